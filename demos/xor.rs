use fxhash::FxHashMap;
use neat_evolve::{FeedforwardNetwork, Genome, NeatConfig, NeuralNetwork, Population};

const CASES: [(f32, f32); 4] = [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)];

fn xor_fitness(genome: &Genome, network: &mut FeedforwardNetwork) -> f32 {
    let mut fitness = 4.0;
    for (a, b) in CASES {
        let mut inputs = FxHashMap::default();
        inputs.insert(genome.input_nodes[0], a);
        inputs.insert(genome.input_nodes[1], b);
        let output = network.evaluate(&inputs)[0].1;
        let expected = if (a > 0.5) ^ (b > 0.5) { 1.0 } else { 0.0 };
        fitness -= (output - expected).abs();
    }
    fitness
}

fn main() {
    let config = NeatConfig {
        population_size: 150,
        input_count: 2,
        output_count: 1,
        bias: true,
        ..NeatConfig::default()
    };
    let mut population = Population::new(config);

    for _ in 0..200 {
        population.evaluate(xor_fitness).unwrap();
        population.epoch();
        let stats = population.stats();
        println!(
            "generation {:3}  best {:.3}  species {:2}  threshold {:.2}",
            stats.generation, stats.best_fitness, stats.species, stats.compat_threshold
        );
        if stats.best_fitness >= 3.9 {
            break;
        }
    }

    if let Some(champion) = population.best() {
        println!(
            "champion: {} nodes, {} connections, fitness {:.3}",
            champion.nodes.len(),
            champion.connections.len(),
            champion.fitness
        );
        let mut network = FeedforwardNetwork::new(champion).unwrap();
        for (a, b) in CASES {
            let mut inputs = FxHashMap::default();
            inputs.insert(champion.input_nodes[0], a);
            inputs.insert(champion.input_nodes[1], b);
            let output = network.evaluate(&inputs)[0].1;
            println!("{} xor {} -> {:.3}", a, b, output);
        }
    }
}
