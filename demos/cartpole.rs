use fxhash::FxHashMap;
use neat_evolve::{FeedforwardNetwork, Genome, NeatConfig, NeuralNetwork, Population};

/// Simulates cartpole dynamics using Euler integration.
/// The network takes 4 inputs: cart x, cart velocity, pole angle, and pole
/// angular velocity, and outputs a force direction to keep the pole balanced.
/// Fitness is the number of simulation steps the pole remains balanced.
fn cartpole_fitness(genome: &Genome, network: &mut FeedforwardNetwork) -> f32 {
    let dt = 0.02; // seconds
    let gravity = 9.8;
    let mass_cart = 1.0;
    let mass_pole = 0.1;
    let pole_length = 0.5; // half-length of pole
    let force_mag = 10.0;
    let max_steps = 500;

    let (mut x, mut x_dot, mut theta, mut theta_dot) = (0.0f32, 0.0f32, 0.05f32, 0.0f32);

    let mut steps = 0;
    for _ in 0..max_steps {
        let mut inputs = FxHashMap::default();
        for (&id, &value) in genome
            .input_nodes
            .iter()
            .zip([x, x_dot, theta, theta_dot].iter())
        {
            inputs.insert(id, value);
        }
        let output = network.evaluate(&inputs)[0].1;
        let force = if output > 0.5 { force_mag } else { -force_mag };

        let costheta = theta.cos();
        let sintheta = theta.sin();
        let temp = (force + mass_pole * pole_length * theta_dot.powi(2) * sintheta)
            / (mass_cart + mass_pole);
        let theta_acc = (gravity * sintheta - costheta * temp)
            / (pole_length * (4.0 / 3.0 - mass_pole * costheta.powi(2) / (mass_cart + mass_pole)));
        let x_acc = temp - mass_pole * pole_length * theta_acc * costheta / (mass_cart + mass_pole);

        x += dt * x_dot;
        x_dot += dt * x_acc;
        theta += dt * theta_dot;
        theta_dot += dt * theta_acc;
        steps += 1;

        if x.abs() > 2.4 || theta.abs() > 0.20944 {
            break;
        }
    }
    steps as f32
}

fn main() {
    let config = NeatConfig {
        population_size: 100,
        input_count: 4,
        output_count: 1,
        bias: true,
        randomize_hidden_layers: true,
        min_hidden_layers: 1,
        max_hidden_layers: 2,
        min_nodes_per_layer: 2,
        max_nodes_per_layer: 4,
        sparse_connectivity: true,
        connection_probability: 0.6,
        guaranteed_output_connections: true,
        connection_mutation_amplifier_range: 5..25,
        ..NeatConfig::default()
    };
    let mut population = Population::new(config);

    for _ in 0..50 {
        population.par_evaluate(cartpole_fitness).unwrap();
        population.epoch();
        let stats = population.stats();
        println!(
            "generation {:2}  best {:5.0} steps  species {:2}",
            stats.generation, stats.best_fitness, stats.species
        );
        if stats.best_fitness >= 500.0 {
            println!("pole balanced for the full episode");
            break;
        }
    }
}
