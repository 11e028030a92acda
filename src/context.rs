use serde::{Deserialize, Serialize};
use std::ops::Range;

// Node-addition amplifier endpoints: early generations explore topology hard,
// later ones grow conservatively
const NODE_AMPLIFIER_START: f32 = 20.0;
const NODE_AMPLIFIER_END: f32 = 0.5;
// Flat multiplier on connection add/remove rates inside the configured window
const CONNECTION_AMPLIFIER: f32 = 4.0;

// Caps for the permanent stagnation ratchet
const MAX_ADD_NODE_RATE: f32 = 0.2;
const MAX_ADD_CONN_RATE: f32 = 0.3;
const MAX_REMOVE_CONN_RATE: f32 = 0.3;
const MAX_PERTURB_STRENGTH: f32 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeatConfig {
    // General parameters
    pub population_size: usize,

    // Initial genome topology
    pub input_count: usize,
    pub output_count: usize,
    pub bias: bool,
    // Fixed hidden layer sizes, or randomised per genome within the bounds below
    pub hidden_layers: Vec<usize>,
    pub randomize_hidden_layers: bool,
    pub min_hidden_layers: usize,
    pub max_hidden_layers: usize,
    pub min_nodes_per_layer: usize,
    pub max_nodes_per_layer: usize,

    // Initial wiring
    pub sparse_connectivity: bool,
    pub connection_probability: f32,
    pub skip_connections: bool,
    pub guaranteed_output_connections: bool,

    // Compatibility parameters
    pub initial_compatibility_threshold: f32,
    pub c1: f32,
    pub c2: f32,
    pub c3: f32,

    // Weight mutation
    pub weight_mutation_rate: f32,
    pub weight_perturb_rate: f32,
    pub weight_perturb_strength: f32,
    pub uniform_weight_rate: f32,
    pub weight_init_range: f32,

    // Structural mutation base rates
    pub add_node_rate: f32,
    pub add_conn_rate: f32,
    pub remove_conn_rate: f32,
    // How many times the per-genome mutation cycle repeats
    pub max_mutation_attempts: usize,

    // Reproduction parameters
    pub crossover_rate: f32,
    pub survival_threshold: f32,
    pub elitism: usize,
    pub stagnation_threshold: usize,

    // Mutation schedule
    pub mutation_amplifier_over_generations: usize,
    pub connection_mutation_amplifier_range: Range<usize>,
}

impl Default for NeatConfig {
    fn default() -> Self {
        NeatConfig {
            population_size: 150,

            input_count: 2,
            output_count: 1,
            bias: true,
            hidden_layers: Vec::new(),
            randomize_hidden_layers: false,
            min_hidden_layers: 1,
            max_hidden_layers: 2,
            min_nodes_per_layer: 1,
            max_nodes_per_layer: 4,

            sparse_connectivity: false,
            connection_probability: 0.5,
            skip_connections: false,
            guaranteed_output_connections: true,

            initial_compatibility_threshold: 3.0,
            c1: 1.0,
            c2: 1.0,
            c3: 0.4,

            weight_mutation_rate: 0.8,
            weight_perturb_rate: 0.9,
            weight_perturb_strength: 0.5,
            uniform_weight_rate: 0.1,
            weight_init_range: 2.0,

            add_node_rate: 0.03,
            add_conn_rate: 0.05,
            remove_conn_rate: 0.02,
            max_mutation_attempts: 1,

            crossover_rate: 0.75,
            survival_threshold: 0.2,
            elitism: 1,
            stagnation_threshold: 15,

            mutation_amplifier_over_generations: 10,
            connection_mutation_amplifier_range: 0..0,
        }
    }
}

/// The mutation intensities the run adjusts as it goes. The base
/// [`NeatConfig`] stays a pure input; prolonged stagnation ratchets these
/// session values up permanently, and the generation schedule amplifies them
/// further on the way into each reproduction pass.
#[derive(Debug, Clone)]
pub struct MutationRates {
    pub add_node_rate: f32,
    pub add_conn_rate: f32,
    pub remove_conn_rate: f32,
    pub weight_perturb_strength: f32,
}

// Effective structural rates for one generation, after amplifiers
#[derive(Debug, Clone, Copy)]
pub struct EffectiveRates {
    pub add_node_rate: f32,
    pub add_conn_rate: f32,
    pub remove_conn_rate: f32,
}

impl MutationRates {
    pub fn from_config(config: &NeatConfig) -> Self {
        MutationRates {
            add_node_rate: config.add_node_rate,
            add_conn_rate: config.add_conn_rate,
            remove_conn_rate: config.remove_conn_rate,
            weight_perturb_strength: config.weight_perturb_strength,
        }
    }

    // Permanent inflation applied after prolonged stagnation. Capped.
    pub fn ratchet(&mut self) {
        self.add_node_rate = (self.add_node_rate * 1.1).min(MAX_ADD_NODE_RATE);
        self.add_conn_rate = (self.add_conn_rate * 1.1).min(MAX_ADD_CONN_RATE);
        self.remove_conn_rate = (self.remove_conn_rate * 1.1).min(MAX_REMOVE_CONN_RATE);
        self.weight_perturb_strength =
            (self.weight_perturb_strength * 1.1).min(MAX_PERTURB_STRENGTH);
    }

    // Structural rates for this generation under the scheduled amplifiers
    pub fn effective(&self, config: &NeatConfig, generation: usize) -> EffectiveRates {
        let horizon = config.mutation_amplifier_over_generations;
        let node_amplifier = if horizon > 0 && generation <= horizon {
            let progress = generation as f32 / horizon as f32;
            NODE_AMPLIFIER_START * (1.0 - progress) + NODE_AMPLIFIER_END * progress
        } else {
            1.0
        };
        let conn_amplifier = if config
            .connection_mutation_amplifier_range
            .contains(&generation)
        {
            CONNECTION_AMPLIFIER
        } else {
            1.0
        };
        EffectiveRates {
            add_node_rate: self.add_node_rate * node_amplifier,
            add_conn_rate: self.add_conn_rate * conn_amplifier,
            remove_conn_rate: self.remove_conn_rate * conn_amplifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratchet_is_capped() {
        let mut rates = MutationRates::from_config(&NeatConfig::default());
        for _ in 0..100 {
            rates.ratchet();
        }
        assert_eq!(rates.add_node_rate, MAX_ADD_NODE_RATE);
        assert_eq!(rates.add_conn_rate, MAX_ADD_CONN_RATE);
        assert_eq!(rates.remove_conn_rate, MAX_REMOVE_CONN_RATE);
        assert_eq!(rates.weight_perturb_strength, MAX_PERTURB_STRENGTH);
    }

    #[test]
    fn node_amplifier_decays_over_horizon() {
        let config = NeatConfig {
            mutation_amplifier_over_generations: 10,
            ..NeatConfig::default()
        };
        let rates = MutationRates::from_config(&config);

        let early = rates.effective(&config, 0);
        assert!((early.add_node_rate - config.add_node_rate * NODE_AMPLIFIER_START).abs() < 1e-6);

        let late = rates.effective(&config, 10);
        assert!((late.add_node_rate - config.add_node_rate * NODE_AMPLIFIER_END).abs() < 1e-6);

        let past = rates.effective(&config, 11);
        assert_eq!(past.add_node_rate, config.add_node_rate);
    }

    #[test]
    fn connection_amplifier_applies_inside_window() {
        let config = NeatConfig {
            mutation_amplifier_over_generations: 0,
            connection_mutation_amplifier_range: 5..10,
            ..NeatConfig::default()
        };
        let rates = MutationRates::from_config(&config);

        let outside = rates.effective(&config, 4);
        assert_eq!(outside.add_conn_rate, config.add_conn_rate);

        let inside = rates.effective(&config, 5);
        assert!((inside.add_conn_rate - config.add_conn_rate * CONNECTION_AMPLIFIER).abs() < 1e-6);
        assert!(
            (inside.remove_conn_rate - config.remove_conn_rate * CONNECTION_AMPLIFIER).abs() < 1e-6
        );

        let after = rates.effective(&config, 10);
        assert_eq!(after.add_conn_rate, config.add_conn_rate);
    }
}
