//! NEAT (NeuroEvolution of Augmenting Topologies) core: a population of
//! genomes whose weights and topology co-evolve under speciation and
//! historical markings. The host supplies a fitness per genome per
//! generation; [`Population::epoch`] does the rest.

pub mod context;
pub mod genome;
pub mod nn;
pub mod population;
pub mod species;
pub mod state;

pub use context::{EffectiveRates, MutationRates, NeatConfig};
pub use genome::genes::{ConnectionGene, NodeGene, NodeKind};
pub use genome::genome::Genome;
pub use nn::feedforward::FeedforwardNetwork;
pub use nn::nn::{NetworkError, NeuralNetwork};
pub use population::{Population, PopulationStats};
pub use species::Species;
pub use state::{InnovationRecord, SpeciationManager};
