//! Neural Network module.

use fxhash::FxHashMap;

use crate::genome::genome::Genome;

/// Steepened sigmoid applied by every non-input node. The 4.9 factor is part
/// of the evaluation contract.
pub fn activate(x: f32) -> f32 {
    1.0 / (1.0 + (-4.9 * x).exp())
}

/// A generic trait for phenotype networks built from genomes.
/// The lifetime parameter 'n represents the lifetime of the genome reference.
pub trait NeuralNetwork<'n> {
    /// Create a network by borrowing the genome.
    /// This can error if the genome is invalid for the network type.
    fn new(genome: &'n Genome) -> Result<Self, NetworkError>
    where
        Self: Sized;

    /// Evaluate the network once. Inputs are addressed by input-node id;
    /// an absent id reads as zero. Outputs come back sorted by node id.
    fn evaluate(&mut self, inputs: &FxHashMap<usize, f32>) -> Vec<(usize, f32)>;
}

/// Error types
#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum NetworkError {
    #[error("cycle in enabled connection graph: {0} node(s) unreachable by topological order")]
    CycleDetected(usize),
}
