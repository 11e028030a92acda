use std::collections::VecDeque;

use fxhash::FxHashMap;

use crate::genome::genes::NodeKind;
use crate::genome::genome::Genome;

use super::nn::{activate, NetworkError, NeuralNetwork};

/// Feedforward phenotype built from a genome snapshot. The structure is
/// frozen at construction; evaluation only writes the activation buffer.
pub struct FeedforwardNetwork<'n> {
    genome: &'n Genome,

    // Topological ordering of the nodes over enabled connections
    sorted_nodes: Vec<usize>,

    // Map from node id to slot in the activation buffer
    node_to_index: FxHashMap<usize, usize>,

    // Incoming (source id, weight) edges per node
    incoming: FxHashMap<usize, Vec<(usize, f32)>>,

    activations: Vec<f32>,
}

impl<'n> NeuralNetwork<'n> for FeedforwardNetwork<'n> {
    /// Create a new feedforward network by borrowing the genome.
    /// A genome whose enabled connections form a cycle is rejected: every
    /// node must be covered by the topological order.
    fn new(genome: &'n Genome) -> Result<Self, NetworkError> {
        let mut node_ids: Vec<usize> = genome.nodes.keys().copied().collect();
        node_ids.sort_unstable();

        let mut node_to_index = FxHashMap::default();
        for (index, &id) in node_ids.iter().enumerate() {
            node_to_index.insert(id, index);
        }

        let mut innovations: Vec<usize> = genome.connections.keys().copied().collect();
        innovations.sort_unstable();

        let mut incoming: FxHashMap<usize, Vec<(usize, f32)>> = FxHashMap::default();
        let mut outgoing: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        let mut in_degree: FxHashMap<usize, usize> = FxHashMap::default();
        for &id in &node_ids {
            incoming.insert(id, Vec::new());
            outgoing.insert(id, Vec::new());
            in_degree.insert(id, 0);
        }

        for id in innovations {
            let conn = &genome.connections[&id];
            if !conn.enabled {
                continue;
            }
            if !genome.nodes.contains_key(&conn.in_node) || !genome.nodes.contains_key(&conn.out_node)
            {
                continue;
            }
            incoming
                .get_mut(&conn.out_node)
                .unwrap()
                .push((conn.in_node, conn.weight));
            outgoing.get_mut(&conn.in_node).unwrap().push(conn.out_node);
            *in_degree.get_mut(&conn.out_node).unwrap() += 1;
        }

        // Kahn's algorithm, seeded in ascending id order
        let mut queue: VecDeque<usize> = node_ids
            .iter()
            .copied()
            .filter(|id| in_degree[id] == 0)
            .collect();
        let mut sorted_nodes = Vec::with_capacity(node_ids.len());

        while let Some(node) = queue.pop_front() {
            sorted_nodes.push(node);
            for &next in &outgoing[&node] {
                let degree = in_degree.get_mut(&next).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }

        if sorted_nodes.len() != node_ids.len() {
            return Err(NetworkError::CycleDetected(
                node_ids.len() - sorted_nodes.len(),
            ));
        }

        let activations = vec![0.0; node_ids.len()];
        Ok(FeedforwardNetwork {
            genome,
            sorted_nodes,
            node_to_index,
            incoming,
            activations,
        })
    }

    fn evaluate(&mut self, inputs: &FxHashMap<usize, f32>) -> Vec<(usize, f32)> {
        self.activations.fill(0.0);

        for &node_id in &self.genome.input_nodes {
            if let Some(&index) = self.node_to_index.get(&node_id) {
                self.activations[index] = inputs.get(&node_id).copied().unwrap_or(0.0);
            }
        }
        if let Some(bias) = self.genome.bias_node {
            if let Some(&index) = self.node_to_index.get(&bias) {
                self.activations[index] = 1.0;
            }
        }

        for &node_id in &self.sorted_nodes {
            let kind = self.genome.nodes[&node_id].kind;
            if kind == NodeKind::Input || kind == NodeKind::Bias {
                continue;
            }

            let sum: f32 = self.incoming[&node_id]
                .iter()
                .map(|&(source, weight)| self.activations[self.node_to_index[&source]] * weight)
                .sum();
            self.activations[self.node_to_index[&node_id]] = activate(sum);
        }

        let mut outputs: Vec<usize> = self.genome.output_nodes.clone();
        outputs.sort_unstable();
        outputs
            .into_iter()
            .map(|id| (id, self.activations[self.node_to_index[&id]]))
            .collect()
    }
}
