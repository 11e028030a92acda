use fxhash::{FxHashMap, FxHashSet};
use petgraph::{algo, graph::DiGraph};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::context::NeatConfig;
use crate::state::InnovationRecord;

use super::genes::{ConnectionGene, NodeGene, NodeKind};

// How many random node pairs an add-connection mutation tries before giving up
pub const ADD_CONNECTION_ATTEMPTS: usize = 20;

// Genome is a single entity: an owned graph of node and connection genes,
// keyed by node id and innovation id respectively
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub nodes: FxHashMap<usize, NodeGene>,
    pub connections: FxHashMap<usize, ConnectionGene>,
    pub connection_set: FxHashSet<(usize, usize)>,

    // Keys of input nodes
    pub input_nodes: Vec<usize>,
    pub bias_node: Option<usize>,
    // Keys of output nodes
    pub output_nodes: Vec<usize>,

    pub fitness: f32,
    pub adjusted_fitness: f32,
}

impl Genome {
    pub fn new() -> Self {
        Genome {
            nodes: FxHashMap::default(),
            connections: FxHashMap::default(),
            connection_set: FxHashSet::default(),
            input_nodes: Vec::new(),
            bias_node: None,
            output_nodes: Vec::new(),
            fitness: 0.0,
            adjusted_fitness: 0.0,
        }
    }

    // Return a new genome from another, with fitness reset
    pub fn from_existing(&self) -> Self {
        Genome {
            fitness: 0.0,
            adjusted_fitness: 0.0,
            ..self.clone()
        }
    }

    pub fn add_node(&mut self, node: NodeGene) {
        self.nodes.insert(node.id, node);
    }

    pub fn add_connection(&mut self, connection: ConnectionGene) {
        self.connection_set
            .insert((connection.in_node, connection.out_node));
        self.connections.insert(connection.innovation, connection);
    }

    pub fn has_connection(&self, from: usize, to: usize) -> bool {
        self.connection_set.contains(&(from, to))
    }

    // Random picks and scans go through sorted key lists so that genomes with
    // equal contents draw identically under the same rng
    fn sorted_node_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn sorted_innovations(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.connections.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // Whether adding from -> to would close a directed cycle over the
    // currently enabled connections
    fn would_create_cycle(&self, from: usize, to: usize) -> bool {
        let mut graph = DiGraph::<usize, ()>::new();
        let mut indices = FxHashMap::default();
        for id in self.sorted_node_ids() {
            indices.insert(id, graph.add_node(id));
        }
        for id in self.sorted_innovations() {
            let conn = &self.connections[&id];
            if conn.enabled {
                graph.add_edge(indices[&conn.in_node], indices[&conn.out_node], ());
            }
        }
        graph.add_edge(indices[&from], indices[&to], ());
        algo::is_cyclic_directed(&graph)
    }

    /// Try to connect two previously unconnected nodes. Draws random pairs
    /// until one is viable or the attempt budget runs out; a pair is rejected
    /// if it is a self-loop, a trivial output-to-input edge, an existing
    /// connection, or an edge that would close a cycle.
    pub fn mutate_add_connection(
        &mut self,
        rng: &mut dyn RngCore,
        innovation: &mut InnovationRecord,
        max_attempts: usize,
    ) -> bool {
        let ids = self.sorted_node_ids();
        if ids.len() < 2 {
            return false;
        }

        for _ in 0..max_attempts {
            let from = ids[rng.random_range(0..ids.len())];
            let to = ids[rng.random_range(0..ids.len())];
            if from == to {
                continue;
            }
            if self.nodes[&from].kind == NodeKind::Output && self.nodes[&to].kind == NodeKind::Input
            {
                continue;
            }
            if self.has_connection(from, to) {
                continue;
            }
            if self.would_create_cycle(from, to) {
                continue;
            }

            // Innovation id for this connection - consistent across the population
            let id = innovation.record_connection_innovation(from, to);
            self.add_connection(ConnectionGene::new((from, to), rng.random_range(-1.0..=1.0), id));
            return true;
        }

        false
    }

    /// Split a random enabled connection with a fresh hidden node. The edge
    /// into the new node gets weight 1.0 and the edge out keeps the old
    /// weight, so the sub-network's output is unchanged at the moment of the
    /// split.
    pub fn mutate_add_node(
        &mut self,
        rng: &mut dyn RngCore,
        innovation: &mut InnovationRecord,
    ) -> bool {
        let mut enabled: Vec<usize> = self
            .connections
            .values()
            .filter(|conn| conn.enabled)
            .map(|conn| conn.innovation)
            .collect();
        enabled.sort_unstable();
        if enabled.is_empty() {
            return false;
        }

        let picked = enabled[rng.random_range(0..enabled.len())];
        let old = self.connections[&picked];
        self.connections.get_mut(&picked).unwrap().enabled = false;

        let node_id = innovation.record_node_innovation();
        self.add_node(NodeGene::new(node_id, NodeKind::Hidden));

        let in_id = innovation.record_connection_innovation(old.in_node, node_id);
        let out_id = innovation.record_connection_innovation(node_id, old.out_node);
        self.add_connection(ConnectionGene::new((old.in_node, node_id), 1.0, in_id));
        self.add_connection(ConnectionGene::new((node_id, old.out_node), old.weight, out_id));
        true
    }

    /// Delete a random connection outright. Fails only on an empty genome.
    pub fn mutate_remove_connection(&mut self, rng: &mut dyn RngCore) -> bool {
        let innovations = self.sorted_innovations();
        if innovations.is_empty() {
            return false;
        }
        let picked = innovations[rng.random_range(0..innovations.len())];
        let conn = self.connections.remove(&picked).unwrap();
        self.connection_set.remove(&(conn.in_node, conn.out_node));
        true
    }

    // Per connection: perturb the weight, or replace it outright
    pub fn mutate_weights(&mut self, rng: &mut dyn RngCore, config: &NeatConfig) {
        for id in self.sorted_innovations() {
            let conn = self.connections.get_mut(&id).unwrap();
            if rng.random::<f32>() < config.weight_perturb_rate {
                conn.weight += rng.random_range(
                    -config.weight_perturb_strength..=config.weight_perturb_strength,
                );
            } else {
                conn.weight =
                    rng.random_range(-config.weight_init_range..=config.weight_init_range);
            }
        }
    }

    // Weight pass used by the population's mutation cycle: perturb most
    // weights, occasionally reset one outright. `strength` is the session
    // value, which stagnation may have ratcheted past the configured base.
    pub fn perturb_weights(&mut self, rng: &mut dyn RngCore, config: &NeatConfig, strength: f32) {
        for id in self.sorted_innovations() {
            let conn = self.connections.get_mut(&id).unwrap();
            if rng.random::<f32>() < config.weight_perturb_rate {
                conn.weight += rng.random_range(-strength..=strength);
            } else if rng.random::<f32>() < config.uniform_weight_rate {
                conn.weight =
                    rng.random_range(-config.weight_init_range..=config.weight_init_range);
            }
        }
    }

    /// Crossover with a less fit genome. The caller must be the fitter
    /// parent: the child takes this genome's node set, matching genes are
    /// inherited from either side at random, and disjoint or excess genes
    /// come from this genome only.
    pub fn crossover(&self, other: &Genome, rng: &mut dyn RngCore) -> Genome {
        let mut child = Genome::new();
        child.input_nodes = self.input_nodes.clone();
        child.bias_node = self.bias_node;
        child.output_nodes = self.output_nodes.clone();

        for (&id, node) in &self.nodes {
            child.nodes.insert(id, *node);
        }

        // Walk innovations in a consistent order
        for id in self.sorted_innovations() {
            let own = self.connections[&id];
            let gene = match other.connections.get(&id) {
                Some(&theirs) => {
                    if rng.random_bool(0.5) {
                        theirs
                    } else {
                        own
                    }
                }
                // disjoint or excess genes follow the fitter parent
                None => own,
            };
            child.add_connection(gene);
        }

        // Every endpoint a retained gene references must exist in the child
        let missing: Vec<usize> = child
            .connections
            .values()
            .flat_map(|conn| [conn.in_node, conn.out_node])
            .filter(|id| !child.nodes.contains_key(id))
            .collect();
        for id in missing {
            child.nodes.insert(id, NodeGene::new(id, NodeKind::Hidden));
        }

        // A gene inherited enabled from `other` while disabled here may close
        // a cycle the fitter parent's enabled set never had; such genes stay
        // enabled only while the graph remains acyclic
        let mut revived: Vec<usize> = child
            .connections
            .values()
            .filter(|conn| conn.enabled && !self.connections[&conn.innovation].enabled)
            .map(|conn| conn.innovation)
            .collect();
        revived.sort_unstable();
        for id in &revived {
            child.connections.get_mut(id).unwrap().enabled = false;
        }
        for id in revived {
            let (from, to) = {
                let conn = &child.connections[&id];
                (conn.in_node, conn.out_node)
            };
            if !child.would_create_cycle(from, to) {
                child.connections.get_mut(&id).unwrap().enabled = true;
            }
        }

        child
    }

    /// Compatibility distance `c1*E/N + c2*D/N + c3*W` over the union of
    /// innovation ids, where excess genes lie beyond the other genome's
    /// highest marking, disjoint genes inside it, and `W` is the mean
    /// absolute weight difference of matching genes.
    pub fn compatibility(&self, other: &Genome, c1: f32, c2: f32, c3: f32) -> f32 {
        let max_self = self.connections.keys().max().copied().unwrap_or(0);
        let max_other = other.connections.keys().max().copied().unwrap_or(0);

        let mut matching = 0usize;
        let mut disjoint = 0usize;
        let mut excess = 0usize;
        let mut weight_diff = 0.0f32;

        let mut union: Vec<usize> = self
            .connections
            .keys()
            .chain(other.connections.keys())
            .copied()
            .collect();
        union.sort_unstable();
        union.dedup();

        for id in union {
            match (self.connections.get(&id), other.connections.get(&id)) {
                (Some(own), Some(theirs)) => {
                    matching += 1;
                    weight_diff += (own.weight - theirs.weight).abs();
                }
                (Some(_), None) => {
                    if id > max_other {
                        excess += 1;
                    } else {
                        disjoint += 1;
                    }
                }
                (None, Some(_)) => {
                    if id > max_self {
                        excess += 1;
                    } else {
                        disjoint += 1;
                    }
                }
                (None, None) => unreachable!(),
            }
        }

        let mean_weight_diff = if matching > 0 {
            weight_diff / matching as f32
        } else {
            0.0
        };
        let size = self.connections.len().max(other.connections.len()).max(1) as f32;

        c1 * excess as f32 / size + c2 * disjoint as f32 / size + c3 * mean_weight_diff
    }

    // Petgraph view of the topology, for host-side inspection
    pub fn to_graph(&self) -> DiGraph<usize, f32> {
        let mut graph = DiGraph::new();
        let mut indices = FxHashMap::default();
        for id in self.sorted_node_ids() {
            indices.insert(id, graph.add_node(id));
        }
        for id in self.sorted_innovations() {
            let conn = &self.connections[&id];
            graph.add_edge(indices[&conn.in_node], indices[&conn.out_node], conn.weight);
        }
        graph
    }
}

impl Default for Genome {
    fn default() -> Self {
        Genome::new()
    }
}
