use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Input,
    Bias,
    Hidden,
    Output,
}

// Nodes carry no weights; the kind is fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: usize,
    pub kind: NodeKind,
}

impl NodeGene {
    pub fn new(id: usize, kind: NodeKind) -> Self {
        NodeGene { id, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    pub in_node: usize,
    pub out_node: usize,
    pub weight: f32,
    pub enabled: bool,

    // unique historical marking, immutable
    pub innovation: usize,
}

impl ConnectionGene {
    pub fn new(connection: (usize, usize), weight: f32, innovation: usize) -> Self {
        ConnectionGene {
            in_node: connection.0,
            out_node: connection.1,
            weight,
            enabled: true,
            innovation,
        }
    }
}
