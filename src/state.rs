use fxhash::FxHashMap;

// Manages the amount of species through adjusting the compatibility threshold
// Also holds the current species counter (simple id for species)
#[derive(Debug, Clone)]
pub struct SpeciationManager {
    // Changing compatibility threshold
    pub compatibility_threshold: f32,
    // Incrementing species id
    species_counter: usize,
    // Amount of species we should try for
    target_species_count: usize,
}

impl SpeciationManager {
    pub fn new(compatibility_threshold: f32, population_size: usize) -> Self {
        SpeciationManager {
            compatibility_threshold,
            species_counter: 0,
            target_species_count: (population_size / 10).clamp(5, 20),
        }
    }

    // Gives a new species id
    pub fn next_species_id(&mut self) -> usize {
        self.species_counter += 1;
        self.species_counter
    }

    // Adjusts the compatibility threshold based on the current species count
    // against the target species count, keeping it inside [0.5, 5.0]
    pub fn adjust_threshold(&mut self, current_species_count: usize) {
        if current_species_count > self.target_species_count {
            self.compatibility_threshold *= 1.05;
        } else {
            self.compatibility_threshold *= 0.95;
        }
        self.compatibility_threshold = self.compatibility_threshold.clamp(0.5, 5.0);
    }
}

/// Historical markings for the whole run. A `(from, to)` connection pair is
/// assigned an innovation id once and answers with the same id forever after,
/// in any genome and any generation. Node ids are fresh on every request.
#[derive(Debug, Clone, Default)]
pub struct InnovationRecord {
    node_counter: usize,
    innovation_counter: usize,
    innovations: FxHashMap<(usize, usize), usize>,
}

impl InnovationRecord {
    pub fn new() -> Self {
        InnovationRecord {
            node_counter: 0,
            innovation_counter: 0,
            innovations: FxHashMap::default(),
        }
    }

    // Innovation id for a connection - consistent across the population
    pub fn record_connection_innovation(&mut self, from: usize, to: usize) -> usize {
        if let Some(&id) = self.innovations.get(&(from, to)) {
            return id;
        }
        self.innovation_counter += 1;
        self.innovations.insert((from, to), self.innovation_counter);
        self.innovation_counter
    }

    // Fresh node id, strictly increasing. Never deduplicated.
    pub fn record_node_innovation(&mut self) -> usize {
        self.node_counter += 1;
        self.node_counter
    }
}
