use crate::genome::genome::Genome;

/// A bucket of compatible genomes. Members are indices into the population's
/// current generation; the representative is a detached clone used only for
/// distance comparison while speciating.
#[derive(Debug, Clone)]
pub struct Species {
    pub id: usize,
    pub representative: Genome,
    pub members: Vec<usize>,
    // Watermark of the best member fitness ever seen in this species
    pub best_fitness: f32,
    // Generations since best_fitness improved
    pub stale: usize,
    pub average: f32,
}

impl Species {
    pub fn new(id: usize, representative: Genome) -> Self {
        Species {
            id,
            representative,
            members: Vec::new(),
            best_fitness: f32::NEG_INFINITY,
            stale: 0,
            average: 0.0,
        }
    }

    pub fn add_member(&mut self, index: usize) {
        self.members.push(index);
    }

    pub fn clear_members(&mut self) {
        self.members.clear();
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    // Explicit fitness sharing: each member's fitness divided by the bucket
    // size. `average` keeps the species' summed adjusted fitness, which is
    // also its share weight for offspring allocation.
    pub fn compute_adjusted_fitnesses(&mut self, genomes: &mut [Genome]) {
        let size = self.members.len() as f32;
        let mut total = 0.0;
        for &index in &self.members {
            let adjusted = genomes[index].fitness / size;
            genomes[index].adjusted_fitness = adjusted;
            total += adjusted;
        }
        self.average = total;
    }

    pub fn update_stagnation(&mut self, genomes: &[Genome]) {
        let best = self
            .members
            .iter()
            .map(|&index| genomes[index].fitness)
            .fold(f32::NEG_INFINITY, f32::max);
        if best > self.best_fitness {
            self.best_fitness = best;
            self.stale = 0;
        } else {
            self.stale += 1;
        }
    }

    // Behavioural test, not identity: matching the all-time best fitness is
    // enough to exempt this species from the stagnation cull
    pub fn contains_best(&self, genomes: &[Genome], best_fitness: f32) -> bool {
        self.members
            .iter()
            .any(|&index| genomes[index].fitness >= best_fitness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genomes_with_fitness(fitnesses: &[f32]) -> Vec<Genome> {
        fitnesses
            .iter()
            .map(|&fitness| Genome {
                fitness,
                ..Genome::new()
            })
            .collect()
    }

    #[test]
    fn fitness_sharing_divides_by_member_count() {
        let mut genomes = genomes_with_fitness(&[3.0, 6.0, 9.0]);
        let mut species = Species::new(1, genomes[0].clone());
        for index in 0..genomes.len() {
            species.add_member(index);
        }

        species.compute_adjusted_fitnesses(&mut genomes);

        let adjusted_sum: f32 = genomes.iter().map(|genome| genome.adjusted_fitness).sum();
        let raw_sum: f32 = genomes.iter().map(|genome| genome.fitness).sum();
        assert!((adjusted_sum - raw_sum / 3.0).abs() < 1e-6);
        assert!((species.average - adjusted_sum).abs() < 1e-6);
        assert!((genomes[1].adjusted_fitness - 2.0).abs() < 1e-6);
    }

    #[test]
    fn stagnation_counts_generations_without_improvement() {
        let mut genomes = genomes_with_fitness(&[1.0, 2.0]);
        let mut species = Species::new(1, genomes[0].clone());
        species.add_member(0);
        species.add_member(1);

        species.update_stagnation(&genomes);
        assert_eq!(species.best_fitness, 2.0);
        assert_eq!(species.stale, 0);

        species.update_stagnation(&genomes);
        assert_eq!(species.stale, 1);
        species.update_stagnation(&genomes);
        assert_eq!(species.stale, 2);

        genomes[0].fitness = 5.0;
        species.update_stagnation(&genomes);
        assert_eq!(species.best_fitness, 5.0);
        assert_eq!(species.stale, 0);
    }

    #[test]
    fn best_containment_compares_fitness_not_identity() {
        let genomes = genomes_with_fitness(&[1.0, 4.0]);
        let mut species = Species::new(1, genomes[0].clone());
        species.add_member(0);
        species.add_member(1);

        assert!(species.contains_best(&genomes, 4.0));
        assert!(!species.contains_best(&genomes, 4.5));
    }
}
