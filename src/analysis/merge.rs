// src/analysis/merge.rs
use rand::seq::index;
use rand::Rng;

/// Run up to `merges` random pairwise merges on `population` in place.
///
/// Each merge picks two distinct positions uniformly, adds the second mass
/// into the first and drops the second by moving the last element into its
/// slot. Total mass is conserved and the population shrinks by one per merge;
/// once a single element remains further merges are no-ops.
pub fn merge<'a, R: Rng + ?Sized>(
    population: &'a mut Vec<f64>,
    merges: usize,
    rng: &mut R,
) -> &'a mut Vec<f64> {
    for _ in 0..merges {
        if population.len() < 2 {
            break;
        }
        let picked = index::sample(rng, population.len(), 2);
        merge_pair(population, picked.index(0), picked.index(1));
    }
    population
}

/// Merge the mass at `from` into `into`, removing `from` in O(1).
pub fn merge_pair(population: &mut Vec<f64>, into: usize, from: usize) {
    debug_assert_ne!(into, from, "a mass cannot merge with itself");
    population[into] += population[from];
    // If `into` was the last slot, swap_remove moves the merged mass to `from`.
    population.swap_remove(from);
}
