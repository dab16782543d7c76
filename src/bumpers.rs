//! Bumper selection between content blocks.
//!
//! This is deliberately outside the CP model: a deterministic, debuggable
//! post-processing step driven purely by config and a seed, so a break's
//! bumpers can be inspected or reproduced without touching the solver.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::models::{BumperItem, BumpersConfig, MixingStrategy};

/// Exhaust-before-repeat shuffler for a single bumper pool.
///
/// Hands out every item in the pool exactly once per "bag", refilling with a
/// fresh shuffle when the bag runs dry, and rotates the fresh bag by one slot
/// if the shuffle would otherwise repeat the last-returned path back to back.
struct ExhaustShuffleCycler {
    items: Vec<BumperItem>,
    rng: StdRng,
    bag: Vec<BumperItem>,
    last_path: Option<String>,
}

impl ExhaustShuffleCycler {
    fn new(items: Vec<BumperItem>, seed: u32) -> Self {
        assert!(!items.is_empty(), "bumper pool requires at least one item");
        Self {
            items,
            rng: StdRng::seed_from_u64(seed as u64),
            bag: Vec::new(),
            last_path: None,
        }
    }

    fn refill(&mut self) {
        let mut bag = self.items.clone();
        bag.shuffle(&mut self.rng);
        if let Some(last) = &self.last_path {
            if bag.len() > 1 && &bag[0].path == last {
                bag.rotate_left(1);
            }
        }
        self.bag = bag;
    }

    fn next(&mut self) -> BumperItem {
        if self.bag.is_empty() {
            self.refill();
        }
        // `refill` always produces a non-empty bag since `items` is non-empty.
        let item = self.bag.remove(0);
        self.last_path = Some(item.path.clone());
        item
    }
}

/// Produces the bumpers for one break at a time, as a lazy infinite sequence.
pub struct BumperSelector {
    pool_names: Vec<String>,
    mixing_strategy: MixingStrategy,
    slots_per_break: u32,
    rr_index: usize,
    weighted_rng: StdRng,
    weights: Vec<f64>,
    cyclers: Vec<ExhaustShuffleCycler>,
}

impl BumperSelector {
    pub fn new(cfg: &BumpersConfig, seed: u32) -> Self {
        assert!(cfg.slots_per_break >= 1, "bumpers.slots_per_break must be >= 1");
        assert!(!cfg.pools.is_empty(), "bumpers.pools must be non-empty");

        let pool_names: Vec<String> = cfg.pools.iter().map(|p| p.name.clone()).collect();
        let weights: Vec<f64> = cfg.pools.iter().map(|p| p.weight.max(0.0)).collect();
        let cyclers = cfg
            .pools
            .iter()
            .map(|p| {
                let pool_seed = seed ^ (crate::stable_hash::stable_hash(&p.name) & 0xFFFF_FFFF);
                ExhaustShuffleCycler::new(p.items.clone(), pool_seed)
            })
            .collect();

        Self {
            pool_names,
            mixing_strategy: cfg.mixing_strategy,
            slots_per_break: cfg.slots_per_break,
            rr_index: 0,
            weighted_rng: StdRng::seed_from_u64((seed ^ 0xA5A5_A5A5) as u64),
            weights,
            cyclers,
        }
    }

    fn choose_pool_index(&mut self) -> usize {
        match self.mixing_strategy {
            MixingStrategy::RoundRobin => {
                let idx = self.rr_index % self.pool_names.len();
                self.rr_index += 1;
                idx
            }
            MixingStrategy::Weighted => {
                let total: f64 = self.weights.iter().sum();
                if total <= 0.0 {
                    let idx = self.rr_index % self.pool_names.len();
                    self.rr_index += 1;
                    return idx;
                }
                let indices: Vec<usize> = (0..self.pool_names.len()).collect();
                *indices
                    .choose_weighted(&mut self.weighted_rng, |&i| self.weights[i])
                    .expect("non-empty, positive-weight-sum choice set")
            }
        }
    }

    /// Return the bumper items for one break.
    pub fn next_bumpers(&mut self) -> Vec<BumperItem> {
        let mut out = Vec::with_capacity(self.slots_per_break as usize);
        for _ in 0..self.slots_per_break {
            let idx = self.choose_pool_index();
            out.push(self.cyclers[idx].next());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BumperPoolConfig, MediaType};

    fn pool(name: &str, n: usize) -> BumperPoolConfig {
        BumperPoolConfig {
            name: name.to_string(),
            weight: 1.0,
            items: (0..n)
                .map(|i| BumperItem {
                    path: format!("/bump/{}/{}.mkv", name, i),
                    duration_s: 10,
                    media_type: MediaType::OtherVideo,
                })
                .collect(),
        }
    }

    #[test]
    fn round_robin_alternates_pools() {
        let cfg = BumpersConfig {
            slots_per_break: 2,
            mixing_strategy: MixingStrategy::RoundRobin,
            pools: vec![pool("a", 3), pool("b", 3)],
        };
        let mut sel = BumperSelector::new(&cfg, 7);
        let b1 = sel.next_bumpers();
        assert!(b1[0].path.contains("/a/"));
        assert!(b1[1].path.contains("/b/"));
        let b2 = sel.next_bumpers();
        assert!(b2[0].path.contains("/a/"));
        assert!(b2[1].path.contains("/b/"));
    }

    #[test]
    fn exhausts_before_repeating() {
        let cfg = BumpersConfig {
            slots_per_break: 1,
            mixing_strategy: MixingStrategy::RoundRobin,
            pools: vec![pool("solo", 4)],
        };
        let mut sel = BumperSelector::new(&cfg, 42);
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(sel.next_bumpers()[0].path.clone());
        }
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4, "every item must appear once before any repeats");
    }

    #[test]
    fn deterministic_across_runs_with_same_seed() {
        let cfg = BumpersConfig {
            slots_per_break: 1,
            mixing_strategy: MixingStrategy::Weighted,
            pools: vec![pool("x", 5), pool("y", 5)],
        };
        let seq = |seed: u32| -> Vec<String> {
            let mut sel = BumperSelector::new(&cfg, seed);
            (0..10).map(|_| sel.next_bumpers()[0].path.clone()).collect()
        };
        assert_eq!(seq(99), seq(99));
    }
}
