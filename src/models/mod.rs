//! Typed, immutable description of a channel's schedulable content.
//!
//! Everything here is constructed once by the config loader and consumed by a
//! single solve; there is no shared mutable state anywhere in this module.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of media an item or bumper represents, as emitted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Episode,
    Movie,
    MusicVideo,
    OtherVideo,
}

/// How bumper pools are mixed slot-by-slot within a break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixingStrategy {
    RoundRobin,
    Weighted,
}

/// A `(season, episode)` pair extracted from a sequential-pool item's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpisodeId {
    pub season: u32,
    pub episode: u32,
}

/// A single schedulable content unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Canonical identity; must be unique across all pools and bumper pools.
    pub path: String,
    pub duration_s: u32,
    pub pool: String,
    pub media_type: MediaType,
    pub repeatable: bool,
    pub repeat_cost_s: u32,
    pub max_extra_uses: u32,
    /// Populated when the item's pool is sequential; `None` otherwise.
    pub sequence_id: Option<EpisodeId>,
}

/// Governs a set of items sharing scheduling policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub name: String,
    pub default_type: MediaType,
    /// If true, items in this pool must appear in nondecreasing `(season, episode)` order.
    pub sequential: bool,
    pub default_repeatable: bool,
    pub default_repeat_cost_s: u32,
    pub default_max_extra_uses: u32,
    /// A pool "dominates" a block once its total seconds there reach this threshold.
    pub dominant_block_threshold_s: u32,
    /// Penalty applied when two adjacent blocks are both dominant for this pool.
    pub dominant_block_penalty_s: u32,
}

/// A short interstitial item played between content blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumperItem {
    pub path: String,
    pub duration_s: u32,
    pub media_type: MediaType,
}

/// One named bumper pool and its mixing weight.
#[derive(Debug, Clone)]
pub struct BumperPoolConfig {
    pub name: String,
    pub weight: f64,
    pub items: Vec<BumperItem>,
}

/// Governs how bumpers are selected and inserted between blocks.
#[derive(Debug, Clone)]
pub struct BumpersConfig {
    pub slots_per_break: u32,
    pub mixing_strategy: MixingStrategy,
    /// Declaration order; `round_robin` cycles through pools in this order.
    pub pools: Vec<BumperPoolConfig>,
}

impl BumpersConfig {
    pub fn pool(&self, name: &str) -> Option<&BumperPoolConfig> {
        self.pools.iter().find(|p| p.name == name)
    }
}

/// Knobs controlling the block scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    /// Target block capacity in seconds.
    pub block_s: u32,
    /// When true, items with `duration_s >= block_s` are long-form and must be solo.
    pub longform_consumes_block: bool,
    /// Extra seconds of slack allowed above `block_s` for non-long blocks.
    pub allow_short_overflow_s: u32,
    /// Wall-clock cap per solver phase.
    pub time_limit_sec: u32,
    /// Non-zero at the solver boundary; `0` means "auto" and must be replaced by the caller.
    pub seed: u32,
}

impl SolverConfig {
    pub fn ceiling_s(&self) -> u32 {
        self.block_s + self.allow_short_overflow_s
    }
}

/// The full, validated description of a channel ready to be scheduled.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub solver: SolverConfig,
    pub bumpers: BumpersConfig,
    pub pools: HashMap<String, PoolConfig>,
    /// Pool names in declaration order. `pools` is a map for O(1) lookup by
    /// name, but model construction needs a stable iteration order so that
    /// two solves of the same config build byte-identical CP models.
    pub pool_order: Vec<String>,
    pub items: Vec<Item>,
}

impl ChannelConfig {
    /// Pools in declaration order.
    pub fn pools_ordered(&self) -> impl Iterator<Item = &PoolConfig> {
        self.pool_order.iter().filter_map(move |name| self.pools.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_adds_overflow() {
        let s = SolverConfig {
            block_s: 1800,
            longform_consumes_block: true,
            allow_short_overflow_s: 60,
            time_limit_sec: 30,
            seed: 1,
        };
        assert_eq!(s.ceiling_s(), 1860);
    }
}
