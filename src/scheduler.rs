//! Two-phase CP block scheduler. The hard core of the pipeline.
//!
//! Phase 1 finds the minimal number of blocks that can host every base item.
//! Phase 2 fixes that block count and searches for the assignment that
//! minimizes wasted capacity, repeat cost, and pool-diversity penalties,
//! warm-started from the Phase-1 solution.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::cpsat::{Model, Var};
use crate::errors::{AppError, SolvePhase};
use crate::models::{ChannelConfig, Item};
use crate::packing::first_fit_decreasing_bins;

const SEARCH_WORKERS: usize = 8;

/// One scheduled block, in output order: the long item (if any) first, then
/// base shorts ascending by short-index, then repeat shorts ascending by
/// short-index.
#[derive(Debug, Clone)]
pub struct SolvedBlock {
    pub items: Vec<Item>,
    pub is_long: bool,
    pub base_items_count: usize,
    pub repeat_items_count: usize,
    pub content_duration_s: u32,
    pub waste_s: u32,
}

/// The outcome of a full two-phase solve.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub blocks: Vec<SolvedBlock>,
}

/// Extended statistics alongside a [`SolveResult`], reported by the CLI.
#[derive(Debug, Clone, Copy)]
pub struct SolveStats {
    pub target_block_s: u32,
    pub block_count: usize,
    pub repeats_used: usize,
    pub total_waste_s: u32,
    pub seed: u32,
}

struct BaseVars {
    y: Vec<Var>,
    xs: Vec<Vec<Var>>,
    xl: Vec<Vec<Var>>,
    long_present: Vec<Var>,
    block_of_short: Vec<Var>,
    block_of_long: Vec<Var>,
}

/// Builds every Phase-1 variable and constraint into `m`. Called once per
/// phase, against a fresh model, since Phase 2 needs its own copy of every
/// variable to add repeats and quality terms on top.
fn build_base(
    m: &mut Model,
    short: &[Item],
    long: &[Item],
    b_count: usize,
    ceiling_s: u32,
    config: &ChannelConfig,
) -> BaseVars {
    let i_short = short.len();
    let i_long = long.len();

    let y: Vec<Var> = (0..b_count).map(|_| m.new_bool_var()).collect();
    let xs: Vec<Vec<Var>> = (0..i_short).map(|_| (0..b_count).map(|_| m.new_bool_var()).collect()).collect();
    let xl: Vec<Vec<Var>> = (0..i_long).map(|_| (0..b_count).map(|_| m.new_bool_var()).collect()).collect();
    let long_present: Vec<Var> = (0..b_count).map(|_| m.new_bool_var()).collect();

    for i in 0..i_short {
        m.add_eq((0..b_count).map(|b| (1, xs[i][b])).collect(), 1);
    }
    for l in 0..i_long {
        m.add_eq((0..b_count).map(|b| (1, xl[l][b])).collect(), 1);
    }

    for b in 0..b_count {
        m.add_le((0..i_long).map(|l| (1, xl[l][b])).collect(), 1);
        if i_long > 0 {
            let mut terms: Vec<(i64, Var)> = (0..i_long).map(|l| (1, xl[l][b])).collect();
            terms.push((-1, long_present[b]));
            m.add_eq(terms, 0);
        } else {
            m.add_eq(vec![(1, long_present[b])], 0);
        }
    }

    for b in 0..b_count {
        let terms: Vec<(i64, Var)> = (0..i_short).map(|i| (short[i].duration_s as i64, xs[i][b])).collect();
        m.add_le(terms, ceiling_s as i64);

        let no_shorts = m.add_eq((0..i_short).map(|i| (1, xs[i][b])).collect(), 0);
        m.only_enforce_if(no_shorts, long_present[b].is_true());
    }

    for b in 0..b_count {
        for i in 0..i_short {
            m.add_le(vec![(1, xs[i][b]), (-1, y[b])], 0);
        }
        for l in 0..i_long {
            m.add_le(vec![(1, xl[l][b]), (-1, y[b])], 0);
        }
        m.add_le(vec![(1, long_present[b]), (-1, y[b])], 0);
    }

    for b in 0..b_count.saturating_sub(1) {
        m.add_le(vec![(1, y[b + 1]), (-1, y[b])], 0);
    }

    let block_of_short: Vec<Var> = (0..i_short).map(|_| m.new_int_var(0, (b_count as i64) - 1)).collect();
    for i in 0..i_short {
        let mut terms: Vec<(i64, Var)> = vec![(1, block_of_short[i])];
        for b in 0..b_count {
            terms.push((-(b as i64), xs[i][b]));
        }
        m.add_eq(terms, 0);
    }

    let block_of_long: Vec<Var> = (0..i_long).map(|_| m.new_int_var(0, (b_count as i64) - 1)).collect();
    for l in 0..i_long {
        let mut terms: Vec<(i64, Var)> = vec![(1, block_of_long[l])];
        for b in 0..b_count {
            terms.push((-(b as i64), xl[l][b]));
        }
        m.add_eq(terms, 0);
    }

    // Sequential ordering: map each pool member's path to its block-index var.
    let mut block_of_path: HashMap<&str, Var> = HashMap::new();
    for (i, it) in short.iter().enumerate() {
        block_of_path.insert(it.path.as_str(), block_of_short[i]);
    }
    for (l, it) in long.iter().enumerate() {
        block_of_path.insert(it.path.as_str(), block_of_long[l]);
    }

    for pool_cfg in config.pools_ordered() {
        if !pool_cfg.sequential {
            continue;
        }
        let mut eps: Vec<&Item> = config.items.iter().filter(|it| it.pool == pool_cfg.name).collect();
        eps.sort_by_key(|it| {
            let id = it.sequence_id.unwrap_or(crate::models::EpisodeId { season: 0, episode: 0 });
            (id.season, id.episode, it.path.clone())
        });
        for w in eps.windows(2) {
            let (a, b_item) = (w[0], w[1]);
            if let (Some(&va), Some(&vb)) = (block_of_path.get(a.path.as_str()), block_of_path.get(b_item.path.as_str())) {
                m.add_le(vec![(1, va), (-1, vb)], 0);
            }
        }
    }

    BaseVars {
        y,
        xs,
        xl,
        long_present,
        block_of_short,
        block_of_long,
    }
}

/// Run the full two-phase solve for `config`. Returns the extracted blocks
/// plus summary statistics for the CLI report.
pub fn solve(config: &ChannelConfig) -> Result<(SolveResult, SolveStats), AppError> {
    let cap_s = config.solver.block_s;
    let ceiling_s = config.solver.ceiling_s();
    let seed = config.solver.seed;
    let time_limit = Duration::from_secs(config.solver.time_limit_sec as u64);

    let mut long_items: Vec<Item> = Vec::new();
    let mut short_items: Vec<Item> = Vec::new();
    for it in &config.items {
        if config.solver.longform_consumes_block && it.duration_s >= cap_s {
            long_items.push(it.clone());
        } else {
            short_items.push(it.clone());
        }
    }

    let ub_short = first_fit_decreasing_bins(&short_items, ceiling_s).len();
    let b_count = long_items.len() + ub_short;
    if b_count == 0 {
        return Err(AppError::NoContent);
    }
    let i_short = short_items.len();
    let i_long = long_items.len();
    debug!(short = i_short, long = i_long, candidate_blocks = b_count, "built candidate block upper bound");

    // --- Phase 1: minimize block count ---
    let mut m1 = Model::new();
    let base1 = build_base(&mut m1, &short_items, &long_items, b_count, ceiling_s, config);
    m1.minimize(base1.y.iter().map(|&v| (1, v)).collect());
    let sol1 = m1.solve(seed, time_limit, SEARCH_WORKERS);
    if !sol1.is_ok() {
        return Err(AppError::Infeasible {
            phase: SolvePhase::MinimizeBlocks,
            message: "CP engine could not find a feasible base packing".to_string(),
        });
    }

    let min_blocks = base1.y.iter().filter(|&&v| sol1.bool_value(v)).count();
    info!(min_blocks, "phase 1 solved");
    let y1_val: Vec<i64> = base1.y.iter().map(|&v| sol1.value(v)).collect();
    let xs1_val: Vec<Vec<i64>> = base1.xs.iter().map(|row| row.iter().map(|&v| sol1.value(v)).collect()).collect();
    let xl1_val: Vec<Vec<i64>> = base1.xl.iter().map(|row| row.iter().map(|&v| sol1.value(v)).collect()).collect();

    // --- Phase 2: fix block count, optimize quality ---
    let mut m2 = Model::new();
    let base2 = build_base(&mut m2, &short_items, &long_items, b_count, ceiling_s, config);

    m2.add_eq(base2.y.iter().map(|&v| (1, v)).collect(), min_blocks as i64);

    for b in 0..b_count {
        m2.add_hint(base2.y[b], y1_val[b]);
        m2.add_hint(base2.long_present[b], 0);
    }
    for i in 0..i_short {
        for b in 0..b_count {
            m2.add_hint(base2.xs[i][b], xs1_val[i][b]);
        }
    }
    for l in 0..i_long {
        for b in 0..b_count {
            m2.add_hint(base2.xl[l][b], xl1_val[l][b]);
        }
    }

    let r: Vec<Vec<Var>> = (0..i_short).map(|_| (0..b_count).map(|_| m2.new_bool_var()).collect()).collect();
    for b in 0..b_count {
        for i in 0..i_short {
            m2.add_hint(r[i][b], 0);
        }
    }

    for (i, it) in short_items.iter().enumerate() {
        if !it.repeatable || it.max_extra_uses == 0 {
            for b in 0..b_count {
                m2.add_eq(vec![(1, r[i][b])], 0);
            }
        } else {
            m2.add_le((0..b_count).map(|b| (1, r[i][b])).collect(), it.max_extra_uses as i64);
        }
        for b in 0..b_count {
            m2.add_le(vec![(1, r[i][b]), (1, base2.long_present[b])], 1);
        }
    }

    let used_short_time: Vec<Var> = (0..b_count).map(|_| m2.new_int_var(0, ceiling_s as i64)).collect();
    for b in 0..b_count {
        let mut terms: Vec<(i64, Var)> = vec![(1, used_short_time[b])];
        for i in 0..i_short {
            let d = short_items[i].duration_s as i64;
            terms.push((-d, base2.xs[i][b]));
            terms.push((-d, r[i][b]));
        }
        m2.add_eq(terms, 0);

        let cap = m2.add_le(vec![(1, used_short_time[b])], ceiling_s as i64);
        m2.only_enforce_if(cap, base2.long_present[b].is_false());
        let zero = m2.add_eq(vec![(1, used_short_time[b])], 0);
        m2.only_enforce_if(zero, base2.long_present[b].is_true());
    }

    let waste: Vec<Var> = (0..b_count).map(|_| m2.new_int_var(0, ceiling_s as i64)).collect();
    for b in 0..b_count {
        let z = m2.add_eq(vec![(1, waste[b])], 0);
        m2.only_enforce_if(z, base2.long_present[b].is_true());
        let w = m2.add_eq(vec![(1, waste[b]), (1, used_short_time[b])], ceiling_s as i64);
        m2.only_enforce_if(w, base2.long_present[b].is_false());
    }

    let mut short_by_pool: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut long_by_pool: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, it) in short_items.iter().enumerate() {
        short_by_pool.entry(it.pool.as_str()).or_default().push(i);
    }
    for (l, it) in long_items.iter().enumerate() {
        long_by_pool.entry(it.pool.as_str()).or_default().push(l);
    }

    let pool_names: Vec<&str> = config.pool_order.iter().map(|s| s.as_str()).collect();
    let mut dominant: Vec<Vec<Var>> = Vec::with_capacity(b_count);
    for b in 0..b_count {
        let mut row = Vec::with_capacity(pool_names.len());
        for &p in &pool_names {
            let pool_cfg = &config.pools[p];
            let max_long = long_by_pool
                .get(p)
                .map(|ls| ls.iter().map(|&l| long_items[l].duration_s).max().unwrap_or(0))
                .unwrap_or(0);
            let pool_time = m2.new_int_var(0, (ceiling_s + max_long) as i64);

            let mut terms: Vec<(i64, Var)> = vec![(1, pool_time)];
            for &i in short_by_pool.get(p).map(|v| v.as_slice()).unwrap_or(&[]) {
                let d = short_items[i].duration_s as i64;
                terms.push((-d, base2.xs[i][b]));
                terms.push((-d, r[i][b]));
            }
            for &l in long_by_pool.get(p).map(|v| v.as_slice()).unwrap_or(&[]) {
                terms.push((-(long_items[l].duration_s as i64), base2.xl[l][b]));
            }
            m2.add_eq(terms, 0);

            let d_var = m2.new_bool_var();
            let thresh = pool_cfg.dominant_block_threshold_s as i64;
            let ge = m2.add_ge(vec![(1, pool_time)], thresh);
            m2.only_enforce_if(ge, d_var.is_true());
            let le = m2.add_le(vec![(1, pool_time)], (thresh - 1).max(0));
            m2.only_enforce_if(le, d_var.is_false());

            row.push(d_var);
        }
        dominant.push(row);
    }

    let mut consec_dom: Vec<Vec<Var>> = Vec::with_capacity(b_count.saturating_sub(1));
    for b in 0..b_count.saturating_sub(1) {
        let mut row = Vec::with_capacity(pool_names.len());
        for (pi, _p) in pool_names.iter().enumerate() {
            let a = dominant[b][pi];
            let c = dominant[b + 1][pi];
            let d = m2.new_bool_var();
            m2.add_le(vec![(1, d), (-1, a)], 0);
            m2.add_le(vec![(1, d), (-1, c)], 0);
            m2.add_ge(vec![(1, d), (-1, a), (-1, c)], -1);
            row.push(d);
        }
        consec_dom.push(row);
    }

    let mut obj_terms: Vec<(i64, Var)> = Vec::new();
    for b in 0..b_count {
        obj_terms.push((1, waste[b]));
    }
    for (i, it) in short_items.iter().enumerate() {
        if it.repeatable && it.repeat_cost_s > 0 {
            for b in 0..b_count {
                obj_terms.push((it.repeat_cost_s as i64, r[i][b]));
            }
        }
    }
    for b in 0..b_count.saturating_sub(1) {
        for (pi, &p) in pool_names.iter().enumerate() {
            let pen = config.pools[p].dominant_block_penalty_s as i64;
            if pen > 0 {
                obj_terms.push((pen, consec_dom[b][pi]));
            }
        }
    }

    let mut rng = StdRng::seed_from_u64(seed as u64);
    for i in 0..i_short {
        for b in 0..b_count {
            let w: i64 = rng.gen_range(0..4);
            if w != 0 {
                obj_terms.push((w, base2.xs[i][b]));
            }
        }
    }
    debug!(obj_terms = obj_terms.len(), "phase 2 objective assembled");
    m2.minimize(obj_terms);

    let sol2 = m2.solve(seed, time_limit, SEARCH_WORKERS);
    if !sol2.is_ok() {
        return Err(AppError::Infeasible {
            phase: SolvePhase::OptimizeQuality,
            message: "CP engine could not find a feasible quality-optimized schedule".to_string(),
        });
    }

    let mut used_blocks: Vec<usize> = Vec::new();
    for b in 0..b_count {
        if sol2.bool_value(base2.y[b]) {
            used_blocks.push(b);
        }
    }

    let mut blocks = Vec::with_capacity(used_blocks.len());
    let mut repeats_used = 0usize;
    let mut total_waste_s = 0u32;

    for &b in &used_blocks {
        let long_in_block = (0..i_long).find(|&l| sol2.bool_value(base2.xl[l][b])).map(|l| long_items[l].clone());

        let base_items: Vec<Item> = (0..i_short).filter(|&i| sol2.bool_value(base2.xs[i][b])).map(|i| short_items[i].clone()).collect();
        let repeat_items: Vec<Item> = (0..i_short).filter(|&i| sol2.bool_value(r[i][b])).map(|i| short_items[i].clone()).collect();

        repeats_used += repeat_items.len();

        let is_long = long_in_block.is_some();
        let mut items = Vec::with_capacity(1 + base_items.len() + repeat_items.len());
        items.extend(long_in_block.clone());
        items.extend(base_items.iter().cloned());
        items.extend(repeat_items.iter().cloned());

        let (content_duration_s, waste_s) = if is_long {
            (long_in_block.as_ref().unwrap().duration_s, 0)
        } else {
            let dur: u32 = items.iter().map(|it| it.duration_s).sum();
            let w = ceiling_s.saturating_sub(dur);
            total_waste_s += w;
            (dur, w)
        };

        blocks.push(SolvedBlock {
            base_items_count: base_items.len() + if is_long { 1 } else { 0 },
            repeat_items_count: repeat_items.len(),
            items,
            is_long,
            content_duration_s,
            waste_s,
        });
    }

    info!(waste_s = total_waste_s, repeats_used, "phase 2 solved");

    let stats = SolveStats {
        target_block_s: cap_s,
        block_count: used_blocks.len(),
        repeats_used,
        total_waste_s,
        seed,
    };

    Ok((SolveResult { blocks }, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BumperItem, BumperPoolConfig, BumpersConfig, MediaType, MixingStrategy, PoolConfig, SolverConfig};
    use std::collections::HashMap as Map;

    fn item(path: &str, duration_s: u32, pool: &str) -> Item {
        Item {
            path: path.to_string(),
            duration_s,
            pool: pool.to_string(),
            media_type: MediaType::Movie,
            repeatable: true,
            repeat_cost_s: 0,
            max_extra_uses: 1,
            sequence_id: None,
        }
    }

    fn config(items: Vec<Item>) -> ChannelConfig {
        let mut pools = Map::new();
        pools.insert(
            "movies".to_string(),
            PoolConfig {
                name: "movies".to_string(),
                default_type: MediaType::Movie,
                sequential: false,
                default_repeatable: true,
                default_repeat_cost_s: 0,
                default_max_extra_uses: 1,
                dominant_block_threshold_s: 0,
                dominant_block_penalty_s: 0,
            },
        );
        ChannelConfig {
            solver: SolverConfig {
                block_s: 1800,
                longform_consumes_block: true,
                allow_short_overflow_s: 60,
                time_limit_sec: 5,
                seed: 3,
            },
            bumpers: BumpersConfig {
                slots_per_break: 1,
                mixing_strategy: MixingStrategy::RoundRobin,
                pools: vec![BumperPoolConfig {
                    name: "promo".to_string(),
                    weight: 1.0,
                    items: vec![BumperItem {
                        path: "/bump/a.mkv".to_string(),
                        duration_s: 10,
                        media_type: MediaType::OtherVideo,
                    }],
                }],
            },
            pools,
            pool_order: vec!["movies".to_string()],
            items,
        }
    }

    #[test]
    fn packs_two_short_items_into_one_block() {
        let cfg = config(vec![item("/m/1.mkv", 900, "movies"), item("/m/2.mkv", 900, "movies")]);
        let (result, stats) = solve(&cfg).expect("should solve");
        assert_eq!(stats.block_count, 1);
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].items.len(), 2);
    }

    #[test]
    fn long_item_gets_solo_block() {
        let cfg = config(vec![item("/m/movie.mkv", 2000, "movies"), item("/m/short.mkv", 900, "movies")]);
        let (result, stats) = solve(&cfg).expect("should solve");
        assert_eq!(stats.block_count, 2);
        let long_block = result.blocks.iter().find(|b| b.is_long).expect("one long block");
        assert_eq!(long_block.items.len(), 1);
    }

    #[test]
    fn empty_content_is_no_content_error() {
        let cfg = config(vec![]);
        let err = solve(&cfg).unwrap_err();
        assert!(matches!(err, AppError::NoContent));
    }
}
