//! Independent re-validation of an assembled playlist against its config.
//! This module never looks at solver internals: it only
//! sees the same `ChannelConfig` the scheduler was given and the flat
//! sequence of `(path, media_type)` entries the assembler produced, so it
//! can catch a bug anywhere upstream.

use std::collections::HashMap;

use crate::assembler::{Cycle, CycleEntry};
use crate::models::ChannelConfig;
use crate::sequence::parse_sxxexx;

/// Severity of a single verifier finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warn,
}

/// One independent finding from a verify pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyFinding {
    pub level: Level,
    pub message: String,
}

impl VerifyFinding {
    fn error<M: Into<String>>(message: M) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
}

/// Run every check in spec order, each reporting the earliest offending
/// location it finds. Checks do not stop at the first failure: callers get
/// the full list of findings, not just the first.
pub fn verify(config: &ChannelConfig, cycle: &Cycle) -> Vec<VerifyFinding> {
    let mut findings = Vec::new();

    let entries = &cycle.entries;

    // 1. Schema.
    if entries.is_empty() {
        findings.push(VerifyFinding::error("playlist is empty"));
        return findings;
    }
    let slots = config.bumpers.slots_per_break as usize;
    if entries.len() < slots + 1 {
        findings.push(VerifyFinding::error(format!(
            "playlist is too short to contain even one full break of {} bumper(s) + content",
            slots
        )));
        return findings;
    }

    // Lookup maps.
    let mut bumper_pool_of: HashMap<&str, &str> = HashMap::new();
    let mut bumper_paths: Vec<&str> = Vec::new();
    for pool in &config.bumpers.pools {
        for item in &pool.items {
            bumper_paths.push(item.path.as_str());
            bumper_pool_of.insert(item.path.as_str(), pool.name.as_str());
        }
    }

    // 2. Bumper-path uniqueness.
    {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for &p in &bumper_paths {
            *seen.entry(p).or_insert(0) += 1;
        }
        let dupes: Vec<&str> = seen
            .into_iter()
            .filter(|&(_, n)| n > 1)
            .map(|(p, _)| p)
            .collect();
        if !dupes.is_empty() {
            findings.push(VerifyFinding::error(format!(
                "bumper path(s) shared across pools: {:?}",
                dupes
            )));
        }
    }

    let bumper_set: std::collections::HashSet<&str> = bumper_paths.iter().copied().collect();
    let content_by_path: HashMap<&str, &crate::models::Item> =
        config.items.iter().map(|it| (it.path.as_str(), it)).collect();
    let mut duration_by_path: HashMap<&str, u32> = HashMap::new();
    for it in &config.items {
        duration_by_path.insert(it.path.as_str(), it.duration_s);
    }
    for pool in &config.bumpers.pools {
        for item in &pool.items {
            duration_by_path.insert(item.path.as_str(), item.duration_s);
        }
    }

    let is_bumper = |e: &CycleEntry| bumper_set.contains(e.path.as_str());

    // 3. Leading break.
    for (i, e) in entries.iter().take(slots).enumerate() {
        if !is_bumper(e) {
            findings.push(VerifyFinding::error(format!(
                "playlist does not start with {} bumper(s); item {} is not a bumper: {}",
                slots, i, e.path
            )));
            break;
        }
    }

    // 4. Run structure.
    let mut runs: Vec<(bool, usize, usize)> = Vec::new(); // (is_bumper, len, start)
    {
        let mut cur_is_b = is_bumper(&entries[0]);
        let mut cur_len = 0usize;
        let mut cur_start = 0usize;
        for (idx, e) in entries.iter().enumerate() {
            let b = is_bumper(e);
            if b == cur_is_b {
                cur_len += 1;
            } else {
                runs.push((cur_is_b, cur_len, cur_start));
                cur_is_b = b;
                cur_len = 1;
                cur_start = idx;
            }
        }
        runs.push((cur_is_b, cur_len, cur_start));
    }

    if runs.first().map(|r| !r.0).unwrap_or(true) {
        findings.push(VerifyFinding::error("playlist does not start with bumpers"));
    }
    if runs.last().map(|r| r.0).unwrap_or(false) {
        findings.push(VerifyFinding::error(
            "playlist ends with bumpers; the wrap would create a bumper run spanning the seam",
        ));
    }
    for &(is_b, len, start) in &runs {
        if is_b && len != slots {
            findings.push(VerifyFinding::error(format!(
                "bumper run length must be exactly {}; found length {} starting at index {}",
                slots, len, start
            )));
            break;
        }
        if !is_b && len == 0 {
            findings.push(VerifyFinding::error(format!("empty content run at index {}", start)));
            break;
        }
    }

    // 5. Known paths.
    let mut unknown: Vec<(usize, &str)> = Vec::new();
    for (idx, e) in entries.iter().enumerate() {
        let p = e.path.as_str();
        if !bumper_set.contains(p) && !content_by_path.contains_key(p) {
            unknown.push((idx, p));
        }
    }
    if !unknown.is_empty() {
        findings.push(VerifyFinding::error(format!(
            "playlist contains paths not present in config; first few: {:?}",
            &unknown[..unknown.len().min(5)]
        )));
    }

    // 6. Repeat policy.
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for e in entries.iter() {
            if bumper_set.contains(e.path.as_str()) {
                continue;
            }
            *counts.entry(e.path.as_str()).or_insert(0) += 1;
        }
        let missing: Vec<&str> = content_by_path
            .keys()
            .copied()
            .filter(|p| counts.get(p).copied().unwrap_or(0) == 0)
            .collect();
        if !missing.is_empty() {
            findings.push(VerifyFinding::error(format!(
                "missing base content items (should appear at least once); first few: {:?}",
                &missing[..missing.len().min(5)]
            )));
        }
        for (&p, &c) in counts.iter() {
            let base = content_by_path[p];
            if !base.repeatable && c != 1 {
                findings.push(VerifyFinding::error(format!(
                    "non-repeatable item appears {} times (must be exactly 1): {}",
                    c, p
                )));
            } else if base.repeatable && c > 1 + base.max_extra_uses as usize {
                findings.push(VerifyFinding::error(format!(
                    "repeatable item exceeds max_extra_uses; appears {} times, limit is {}: {}",
                    c,
                    1 + base.max_extra_uses,
                    p
                )));
            }
        }
    }

    // 7. Exhaust-before-repeat per bumper pool.
    for pool in &config.bumpers.pools {
        let pool_set: std::collections::HashSet<&str> =
            pool.items.iter().map(|it| it.path.as_str()).collect();
        if pool_set.len() <= 1 {
            continue;
        }
        let mut last_seen: HashMap<&str, usize> = HashMap::new();
        let mut seen_count = 0usize;
        for e in entries.iter() {
            let p = e.path.as_str();
            if !pool_set.contains(p) {
                continue;
            }
            if let Some(&prev) = last_seen.get(p) {
                let gap = seen_count - prev;
                if gap < pool_set.len() {
                    findings.push(VerifyFinding::error(format!(
                        "bumper repeats before exhaustion in pool {:?}; {} repeated after {} use(s), need >= {}",
                        pool.name,
                        p,
                        gap,
                        pool_set.len()
                    )));
                    break;
                }
            }
            last_seen.insert(p, seen_count);
            seen_count += 1;
        }
    }

    // 8. Block durations.
    let cap_s = config.solver.block_s;
    let ceiling_s = config.solver.ceiling_s();
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for &(is_b, len, start) in &runs {
        if is_b {
            continue;
        }
        blocks.push(entries[start..start + len].iter().map(|e| e.path.as_str()).collect());
    }

    if blocks.is_empty() {
        findings.push(VerifyFinding::error("no content blocks found"));
    } else {
        'blocks: for (bi, block) in blocks.iter().enumerate() {
            if block.is_empty() {
                findings.push(VerifyFinding::error(format!("empty content block at index {}", bi)));
                continue;
            }
            let dur_s: u32 = block.iter().map(|p| duration_by_path.get(p).copied().unwrap_or(0)).sum();

            if config.solver.longform_consumes_block {
                let long_items: Vec<&str> = block
                    .iter()
                    .copied()
                    .filter(|p| duration_by_path.get(p).copied().unwrap_or(0) >= cap_s)
                    .collect();
                if !long_items.is_empty() {
                    if block.len() != 1 {
                        findings.push(VerifyFinding::error(format!(
                            "block {} contains long-form content but also other items: {:?}",
                            bi,
                            &long_items[..long_items.len().min(3)]
                        )));
                    }
                    continue 'blocks;
                }
            }

            if dur_s > ceiling_s {
                findings.push(VerifyFinding::error(format!(
                    "block {} exceeds target capacity: {:.1} min > {:.1} min",
                    bi,
                    dur_s as f64 / 60.0,
                    ceiling_s as f64 / 60.0
                )));
            }
        }
    }

    // 9. Sequential ordering.
    for pool_cfg in config.pools_ordered() {
        if !pool_cfg.sequential {
            continue;
        }
        let mut eps: Vec<(u32, u32, &str)> = Vec::new();
        for e in entries.iter() {
            let p = e.path.as_str();
            if bumper_set.contains(p) {
                continue;
            }
            let Some(base) = content_by_path.get(p) else {
                continue;
            };
            if base.pool != pool_cfg.name {
                continue;
            }
            match parse_sxxexx(p) {
                Some(id) => eps.push((id.season, id.episode, p)),
                None => {
                    findings.push(VerifyFinding::error(format!("sequential pool item missing SxxExx: {}", p)));
                }
            }
        }
        for w in eps.windows(2) {
            let (s1, e1, p1) = w[0];
            let (s2, e2, p2) = w[1];
            if (s2, e2) < (s1, e1) {
                findings.push(VerifyFinding::error(format!(
                    "sequential pool {:?} is out of order: {} then {}",
                    pool_cfg.name, p1, p2
                )));
                break;
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::CycleEntry;
    use crate::models::{BumperItem, BumperPoolConfig, BumpersConfig, MediaType, MixingStrategy, PoolConfig, SolverConfig};
    use std::collections::HashMap as Map;

    fn base_config() -> ChannelConfig {
        let mut pools = Map::new();
        pools.insert(
            "movies".to_string(),
            PoolConfig {
                name: "movies".to_string(),
                default_type: MediaType::Movie,
                sequential: false,
                default_repeatable: true,
                default_repeat_cost_s: 0,
                default_max_extra_uses: 2,
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
                seed: 1,
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
            pools: pools,
            pool_order: vec!["movies".to_string()],
            items: vec![crate::models::Item {
                path: "/movies/one.mkv".to_string(),
                duration_s: 1000,
                pool: "movies".to_string(),
                media_type: MediaType::Movie,
                repeatable: true,
                repeat_cost_s: 0,
                max_extra_uses: 2,
                sequence_id: None,
            }],
        }
    }

    fn entry(path: &str, mt: MediaType) -> CycleEntry {
        CycleEntry {
            path: path.to_string(),
            media_type: mt,
            include_in_guide: true,
        }
    }

    #[test]
    fn clean_cycle_has_no_errors() {
        let cfg = base_config();
        let cycle = Cycle {
            entries: vec![
                entry("/bump/a.mkv", MediaType::OtherVideo),
                entry("/movies/one.mkv", MediaType::Movie),
            ],
        };
        let findings = verify(&cfg, &cycle);
        assert!(findings.iter().all(|f| f.level != Level::Error), "{:?}", findings);
    }

    #[test]
    fn detects_missing_leading_bumper() {
        let cfg = base_config();
        let cycle = Cycle {
            entries: vec![
                entry("/movies/one.mkv", MediaType::Movie),
                entry("/bump/a.mkv", MediaType::OtherVideo),
            ],
        };
        let findings = verify(&cfg, &cycle);
        assert!(findings.iter().any(|f| f.level == Level::Error));
    }

    #[test]
    fn detects_trailing_bumper_run() {
        let cfg = base_config();
        let cycle = Cycle {
            entries: vec![
                entry("/bump/a.mkv", MediaType::OtherVideo),
                entry("/movies/one.mkv", MediaType::Movie),
                entry("/bump/a.mkv", MediaType::OtherVideo),
            ],
        };
        let findings = verify(&cfg, &cycle);
        assert!(findings
            .iter()
            .any(|f| f.level == Level::Error && f.message.contains("ends with bumpers")));
    }

    #[test]
    fn detects_non_repeatable_repeated() {
        let mut cfg = base_config();
        cfg.items[0].repeatable = false;
        let cycle = Cycle {
            entries: vec![
                entry("/bump/a.mkv", MediaType::OtherVideo),
                entry("/movies/one.mkv", MediaType::Movie),
                entry("/bump/a.mkv", MediaType::OtherVideo),
                entry("/movies/one.mkv", MediaType::Movie),
            ],
        };
        let findings = verify(&cfg, &cycle);
        assert!(findings
            .iter()
            .any(|f| f.level == Level::Error && f.message.contains("non-repeatable")));
    }
}
