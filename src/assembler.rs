//! Interleaves solved blocks with bumper breaks into a single flat playlist.

use std::collections::HashSet;

use crate::bumpers::BumperSelector;
use crate::models::MediaType;
use crate::scheduler::SolveResult;

/// One emitted playlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEntry {
    pub path: String,
    pub media_type: MediaType,
    /// `true` for the first appearance of `path` in the cycle, `false` for
    /// every subsequent filler repeat. Bumpers are always `true` but are not
    /// guide-relevant; downstream guide generation is expected to skip them
    /// by media kind rather than by this flag.
    pub include_in_guide: bool,
}

/// One full pass of the generated playlist, to be looped by the playout engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub entries: Vec<CycleEntry>,
}

/// Assemble a `Cycle` from solved blocks, inserting one break of bumpers
/// before every block except that the trailing break after the final block
/// is omitted. The cycle always ends with content, so the loop wrap never
/// produces two adjacent bumper runs.
pub fn assemble(result: &SolveResult, selector: &mut BumperSelector) -> Cycle {
    let mut entries = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for block in &result.blocks {
        let bumpers = selector.next_bumpers();
        for b in bumpers {
            entries.push(CycleEntry {
                path: b.path,
                media_type: b.media_type,
                include_in_guide: true,
            });
        }
        for item in &block.items {
            let first = seen.insert(item.path.clone());
            entries.push(CycleEntry {
                path: item.path.clone(),
                media_type: item.media_type,
                include_in_guide: first,
            });
        }
    }

    Cycle { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BumperItem, BumperPoolConfig, BumpersConfig, Item, MixingStrategy};
    use crate::scheduler::SolvedBlock;

    fn item(path: &str, duration_s: u32) -> Item {
        Item {
            path: path.to_string(),
            duration_s,
            pool: "p".to_string(),
            media_type: MediaType::Movie,
            repeatable: true,
            repeat_cost_s: 0,
            max_extra_uses: 2,
            sequence_id: None,
        }
    }

    fn selector() -> BumperSelector {
        let cfg = BumpersConfig {
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
        };
        BumperSelector::new(&cfg, 1)
    }

    fn solved_block(path: &str, duration_s: u32) -> SolvedBlock {
        SolvedBlock {
            items: vec![item(path, duration_s)],
            is_long: false,
            base_items_count: 1,
            repeat_items_count: 0,
            content_duration_s: duration_s,
            waste_s: 0,
        }
    }

    #[test]
    fn omits_trailing_break_and_ends_with_content() {
        let result = SolveResult {
            blocks: vec![solved_block("/m/1.mkv", 1000), solved_block("/m/2.mkv", 1000)],
        };
        let mut sel = selector();
        let cycle = assemble(&result, &mut sel);
        assert_eq!(cycle.entries.last().unwrap().path, "/m/2.mkv");
        let bumper_count = cycle.entries.iter().filter(|e| e.path == "/bump/a.mkv").count();
        assert_eq!(bumper_count, 2, "one break before each block, none trailing");
    }

    #[test]
    fn marks_only_first_occurrence_as_guide_eligible() {
        let result = SolveResult {
            blocks: vec![solved_block("/m/1.mkv", 1000), solved_block("/m/1.mkv", 1000)],
        };
        let mut sel = selector();
        let cycle = assemble(&result, &mut sel);
        let occurrences: Vec<&CycleEntry> = cycle.entries.iter().filter(|e| e.path == "/m/1.mkv").collect();
        assert_eq!(occurrences.len(), 2);
        assert!(occurrences[0].include_in_guide);
        assert!(!occurrences[1].include_in_guide);
    }
}
