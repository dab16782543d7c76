//! Greedy First-Fit-Decreasing bin packer.
//!
//! Supplies a safe upper bound on the number of blocks the CP scheduler needs
//! to consider. Correctness of the final schedule never depends on this
//! bound being tight, only on it being an upper bound, so this module is a
//! pure performance aid, not part of the solved model.

use crate::models::Item;

/// First-Fit-Decreasing bin packing over `items`, using `cap_s` as bin capacity.
///
/// Returns bins as lists of indices into `items`. The number of bins returned
/// is a valid upper bound on the minimum number of bins required.
pub fn first_fit_decreasing_bins(items: &[Item], cap_s: u32) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| items[b].duration_s.cmp(&items[a].duration_s));

    let mut bins: Vec<Vec<usize>> = Vec::new();
    let mut remaining: Vec<u32> = Vec::new();

    for i in order {
        let d = items[i].duration_s;
        let mut placed = false;
        for b in 0..bins.len() {
            if remaining[b] >= d {
                bins[b].push(i);
                remaining[b] -= d;
                placed = true;
                break;
            }
        }
        if !placed {
            bins.push(vec![i]);
            remaining.push(cap_s.saturating_sub(d));
        }
    }
    bins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaType;

    fn item(path: &str, duration_s: u32) -> Item {
        Item {
            path: path.to_string(),
            duration_s,
            pool: "p".to_string(),
            media_type: MediaType::OtherVideo,
            repeatable: false,
            repeat_cost_s: 0,
            max_extra_uses: 0,
            sequence_id: None,
        }
    }

    #[test]
    fn packs_two_equal_items_into_one_bin() {
        let items = vec![item("a", 600), item("b", 600)];
        let bins = first_fit_decreasing_bins(&items, 1800);
        assert_eq!(bins.len(), 1);
    }

    #[test]
    fn opens_new_bin_when_no_fit() {
        let items = vec![item("a", 1700), item("b", 1700)];
        let bins = first_fit_decreasing_bins(&items, 1800);
        assert_eq!(bins.len(), 2);
    }

    #[test]
    fn empty_input_yields_no_bins() {
        let bins = first_fit_decreasing_bins(&[], 1800);
        assert!(bins.is_empty());
    }
}
