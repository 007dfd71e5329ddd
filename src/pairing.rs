//! Adjacent-station pairs for the pair-based travel time API.
//!
//! Station order along a branch is not in the feed, so it is approximated
//! by a [`BranchSequencer`]. The default sorts by descending stop id.

use crate::stops::{LineGroup, Station};

/// Branches with fewer stations than this yield no pairs.
pub const MIN_BRANCH_LEN: usize = 3;

/// Puts one branch's stations in travel order.
pub trait BranchSequencer {
    fn sequence(&self, stations: &mut [Station]);
}

/// Highest stop id first. MBTA ids tend to increase along a branch, so this
/// usually matches physical order, but it is not guaranteed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescendingId;

impl BranchSequencer for DescendingId {
    fn sequence(&self, stations: &mut [Station]) {
        stations.sort_by(|a, b| b.id.cmp(&a.id));
    }
}

/// Two consecutive stations on the same line and destination.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyPair {
    pub from: Station,
    pub to: Station,
}

/// Returns the consecutive pairs of every branch of `group` that has at least
/// [`MIN_BRANCH_LEN`] stations, branch by branch in catalog order.
pub fn adjacency_pairs<S: BranchSequencer + ?Sized>(
    group: &LineGroup,
    sequencer: &S,
) -> Vec<AdjacencyPair> {
    let mut pairs = Vec::new();

    for branch in &group.branches {
        if branch.stations.len() < MIN_BRANCH_LEN {
            continue;
        }

        let mut ordered = branch.stations.clone();
        sequencer.sequence(&mut ordered);

        pairs.extend(ordered.windows(2).map(|w| AdjacencyPair {
            from: w[0].clone(),
            to: w[1].clone(),
        }));
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stops::Branch;

    fn station(id: i64, dest: &str) -> Station {
        Station {
            id,
            name: format!("Stop {id}"),
            line: Some("Red".to_string()),
            destination: Some(dest.to_string()),
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    fn branch(dest: &str, ids: &[i64]) -> Branch {
        Branch {
            destination: dest.to_string(),
            stations: ids.iter().map(|&id| station(id, dest)).collect(),
        }
    }

    fn ids(pairs: &[AdjacencyPair]) -> Vec<(i64, i64)> {
        pairs.iter().map(|p| (p.from.id, p.to.id)).collect()
    }

    #[test]
    fn test_short_branches_yield_nothing() {
        let group = LineGroup {
            line: "Red".to_string(),
            branches: vec![branch("A", &[]), branch("B", &[1]), branch("C", &[1, 2])],
        };

        assert!(adjacency_pairs(&group, &DescendingId).is_empty());
    }

    #[test]
    fn test_pairs_follow_descending_ids() {
        let group = LineGroup {
            line: "Red".to_string(),
            branches: vec![branch("Alewife", &[70063, 70067, 70061, 70065])],
        };

        let pairs = adjacency_pairs(&group, &DescendingId);

        assert_eq!(
            ids(&pairs),
            [(70067, 70065), (70065, 70063), (70063, 70061)]
        );
    }

    #[test]
    fn test_n_minus_one_pairs_per_branch() {
        let group = LineGroup {
            line: "Red".to_string(),
            branches: vec![
                branch("Alewife", &[5, 4, 3]),
                branch("Ashmont", &[10, 11, 12, 13, 14]),
                branch("Braintree", &[20, 21]),
            ],
        };

        let pairs = adjacency_pairs(&group, &DescendingId);

        assert_eq!(pairs.len(), 2 + 4);
        assert!(pairs.iter().all(|p| p.from.destination == p.to.destination));
        assert_eq!(ids(&pairs)[2..], [(14, 13), (13, 12), (12, 11), (11, 10)]);
    }

    #[test]
    fn test_custom_sequencer() {
        struct Ascending;
        impl BranchSequencer for Ascending {
            fn sequence(&self, stations: &mut [Station]) {
                stations.sort_by_key(|s| s.id);
            }
        }

        let group = LineGroup {
            line: "Red".to_string(),
            branches: vec![branch("Alewife", &[3, 1, 2])],
        };

        assert_eq!(ids(&adjacency_pairs(&group, &Ascending)), [(1, 2), (2, 3)]);
    }
}
