//! Assignment of simulation player indices to input sources.
//!
//! A simulation update consumes one [`InputFrame`] per player, ordered by
//! player index. The [`InputMapping`] records which of those indices are fed
//! by the local client and which arrive in packets from remote clients, so
//! the networked state knows where every incoming frame belongs.
//!
//! [`InputFrame`]: crate::input_frame::InputFrame

use std::collections::BTreeMap;

use crate::error::BulwarkError;
use crate::RemoteId;

/// Partition of the player indices `0..player_count` into one local group
/// and zero or more remote groups.
///
/// Every player index belongs to exactly one group. The local group must be
/// non-empty (the local client always controls at least one player); remote
/// groups must each be non-empty as well, since an empty group would describe
/// a remote that never contributes inputs.
///
/// The mapping is validated once at construction and immutable afterwards.
///
/// # Example
///
/// ```
/// use bulwark_rollback::mapping::InputMapping;
///
/// // Two players: index 0 driven locally, index 1 by remote "peer-a".
/// let mapping = InputMapping::new(vec![0], vec![("peer-a", vec![1])]).unwrap();
/// assert_eq!(mapping.player_count(), 2);
/// assert_eq!(mapping.local_players(), &[0]);
/// assert_eq!(mapping.remote_group(&"peer-a"), Some(&[1][..]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMapping<R: RemoteId> {
    player_count: usize,
    local_players: Vec<usize>,
    remote_groups: BTreeMap<R, Vec<usize>>,
}

impl<R: RemoteId> InputMapping<R> {
    /// Builds a mapping from the local player indices and the per-remote
    /// player indices.
    ///
    /// The total player count is the sum of all group sizes; the groups must
    /// together cover `0..player_count` with no index repeated or skipped.
    ///
    /// # Errors
    ///
    /// Returns [`BulwarkError::MappingInvalid`] if:
    /// - the local group is empty
    /// - any remote group is empty
    /// - a remote id appears more than once
    /// - any player index is out of range or assigned twice
    pub fn new(
        local_players: Vec<usize>,
        remote_groups: Vec<(R, Vec<usize>)>,
    ) -> Result<Self, BulwarkError> {
        if local_players.is_empty() {
            return Err(BulwarkError::MappingInvalid {
                reason: "local player group is empty".to_owned(),
            });
        }
        for (remote, players) in &remote_groups {
            if players.is_empty() {
                return Err(BulwarkError::MappingInvalid {
                    reason: format!("remote group for {remote:?} is empty"),
                });
            }
        }

        let player_count = local_players.len()
            + remote_groups
                .iter()
                .map(|(_, players)| players.len())
                .sum::<usize>();

        // Every index must land in exactly one group.
        let mut assigned = vec![false; player_count];
        let all_indices = local_players
            .iter()
            .chain(remote_groups.iter().flat_map(|(_, players)| players.iter()));
        for &player in all_indices {
            match assigned.get_mut(player) {
                None => {
                    return Err(BulwarkError::MappingInvalid {
                        reason: format!(
                            "player index {player} out of range for {player_count} players"
                        ),
                    });
                }
                Some(slot) if *slot => {
                    return Err(BulwarkError::MappingInvalid {
                        reason: format!("player index {player} assigned to more than one group"),
                    });
                }
                Some(slot) => *slot = true,
            }
        }

        let mut groups = BTreeMap::new();
        for (remote, players) in remote_groups {
            if groups.insert(remote.clone(), players).is_some() {
                return Err(BulwarkError::MappingInvalid {
                    reason: format!("duplicate remote id {remote:?}"),
                });
            }
        }

        Ok(Self {
            player_count,
            local_players,
            remote_groups: groups,
        })
    }

    /// Total number of players across all groups.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.player_count
    }

    /// Player indices driven by the local client, in the order given at
    /// construction.
    #[must_use]
    pub fn local_players(&self) -> &[usize] {
        &self.local_players
    }

    /// Player indices driven by the given remote, or `None` if the remote is
    /// not part of this mapping.
    #[must_use]
    pub fn remote_group(&self, remote: &R) -> Option<&[usize]> {
        self.remote_groups.get(remote).map(Vec::as_slice)
    }

    /// Whether the given remote is part of this mapping.
    #[must_use]
    pub fn contains_remote(&self, remote: &R) -> bool {
        self.remote_groups.contains_key(remote)
    }

    /// Iterates over the remote ids in a stable (sorted) order.
    pub fn remotes(&self) -> impl Iterator<Item = &R> {
        self.remote_groups.keys()
    }

    /// Number of remote groups.
    #[must_use]
    pub fn remote_count(&self) -> usize {
        self.remote_groups.len()
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn two_player_mapping() {
        let mapping = InputMapping::new(vec![0], vec![("peer", vec![1])]).unwrap();
        assert_eq!(mapping.player_count(), 2);
        assert_eq!(mapping.local_players(), &[0]);
        assert_eq!(mapping.remote_group(&"peer"), Some(&[1][..]));
        assert_eq!(mapping.remote_count(), 1);
        assert!(mapping.contains_remote(&"peer"));
        assert!(!mapping.contains_remote(&"stranger"));
    }

    #[test]
    fn local_only_mapping_has_no_remotes() {
        let mapping: InputMapping<&str> = InputMapping::new(vec![0, 1], vec![]).unwrap();
        assert_eq!(mapping.player_count(), 2);
        assert_eq!(mapping.remote_count(), 0);
        assert_eq!(mapping.remotes().count(), 0);
    }

    #[test]
    fn multi_player_remote_groups() {
        // Four players: local drives 0 and 3, remote "a" drives 2, remote "b" drives 1.
        let mapping =
            InputMapping::new(vec![0, 3], vec![("a", vec![2]), ("b", vec![1])]).unwrap();
        assert_eq!(mapping.player_count(), 4);
        assert_eq!(mapping.remote_group(&"a"), Some(&[2][..]));
        assert_eq!(mapping.remote_group(&"b"), Some(&[1][..]));

        // Remote iteration order is sorted, independent of insertion order.
        let remotes: Vec<_> = mapping.remotes().copied().collect();
        assert_eq!(remotes, vec!["a", "b"]);
    }

    #[test]
    fn empty_local_group_rejected() {
        let result: Result<InputMapping<&str>, _> =
            InputMapping::new(vec![], vec![("peer", vec![0])]);
        assert!(matches!(result, Err(BulwarkError::MappingInvalid { .. })));
    }

    #[test]
    fn empty_remote_group_rejected() {
        let result = InputMapping::new(vec![0], vec![("peer", vec![])]);
        assert!(matches!(result, Err(BulwarkError::MappingInvalid { .. })));
    }

    #[test]
    fn duplicate_remote_id_rejected() {
        let result = InputMapping::new(vec![0], vec![("peer", vec![1]), ("peer", vec![2])]);
        assert!(matches!(result, Err(BulwarkError::MappingInvalid { .. })));
    }

    #[test]
    fn overlapping_indices_rejected() {
        let result = InputMapping::new(vec![0, 1], vec![("peer", vec![1])]);
        let err = result.unwrap_err();
        match err {
            BulwarkError::MappingInvalid { reason } => {
                assert!(reason.contains("more than one group"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn out_of_range_index_rejected() {
        // Two slots total, but index 5 named.
        let result = InputMapping::new(vec![0], vec![("peer", vec![5])]);
        let err = result.unwrap_err();
        match err {
            BulwarkError::MappingInvalid { reason } => {
                assert!(reason.contains("out of range"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn skipped_index_rejected() {
        // Indices 0 and 2 for a two-player total; 1 is missing, 2 out of range.
        let result = InputMapping::new(vec![0], vec![("peer", vec![2])]);
        assert!(matches!(result, Err(BulwarkError::MappingInvalid { .. })));
    }

    #[test]
    fn non_contiguous_local_group_is_allowed() {
        // Locals need not be consecutive indices.
        let mapping = InputMapping::new(vec![2, 0], vec![("peer", vec![1])]).unwrap();
        assert_eq!(mapping.local_players(), &[2, 0]);
        assert_eq!(mapping.player_count(), 3);
    }
}
