//! Set difference between what the store holds and what was requested.

use std::collections::BTreeSet;

/// Keys partitioned into the three reconciliation passes.
///
/// Every key of `existing ∪ incoming` lands in exactly one set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDiff<K: Ord> {
    pub to_insert: BTreeSet<K>,
    pub to_update: BTreeSet<K>,
    pub to_delete: BTreeSet<K>,
}

impl<K: Ord> KeyDiff<K> {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn total(&self) -> usize {
        self.to_insert.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// `to_update = existing ∩ incoming`, `to_insert = incoming − existing`,
/// `to_delete = existing − incoming`.
pub fn compute_diff<K, E, I>(existing: E, incoming: I) -> KeyDiff<K>
where
    K: Ord + Clone,
    E: IntoIterator<Item = K>,
    I: IntoIterator<Item = K>,
{
    let existing: BTreeSet<K> = existing.into_iter().collect();
    let incoming: BTreeSet<K> = incoming.into_iter().collect();
    KeyDiff {
        to_insert: incoming.difference(&existing).cloned().collect(),
        to_update: incoming.intersection(&existing).cloned().collect(),
        to_delete: existing.difference(&incoming).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_existing_ab_incoming_bc() {
        let d = compute_diff(["a", "b"], ["b", "c"]);
        assert_eq!(d.to_delete, BTreeSet::from(["a"]));
        assert_eq!(d.to_update, BTreeSet::from(["b"]));
        assert_eq!(d.to_insert, BTreeSet::from(["c"]));
    }

    #[test]
    fn identical_sets_only_update() {
        let d = compute_diff([1, 2, 3], [3, 2, 1]);
        assert!(d.to_insert.is_empty() && d.to_delete.is_empty());
        assert_eq!(d.to_update.len(), 3);
    }

    #[test]
    fn empty_inputs_give_empty_diff() {
        let d = compute_diff(Vec::<u32>::new(), Vec::new());
        assert!(d.is_empty());
        assert_eq!(d.total(), 0);
    }
}
