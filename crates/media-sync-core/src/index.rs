use crate::hasher::Fingerprint;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fingerprints of every file already accepted into the destination.
///
/// Each fingerprint maps to its insertion sequence so a snapshot comes back in
/// the order fingerprints were accepted. `claim` is the check-and-insert used
/// by workers: the shard lock makes it linearizable, so exactly one caller
/// sees a given fingerprint as new.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    entries: DashMap<Fingerprint, u64>,
    next_seq: AtomicU64,
}

impl DuplicateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fingerprints<I>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = Fingerprint>,
    {
        let index = Self::new();
        for fp in fingerprints {
            index.add(fp);
        }
        index
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Insert; a fingerprint already present is left untouched.
    pub fn add(&self, fingerprint: Fingerprint) {
        self.claim(fingerprint);
    }

    /// Insert and report whether the fingerprint was new.
    pub fn claim(&self, fingerprint: Fingerprint) -> bool {
        match self.entries.entry(fingerprint) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(self.next_seq.fetch_add(1, Ordering::SeqCst));
                true
            }
        }
    }

    /// Undo a claim whose file could not be moved.
    pub fn release(&self, fingerprint: &Fingerprint) {
        self.entries.remove(fingerprint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Fingerprint> {
        let mut ordered: Vec<(u64, Fingerprint)> = self
            .entries
            .iter()
            .map(|entry| (*entry.value(), *entry.key()))
            .collect();
        ordered.sort_unstable_by_key(|(seq, _)| *seq);
        ordered.into_iter().map(|(_, fp)| fp).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_add_is_idempotent() {
        let index = DuplicateIndex::new();
        let fp = Fingerprint::of_bytes(b"one");
        index.add(fp);
        index.add(fp);
        assert_eq!(index.len(), 1);
        assert!(index.contains(&fp));
        assert!(!index.claim(fp));
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let fps: Vec<Fingerprint> = (0..50u32)
            .map(|i| Fingerprint::of_bytes(&i.to_le_bytes()))
            .collect();
        let index = DuplicateIndex::from_fingerprints(fps.clone());
        index.add(fps[3]);
        assert_eq!(index.snapshot(), fps);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let index = DuplicateIndex::new();
        let fp = Fingerprint::of_bytes(b"contended");
        let winners: usize = (0..64)
            .into_par_iter()
            .map(|_| usize::from(index.claim(fp)))
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_release_allows_reclaim() {
        let index = DuplicateIndex::new();
        let fp = Fingerprint::of_bytes(b"retry");
        assert!(index.claim(fp));
        index.release(&fp);
        assert!(index.is_empty());
        assert!(index.claim(fp));
    }
}
