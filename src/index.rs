//! The per-key, per-version log that backs every stateful operator.
//!
//! Logically an `Index<K, V>` is a `Map<K, Map<Version, List<(V, multiplicity)>>>`.
//! Reconstructing the value of a key at a version is the primitive `reduce` needs;
//! the per-version log is the primitive `join` needs; compaction is what keeps the
//! log from growing without bound once a frontier has sealed a range of versions.

use fnv::{FnvHashMap, FnvHashSet};

use crate::antichain::Antichain;
use crate::error::{Error, Result};
use crate::multiset::MultiSet;
use crate::version::Version;

/// Which side(s) of a join to retain when a key is present on only one side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    /// Only keys present on both sides.
    Inner,
    /// Inner, plus unmatched left keys (paired with nothing).
    Left,
    /// Inner, plus unmatched right keys.
    Right,
    /// Inner, plus unmatched keys from both sides.
    Full,
}

/// The value half of a join result: either a genuine match, or one side of an outer
/// join whose partner was absent.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JoinValue<V1, V2> {
    /// Both sides had an entry for this key.
    Matched(V1, V2),
    /// Only the left index had an entry (`Left`/`Full` joins only).
    LeftOnly(V1),
    /// Only the right index had an entry (`Right`/`Full` joins only).
    RightOnly(V2),
}

/// One `(Version, Key, JoinValue, multiplicity)` contribution of a join. The caller
/// (typically [`crate::operators::join`]) groups these by version into per-version
/// output batches.
pub type JoinEntry<K, V1, V2> = (Version, K, JoinValue<V1, V2>, isize);

/// Per-key, per-version log of value changes, with compaction.
#[derive(Clone, Debug)]
pub struct Index<K, V> {
    inner: FnvHashMap<K, FnvHashMap<Version, Vec<(V, isize)>>>,
    compaction_frontier: Option<Antichain>,
    dirty_keys: FnvHashSet<K>,
}

impl<K, V> Default for Index<K, V>
where
    K: Eq + std::hash::Hash,
{
    fn default() -> Self {
        Index {
            inner: FnvHashMap::default(),
            compaction_frontier: None,
            dirty_keys: FnvHashSet::default(),
        }
    }
}

impl<K, V> Index<K, V>
where
    K: Eq + std::hash::Hash + Clone,
    V: Clone + Ord,
{
    /// An empty index with no compaction frontier.
    pub fn new() -> Self {
        Self::default()
    }

    /// The index's current compaction frontier, if any writes have been compacted.
    pub fn compaction_frontier(&self) -> Option<&Antichain> {
        self.compaction_frontier.as_ref()
    }

    /// Appends `(val, mult)` under `k` at version `v`. Fails if `v` is not covered by
    /// the compaction frontier (i.e. some frontier element is `<= v`).
    pub fn add_value(&mut self, k: K, v: Version, change: (V, isize)) -> Result<()> {
        if let Some(frontier) = &self.compaction_frontier {
            if !frontier.less_equal_version(&v)? {
                return Err(Error::InvalidVersionForWrite {
                    version: format!("{v:?}"),
                    frontier: format!("{frontier:?}"),
                });
            }
        }
        self.inner.entry(k.clone()).or_default().entry(v).or_default().push(change);
        self.dirty_keys.insert(k);
        Ok(())
    }

    /// Every version with at least one stored entry for `k`, advanced by the current
    /// compaction frontier. `compact` only revisits dirty keys, so a key untouched
    /// since an earlier compaction can still hold versions raw from before the most
    /// recent one; advancing here (rather than trusting storage to already reflect it)
    /// keeps that key's presentation consistent with one that was just compacted.
    pub fn versions(&self, k: &K) -> Result<Vec<Version>> {
        let Some(by_version) = self.inner.get(k) else {
            return Ok(Vec::new());
        };
        match &self.compaction_frontier {
            Some(frontier) => {
                by_version.keys().map(|v| v.advance_by(frontier)).collect()
            }
            None => Ok(by_version.keys().cloned().collect()),
        }
    }

    /// The consolidated multiset of `(val, mult)` pairs accumulated under `k` at all
    /// versions `<= v`.
    pub fn reconstruct_at(&self, k: &K, v: &Version) -> Result<MultiSet<V>> {
        let mut out = MultiSet::new();
        if let Some(by_version) = self.inner.get(k) {
            for (ver, entries) in by_version {
                if ver.less_equal(v)? {
                    for (val, mult) in entries {
                        out.push(val.clone(), *mult);
                    }
                }
            }
        }
        Ok(out.consolidate())
    }

    /// Merges `other`'s entries into `self`, per-key per-version list concatenation.
    /// Keys touched by the merge are marked dirty.
    pub fn append(&mut self, other: Index<K, V>) {
        for (k, by_version) in other.inner {
            let slot = self.inner.entry(k.clone()).or_default();
            for (v, mut entries) in by_version {
                slot.entry(v).or_default().append(&mut entries);
            }
            self.dirty_keys.insert(k);
        }
    }

    /// Advances every stored version below `frontier` to `version.advance_by(frontier)`,
    /// then consolidates the per-key per-new-version value lists. Only `keys` (or all
    /// dirty keys, if `None`) are visited. Fails if `frontier` is not `>=` the
    /// previous compaction frontier.
    pub fn compact(&mut self, frontier: &Antichain, keys: Option<&[K]>) -> Result<()> {
        if let Some(old) = &self.compaction_frontier {
            if !old.less_equal(frontier)? {
                return Err(Error::InvalidCompactionFrontier {
                    new: format!("{frontier:?}"),
                    old: format!("{old:?}"),
                });
            }
        }

        let targets: Vec<K> = match keys {
            Some(ks) => ks.to_vec(),
            None => self.dirty_keys.iter().cloned().collect(),
        };

        for k in &targets {
            if let Some(by_version) = self.inner.get_mut(k) {
                let old_map = std::mem::take(by_version);
                let mut advanced: FnvHashMap<Version, Vec<(V, isize)>> = FnvHashMap::default();
                for (ver, entries) in old_map {
                    let new_ver = ver.advance_by(frontier)?;
                    advanced.entry(new_ver).or_default().extend(entries);
                }
                for entries in advanced.values_mut() {
                    let len = consolidate_values(entries);
                    entries.truncate(len);
                }
                *by_version = advanced;
            }
            self.dirty_keys.remove(k);
        }

        log::trace!(
            "index compacted {} keys to frontier {:?}",
            targets.len(),
            frontier
        );
        self.compaction_frontier = Some(frontier.clone());
        Ok(())
    }

    /// Number of distinct keys currently stored.
    pub fn key_count(&self) -> usize {
        self.inner.len()
    }

    /// `true` if `k` has any stored entries.
    pub fn contains_key(&self, k: &K) -> bool {
        self.inner.contains_key(k)
    }

    /// All keys currently stored, in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }
}

impl<K, V1> Index<K, V1>
where
    K: Eq + std::hash::Hash + Clone,
    V1: Clone + Ord,
{
    /// Joins `self` against `other`, matching on key. Iterates whichever index has
    /// fewer keys, to minimize work. For every shared key and every pair of stored
    /// versions, emits one entry at `(v_self.join(v_other), k, Matched(..), m1*m2)`.
    /// Outer variants additionally emit each unmatched key's raw `(val, mult)`
    /// entries at their own (unjoined) version.
    pub fn join<V2>(&self, other: &Index<K, V2>, kind: JoinKind) -> Result<Vec<JoinEntry<K, V1, V2>>>
    where
        V2: Clone + Ord,
    {
        let mut out = Vec::new();

        let (small, big, small_is_self) = if self.inner.len() <= other.inner.len() {
            (&self.inner, &other.inner, true)
        } else {
            (&other.inner, &self.inner, false)
        };

        for (k, small_versions) in small {
            if let Some(big_versions) = big.get(k) {
                for (small_v, small_entries) in small_versions {
                    for (big_v, big_entries) in big_versions {
                        let joined_v = small_v.join(big_v)?;
                        for (small_val, small_mult) in small_entries {
                            for (big_val, big_mult) in big_entries {
                                let mult = small_mult * big_mult;
                                if mult == 0 {
                                    continue;
                                }
                                let value = if small_is_self {
                                    JoinValue::Matched(small_val.clone(), big_val.clone())
                                } else {
                                    JoinValue::Matched(big_val.clone(), small_val.clone())
                                };
                                out.push((joined_v.clone(), k.clone(), value, mult));
                            }
                        }
                    }
                }
            }
        }

        if matches!(kind, JoinKind::Left | JoinKind::Full) {
            for (k, by_version) in &self.inner {
                if !other.inner.contains_key(k) {
                    for (v, entries) in by_version {
                        for (val, mult) in entries {
                            out.push((v.clone(), k.clone(), JoinValue::LeftOnly(val.clone()), *mult));
                        }
                    }
                }
            }
        }
        if matches!(kind, JoinKind::Right | JoinKind::Full) {
            for (k, by_version) in &other.inner {
                if !self.inner.contains_key(k) {
                    for (v, entries) in by_version {
                        for (val, mult) in entries {
                            out.push((v.clone(), k.clone(), JoinValue::RightOnly(val.clone()), *mult));
                        }
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Sorts `entries` by value and merges runs of equal values, summing multiplicities
/// and dropping zero-sum runs. Returns the valid prefix length. Shared shape with
/// `multiset::consolidate_vec`, specialized for the index's internal storage.
fn consolidate_values<V: Ord>(entries: &mut [(V, isize)]) -> usize {
    if entries.len() <= 1 {
        return entries.iter().filter(|(_, m)| *m != 0).count();
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut offset = 0;
    let mut accum = entries[0].1;
    for index in 1..entries.len() {
        if entries[index].0 == entries[index - 1].0 {
            accum += entries[index].1;
        } else {
            if accum != 0 {
                entries.swap(offset, index - 1);
                entries[offset].1 = accum;
                offset += 1;
            }
            accum = entries[index].1;
        }
    }
    if accum != 0 {
        let last = entries.len() - 1;
        entries.swap(offset, last);
        entries[offset].1 = accum;
        offset += 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstruct_includes_all_versions_at_or_below() {
        let mut idx: Index<&'static str, i32> = Index::new();
        idx.add_value("k", Version::single(1), (10, 1)).unwrap();
        idx.add_value("k", Version::single(2), (20, 1)).unwrap();
        let at1 = idx.reconstruct_at(&"k", &Version::single(1)).unwrap();
        assert_eq!(at1.entries(), &[(10, 1)]);
        let at2 = idx.reconstruct_at(&"k", &Version::single(2)).unwrap();
        let mut entries = at2.entries().to_vec();
        entries.sort();
        assert_eq!(entries, vec![(10, 1), (20, 1)]);
    }

    #[test]
    fn write_below_compaction_frontier_fails() {
        let mut idx: Index<&'static str, i32> = Index::new();
        idx.add_value("k", Version::single(5), (1, 1)).unwrap();
        idx.compact(&Antichain::from_elem(Version::single(5)), None).unwrap();
        let err = idx.add_value("k", Version::single(1), (2, 1));
        assert!(err.is_err());
    }

    #[test]
    fn compaction_preserves_reconstruction_at_frontier() {
        let mut idx: Index<&'static str, i32> = Index::new();
        idx.add_value("k", Version::single(1), (10, 1)).unwrap();
        idx.add_value("k", Version::single(2), (10, 1)).unwrap();
        idx.add_value("k", Version::single(2), (20, 1)).unwrap();
        let before = idx.reconstruct_at(&"k", &Version::single(2)).unwrap();

        idx.compact(&Antichain::from_elem(Version::single(2)), None).unwrap();
        let after = idx.reconstruct_at(&"k", &Version::single(2)).unwrap();

        let mut b = before.entries().to_vec();
        let mut a = after.entries().to_vec();
        b.sort();
        a.sort();
        assert_eq!(b, a);
    }

    #[test]
    fn compaction_must_be_monotone() {
        let mut idx: Index<&'static str, i32> = Index::new();
        idx.add_value("k", Version::single(5), (1, 1)).unwrap();
        idx.compact(&Antichain::from_elem(Version::single(5)), None).unwrap();
        let result = idx.compact(&Antichain::from_elem(Version::single(3)), None);
        assert!(result.is_err());
    }

    #[test]
    fn inner_join_matches_keys() {
        let mut a: Index<i32, &'static str> = Index::new();
        a.add_value(1, Version::single(1), ("a", 1)).unwrap();
        let mut b: Index<i32, &'static str> = Index::new();
        b.add_value(1, Version::single(1), ("x", 1)).unwrap();
        b.add_value(2, Version::single(1), ("y", 1)).unwrap();

        let joined = a.join(&b, JoinKind::Inner).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].1, 1);
        assert_eq!(joined[0].2, JoinValue::Matched("a", "x"));
    }

    #[test]
    fn left_join_includes_unmatched_left() {
        let mut a: Index<i32, &'static str> = Index::new();
        a.add_value(1, Version::single(1), ("a", 1)).unwrap();
        a.add_value(2, Version::single(1), ("b", 1)).unwrap();
        let mut b: Index<i32, &'static str> = Index::new();
        b.add_value(1, Version::single(1), ("x", 1)).unwrap();

        let joined = a.join(&b, JoinKind::Left).unwrap();
        assert!(joined.iter().any(|(_, k, v, _)| *k == 2 && *v == JoinValue::LeftOnly("b")));
    }
}
