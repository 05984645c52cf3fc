//! Bags of records with signed multiplicities.
//!
//! A [`MultiSet<T>`] is the payload the engine moves around: a sequence of
//! `(record, multiplicity)` pairs. Multiplicity zero means "absent"; negative
//! multiplicities are retractions, and are exactly as meaningful as positive ones —
//! `concat`-ing a multiset with its [`MultiSet::negate`] cancels it out record for
//! record once consolidated.

use crate::error::{Error, Result};

/// A bag of `(T, multiplicity)` pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MultiSet<T>(Vec<(T, isize)>);

impl<T> MultiSet<T> {
    /// An empty multiset.
    pub fn new() -> MultiSet<T> {
        MultiSet(Vec::new())
    }

    /// The underlying `(record, multiplicity)` pairs, in insertion order.
    pub fn entries(&self) -> &[(T, isize)] {
        &self.0
    }

    /// Consumes the multiset, returning its entries.
    pub fn into_entries(self) -> Vec<(T, isize)> {
        self.0
    }

    /// Appends one record at the given multiplicity.
    pub fn push(&mut self, record: T, multiplicity: isize) {
        self.0.push((record, multiplicity));
    }

    /// Appends `other`'s entries onto `self`, in place.
    pub fn extend(&mut self, other: MultiSet<T>) {
        self.0.extend(other.0);
    }

    /// The total number of `(record, multiplicity)` entries, *before* consolidation.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if there are no entries at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> FromIterator<(T, isize)> for MultiSet<T> {
    fn from_iter<I: IntoIterator<Item = (T, isize)>>(iter: I) -> Self {
        MultiSet(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for MultiSet<T> {
    type Item = (T, isize);
    type IntoIter = std::vec::IntoIter<(T, isize)>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<T: Clone> MultiSet<T> {
    /// Returns a copy of `self` with `f` applied to each record, multiplicities
    /// unchanged.
    pub fn map<U, F: FnMut(&T) -> U>(&self, mut f: F) -> MultiSet<U> {
        MultiSet(self.0.iter().map(|(t, m)| (f(t), *m)).collect())
    }

    /// Returns a copy of `self` containing only the records satisfying `p`,
    /// multiplicities unchanged. Conserves the signed sum of multiplicities over the
    /// records it keeps.
    pub fn filter<P: FnMut(&T) -> bool>(&self, mut p: P) -> MultiSet<T> {
        MultiSet(self.0.iter().filter(|(t, _)| p(t)).cloned().collect())
    }

    /// Returns a copy of `self` with every multiplicity's sign flipped. An involution:
    /// `x.negate().negate()` has the same content as `x`.
    pub fn negate(&self) -> MultiSet<T> {
        MultiSet(self.0.iter().map(|(t, m)| (t.clone(), -m)).collect())
    }

    /// Returns the concatenation of `self` and `other`, unconsolidated.
    pub fn concat(&self, other: &MultiSet<T>) -> MultiSet<T> {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        MultiSet(out)
    }
}

impl<T: Ord + Clone> MultiSet<T> {
    /// Coalesces identical records by summing their multiplicities, dropping any
    /// record whose accumulated multiplicity is zero. Idempotent: consolidating an
    /// already-consolidated multiset returns the same content.
    ///
    /// A sort-and-merge strategy: sort by record, then fold adjacent equal runs.
    pub fn consolidate(mut self) -> MultiSet<T> {
        let len = consolidate_vec(&mut self.0);
        self.0.truncate(len);
        self
    }
}

/// Sorts `vec` by its first element and merges runs of equal records, summing
/// multiplicities and dropping zero-sum runs. Returns the length of the valid prefix.
fn consolidate_vec<T: Ord + Clone>(vec: &mut [(T, isize)]) -> usize {
    if vec.len() <= 1 {
        return vec.iter().filter(|(_, m)| *m != 0).count();
    }
    vec.sort_by(|a, b| a.0.cmp(&b.0));

    let mut offset = 0;
    let mut accum = vec[0].1;
    for index in 1..vec.len() {
        if vec[index].0 == vec[index - 1].0 {
            accum += vec[index].1;
        } else {
            if accum != 0 {
                vec.swap(offset, index - 1);
                vec[offset].1 = accum;
                offset += 1;
            }
            accum = vec[index].1;
        }
    }
    if accum != 0 {
        let last = vec.len() - 1;
        vec.swap(offset, last);
        vec[offset].1 = accum;
        offset += 1;
    }
    offset
}

/// One-shot (non-streaming) aggregations over a [`MultiSet`], built directly on top
/// of consolidation rather than the streaming `reduce`/`distinct`/`count` operators.
/// Convenience for callers not constructing a full dataflow graph.
impl<T: Ord + Clone> MultiSet<T> {
    /// The signed sum of all multiplicities.
    pub fn count(&self) -> isize {
        self.0.iter().map(|(_, m)| m).sum()
    }

    /// Every distinct record with multiplicity exactly 1. Fails if, after
    /// consolidation, any record carries a negative multiplicity — distinctness is
    /// undefined over a collection with retractions outstanding.
    pub fn distinct(&self) -> Result<MultiSet<T>> {
        let consolidated = self.clone().consolidate();
        for (_, m) in consolidated.entries() {
            if *m < 0 {
                return Err(Error::InvalidVersion(
                    "distinct is undefined over negative multiplicities".into(),
                ));
            }
        }
        Ok(MultiSet(consolidated.0.into_iter().map(|(t, _)| (t, 1)).collect()))
    }

    /// The minimum record by `Ord`, ignoring multiplicity count (but still requiring
    /// no negative multiplicities, since a retracted record should not be considered
    /// present at all).
    pub fn min(&self) -> Result<Option<T>> {
        let consolidated = self.clone().consolidate();
        for (_, m) in consolidated.entries() {
            if *m < 0 {
                return Err(Error::InvalidVersion(
                    "min is undefined over negative multiplicities".into(),
                ));
            }
        }
        Ok(consolidated.0.into_iter().map(|(t, _)| t).min())
    }

    /// The maximum record by `Ord`. See [`MultiSet::min`] for the negative-weight
    /// restriction.
    pub fn max(&self) -> Result<Option<T>> {
        let consolidated = self.clone().consolidate();
        for (_, m) in consolidated.entries() {
            if *m < 0 {
                return Err(Error::InvalidVersion(
                    "max is undefined over negative multiplicities".into(),
                ));
            }
        }
        Ok(consolidated.0.into_iter().map(|(t, _)| t).max())
    }

    /// Applies `f` to the consolidated per-record multiplicities grouped by the key
    /// `key_of` extracts, producing one `(key, aggregated)` record per distinct key.
    pub fn reduce<K: Ord + Clone, R, F>(&self, key_of: impl Fn(&T) -> K, mut f: F) -> MultiSet<(K, R)>
    where
        F: FnMut(&K, &[(T, isize)]) -> Vec<(R, isize)>,
    {
        let consolidated = self.clone().consolidate();
        let mut groups: Vec<(K, Vec<(T, isize)>)> = Vec::new();
        for (record, mult) in consolidated.0 {
            let key = key_of(&record);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, entries)) => entries.push((record, mult)),
                None => groups.push((key, vec![(record, mult)])),
            }
        }
        let mut out = Vec::new();
        for (key, entries) in groups {
            for (value, mult) in f(&key, &entries) {
                out.push(((key.clone(), value), mult));
            }
        }
        MultiSet(out)
    }

    /// The sum of multiplicities over a derived numeric projection; for example
    /// summing an integer field across a keyed collection. Mirrors `count` but over
    /// a caller-chosen weight rather than pure record multiplicity.
    pub fn sum<F: Fn(&T) -> i64>(&self, weight: F) -> i64 {
        self.0.iter().map(|(t, m)| weight(t) * (*m as i64)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consolidate_merges_and_drops_zero() {
        let ms: MultiSet<i32> = vec![(1, 1), (2, 1), (1, -1), (3, 2)].into_iter().collect();
        let c = ms.consolidate();
        let mut entries = c.entries().to_vec();
        entries.sort();
        assert_eq!(entries, vec![(2, 1), (3, 2)]);
    }

    #[test]
    fn consolidate_is_idempotent() {
        let ms: MultiSet<i32> = vec![(1, 1), (2, 3)].into_iter().collect();
        let once = ms.clone().consolidate();
        let twice = once.clone().consolidate();
        assert_eq!(once, twice);
    }

    #[test]
    fn negate_is_involution() {
        let ms: MultiSet<i32> = vec![(1, 2), (2, -3)].into_iter().collect();
        let back = ms.negate().negate();
        assert_eq!(ms, back);
    }

    #[test]
    fn map_conserves_signed_sum() {
        let ms: MultiSet<i32> = vec![(1, 2), (2, -3), (3, 4)].into_iter().collect();
        let mapped = ms.map(|x| x + 5);
        let sum_before: isize = ms.entries().iter().map(|(_, m)| m).sum();
        let sum_after: isize = mapped.entries().iter().map(|(_, m)| m).sum();
        assert_eq!(sum_before, sum_after);
    }

    #[test]
    fn distinct_rejects_negative_multiplicity() {
        let ms: MultiSet<i32> = vec![(1, -1)].into_iter().collect();
        assert!(ms.distinct().is_err());
    }

    #[test]
    fn distinct_drops_duplicates() {
        let ms: MultiSet<i32> = vec![(1, 1), (1, 1), (2, 1)].into_iter().collect();
        let d = ms.distinct().unwrap();
        let mut entries = d.entries().to_vec();
        entries.sort();
        assert_eq!(entries, vec![(1, 1), (2, 1)]);
    }
}
