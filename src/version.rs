//! Partially ordered timestamps.
//!
//! A [`Version`] is a tuple of non-negative integers of fixed dimension. One
//! dimension gives a total order (ordinary "time moves forward"); more than one
//! dimension gives the product order used to make nested iteration consistent: the
//! outer coordinates count "real" progress and the innermost coordinate counts loop
//! iterations.

use std::cmp::Ordering;
use smallvec::SmallVec;

use crate::antichain::Antichain;
use crate::error::{Error, Result};

/// A point in partially ordered time.
///
/// Coordinates are stored inline for the common case of one or two dimensions.
/// Versions are value types: two versions with equal coordinates are
/// interchangeable everywhere.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Version(SmallVec<[u64; 4]>);

impl Version {
    /// Builds a version from its coordinates. Fails if `coords` is empty: the
    /// zero-dimensional version is disallowed.
    pub fn new<I: Into<SmallVec<[u64; 4]>>>(coords: I) -> Result<Version> {
        let coords = coords.into();
        if coords.is_empty() {
            return Err(Error::InvalidVersion("version must have at least one dimension".into()));
        }
        Ok(Version(coords))
    }

    /// A single-coordinate version, the common case for non-iterative scopes.
    pub fn single(t: u64) -> Version {
        Version(SmallVec::from_elem(t, 1))
    }

    /// The all-zero version of the given dimension; the least element of that scope.
    pub fn minimum(dimension: usize) -> Result<Version> {
        if dimension == 0 {
            return Err(Error::InvalidVersion("dimension must be at least 1".into()));
        }
        Ok(Version(SmallVec::from_elem(0, dimension)))
    }

    /// The number of coordinates.
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// The raw coordinates, outermost-first.
    pub fn coords(&self) -> &[u64] {
        &self.0
    }

    fn check_dimension(&self, other: &Version) -> Result<()> {
        if self.dimension() != other.dimension() {
            Err(Error::InvalidVersion(format!(
                "dimension mismatch: {} vs {}",
                self.dimension(),
                other.dimension()
            )))
        } else {
            Ok(())
        }
    }

    /// Structural equality, after checking the two versions share a dimension.
    pub fn equals(&self, other: &Version) -> Result<bool> {
        self.check_dimension(other)?;
        Ok(self == other)
    }

    /// `self <= other`, pointwise.
    pub fn less_equal(&self, other: &Version) -> Result<bool> {
        self.check_dimension(other)?;
        Ok(self.0.iter().zip(other.0.iter()).all(|(a, b)| a <= b))
    }

    /// `self <= other` and `self != other`.
    pub fn less_than(&self, other: &Version) -> Result<bool> {
        Ok(self.less_equal(other)? && self != other)
    }

    /// The pointwise maximum (least upper bound) of the two versions.
    pub fn join(&self, other: &Version) -> Result<Version> {
        self.check_dimension(other)?;
        let coords = self.0.iter().zip(other.0.iter()).map(|(a, b)| *a.max(b)).collect();
        Ok(Version(coords))
    }

    /// The pointwise minimum (greatest lower bound) of the two versions.
    pub fn meet(&self, other: &Version) -> Result<Version> {
        self.check_dimension(other)?;
        let coords = self.0.iter().zip(other.0.iter()).map(|(a, b)| *a.min(b)).collect();
        Ok(Version(coords))
    }

    /// Enters an iteration scope by appending a trailing zero coordinate.
    pub fn extend(&self) -> Version {
        let mut coords = self.0.clone();
        coords.push(0);
        Version(coords)
    }

    /// Leaves an iteration scope by dropping the trailing coordinate. Fails if that
    /// would produce a zero-dimensional version.
    pub fn truncate(&self) -> Result<Version> {
        if self.dimension() <= 1 {
            return Err(Error::InvalidVersion(
                "cannot truncate a one-dimensional version".into(),
            ));
        }
        let mut coords = self.0.clone();
        coords.pop();
        Ok(Version(coords))
    }

    /// Adds `k` (which must be positive) to the trailing coordinate; this is how a
    /// feedback edge advances the iteration counter.
    pub fn apply_step(&self, k: u64) -> Result<Version> {
        if k == 0 {
            return Err(Error::InvalidVersion("apply_step requires k > 0".into()));
        }
        let mut coords = self.0.clone();
        let last = coords.last_mut().expect("version is never zero-dimensional");
        *last = last.checked_add(k).ok_or_else(|| {
            Error::InvalidVersion("apply_step overflowed the trailing coordinate".into())
        })?;
        Ok(Version(coords))
    }

    /// Rounds `self` up to the smallest version that is both `>= self` and `>=` some
    /// element of `frontier`.
    ///
    /// Computed as the meet of `self.join(e)` over every `e` in `frontier`: each such
    /// join is individually a valid candidate (it dominates both `self` and `e`), and
    /// the meet of all candidates is the smallest version that is still `>= self`
    /// (every candidate is `>= self`, so their meet is too) while remaining `>=` at
    /// least one frontier element.
    pub fn advance_by(&self, frontier: &Antichain) -> Result<Version> {
        let mut result: Option<Version> = None;
        for element in frontier.elements() {
            let candidate = element.join(self)?;
            result = Some(match result {
                Some(acc) => acc.meet(&candidate)?,
                None => candidate,
            });
        }
        result.ok_or_else(|| Error::InvalidVersion("advance_by against an empty frontier".into()))
    }

    /// A partial order comparison, `None` when the two versions are incomparable or
    /// of mismatched dimension.
    pub fn partial_cmp_checked(&self, other: &Version) -> Option<Ordering> {
        if self.dimension() != other.dimension() {
            return None;
        }
        let mut less = false;
        let mut greater = false;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.cmp(b) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (false, false) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (true, true) => None,
        }
    }
}

impl From<u64> for Version {
    fn from(t: u64) -> Version {
        Version::single(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dimension_is_totally_ordered() {
        let a = Version::single(1);
        let b = Version::single(2);
        assert!(a.less_than(&b).unwrap());
        assert!(!b.less_than(&a).unwrap());
    }

    #[test]
    fn zero_dimension_rejected() {
        let empty: SmallVec<[u64; 4]> = SmallVec::new();
        assert!(Version::new(empty).is_err());
    }

    #[test]
    fn product_order_incomparable() {
        let a = Version::new(SmallVec::from_slice(&[1u64, 0])).unwrap();
        let b = Version::new(SmallVec::from_slice(&[0u64, 1])).unwrap();
        assert!(!a.less_equal(&b).unwrap());
        assert!(!b.less_equal(&a).unwrap());
        assert_eq!(a.partial_cmp_checked(&b), None);
    }

    #[test]
    fn join_is_pointwise_max() {
        let a = Version::new(SmallVec::from_slice(&[1u64, 4])).unwrap();
        let b = Version::new(SmallVec::from_slice(&[3u64, 2])).unwrap();
        let j = a.join(&b).unwrap();
        assert_eq!(j.coords(), &[3, 4]);
    }

    #[test]
    fn extend_then_truncate_roundtrips() {
        let a = Version::single(5);
        let extended = a.extend();
        assert_eq!(extended.coords(), &[5, 0]);
        let truncated = extended.truncate().unwrap();
        assert_eq!(truncated, a);
    }

    #[test]
    fn truncate_one_dimensional_fails() {
        assert!(Version::single(1).truncate().is_err());
    }

    #[test]
    fn apply_step_requires_positive() {
        let a = Version::single(1);
        assert!(a.apply_step(0).is_err());
        assert_eq!(a.apply_step(3).unwrap().coords(), &[4]);
    }

    #[test]
    fn dimension_mismatch_errors() {
        let a = Version::single(1);
        let b = Version::new(SmallVec::from_slice(&[1u64, 2])).unwrap();
        assert!(a.less_equal(&b).is_err());
        assert!(a.join(&b).is_err());
    }
}
