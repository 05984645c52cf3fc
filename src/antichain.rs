//! Minimal antichains of [`Version`]s — "frontiers".
//!
//! A frontier is a promise: no further data will ever arrive at a version that is not
//! `>=` some element of the frontier. The empty antichain is the strongest possible
//! promise ("no further progress"); it is reached when an input or operator has
//! nothing left to contribute.

use crate::error::Result;
use crate::version::Version;

/// A set of pairwise-incomparable [`Version`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Antichain(Vec<Version>);

impl Antichain {
    /// The empty antichain — "no further progress possible".
    pub fn new() -> Antichain {
        Antichain(Vec::new())
    }

    /// A frontier consisting of a single version.
    pub fn from_elem(v: Version) -> Antichain {
        Antichain(vec![v])
    }

    /// Builds a minimal antichain from a collection of versions, dropping any that
    /// are dominated by another.
    pub fn from_elements<I: IntoIterator<Item = Version>>(elements: I) -> Result<Antichain> {
        let mut antichain = Antichain::new();
        for element in elements {
            antichain.insert(element)?;
        }
        Ok(antichain)
    }

    /// The frontier's elements. Pairwise incomparable by construction.
    pub fn elements(&self) -> &[Version] {
        &self.0
    }

    /// `true` if the frontier promises no further progress.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Inserts `v`, preserving minimality: any existing element `>= v` is dropped,
    /// and `v` itself is discarded if some existing element is already `<= v`.
    /// Returns whether `v` (or something it replaced) changed the frontier.
    pub fn insert(&mut self, v: Version) -> Result<bool> {
        for existing in &self.0 {
            if existing.less_equal(&v)? {
                return Ok(false);
            }
        }
        let mut retained = Vec::with_capacity(self.0.len());
        for existing in self.0.drain(..) {
            if !v.less_equal(&existing)? {
                retained.push(existing);
            }
        }
        self.0 = retained;
        self.0.push(v);
        Ok(true)
    }

    /// The union of two frontiers, re-minimized. This is the frontier one obtains by
    /// requiring both promises to hold simultaneously.
    pub fn meet(&self, other: &Antichain) -> Result<Antichain> {
        let mut result = self.clone();
        for element in &other.0 {
            result.insert(element.clone())?;
        }
        Ok(result)
    }

    /// `true` if every element of `other` is `>=` some element of `self`: `self`'s
    /// promise is at least as strong as `other`'s.
    pub fn less_equal(&self, other: &Antichain) -> Result<bool> {
        for o in &other.0 {
            if !self.less_equal_version(o)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `true` if some element of the frontier is `<= v`, i.e. `v` is not yet sealed
    /// away by this promise.
    pub fn less_equal_version(&self, v: &Version) -> Result<bool> {
        for element in &self.0 {
            if element.less_equal(v)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Lifts [`Version::extend`] over every element.
    pub fn extend(&self) -> Antichain {
        Antichain(self.0.iter().map(Version::extend).collect())
    }

    /// Lifts [`Version::truncate`] over every element, re-minimizing the result
    /// (distinct extended versions can collapse to the same truncated version).
    pub fn truncate(&self) -> Result<Antichain> {
        let mut result = Antichain::new();
        for element in &self.0 {
            result.insert(element.truncate()?)?;
        }
        Ok(result)
    }

    /// Lifts [`Version::apply_step`] over every element, re-minimizing.
    pub fn apply_step(&self, k: u64) -> Result<Antichain> {
        let mut result = Antichain::new();
        for element in &self.0 {
            result.insert(element.apply_step(k)?)?;
        }
        Ok(result)
    }
}
