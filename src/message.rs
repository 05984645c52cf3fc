//! The two message kinds that travel along a stream edge.

use crate::antichain::Antichain;
use crate::multiset::MultiSet;
use crate::version::Version;

/// A message delivered to a stream reader.
#[derive(Clone, Debug)]
pub enum Message<T> {
    /// A change batch at a specific version.
    Data(Version, MultiSet<T>),
    /// A promise that no further data will arrive at a version not `>=` some element
    /// of this frontier.
    Frontier(Antichain),
}
