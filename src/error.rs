//! Typed failures surfaced at the engine's API boundary.
//!
//! Every fallible operation in this crate returns [`Result<T, Error>`]. None of these
//! are retried internally; a data-model invariant breach (bad dimension, non-monotone
//! frontier) is a programming error in the dataflow author's code, not a transient
//! condition.

use thiserror::Error as ThisError;

/// The error type returned by fallible engine operations.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A [`crate::version::Version`] had zero dimension, a mismatched dimension
    /// against its peer, or (conceptually) a negative coordinate.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// A `Frontier` message on a stream edge was not ≥ the edge's current frontier.
    #[error("frontier update {update:?} is not >= current frontier {current:?}")]
    InvalidFrontierUpdate {
        /// Debug rendering of the rejected update.
        update: String,
        /// Debug rendering of the frontier it failed to dominate.
        current: String,
    },

    /// An operator's computed output frontier regressed relative to what it had
    /// already emitted. This is an internal invariant breach.
    #[error("computed output frontier regressed: {0}")]
    InvalidFrontierState(String),

    /// [`crate::index::Index::add_value`] was attempted at a version not covered by
    /// the index's compaction frontier.
    #[error("write at version {version:?} is below the compaction frontier {frontier:?}")]
    InvalidVersionForWrite {
        /// Debug rendering of the rejected write version.
        version: String,
        /// Debug rendering of the compaction frontier.
        frontier: String,
    },

    /// [`crate::index::Index::compact`] was called with a frontier that is not ≥ the
    /// index's previous compaction frontier.
    #[error("compaction frontier {new:?} is not >= previous compaction frontier {old:?}")]
    InvalidCompactionFrontier {
        /// Debug rendering of the requested frontier.
        new: String,
        /// Debug rendering of the previous frontier.
        old: String,
    },

    /// An operation required [`crate::graph::Graph::finalize`] to not yet have run.
    #[error("graph is already finalized")]
    GraphAlreadyFinalized,

    /// An operation required [`crate::graph::Graph::finalize`] to have already run.
    #[error("graph has not been finalized")]
    GraphNotFinalized,

    /// Two streams from different [`crate::graph::Graph`] instances were connected.
    #[error("cannot connect streams belonging to different graphs")]
    CrossGraphComposition,

    /// A stateful operator variant was used inside an iteration scope where it is
    /// not supported.
    #[error("operator {0} is not supported inside an iteration scope")]
    UnsupportedInIteration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

macro_rules! warn_err {
    ($e:expr) => {{
        let err = $e;
        log::warn!("{err}");
        err
    }};
}

pub(crate) use warn_err;
