//! An incremental view maintenance engine: collections that change over time, and
//! operators (map, filter, join, reduce, iterate, ...) that maintain derived
//! collections as streams of changes proportional to the size of the change rather
//! than the size of the data.
//!
//! The data model is [`version::Version`] (a partially ordered timestamp),
//! [`antichain::Antichain`] (a frontier — a promise about what versions remain
//! possible), and [`multiset::MultiSet`] (a bag of records with signed
//! multiplicities, where negative multiplicities are retractions). [`index::Index`]
//! is the per-key, per-version log that the stateful operators (join, reduce) use to
//! reconstruct a key's value at a version without rescanning the whole collection.
//!
//! [`graph::Graph`] owns the dataflow: [`graph::Graph::new_input`] creates a typed
//! input, operators in [`operators`] build derived streams from it, and
//! [`graph::Graph::step`]/[`graph::Graph::run`] drive the whole thing to quiescence,
//! single-threaded and cooperatively scheduled (see [`operator`] for the per-operator
//! contract every built-in operator and any custom one must honor).

pub mod antichain;
pub mod error;
pub mod graph;
pub mod index;
pub mod message;
pub mod multiset;
pub mod operator;
pub mod operators;
pub mod stream;
pub mod version;
