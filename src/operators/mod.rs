//! The operator library: stateless linear operators, `consolidate`, the join/reduce
//! family, and the iteration operators (ingress/egress/feedback).
//!
//! Each operator is exposed as a function taking the input [`crate::graph::Stream`]s
//! and returning the output `Stream`, one function per file, so chaining reads as
//! `map(&s, f)?` rather than `s.map(f)?`.

pub mod concat;
pub mod consolidate;
pub mod debug;
pub mod filter;
pub mod iterate;
pub mod join;
pub mod map;
pub mod negate;
pub mod output;
pub mod reduce;

pub use concat::concat;
pub use consolidate::consolidate;
pub use debug::debug;
pub use filter::filter;
pub use iterate::{egress, feedback, ingress, iterate};
pub use join::join;
pub use map::map;
pub use negate::negate;
pub use output::output;
pub use reduce::{count, distinct, reduce};
