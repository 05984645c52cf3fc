//! The operator kernel: the shared shape every concrete operator is built from.
//!
//! An operator owns an id, a list of input readers, a single output writer, a
//! per-input frontier, and a single output frontier. Its `step` drains whatever is
//! waiting on its inputs, does its own bookkeeping, and advances its output frontier
//! no further than the meet of its current input frontiers (invariant 7, §8).

use crate::antichain::Antichain;
use crate::error::{warn_err, Error, Result};

/// Every operator in the graph implements this. `step` is called once per
/// `Graph::step` pass, in registration order; it should drain whatever is waiting on
/// its inputs and return whether it did any work, so that `Graph::run` can detect
/// quiescence.
pub trait Operator {
    /// A stable identifier, assigned at registration.
    fn id(&self) -> usize;

    /// A human-readable operator name, used in `debug` output and logging.
    fn name(&self) -> &str;

    /// Drains pending input, updates state, and emits output. Returns `true` if the
    /// operator consumed or produced at least one message.
    fn step(&mut self) -> Result<bool>;
}

/// Shared input/output frontier bookkeeping for a concrete operator.
///
/// Concrete operators hold one of these per operator instance and delegate frontier
/// monotonicity checks to it, rather than re-deriving the checks in every operator.
pub struct FrontierState {
    input_frontiers: Vec<Antichain>,
    output_frontier: Antichain,
}

impl FrontierState {
    /// `n_inputs` input frontiers and one output frontier, all starting at
    /// `initial`.
    pub fn new(n_inputs: usize, initial: Antichain) -> Self {
        FrontierState {
            input_frontiers: vec![initial.clone(); n_inputs],
            output_frontier: initial,
        }
    }

    /// The frontier currently recorded for input `idx`.
    pub fn input(&self, idx: usize) -> &Antichain {
        &self.input_frontiers[idx]
    }

    /// The frontier this operator has last emitted on its output.
    pub fn output(&self) -> &Antichain {
        &self.output_frontier
    }

    /// Records a frontier update on input `idx`. Fails if it does not dominate the
    /// previously recorded frontier for that input.
    pub fn update_input(&mut self, idx: usize, frontier: Antichain) -> Result<()> {
        if !self.input_frontiers[idx].less_equal(&frontier)? {
            return Err(warn_err!(Error::InvalidFrontierUpdate {
                update: format!("{frontier:?}"),
                current: format!("{:?}", self.input_frontiers[idx]),
            }));
        }
        self.input_frontiers[idx] = frontier;
        Ok(())
    }

    /// The meet of every recorded input frontier — the strongest combined promise
    /// currently in effect.
    pub fn meet_inputs(&self) -> Result<Antichain> {
        let mut meet = Antichain::new();
        for frontier in &self.input_frontiers {
            meet = meet.meet(frontier)?;
        }
        Ok(meet)
    }

    /// Attempts to advance the output frontier to `candidate`. Fails if `candidate`
    /// would regress relative to the frontier already emitted (internal invariant
    /// breach). Returns `true` if the frontier actually changed (and so should be
    /// sent downstream).
    pub fn advance_output(&mut self, candidate: Antichain) -> Result<bool> {
        if candidate == self.output_frontier {
            return Ok(false);
        }
        if !self.output_frontier.less_equal(&candidate)? {
            return Err(warn_err!(Error::InvalidFrontierState(format!(
                "output frontier would regress from {:?} to {:?}",
                self.output_frontier, candidate
            ))));
        }
        self.output_frontier = candidate;
        Ok(true)
    }
}
