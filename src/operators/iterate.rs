//! Fixpoint iteration: ingress, feedback, egress, and the `iterate` convenience that
//! wires all three around a user-supplied loop body.
//!
//! A loop runs in a scope one dimension deeper than its surroundings: [`ingress`]
//! appends a trailing iteration coordinate (and immediately retracts the same data
//! one iteration later, so it nets to zero unless the body reintroduces it);
//! [`feedback`] advances that trailing coordinate each time data passes around the
//! loop and decides, from frontier updates alone, when the loop has gone quiet
//! enough to let the containing scope's frontier advance past it; [`egress`] strips
//! the coordinate back off on the way out.

use std::collections::{HashMap, HashSet};

use crate::antichain::Antichain;
use crate::error::Result;
use crate::graph::Stream;
use crate::message::Message;
use crate::operator::{FrontierState, Operator};
use crate::operators::concat::concat;
use crate::stream::StreamReader;
use crate::version::Version;

/// Tolerate this many consecutive frontier updates with no in-flight data for a
/// top-level time before concluding the loop has reached a fixpoint there. Data can
/// still arrive later at that outer time (from outside the loop), which is why this
/// is a heuristic rather than a proof, and why it's only sound under single-threaded,
/// in-registration-order execution (no other worker can be silently behind).
const EMPTY_STRIKE_LIMIT: u32 = 3;

struct IngressOperator<T> {
    id: usize,
    input: StreamReader<T>,
    output: Stream<T>,
    frontier: FrontierState,
}

impl<T: Clone + 'static> Operator for IngressOperator<T> {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "ingress"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        for message in self.input.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    let entered = version.extend();
                    let retraction_at = entered.apply_step(1)?;
                    self.output.writer().borrow_mut().send_data(entered, data.clone())?;
                    self.output.writer().borrow_mut().send_data(retraction_at, data.negate())?;
                }
                Message::Frontier(frontier) => {
                    self.frontier.update_input(0, frontier)?;
                    let candidate = self.frontier.input(0).extend();
                    if self.frontier.advance_output(candidate.clone())? {
                        self.output.writer().borrow_mut().send_frontier(candidate)?;
                    }
                }
            }
        }
        Ok(did_work)
    }
}

/// Enters an iteration scope: every data batch at version `v` is emitted unchanged at
/// `v.extend()`, and its exact negation is emitted at the next iteration
/// (`v.extend().apply_step(1)`) so that, left alone, the net contribution inside the
/// loop is zero — only a loop body that reintroduces the data keeps it alive.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::ingress;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_input, stream) = graph.new_input::<i32>().unwrap();
/// let entered = ingress(&stream).unwrap();
/// graph.finalize().unwrap();
/// let _ = entered;
/// ```
pub fn ingress<T: Clone + 'static>(input: &Stream<T>) -> Result<Stream<T>> {
    input.check_not_finalized()?;
    let reader = input.new_reader();
    let output = input.new_output::<T>();
    let frontier = FrontierState::new(1, input.initial_frontier());
    let id = input.graph().next_operator_id();
    let op = IngressOperator { id, input: reader, output: output.clone(), frontier };
    output.register(Box::new(op));
    Ok(output)
}

struct EgressOperator<T> {
    id: usize,
    input: StreamReader<T>,
    output: Stream<T>,
    frontier: FrontierState,
}

impl<T: Clone + 'static> Operator for EgressOperator<T> {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "egress"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        for message in self.input.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    self.output.writer().borrow_mut().send_data(version.truncate()?, data)?;
                }
                Message::Frontier(frontier) => {
                    self.frontier.update_input(0, frontier)?;
                    let candidate = self.frontier.input(0).truncate()?;
                    if self.frontier.advance_output(candidate.clone())? {
                        self.output.writer().borrow_mut().send_frontier(candidate)?;
                    }
                }
            }
        }
        Ok(did_work)
    }
}

/// Leaves an iteration scope: every data batch at `v` is emitted at `v.truncate()`,
/// dropping the trailing iteration coordinate.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::{egress, ingress};
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_input, stream) = graph.new_input::<i32>().unwrap();
/// let entered = ingress(&stream).unwrap();
/// let left = egress(&entered).unwrap();
/// graph.finalize().unwrap();
/// let _ = left;
/// ```
pub fn egress<T: Clone + 'static>(input: &Stream<T>) -> Result<Stream<T>> {
    input.check_not_finalized()?;
    let reader = input.new_reader();
    let output = input.new_output::<T>();
    let frontier = FrontierState::new(1, input.initial_frontier());
    let id = input.graph().next_operator_id();
    let op = EgressOperator { id, input: reader, output: output.clone(), frontier };
    output.register(Box::new(op));
    Ok(output)
}

struct FeedbackOperator<T> {
    id: usize,
    input: StreamReader<T>,
    output: Stream<T>,
    frontier: FrontierState,
    step: u64,
    in_flight: HashMap<Version, HashSet<Version>>,
    empty_strikes: HashMap<Version, u32>,
}

impl<T: Clone + 'static> Operator for FeedbackOperator<T> {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "feedback"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        for message in self.input.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    let emitted = version.apply_step(self.step)?;
                    let top = emitted.truncate()?;
                    self.in_flight.entry(top.clone()).or_default().insert(emitted.clone());
                    self.empty_strikes.remove(&top);
                    self.output.writer().borrow_mut().send_data(emitted, data)?;
                }
                Message::Frontier(frontier) => {
                    self.frontier.update_input(0, frontier)?;
                    let incremented = self.frontier.input(0).apply_step(self.step)?;
                    let candidate = self.compute_candidate_frontier(&incremented)?;
                    self.prune_resolved(&candidate)?;
                    if self.frontier.advance_output(candidate.clone())? {
                        self.output.writer().borrow_mut().send_frontier(candidate)?;
                    }
                }
            }
        }
        Ok(did_work)
    }
}

impl<T> FeedbackOperator<T> {
    /// Keeps every incremented-frontier element whose top-level time still has
    /// in-flight data. For an element with none, tolerates up to
    /// [`EMPTY_STRIKE_LIMIT`] consecutive empty updates before concluding that time
    /// has converged; once concluded, the element is dropped (or, if other top-level
    /// times are still circulating data, replaced by its join with each of them, so
    /// the frontier doesn't promise progress the loop hasn't made).
    fn compute_candidate_frontier(&mut self, incremented: &Antichain) -> Result<Antichain> {
        let surviving: Vec<Version> =
            self.in_flight.values().flat_map(|versions| versions.iter().cloned()).collect();

        let mut candidate = Antichain::new();
        for v in incremented.elements() {
            let top = v.truncate()?;
            let has_in_flight = self.in_flight.get(&top).is_some_and(|s| !s.is_empty());
            if has_in_flight {
                self.empty_strikes.remove(&top);
                candidate.insert(v.clone())?;
                continue;
            }

            let strikes = self.empty_strikes.entry(top.clone()).or_insert(0);
            *strikes += 1;
            if *strikes <= EMPTY_STRIKE_LIMIT {
                candidate.insert(v.clone())?;
            } else {
                log::debug!(
                    "feedback: frontier element {v:?} dropped after {strikes} empty updates"
                );
                for u in &surviving {
                    candidate.insert(v.join(u)?)?;
                }
            }
        }
        Ok(candidate)
    }

    /// Drops in-flight bookkeeping for versions the new output frontier has sealed
    /// away (nothing further can arrive there, so there is nothing left to track).
    fn prune_resolved(&mut self, candidate: &Antichain) -> Result<()> {
        for versions in self.in_flight.values_mut() {
            let mut retained = HashSet::with_capacity(versions.len());
            for v in versions.drain() {
                if candidate.less_equal_version(&v)? {
                    retained.insert(v);
                }
            }
            *versions = retained;
        }
        self.in_flight.retain(|_, versions| !versions.is_empty());
        Ok(())
    }
}

fn build_feedback<T: Clone + 'static>(source: &Stream<T>, output: Stream<T>, step: u64) -> Result<()> {
    source.check_not_finalized()?;
    let reader = source.new_reader();
    let frontier = FrontierState::new(1, source.initial_frontier());
    let id = source.graph().next_operator_id();
    let op = FeedbackOperator {
        id,
        input: reader,
        output: output.clone(),
        frontier,
        step,
        in_flight: HashMap::new(),
        empty_strikes: HashMap::new(),
    };
    output.register(Box::new(op));
    Ok(())
}

/// Advances every data batch's trailing (iteration) coordinate by `step`, tracking
/// in-flight versions well enough to decide, from frontier updates alone, when a
/// top-level time has gone quiet. Used standalone by callers wiring a loop by hand;
/// [`iterate`] uses the same mechanism internally to close a loop body's output back
/// onto its input.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::{feedback, ingress};
///
/// let graph = Graph::with_dimension(2).unwrap();
/// let (_input, stream) = graph.new_input::<i32>().unwrap();
/// let entered = ingress(&stream).unwrap();
/// let looped = feedback(&entered, 1).unwrap();
/// graph.finalize().unwrap();
/// let _ = looped;
/// ```
pub fn feedback<T: Clone + 'static>(input: &Stream<T>, step: u64) -> Result<Stream<T>> {
    let output = input.new_output::<T>();
    build_feedback(input, output.clone(), step)?;
    Ok(output)
}

/// Runs `body` to a fixpoint: `input` enters the loop via [`ingress`], is
/// concatenated with the loop's own feedback stream, handed to `body`, and `body`'s
/// result is closed back onto the feedback stream (one iteration step per pass) and
/// finally released with [`egress`].
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::{filter, iterate};
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_input, stream) = graph.new_input::<i32>().unwrap();
/// let result = iterate(&stream, |looped| filter(looped, |n| *n > 0)).unwrap();
/// graph.finalize().unwrap();
/// let _ = result;
/// ```
pub fn iterate<T, F>(input: &Stream<T>, body: F) -> Result<Stream<T>>
where
    T: Clone + 'static,
    F: FnOnce(&Stream<T>) -> Result<Stream<T>>,
{
    input.check_not_finalized()?;
    let entered = ingress(input)?;
    let loop_stream = entered.new_output::<T>();
    let combined = concat(&entered, &loop_stream)?;
    let body_output = body(&combined)?;
    build_feedback(&body_output, loop_stream.clone(), 1)?;
    egress(&loop_stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::message::Message;
    use crate::multiset::MultiSet;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn ingress_retracts_one_iteration_later() {
        let graph = Graph::with_dimension(1).unwrap();
        let (input, stream) = graph.new_input::<i32>().unwrap();
        let entered = ingress(&stream).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        crate::operators::output(&entered, move |message| {
            if let Message::Data(version, data) = message {
                seen_clone.borrow_mut().push((version.clone(), data.entries().to_vec()));
            }
        })
        .unwrap();
        graph.finalize().unwrap();

        input.send_data(Version::single(0), vec![(1, 1)].into_iter().collect::<MultiSet<i32>>()).unwrap();
        input.send_frontier(Antichain::from_elem(Version::single(1))).unwrap();
        graph.run().unwrap();

        let entries = seen.borrow();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.coords(), &[0, 0]);
        assert_eq!(entries[0].1, vec![(1, 1)]);
        assert_eq!(entries[1].0.coords(), &[0, 1]);
        assert_eq!(entries[1].1, vec![(1, -1)]);
    }

    #[test]
    fn egress_truncates_trailing_coordinate() {
        let graph = Graph::with_dimension(2).unwrap();
        let (input, stream) = graph.new_input::<i32>().unwrap();
        let left = egress(&stream).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        crate::operators::output(&left, move |message| {
            if let Message::Data(version, _) = message {
                seen_clone.borrow_mut().push(version.clone());
            }
        })
        .unwrap();
        graph.finalize().unwrap();

        input
            .send_data(Version::new(smallvec::smallvec![3u64, 0]).unwrap(), vec![(1, 1)].into_iter().collect())
            .unwrap();
        input
            .send_frontier(Antichain::from_elem(Version::new(smallvec::smallvec![4u64, 0]).unwrap()))
            .unwrap();
        graph.run().unwrap();

        assert_eq!(seen.borrow().as_slice(), &[Version::single(3)]);
    }

    #[test]
    fn iterate_converges_without_hanging() {
        let graph = Graph::with_dimension(1).unwrap();
        let (input, stream) = graph.new_input::<i32>().unwrap();
        let result = iterate(&stream, |looped| crate::operators::filter(looped, |n| *n > 0)).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        crate::operators::output(&result, move |message| {
            if let Message::Data(_, data) = message {
                seen_clone.borrow_mut().extend(data.entries().to_vec());
            }
        })
        .unwrap();
        graph.finalize().unwrap();

        input.send_data(Version::single(0), vec![(1, 1)].into_iter().collect::<MultiSet<i32>>()).unwrap();
        input.send_frontier(Antichain::from_elem(Version::single(1))).unwrap();
        graph.run().unwrap();

        assert!(seen.borrow().contains(&(1, 1)));
    }
}
