//! Buffer-until-sealed consolidation.
//!
//! Upstream operators may emit many small batches at the same version; `consolidate`
//! accumulates them per version and only emits once the input frontier has moved past
//! that version, flattening the batch into one consolidated multiset with no
//! zero-multiplicity noise.

use std::collections::HashMap;

use crate::error::Result;
use crate::graph::Stream;
use crate::message::Message;
use crate::multiset::MultiSet;
use crate::operator::{FrontierState, Operator};
use crate::stream::StreamReader;
use crate::version::Version;

struct ConsolidateOperator<T: Ord + Clone> {
    id: usize,
    input: StreamReader<T>,
    output: Stream<T>,
    frontier: FrontierState,
    buffer: HashMap<Version, MultiSet<T>>,
}

impl<T: Ord + Clone + 'static> Operator for ConsolidateOperator<T> {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "consolidate"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        let mut frontier_moved = false;
        for message in self.input.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    self.buffer.entry(version).or_insert_with(MultiSet::new).extend(data);
                }
                Message::Frontier(frontier) => {
                    self.frontier.update_input(0, frontier)?;
                    frontier_moved = true;
                }
            }
        }

        if frontier_moved {
            let sealed: Vec<Version> = self
                .buffer
                .keys()
                .filter_map(|v| match self.frontier.input(0).less_equal_version(v) {
                    Ok(true) => None,
                    Ok(false) => Some(Ok(v.clone())),
                    Err(e) => Some(Err(e)),
                })
                .collect::<Result<Vec<_>>>()?;

            for version in sealed {
                if let Some(batch) = self.buffer.remove(&version) {
                    let consolidated = batch.consolidate();
                    self.output.writer().borrow_mut().send_data(version, consolidated)?;
                }
            }

            let candidate = self.frontier.meet_inputs()?;
            if self.frontier.advance_output(candidate.clone())? {
                self.output.writer().borrow_mut().send_frontier(candidate)?;
            }
        }

        Ok(did_work)
    }
}

/// Consolidates `input`: batches accumulate per version until the input frontier
/// moves past that version, at which point the accumulated multiset is consolidated
/// (identical records merged, zero-multiplicity records dropped) and emitted as one
/// batch.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::consolidate;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_input, stream) = graph.new_input::<i32>().unwrap();
/// let consolidated = consolidate(&stream).unwrap();
/// graph.finalize().unwrap();
/// let _ = consolidated;
/// ```
pub fn consolidate<T: Ord + Clone + 'static>(input: &Stream<T>) -> Result<Stream<T>> {
    input.check_not_finalized()?;
    let reader = input.new_reader();
    let output = input.new_output::<T>();
    let frontier = FrontierState::new(1, input.initial_frontier());
    let id = input.graph().next_operator_id();
    let op = ConsolidateOperator {
        id,
        input: reader,
        output: output.clone(),
        frontier,
        buffer: HashMap::new(),
    };
    output.register(Box::new(op));
    Ok(output)
}
