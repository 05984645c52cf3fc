//! Pass through the union of two collections, unchanged.

use crate::error::Result;
use crate::graph::Stream;
use crate::message::Message;
use crate::operator::{FrontierState, Operator};
use crate::stream::StreamReader;

struct ConcatOperator<T> {
    id: usize,
    a: StreamReader<T>,
    b: StreamReader<T>,
    output: Stream<T>,
    frontier: FrontierState,
}

impl<T: Clone + 'static> Operator for ConcatOperator<T> {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "concat"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        for message in self.a.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    self.output.writer().borrow_mut().send_data(version, data)?;
                }
                Message::Frontier(frontier) => self.frontier.update_input(0, frontier)?,
            }
        }
        for message in self.b.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    self.output.writer().borrow_mut().send_data(version, data)?;
                }
                Message::Frontier(frontier) => self.frontier.update_input(1, frontier)?,
            }
        }
        if did_work {
            let candidate = self.frontier.meet_inputs()?;
            if self.frontier.advance_output(candidate.clone())? {
                self.output.writer().borrow_mut().send_frontier(candidate)?;
            }
        }
        Ok(did_work)
    }
}

/// Passes through data from either `a` or `b` unchanged, each retaining its own
/// version. The output frontier is the meet of both input frontiers.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::concat;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_a_in, a) = graph.new_input::<i32>().unwrap();
/// let (_b_in, b) = graph.new_input::<i32>().unwrap();
/// let both = concat(&a, &b).unwrap();
/// graph.finalize().unwrap();
/// let _ = both;
/// ```
pub fn concat<T: Clone + 'static>(a: &Stream<T>, b: &Stream<T>) -> Result<Stream<T>> {
    a.check_not_finalized()?;
    a.require_same_graph(b)?;
    let a_reader = a.new_reader();
    let b_reader = b.new_reader();
    let output = a.new_output::<T>();
    let frontier = FrontierState::new(2, a.initial_frontier());
    let id = a.graph().next_operator_id();
    let op = ConcatOperator { id, a: a_reader, b: b_reader, output: output.clone(), frontier };
    output.register(Box::new(op));
    Ok(output)
}
