//! Flip the sign of every record's multiplicity.

use crate::error::Result;
use crate::graph::Stream;
use crate::message::Message;
use crate::operator::{FrontierState, Operator};
use crate::stream::StreamReader;

struct NegateOperator<T> {
    id: usize,
    input: StreamReader<T>,
    output: Stream<T>,
    frontier: FrontierState,
}

impl<T: Clone + 'static> Operator for NegateOperator<T> {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "negate"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        for message in self.input.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    self.output.writer().borrow_mut().send_data(version, data.negate())?;
                }
                Message::Frontier(frontier) => {
                    self.frontier.update_input(0, frontier)?;
                    let candidate = self.frontier.meet_inputs()?;
                    if self.frontier.advance_output(candidate.clone())? {
                        self.output.writer().borrow_mut().send_frontier(candidate)?;
                    }
                }
            }
        }
        Ok(did_work)
    }
}

/// Negates the multiplicity of every record in `input`.
///
/// Most commonly paired with [`crate::operators::concat`] to compute a set
/// difference: `concat(&a, &negate(&b)?)?` contains `a`'s records not cancelled by
/// `b`'s.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::negate;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_input, stream) = graph.new_input::<i32>().unwrap();
/// let negated = negate(&stream).unwrap();
/// graph.finalize().unwrap();
/// let _ = negated;
/// ```
pub fn negate<T: Clone + 'static>(input: &Stream<T>) -> Result<Stream<T>> {
    input.check_not_finalized()?;
    let reader = input.new_reader();
    let output = input.new_output::<T>();
    let frontier = FrontierState::new(1, input.initial_frontier());
    let id = input.graph().next_operator_id();
    let op = NegateOperator { id, input: reader, output: output.clone(), frontier };
    output.register(Box::new(op));
    Ok(output)
}
