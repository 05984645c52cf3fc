//! Keep only the records satisfying a predicate.

use crate::error::Result;
use crate::graph::Stream;
use crate::message::Message;
use crate::operator::{FrontierState, Operator};
use crate::stream::StreamReader;

struct FilterOperator<T, P> {
    id: usize,
    input: StreamReader<T>,
    output: Stream<T>,
    frontier: FrontierState,
    p: P,
}

impl<T, P> Operator for FilterOperator<T, P>
where
    T: Clone + 'static,
    P: FnMut(&T) -> bool,
{
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "filter"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        for message in self.input.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    let filtered = data.filter(|t| (self.p)(t));
                    self.output.writer().borrow_mut().send_data(version, filtered)?;
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

/// Keeps only the records of `input` for which `p` returns `true`.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::filter;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_input, stream) = graph.new_input::<i32>().unwrap();
/// let evens = filter(&stream, |x| x % 2 == 0).unwrap();
/// graph.finalize().unwrap();
/// let _ = evens;
/// ```
pub fn filter<T, P>(input: &Stream<T>, mut p: P) -> Result<Stream<T>>
where
    T: Clone + 'static,
    P: FnMut(&T) -> bool + 'static,
{
    input.check_not_finalized()?;
    let reader = input.new_reader();
    let output = input.new_output::<T>();
    let frontier = FrontierState::new(1, input.initial_frontier());
    let id = input.graph().next_operator_id();
    let op = FilterOperator {
        id,
        input: reader,
        output: output.clone(),
        frontier,
        p: move |t: &T| p(t),
    };
    output.register(Box::new(op));
    Ok(output)
}
