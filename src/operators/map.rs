//! Apply a function to every record of a collection.

use crate::error::Result;
use crate::graph::Stream;
use crate::message::Message;
use crate::operator::{FrontierState, Operator};
use crate::stream::StreamReader;

struct MapOperator<T, U, F> {
    id: usize,
    input: StreamReader<T>,
    output: Stream<U>,
    frontier: FrontierState,
    f: F,
}

impl<T, U, F> Operator for MapOperator<T, U, F>
where
    T: Clone + 'static,
    U: Clone + 'static,
    F: FnMut(&T) -> U,
{
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "map"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        for message in self.input.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    let mapped = data.map(|t| (self.f)(t));
                    self.output.writer().borrow_mut().send_data(version, mapped)?;
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

/// Applies `f` to every record in `input`, preserving each record's version and
/// multiplicity.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::map;
/// use incremental_dataflow::version::Version;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (input, stream) = graph.new_input::<i32>().unwrap();
/// let mapped = map(&stream, |x| x + 1).unwrap();
/// graph.finalize().unwrap();
///
/// input.send_data(Version::single(0), vec![(1, 1)].into_iter().collect()).unwrap();
/// input.send_frontier(incremental_dataflow::antichain::Antichain::from_elem(Version::single(1))).unwrap();
/// graph.run().unwrap();
/// let _ = mapped;
/// ```
pub fn map<T, U, F>(input: &Stream<T>, mut f: F) -> Result<Stream<U>>
where
    T: Clone + 'static,
    U: Clone + 'static,
    F: FnMut(&T) -> U + 'static,
{
    input.check_not_finalized()?;
    let reader = input.new_reader();
    let output = input.new_output::<U>();
    let frontier = FrontierState::new(1, input.initial_frontier());
    let id = input.graph().next_operator_id();
    let op = MapOperator {
        id,
        input: reader,
        output: output.clone(),
        frontier,
        f: move |t: &T| f(t),
    };
    output.register(Box::new(op));
    Ok(output)
}
