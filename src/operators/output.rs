//! The one exfiltration point: hand every message to a caller-supplied closure.

use crate::error::Result;
use crate::graph::Stream;
use crate::message::Message;
use crate::operator::{FrontierState, Operator};
use crate::stream::StreamReader;

struct OutputOperator<T, F> {
    id: usize,
    input: StreamReader<T>,
    output: Stream<T>,
    frontier: FrontierState,
    f: F,
}

impl<T, F> Operator for OutputOperator<T, F>
where
    T: Clone + 'static,
    F: FnMut(&Message<T>),
{
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "output"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        for message in self.input.drain() {
            did_work = true;
            (self.f)(&message);
            match message {
                Message::Data(version, data) => {
                    self.output.writer().borrow_mut().send_data(version, data)?;
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

/// Calls `f` synchronously with every message flowing through `input` — the only
/// exfiltration mechanism an application has for observing engine output — then
/// passes the message through unchanged.
///
/// `f` runs on the graph's own thread during `Graph::step`; it must not attempt to
/// mutate the graph it is observing (§5 "Suspension points").
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::message::Message;
/// use incremental_dataflow::operators::output;
/// use incremental_dataflow::version::Version;
/// use incremental_dataflow::antichain::Antichain;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (input, stream) = graph.new_input::<i32>().unwrap();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let seen_clone = seen.clone();
/// let _observed = output(&stream, move |message| {
///     if let Message::Data(_, data) = message {
///         seen_clone.borrow_mut().extend(data.entries().to_vec());
///     }
/// }).unwrap();
/// graph.finalize().unwrap();
///
/// input.send_data(Version::single(0), vec![(1, 1)].into_iter().collect()).unwrap();
/// input.send_frontier(Antichain::from_elem(Version::single(1))).unwrap();
/// graph.run().unwrap();
/// assert_eq!(seen.borrow().as_slice(), &[(1, 1)]);
/// ```
pub fn output<T, F>(input: &Stream<T>, f: F) -> Result<Stream<T>>
where
    T: Clone + 'static,
    F: FnMut(&Message<T>) + 'static,
{
    input.check_not_finalized()?;
    let reader = input.new_reader();
    let output = input.new_output::<T>();
    let frontier = FrontierState::new(1, input.initial_frontier());
    let id = input.graph().next_operator_id();
    let op = OutputOperator { id, input: reader, output: output.clone(), frontier, f };
    output.register(Box::new(op));
    Ok(output)
}
