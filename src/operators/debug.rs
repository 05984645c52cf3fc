//! Log every message flowing through a stream, unchanged.

use crate::error::Result;
use crate::graph::Stream;
use crate::message::Message;
use crate::operator::{FrontierState, Operator};
use crate::stream::StreamReader;

struct DebugOperator<T> {
    id: usize,
    name: String,
    indent: usize,
    input: StreamReader<T>,
    output: Stream<T>,
    frontier: FrontierState,
}

impl<T: Clone + std::fmt::Debug + 'static> Operator for DebugOperator<T> {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "debug"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        let pad = " ".repeat(self.indent);
        for message in self.input.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    log::debug!("{pad}[{}] data @ {version:?}: {:?}", self.name, data.entries());
                    self.output.writer().borrow_mut().send_data(version, data)?;
                }
                Message::Frontier(frontier) => {
                    log::debug!("{pad}[{}] frontier: {frontier:?}", self.name);
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

/// Logs every message passing through `input` at `log::debug!` level, prefixed with
/// `name`, then passes it through unchanged. `indent` spaces are prepended to each
/// line, letting nested pipelines visually nest their traces.
pub fn debug<T: Clone + std::fmt::Debug + 'static>(
    input: &Stream<T>,
    name: &str,
    indent: usize,
) -> Result<Stream<T>> {
    input.check_not_finalized()?;
    let reader = input.new_reader();
    let output = input.new_output::<T>();
    let frontier = FrontierState::new(1, input.initial_frontier());
    let id = input.graph().next_operator_id();
    let op = DebugOperator {
        id,
        name: name.to_string(),
        indent,
        input: reader,
        output: output.clone(),
        frontier,
    };
    output.register(Box::new(op));
    Ok(output)
}
