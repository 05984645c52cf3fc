//! The stream edge: a single-writer, multi-reader message queue.
//!
//! Each reader sees its own FIFO queue; the writer fans out a clone of every message
//! to every reader's queue. The writer tracks the last frontier it sent and refuses
//! to violate the two monotonicity rules in §3.5: data must be covered by the current
//! frontier, and a new frontier must dominate the previous one.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::antichain::Antichain;
use crate::error::{warn_err, Error, Result};
use crate::message::Message;
use crate::multiset::MultiSet;
use crate::version::Version;

type Queue<T> = Rc<RefCell<VecDeque<Message<T>>>>;

/// The write end of a stream edge. Owned by the operator (or input handle) that
/// produces this stream's data.
#[derive(Clone)]
pub struct StreamWriter<T> {
    graph_id: u64,
    readers: Vec<Queue<T>>,
    last_sent_frontier: Antichain,
}

impl<T: Clone> StreamWriter<T> {
    /// A writer with no readers yet, starting at `initial_frontier`.
    pub fn new(graph_id: u64, initial_frontier: Antichain) -> Self {
        StreamWriter {
            graph_id,
            readers: Vec::new(),
            last_sent_frontier: initial_frontier,
        }
    }

    /// The graph this edge belongs to; used to reject cross-graph composition.
    pub fn graph_id(&self) -> u64 {
        self.graph_id
    }

    /// The last frontier this writer has sent (or its initial frontier, if none yet).
    pub fn frontier(&self) -> &Antichain {
        &self.last_sent_frontier
    }

    /// Registers a new reader and returns its handle. Readers registered after data
    /// has already been sent will not see it; in practice all readers are registered
    /// during graph construction, before `finalize`.
    pub fn new_reader(&mut self) -> StreamReader<T> {
        let queue: Queue<T> = Rc::new(RefCell::new(VecDeque::new()));
        self.readers.push(queue.clone());
        StreamReader { queue }
    }

    /// Sends a data batch at `version`. Fails if `version` is not covered by the
    /// writer's last-sent frontier.
    pub fn send_data(&mut self, version: Version, data: MultiSet<T>) -> Result<()> {
        if !self.last_sent_frontier.less_equal_version(&version)? {
            return Err(warn_err!(Error::InvalidVersionForWrite {
                version: format!("{version:?}"),
                frontier: format!("{:?}", self.last_sent_frontier),
            }));
        }
        let message = Message::Data(version, data);
        for reader in &self.readers {
            reader.borrow_mut().push_back(message.clone());
        }
        Ok(())
    }

    /// Sends a frontier update. Fails if `frontier` is not `>=` the previously sent
    /// frontier.
    pub fn send_frontier(&mut self, frontier: Antichain) -> Result<()> {
        if !self.last_sent_frontier.less_equal(&frontier)? {
            return Err(warn_err!(Error::InvalidFrontierUpdate {
                update: format!("{frontier:?}"),
                current: format!("{:?}", self.last_sent_frontier),
            }));
        }
        let message = Message::Frontier(frontier.clone());
        for reader in &self.readers {
            reader.borrow_mut().push_back(message.clone());
        }
        self.last_sent_frontier = frontier;
        Ok(())
    }
}

/// The read end of a stream edge: one reader's private FIFO queue.
#[derive(Clone)]
pub struct StreamReader<T> {
    queue: Queue<T>,
}

impl<T> StreamReader<T> {
    /// Pops the next message, if any.
    pub fn recv(&mut self) -> Option<Message<T>> {
        self.queue.borrow_mut().pop_front()
    }

    /// `true` if there is at least one message waiting.
    pub fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    /// Drains every currently-queued message in FIFO order.
    pub fn drain(&mut self) -> Vec<Message<T>> {
        self.queue.borrow_mut().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_covered_by_frontier_is_accepted() {
        let mut writer: StreamWriter<i32> = StreamWriter::new(0, Antichain::from_elem(Version::single(0)));
        let mut reader = writer.new_reader();
        let ms: MultiSet<i32> = vec![(1, 1)].into_iter().collect();
        writer.send_data(Version::single(0), ms).unwrap();
        assert!(matches!(reader.recv(), Some(Message::Data(_, _))));
    }

    #[test]
    fn data_not_covered_is_rejected() {
        let mut writer: StreamWriter<i32> = StreamWriter::new(0, Antichain::from_elem(Version::single(5)));
        let ms: MultiSet<i32> = MultiSet::new();
        assert!(writer.send_data(Version::single(1), ms).is_err());
    }

    #[test]
    fn frontier_must_advance() {
        let mut writer: StreamWriter<i32> = StreamWriter::new(0, Antichain::from_elem(Version::single(5)));
        assert!(writer.send_frontier(Antichain::from_elem(Version::single(3))).is_err());
        assert!(writer.send_frontier(Antichain::from_elem(Version::single(6))).is_ok());
    }

    #[test]
    fn each_reader_has_independent_queue() {
        let mut writer: StreamWriter<i32> = StreamWriter::new(0, Antichain::from_elem(Version::single(0)));
        let mut r1 = writer.new_reader();
        let mut r2 = writer.new_reader();
        let ms: MultiSet<i32> = vec![(1, 1)].into_iter().collect();
        writer.send_data(Version::single(0), ms).unwrap();
        assert!(r1.recv().is_some());
        assert!(r2.recv().is_some());
        assert!(r1.recv().is_none());
    }
}
