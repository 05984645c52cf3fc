//! The dataflow container: operator/stream ownership, finalize, step, run.
//!
//! A [`Graph`] owns every operator and stream edge created against it. Construction
//! proceeds by creating [`InputHandle`]s and chaining operator methods on the
//! [`Stream`]s they produce; [`Graph::finalize`] freezes the topology, after which
//! [`Graph::step`] and [`Graph::run`] drive it to quiescence.
//!
//! Operators are pushed onto the graph's operator list in the order they are
//! constructed. Because an operator can only read from streams that already exist,
//! registration order is automatically a valid topological order — `step` can simply
//! run every operator once, in registration order, each pass.

use std::cell::RefCell;
use std::rc::Rc;

use crate::antichain::Antichain;
use crate::error::{Error, Result};
use crate::multiset::MultiSet;
use crate::operator::Operator;
use crate::stream::StreamWriter;
use crate::version::Version;

static NEXT_GRAPH_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Configuration for a new [`Graph`].
pub struct GraphConfig {
    /// The fixed [`Version`] dimension used throughout this graph's scope.
    pub dimension: usize,
    /// The frontier every input and operator starts at.
    pub initial_frontier: Antichain,
    /// Whether stateful operators compact their indices each time their output
    /// frontier advances (§9 "Compaction aggressiveness"). Defaults to `true`;
    /// disabling it trades unbounded index growth for fewer compaction passes.
    pub compact_on_advance: bool,
}

impl GraphConfig {
    /// The common case: a single-dimensional graph starting at version 0.
    pub fn with_dimension(dimension: usize) -> Result<GraphConfig> {
        let minimum = Version::minimum(dimension)?;
        Ok(GraphConfig {
            dimension,
            initial_frontier: Antichain::from_elem(minimum),
            compact_on_advance: true,
        })
    }
}

pub(crate) struct GraphInner {
    id: u64,
    operators: Vec<Box<dyn Operator>>,
    finalized: bool,
    next_operator_id: usize,
    initial_frontier: Antichain,
    compact_on_advance: bool,
}

/// The dataflow container. Cheaply cloneable; clones share the same underlying graph.
#[derive(Clone)]
pub struct Graph(pub(crate) Rc<RefCell<GraphInner>>);

impl Graph {
    /// Builds a new, empty graph.
    pub fn new(config: GraphConfig) -> Graph {
        let id = NEXT_GRAPH_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        log::debug!("graph {id} created, dimension {}", config.dimension);
        Graph(Rc::new(RefCell::new(GraphInner {
            id,
            operators: Vec::new(),
            finalized: false,
            next_operator_id: 0,
            initial_frontier: config.initial_frontier,
            compact_on_advance: config.compact_on_advance,
        })))
    }

    /// Convenience over [`GraphConfig::with_dimension`] + [`Graph::new`].
    pub fn with_dimension(dimension: usize) -> Result<Graph> {
        Ok(Graph::new(GraphConfig::with_dimension(dimension)?))
    }

    /// Creates a new typed input. Returns a handle for submitting data/frontier
    /// updates, and the [`Stream`] to build the rest of the dataflow from.
    pub fn new_input<T: Clone + 'static>(&self) -> Result<(InputHandle<T>, Stream<T>)> {
        if self.0.borrow().finalized {
            return Err(Error::GraphAlreadyFinalized);
        }
        let initial = self.0.borrow().initial_frontier.clone();
        let graph_id = self.0.borrow().id;
        let writer = Rc::new(RefCell::new(StreamWriter::new(graph_id, initial)));
        let handle = InputHandle { writer: writer.clone() };
        let stream = Stream { graph: self.0.clone(), writer };
        Ok((handle, stream))
    }

    /// Freezes the topology. No further operators may be constructed afterwards.
    pub fn finalize(&self) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        if inner.finalized {
            return Err(Error::GraphAlreadyFinalized);
        }
        inner.finalized = true;
        log::debug!("graph {} finalized with {} operators", inner.id, inner.operators.len());
        Ok(())
    }

    /// `true` once the given version/operator count means compaction should run,
    /// per the graph's `compact_on_advance` policy.
    pub fn compacts_eagerly(&self) -> bool {
        self.0.borrow().compact_on_advance
    }

    /// Runs every operator once, in registration order. Returns `true` if any
    /// operator did work, so callers (and [`Graph::run`]) can detect quiescence.
    pub fn step(&self) -> Result<bool> {
        if !self.0.borrow().finalized {
            return Err(Error::GraphNotFinalized);
        }
        let mut any = false;
        let mut inner = self.0.borrow_mut();
        for operator in inner.operators.iter_mut() {
            if operator.step()? {
                any = true;
            }
        }
        Ok(any)
    }

    /// Calls [`Graph::step`] until a full pass does no work.
    pub fn run(&self) -> Result<()> {
        while self.step()? {}
        Ok(())
    }
}

impl GraphInner {
    fn next_id(&mut self) -> usize {
        let id = self.next_operator_id;
        self.next_operator_id += 1;
        id
    }
}

/// A handle to a graph input: feed it data batches and frontier updates.
pub struct InputHandle<T> {
    writer: Rc<RefCell<StreamWriter<T>>>,
}

impl<T: Clone> InputHandle<T> {
    /// Submits a change batch at `version`. Fails if `version` is not covered by the
    /// input's current frontier.
    pub fn send_data(&self, version: Version, data: MultiSet<T>) -> Result<()> {
        self.writer.borrow_mut().send_data(version, data)
    }

    /// Advances the input's frontier. Fails if `frontier` does not dominate the
    /// previous one.
    pub fn send_frontier(&self, frontier: Antichain) -> Result<()> {
        self.writer.borrow_mut().send_frontier(frontier)
    }

    /// The input's current frontier.
    pub fn frontier(&self) -> Antichain {
        self.writer.borrow().frontier().clone()
    }
}

/// A handle to one stream in the dataflow graph: the output of an input or operator.
/// Operator-building methods are defined as extension traits in [`crate::operators`].
pub struct Stream<T> {
    pub(crate) graph: Rc<RefCell<GraphInner>>,
    pub(crate) writer: Rc<RefCell<StreamWriter<T>>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Stream { graph: self.graph.clone(), writer: self.writer.clone() }
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// The graph this stream belongs to.
    pub fn graph(&self) -> Graph {
        Graph(self.graph.clone())
    }

    /// `true` if `self` and `other` belong to the same graph.
    pub fn same_graph<U>(&self, other: &Stream<U>) -> bool {
        Rc::ptr_eq(&self.graph, &other.graph)
    }

    /// Fails with [`Error::CrossGraphComposition`] unless `other` is in the same
    /// graph as `self`. Binary operators call this before wiring up their second
    /// input.
    pub fn require_same_graph<U>(&self, other: &Stream<U>) -> Result<()> {
        if self.same_graph(other) {
            Ok(())
        } else {
            Err(Error::CrossGraphComposition)
        }
    }

    /// Registers a new reader against this stream's writer.
    pub fn new_reader(&self) -> crate::stream::StreamReader<T> {
        self.writer.borrow_mut().new_reader()
    }

    /// The graph's initial frontier, used to seed a newly constructed operator.
    pub fn initial_frontier(&self) -> Antichain {
        self.graph.borrow().initial_frontier.clone()
    }

    /// Whether stateful operators built on this stream should compact eagerly.
    pub fn compacts_eagerly(&self) -> bool {
        self.graph.borrow().compact_on_advance
    }

    /// Fails if the graph has already been finalized.
    pub fn check_not_finalized(&self) -> Result<()> {
        if self.graph.borrow().finalized {
            Err(Error::GraphAlreadyFinalized)
        } else {
            Ok(())
        }
    }

    /// Allocates a fresh output stream (writer + handle) in this stream's graph.
    pub fn new_output<U: Clone + 'static>(&self) -> Stream<U> {
        let graph_id = self.graph.borrow().id;
        let writer = Rc::new(RefCell::new(StreamWriter::new(graph_id, self.initial_frontier())));
        Stream { graph: self.graph.clone(), writer }
    }

    /// Reserves the next operator id. Concrete operator constructors call this
    /// before building their state, so the id can be stored in the operator itself.
    pub fn next_operator_id(&self) -> usize {
        self.graph.borrow_mut().next_id()
    }

    /// Registers `operator` with the graph. The operator starts running on the very
    /// next `Graph::step`.
    pub fn register(&self, operator: Box<dyn Operator>) {
        let mut inner = self.graph.borrow_mut();
        log::trace!("operator {} ({}) registered", operator.id(), operator.name());
        inner.operators.push(operator);
    }

    /// The output writer backing this stream; used by the operator that owns it to
    /// emit data/frontier messages.
    pub(crate) fn writer(&self) -> Rc<RefCell<StreamWriter<T>>> {
        self.writer.clone()
    }

    /// The stream's current frontier.
    pub fn frontier(&self) -> Antichain {
        self.writer.borrow().frontier().clone()
    }
}
