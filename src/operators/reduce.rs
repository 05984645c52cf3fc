//! Stateful unary reduction, keyed by the first element of each record.
//!
//! Mirrors the bookkeeping [`crate::operators::join`] uses, but against a single
//! input index and an `index_out` tracking what was previously emitted per key per
//! version, so that only the delta between old and new aggregate is ever sent
//! downstream.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::graph::Stream;
use crate::index::Index;
use crate::message::Message;
use crate::multiset::MultiSet;
use crate::operator::{FrontierState, Operator};
use crate::stream::StreamReader;
use crate::version::Version;

struct ReduceOperator<K, V, R, F> {
    id: usize,
    input: StreamReader<(K, V)>,
    output: Stream<(K, R)>,
    frontier: FrontierState,
    index: Index<K, V>,
    index_out: Index<K, R>,
    keys_todo: HashMap<Version, HashSet<K>>,
    compact_eagerly: bool,
    f: F,
}

impl<K, V, R, F> Operator for ReduceOperator<K, V, R, F>
where
    K: Eq + std::hash::Hash + Clone + Ord + 'static,
    V: Clone + Ord + 'static,
    R: Clone + Ord + 'static,
    F: FnMut(&[(V, isize)]) -> Result<Vec<(R, isize)>>,
{
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        "reduce"
    }

    fn step(&mut self) -> Result<bool> {
        let mut did_work = false;
        for message in self.input.drain() {
            did_work = true;
            match message {
                Message::Data(version, data) => {
                    for ((k, v), m) in data.into_entries() {
                        let pre_existing = self.index.versions(&k)?;
                        self.index.add_value(k.clone(), version.clone(), (v, m))?;
                        self.keys_todo.entry(version.clone()).or_default().insert(k.clone());
                        for v_prime in pre_existing {
                            let joined = version.join(&v_prime)?;
                            self.keys_todo.entry(joined).or_default().insert(k.clone());
                        }
                    }
                }
                Message::Frontier(frontier) => self.frontier.update_input(0, frontier)?,
            }
        }

        if !did_work {
            return Ok(false);
        }

        let mut sealed: Vec<Version> = Vec::new();
        for version in self.keys_todo.keys() {
            if !self.frontier.input(0).less_equal_version(version)? {
                sealed.push(version.clone());
            }
        }
        sealed.sort_by(|a, b| a.coords().cmp(b.coords()));

        for version in sealed {
            let keys = self.keys_todo.remove(&version).unwrap_or_default();
            let mut keys: Vec<K> = keys.into_iter().collect();
            keys.sort();

            let mut batch: MultiSet<(K, R)> = MultiSet::new();
            for k in keys {
                let input_snapshot = self.index.reconstruct_at(&k, &version)?;
                let new_out: MultiSet<R> = (self.f)(input_snapshot.entries())?.into_iter().collect();
                let new_out = new_out.consolidate();
                let old_out = self.index_out.reconstruct_at(&k, &version)?;

                if old_out != new_out {
                    for (r, m) in old_out.entries() {
                        batch.push((k.clone(), r.clone()), -*m);
                        self.index_out.add_value(k.clone(), version.clone(), (r.clone(), -*m))?;
                    }
                    for (r, m) in new_out.entries() {
                        batch.push((k.clone(), r.clone()), *m);
                        self.index_out.add_value(k.clone(), version.clone(), (r.clone(), *m))?;
                    }
                }
            }

            let batch = batch.consolidate();
            if !batch.is_empty() {
                self.output.writer().borrow_mut().send_data(version, batch)?;
            }
        }

        let candidate = self.frontier.meet_inputs()?;
        if self.frontier.advance_output(candidate.clone())? {
            self.output.writer().borrow_mut().send_frontier(candidate.clone())?;
            if self.compact_eagerly {
                self.index.compact(&candidate, None)?;
                self.index_out.compact(&candidate, None)?;
            }
        }

        Ok(true)
    }
}

/// Applies `f` to the consolidated `(value, multiplicity)` entries accumulated per
/// key at each sealed version, emitting `(key, result)` deltas as the aggregate
/// changes. Only keys touched since the last run are ever recomputed.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::reduce;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_input, stream) = graph.new_input::<(i32, i32)>().unwrap();
/// let summed = reduce(&stream, |entries| {
///     Ok(vec![(entries.iter().map(|(v, m)| v * (*m as i32)).sum(), 1)])
/// }).unwrap();
/// graph.finalize().unwrap();
/// let _ = summed;
/// ```
pub fn reduce<K, V, R, F>(input: &Stream<(K, V)>, f: F) -> Result<Stream<(K, R)>>
where
    K: Eq + std::hash::Hash + Clone + Ord + 'static,
    V: Clone + Ord + 'static,
    R: Clone + Ord + 'static,
    F: FnMut(&[(V, isize)]) -> Result<Vec<(R, isize)>> + 'static,
{
    input.check_not_finalized()?;
    let reader = input.new_reader();
    let output = input.new_output::<(K, R)>();
    let frontier = FrontierState::new(1, input.initial_frontier());
    let id = input.graph().next_operator_id();
    let compact_eagerly = input.compacts_eagerly();
    let op = ReduceOperator {
        id,
        input: reader,
        output: output.clone(),
        frontier,
        index: Index::new(),
        index_out: Index::new(),
        keys_todo: HashMap::new(),
        compact_eagerly,
        f,
    };
    output.register(Box::new(op));
    Ok(output)
}

/// Reduce with a built-in `f` that sums input multiplicities per key, emitting the
/// running count at multiplicity 1 (no record at all once the count returns to zero).
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::count;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_input, stream) = graph.new_input::<(&'static str, i32)>().unwrap();
/// let counted = count(&stream).unwrap();
/// graph.finalize().unwrap();
/// let _ = counted;
/// ```
pub fn count<K, V>(input: &Stream<(K, V)>) -> Result<Stream<(K, isize)>>
where
    K: Eq + std::hash::Hash + Clone + Ord + 'static,
    V: Clone + Ord + 'static,
{
    reduce(input, |entries| {
        let total: isize = entries.iter().map(|(_, m)| m).sum();
        Ok(if total == 0 { Vec::new() } else { vec![(total, 1)] })
    })
}

/// Reduce with a built-in `f` that keeps each distinct value at multiplicity 1. Fails
/// (propagating the error out of `Graph::step`/`Graph::run`) if, for a given key and
/// version, the consolidated input carries a negative multiplicity.
///
/// # Examples
///
/// ```
/// use incremental_dataflow::graph::Graph;
/// use incremental_dataflow::operators::distinct;
///
/// let graph = Graph::with_dimension(1).unwrap();
/// let (_input, stream) = graph.new_input::<(&'static str, i32)>().unwrap();
/// let deduped = distinct(&stream).unwrap();
/// graph.finalize().unwrap();
/// let _ = deduped;
/// ```
pub fn distinct<K, V>(input: &Stream<(K, V)>) -> Result<Stream<(K, V)>>
where
    K: Eq + std::hash::Hash + Clone + Ord + 'static,
    V: Clone + Ord + 'static,
{
    reduce(input, |entries| {
        for (_, m) in entries {
            if *m < 0 {
                return Err(crate::error::Error::InvalidVersion(
                    "distinct is undefined over negative multiplicities".into(),
                ));
            }
        }
        Ok(entries.iter().filter(|(_, m)| *m != 0).map(|(v, _)| (v.clone(), 1)).collect())
    })
}
