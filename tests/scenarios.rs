//! Black-box end-to-end scenarios, driven entirely through the public `Graph` and
//! `operators` API — one test per scenario in the testable-properties section.

use std::cell::RefCell;
use std::rc::Rc;

use incremental_dataflow::antichain::Antichain;
use incremental_dataflow::graph::Graph;
use incremental_dataflow::index::JoinKind;
use incremental_dataflow::message::Message;
use incremental_dataflow::multiset::MultiSet;
use incremental_dataflow::operators::{
    concat, consolidate, count, distinct, filter, iterate, join, map, output,
};
use incremental_dataflow::version::Version;

fn capture<T: Clone + 'static>(
    stream: &incremental_dataflow::graph::Stream<T>,
) -> Rc<RefCell<Vec<(Version, Vec<(T, isize)>)>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    output(stream, move |message| {
        if let Message::Data(version, data) = message {
            seen_clone.borrow_mut().push((version.clone(), data.entries().to_vec()));
        }
    })
    .unwrap();
    seen
}

#[test]
fn s1_map_then_filter() {
    let graph = Graph::with_dimension(1).unwrap();
    let (input, stream) = graph.new_input::<i32>().unwrap();
    let mapped = map(&stream, |x| x + 5).unwrap();
    let filtered = filter(&mapped, |x| x % 2 == 0).unwrap();
    let seen = capture(&filtered);
    graph.finalize().unwrap();

    input
        .send_data(Version::single(1), vec![(1, 1), (2, 1), (3, 1)].into_iter().collect())
        .unwrap();
    input.send_frontier(Antichain::from_elem(Version::single(2))).unwrap();
    graph.run().unwrap();

    let seen = seen.borrow();
    let at_one: Vec<(i32, isize)> =
        seen.iter().filter(|(v, _)| *v == Version::single(1)).flat_map(|(_, e)| e.clone()).collect();
    let mut at_one = at_one;
    at_one.sort();
    assert_eq!(at_one, vec![(6, 1), (8, 1)]);
}

#[test]
fn s2_join_matches_shared_keys() {
    let graph = Graph::with_dimension(1).unwrap();
    let (a_in, a) = graph.new_input::<(i32, char)>().unwrap();
    let (b_in, b) = graph.new_input::<(i32, char)>().unwrap();
    let joined = join(&a, &b, JoinKind::Inner).unwrap();
    let seen = capture(&joined);
    graph.finalize().unwrap();

    a_in.send_data(Version::single(1), vec![((1, 'a'), 1), ((2, 'b'), 1)].into_iter().collect()).unwrap();
    b_in.send_data(
        Version::single(1),
        vec![((1, 'x'), 1), ((2, 'y'), 1), ((3, 'z'), 1)].into_iter().collect(),
    )
    .unwrap();
    a_in.send_frontier(Antichain::from_elem(Version::single(2))).unwrap();
    b_in.send_frontier(Antichain::from_elem(Version::single(2))).unwrap();
    graph.run().unwrap();

    let mut matched: Vec<_> = seen
        .borrow()
        .iter()
        .flat_map(|(_, e)| e.clone())
        .map(|((k, v), m)| (k, v, m))
        .collect();
    matched.sort();
    use incremental_dataflow::index::JoinValue;
    assert_eq!(
        matched,
        vec![(1, JoinValue::Matched('a', 'x'), 1), (2, JoinValue::Matched('b', 'y'), 1)]
    );
}

#[test]
fn s3_count_retracts_previous_total_on_change() {
    let graph = Graph::with_dimension(1).unwrap();
    let (input, stream) = graph.new_input::<(&'static str, char)>().unwrap();
    let counted = count(&stream).unwrap();
    let seen = capture(&counted);
    graph.finalize().unwrap();

    input.send_data(Version::single(1), vec![(("k1", 'a'), 1), (("k1", 'b'), 1)].into_iter().collect()).unwrap();
    input.send_frontier(Antichain::from_elem(Version::single(2))).unwrap();
    graph.run().unwrap();

    input.send_data(Version::single(2), vec![(("k1", 'c'), 1), (("k2", 'a'), 1)].into_iter().collect()).unwrap();
    input.send_frontier(Antichain::from_elem(Version::single(3))).unwrap();
    graph.run().unwrap();

    let seen = seen.borrow();
    let at_one: Vec<_> = seen.iter().filter(|(v, _)| *v == Version::single(1)).flat_map(|(_, e)| e.clone()).collect();
    assert_eq!(at_one, vec![(("k1", 2), 1)]);

    let mut at_two: Vec<_> =
        seen.iter().filter(|(v, _)| *v == Version::single(2)).flat_map(|(_, e)| e.clone()).collect();
    at_two.sort();
    let mut expected = vec![(("k1", 3), 1), (("k1", 2), -1), (("k2", 1), 1)];
    expected.sort();
    assert_eq!(at_two, expected);
}

#[test]
fn s4_distinct_retracts_under_deletion() {
    let graph = Graph::with_dimension(1).unwrap();
    let (input, stream) = graph.new_input::<(&'static str, i32)>().unwrap();
    let deduped = distinct(&stream).unwrap();
    let seen = capture(&deduped);
    graph.finalize().unwrap();

    input
        .send_data(Version::single(1), vec![(("k", 1), 1), (("k", 1), 1), (("k", 2), 1)].into_iter().collect())
        .unwrap();
    input.send_frontier(Antichain::from_elem(Version::single(2))).unwrap();
    graph.run().unwrap();

    input.send_data(Version::single(2), vec![(("k", 1), -2)].into_iter().collect()).unwrap();
    input.send_frontier(Antichain::from_elem(Version::single(3))).unwrap();
    graph.run().unwrap();

    let seen = seen.borrow();
    let mut at_one: Vec<_> =
        seen.iter().filter(|(v, _)| *v == Version::single(1)).flat_map(|(_, e)| e.clone()).collect();
    at_one.sort();
    assert_eq!(at_one, vec![(("k", 1), 1), (("k", 2), 1)]);

    let at_two: Vec<_> = seen.iter().filter(|(v, _)| *v == Version::single(2)).flat_map(|(_, e)| e.clone()).collect();
    assert_eq!(at_two, vec![(("k", 1), -1)]);
}

#[test]
fn s5_consolidate_merges_batches_at_the_same_version() {
    let graph = Graph::with_dimension(1).unwrap();
    let (input, stream) = graph.new_input::<i32>().unwrap();
    let consolidated = consolidate(&stream).unwrap();
    let seen = capture(&consolidated);
    graph.finalize().unwrap();

    input.send_data(Version::single(1), vec![(1, 1), (2, 1)].into_iter().collect()).unwrap();
    input.send_data(Version::single(1), vec![(3, 1), (4, 1)].into_iter().collect()).unwrap();
    input.send_data(Version::single(1), vec![(3, 2), (2, -1)].into_iter().collect()).unwrap();
    input.send_frontier(Antichain::from_elem(Version::single(2))).unwrap();
    graph.run().unwrap();

    let seen = seen.borrow();
    let mut merged: Vec<_> = seen.iter().flat_map(|(_, e)| e.clone()).collect();
    merged.sort();
    assert_eq!(merged, vec![(1, 1), (3, 3), (4, 1)]);
}

#[test]
fn s6_iterate_reaches_the_doubling_fixpoint() {
    let graph = Graph::with_dimension(1).unwrap();
    let (input, stream) = graph.new_input::<(i32, i32)>().unwrap();
    let result = iterate(&stream, |looped| {
        let doubled = map(looped, |&(_, v)| {
            let d = v * 2;
            (d, d)
        })?;
        let combined = concat(looped, &doubled)?;
        let filtered = filter(&combined, |&(_, v)| v <= 50)?;
        distinct(&filtered)
    })
    .unwrap();
    let seen = capture(&result);
    graph.finalize().unwrap();

    input.send_data(Version::single(0), vec![((1, 1), 1)].into_iter().collect::<MultiSet<(i32, i32)>>()).unwrap();
    input.send_frontier(Antichain::from_elem(Version::single(1))).unwrap();
    graph.run().unwrap();

    let mut totals: std::collections::HashMap<i32, isize> = std::collections::HashMap::new();
    for (_, entries) in seen.borrow().iter() {
        for ((k, _), m) in entries {
            *totals.entry(*k).or_insert(0) += m;
        }
    }
    let net: std::collections::HashSet<i32> =
        totals.into_iter().filter(|(_, m)| *m > 0).map(|(k, _)| k).collect();
    assert_eq!(net, [1, 2, 4, 8, 16, 32].into_iter().collect());
}
