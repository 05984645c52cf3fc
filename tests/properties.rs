//! Randomized property tests: drive a small pipeline through a sequence of
//! monotone-frontier, frontier-covered writes and check the universal invariants
//! from the testable-properties section hold after every step.

use std::cell::RefCell;
use std::rc::Rc;

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use incremental_dataflow::antichain::Antichain;
use incremental_dataflow::graph::Graph;
use incremental_dataflow::message::Message;
use incremental_dataflow::multiset::MultiSet;
use incremental_dataflow::operators::{consolidate, filter, map, output};
use incremental_dataflow::version::Version;

/// Generates a random batch of `(i32, multiplicity)` pairs, multiplicities in
/// `-5..=5` excluding zero (a zero-multiplicity entry carries no information and
/// every operator is entitled to drop it silently).
fn random_batch(rng: &mut StdRng, n: usize) -> MultiSet<i32> {
    (0..n)
        .map(|_| {
            let value: i32 = rng.gen_range(0..20);
            let mult: isize = loop {
                let m = rng.gen_range(-5..=5);
                if m != 0 {
                    break m;
                }
            };
            (value, mult)
        })
        .collect()
}

#[test]
fn map_conserves_signed_multiplicity_sum_across_random_batches() {
    let mut rng = StdRng::seed_from_u64(0xD1FF_5EED);

    for _ in 0..20 {
        let graph = Graph::with_dimension(1).unwrap();
        let (input, stream) = graph.new_input::<i32>().unwrap();
        let mapped = map(&stream, |x| x * 3 + 1).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        output(&mapped, move |message| {
            if let Message::Data(_, data) = message {
                seen_clone.borrow_mut().extend(data.entries().to_vec());
            }
        })
        .unwrap();
        graph.finalize().unwrap();

        let batch = random_batch(&mut rng, 10);
        let input_sum: isize = batch.entries().iter().map(|(_, m)| m).sum();

        input.send_data(Version::single(1), batch).unwrap();
        input.send_frontier(Antichain::from_elem(Version::single(2))).unwrap();
        graph.run().unwrap();

        let output_sum: isize = seen.borrow().iter().map(|(_, m)| m).sum();
        assert_eq!(input_sum, output_sum, "map must conserve the signed multiplicity sum");
    }
}

#[test]
fn frontier_sequence_is_monotone_and_output_never_leads_input() {
    let mut rng = StdRng::seed_from_u64(0x5EA1_D00D);
    let graph = Graph::with_dimension(1).unwrap();
    let (input, stream) = graph.new_input::<i32>().unwrap();
    let filtered = filter(&stream, |x| x % 2 == 0).unwrap();
    let consolidated = consolidate(&filtered).unwrap();

    let frontiers_seen = Rc::new(RefCell::new(Vec::new()));
    let frontiers_clone = frontiers_seen.clone();
    output(&consolidated, move |message| {
        if let Message::Frontier(f) = message {
            frontiers_clone.borrow_mut().push(f.clone());
        }
    })
    .unwrap();
    graph.finalize().unwrap();

    let mut current = 1u64;
    for _round in 0..15 {
        let batch = random_batch(&mut rng, 6);
        input.send_data(Version::single(current), batch).unwrap();
        current += 1 + rng.gen_range(0..3);
        input.send_frontier(Antichain::from_elem(Version::single(current))).unwrap();
        graph.run().unwrap();

        // Invariant 7: the operator's emitted frontier is always >= the meet of its
        // (here, singular) input frontier as last received.
        let input_frontier = input.frontier();
        if let Some(last) = frontiers_seen.borrow().last() {
            assert!(
                input_frontier.less_equal(last).unwrap(),
                "emitted frontier {last:?} must be >= input frontier {input_frontier:?}"
            );
        }
    }

    // Invariant 1: the sequence of frontier messages is non-decreasing.
    let frontiers = frontiers_seen.borrow();
    for (a, b) in frontiers.iter().tuple_windows() {
        assert!(a.less_equal(b).unwrap(), "frontier regressed from {a:?} to {b:?}");
    }
}

#[test]
fn consolidate_output_never_carries_zero_multiplicity() {
    let mut rng = StdRng::seed_from_u64(0xC0FF_EE42);
    let graph = Graph::with_dimension(1).unwrap();
    let (input, stream) = graph.new_input::<i32>().unwrap();
    let consolidated = consolidate(&stream).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    output(&consolidated, move |message| {
        if let Message::Data(_, data) = message {
            seen_clone.borrow_mut().extend(data.entries().to_vec());
        }
    })
    .unwrap();
    graph.finalize().unwrap();

    for _ in 0..5 {
        input.send_data(Version::single(1), random_batch(&mut rng, 8)).unwrap();
    }
    input.send_frontier(Antichain::from_elem(Version::single(2))).unwrap();
    graph.run().unwrap();

    assert!(seen.borrow().iter().all(|(_, m)| *m != 0));
    let values: Vec<i32> = seen.borrow().iter().map(|(v, _)| *v).collect();
    assert_eq!(values.iter().unique().count(), values.len(), "consolidate must merge duplicates");
}
