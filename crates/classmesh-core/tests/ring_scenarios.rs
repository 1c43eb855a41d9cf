#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeSet;

use serde_json::json;

mod harness;
use harness::{pair, sorted, Fixture};

#[test]
fn three_joins_form_one_cycle() {
    let fx = Fixture::new(&["A", "B", "C"]);
    let mut net = fx.network("n1", "ring", json!({})).unwrap();

    for u in ["A", "B", "C"] {
        net.on_user_join(u).unwrap();
    }

    assert_eq!(fx.created_count(), 3);
    let pairs: BTreeSet<_> = fx.created_pairs().into_iter().collect();
    assert_eq!(pairs.len(), 3, "no duplicate unordered pairs");
    assert_eq!(pairs, [pair("A", "B"), pair("B", "C"), pair("A", "C")].into_iter().collect());
    assert_eq!(sorted(net.linked_pairs()), vec![pair("A", "B"), pair("A", "C"), pair("B", "C")]);
}

#[test]
fn leaving_a_triangle_keeps_a_two_node_ring() {
    let fx = Fixture::new(&["A", "B", "C"]);
    let mut net = fx.network("n1", "ring", json!({})).unwrap();
    for u in ["A", "B", "C"] {
        net.on_user_join(u).unwrap();
    }

    net.on_user_leave("B").unwrap();

    let destroyed = fx.destroyed_pairs();
    assert_eq!(destroyed, [pair("A", "B"), pair("B", "C")].into_iter().collect());
    // The closing edge A-C already exists, so no new link is needed.
    assert_eq!(fx.created_count(), 3);
    assert_eq!(net.linked_pairs(), vec![pair("A", "C")]);
    assert_eq!(net.members(), vec!["A", "C"]);
}

#[test]
fn leaving_a_square_bridges_the_gap() {
    let fx = Fixture::new(&["A", "B", "C", "D"]);
    let mut net = fx.network("n1", "ring", json!({})).unwrap();
    for u in ["A", "B", "C", "D"] {
        net.on_user_join(u).unwrap();
    }
    assert_eq!(
        sorted(net.linked_pairs()),
        vec![pair("A", "B"), pair("A", "D"), pair("B", "C"), pair("C", "D")]
    );

    net.on_user_leave("B").unwrap();
    assert_eq!(sorted(net.linked_pairs()), vec![pair("A", "C"), pair("A", "D"), pair("C", "D")]);
}

#[test]
fn offline_member_gets_dead_links_and_no_notices() {
    let fx = Fixture::new(&["A", "B"]);
    let mut net = fx.network("n1", "ring", json!({})).unwrap();
    net.on_user_join("A").unwrap();
    net.on_user_join("ghost").unwrap();
    net.on_user_join("B").unwrap();

    // Only A-B is wired; links to the offline member are dead.
    assert_eq!(net.linked_pairs(), vec![pair("A", "B")]);
    assert_eq!(fx.created_count(), 1);

    net.on_user_leave("ghost").unwrap();
    assert!(fx.destroyed_pairs().is_empty());
    assert!(!net.has_user("ghost"));
}

#[test]
fn leave_is_idempotent() {
    let fx = Fixture::new(&["A", "B", "C"]);
    let mut net = fx.network("n1", "ring", json!({})).unwrap();
    for u in ["A", "B", "C"] {
        net.on_user_join(u).unwrap();
    }
    net.on_user_leave("C").unwrap();
    let after_first = net.get_state().unwrap();
    net.on_user_leave("C").unwrap();
    assert_eq!(net.get_state().unwrap(), after_first);
    assert_eq!(net.linked_pairs(), vec![pair("A", "B")]);
}
