use indexmap::{IndexMap, IndexSet};
use weave_core::graph::{build_edges, topo_sort};
use weave_core::WeaveError;

fn nodes(items: &[&str]) -> IndexSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn required(pairs: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(k, deps)| (k.to_string(), deps.iter().map(|d| d.to_string()).collect()))
        .collect()
}

#[test]
fn linear_chain_sorts_a_before_b_before_c() {
    let required = required(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
    let node_set = nodes(&["a", "b", "c"]);
    let edges = build_edges(&node_set, &required).unwrap();
    let order = topo_sort(&node_set, &edges).unwrap();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn diamond_keeps_base_first_and_top_last_either_middle_order() {
    let required = required(&[
        ("base", &[]),
        ("left", &["base"]),
        ("right", &["base"]),
        ("top", &["left", "right"]),
    ]);
    let node_set = nodes(&["base", "left", "right", "top"]);
    let edges = build_edges(&node_set, &required).unwrap();
    let order = topo_sort(&node_set, &edges).unwrap();
    assert_eq!(order[0], "base");
    assert_eq!(order[3], "top");
    let left_pos = order.iter().position(|k| k == "left").unwrap();
    let right_pos = order.iter().position(|k| k == "right").unwrap();
    assert!(left_pos < 3 && right_pos < 3);
}

#[test]
fn cycle_fails_naming_exactly_the_cyclic_kinds() {
    let required = required(&[("x", &["y"]), ("y", &["x"])]);
    let node_set = nodes(&["x", "y"]);
    let edges = build_edges(&node_set, &required).unwrap();
    let err = topo_sort(&node_set, &edges).unwrap_err();
    match err {
        WeaveError::Cycle { mut kinds } => {
            kinds.sort();
            assert_eq!(kinds, vec!["x", "y"]);
        }
        other => panic!("expected Cycle, got {other}"),
    }
}

#[test]
fn sort_is_deterministic_across_repeated_runs() {
    let required = required(&[("a", &[]), ("b", &[]), ("c", &[])]);
    let node_set = nodes(&["c", "a", "b"]);
    let edges = build_edges(&node_set, &required).unwrap();
    let first = topo_sort(&node_set, &edges).unwrap();
    let second = topo_sort(&node_set, &edges).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, vec!["c", "a", "b"]);
}
