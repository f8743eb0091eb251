//! Quantified invariants from spec.md §3/§8, exercised over randomised
//! sequences of graph operations through the public `SessionManager` API.

use std::collections::{HashMap, HashSet};

use pretty_assertions::{assert_eq, assert_ne};
use proptest::prelude::*;

use tmux_core::manager::target::Direction;
use tmux_core::manager::SessionManager;
use tmux_core::model::layout::SplitDirection;

#[derive(Debug, Clone, Copy)]
enum Op {
    Split { parent_slot: usize, horizontal: bool },
    Kill { slot: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..8, any::<bool>()).prop_map(|(parent_slot, horizontal)| Op::Split { parent_slot, horizontal }),
        (0usize..8).prop_map(|slot| Op::Kill { slot }),
    ]
}

/// Runs `ops` against a fresh single-pane session, skipping any op whose
/// slot index doesn't land on a currently-live pane, and checks every
/// structural invariant after each surviving mutation.
fn run_and_check(ops: Vec<Op>) {
    let mgr = SessionManager::new();
    let (name, _sid, _wid, pane0) = mgr.create_session("s", "0", 80, 24).unwrap();
    let mut live: Vec<tmux_core::PaneId> = vec![pane0];
    let mut all_seen_ids: HashSet<tmux_core::PaneId> = HashSet::new();
    all_seen_ids.insert(pane0);

    for op in ops {
        if live.is_empty() {
            break;
        }
        match op {
            Op::Split { parent_slot, horizontal } => {
                let target = live[parent_slot % live.len()];
                let direction = if horizontal { SplitDirection::Horizontal } else { SplitDirection::Vertical };
                let before_gen = mgr.generation();
                let new_pane = mgr.split_pane(target, direction).unwrap();
                assert!(mgr.generation() > before_gen, "split must bump generation");
                assert!(all_seen_ids.insert(new_pane), "pane id {new_pane:?} was reused");
                live.push(new_pane);
            }
            Op::Kill { slot } => {
                let target = live[slot % live.len()];
                let before_gen = mgr.generation();
                let outcome = mgr.kill_pane(target).unwrap();
                assert!(mgr.generation() > before_gen, "kill must bump generation");
                live.retain(|p| *p != target);
                if outcome.session_destroyed {
                    assert!(live.is_empty());
                    assert!(!mgr.has_session(&name));
                    break;
                }
            }
        }
        check_invariants(&mgr, &name, &live);
    }
}

fn check_invariants(mgr: &SessionManager, session_name: &str, live: &[tmux_core::PaneId]) {
    let session = mgr.get_session(session_name).expect("session must still exist while panes remain live");
    assert_eq!(session.windows.len(), 1, "1-window model: exactly one window per session");
    let window = &session.windows[0];

    // Invariant 3: pane map <-> window pane slice agree, and indices are dense.
    let mut window_ids: Vec<_> = window.panes.iter().map(|p| p.id).collect();
    let mut expected: Vec<_> = live.to_vec();
    window_ids.sort();
    expected.sort();
    assert_eq!(window_ids, expected, "window pane slice must match the live pane set");
    for (i, pane) in window.panes.iter().enumerate() {
        assert_eq!(pane.index, i, "pane.index must equal its slot");
    }

    // Exactly one active pane.
    let active_count = window.panes.iter().filter(|p| p.active).count();
    assert_eq!(active_count, 1, "exactly one pane must be active");
    assert!(window.panes[window.active_pane_index].active);

    // Invariant 5: layout leaf-ID set equals the window's pane-ID set.
    assert!(
        window.layout.leaf_set_matches(&window.pane_ids()),
        "layout leaves must match the pane set exactly"
    );
}

proptest! {
    #[test]
    fn graph_invariants_hold_after_any_op_sequence(ops in prop::collection::vec(op_strategy(), 0..40)) {
        run_and_check(ops);
    }
}

#[test]
fn resolve_directional_pane_clamps_without_wrap() {
    let mgr = SessionManager::new();
    let (_name, _sid, _wid, pane0) = mgr.create_session("s", "0", 80, 24).unwrap();
    let pane1 = mgr.split_pane(pane0, SplitDirection::Horizontal).unwrap();
    let pane2 = mgr.split_pane(pane1, SplitDirection::Horizontal).unwrap();

    // window order is [pane0, pane1, pane2] (each split inserted after its source)
    let first = mgr.resolve_directional_pane(pane0, Direction::Prev).unwrap();
    assert_eq!(first.id, pane0, "Prev at the first pane clamps, never wraps to the last");

    let last = mgr.resolve_directional_pane(pane2, Direction::Next).unwrap();
    assert_eq!(last.id, pane2, "Next at the last pane clamps, never wraps to the first");

    let mid_prev = mgr.resolve_directional_pane(pane1, Direction::Prev).unwrap();
    assert_eq!(mid_prev.id, pane0);
    let mid_next = mgr.resolve_directional_pane(pane1, Direction::Next).unwrap();
    assert_eq!(mid_next.id, pane2);
}

proptest! {
    #[test]
    fn ids_never_recur_across_many_creates(n in 1u64..60) {
        let mgr = SessionManager::new();
        let mut seen = HashSet::new();
        for i in 0..n {
            let (name, _sid, _wid, pane_id) = mgr.create_session(&format!("s{i}"), "0", 80, 24).unwrap();
            prop_assert!(seen.insert(pane_id));
            let _ = name;
        }
    }
}

#[test]
fn snapshot_is_independent_of_later_mutation() {
    let mgr = SessionManager::new();
    mgr.create_session("s", "0", 80, 24).unwrap();
    let before = mgr.snapshot();
    mgr.create_session("t", "0", 80, 24).unwrap();
    assert_eq!(before.len(), 1, "a previously taken snapshot must not observe later sessions");
    assert_eq!(mgr.snapshot().len(), 2);
}

#[test]
fn snapshot_cache_is_reused_until_generation_moves() {
    let mgr = SessionManager::new();
    mgr.create_session("s", "0", 80, 24).unwrap();
    let a = mgr.snapshot();
    let b = mgr.snapshot();
    assert_eq!(a, b, "repeated snapshot() calls at the same generation must agree");
    mgr.set_session_env("s", "K", "v").unwrap();
    let c = mgr.snapshot();
    assert_ne!(a, c, "a mutation must be visible in the next snapshot");
}

proptest! {
    #[test]
    fn env_entries_mutated_via_snapshot_never_leak_back(key in "[A-Z]{1,6}", value in "[a-z]{1,10}") {
        let mgr = SessionManager::new();
        mgr.create_session("s", "0", 80, 24).unwrap();
        mgr.set_session_env("s", &key, &value).unwrap();
        let mut snap = mgr.get_session("s").unwrap();
        snap.env.insert(key.clone(), "mutated-locally".to_string());
        let fresh = mgr.get_session("s").unwrap();
        prop_assert_eq!(fresh.env.get(&key), Some(&value));
    }
}

proptest! {
    #[test]
    fn blocked_keys_are_dropped_regardless_of_case(value in "[a-zA-Z0-9]{1,12}") {
        use tmux_core::router::env::{blocked_keys, filter_blocked};

        for key in blocked_keys() {
            let mut env: HashMap<String, String> = HashMap::new();
            env.insert(key.to_ascii_lowercase(), value.clone());
            env.insert("SAFE_VAR".to_string(), value.clone());
            filter_blocked(&mut env);
            prop_assert!(!env.contains_key(&key.to_ascii_lowercase()));
            prop_assert_eq!(env.get("SAFE_VAR"), Some(&value));
        }
    }
}
