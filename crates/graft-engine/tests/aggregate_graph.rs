//! Aggregate graph behaviour through the public API: validity cascade
//! over collections, the single-root invariant, moves, notifications
//! and the clean-state reset.

use std::sync::{Arc, Mutex};

use graft_core::{GraphError, PropertyId};
use graft_engine::{ChangeEvent, ChangeKind};
use graft_test_utils::{graph, OrderTypes};
use proptest::prelude::*;

#[test]
fn invalid_item_invalidates_root_and_recovers() {
    let types = OrderTypes::new();
    let mut g = graph();
    let (order, lines) = types.new_order(&mut g, "ACME");
    let line = types.new_line(&mut g, "A-1", 2);
    g.add(lines, line).unwrap();
    assert!(g.is_valid(order).unwrap());

    g.set(line, types.sku, String::new()).unwrap();
    assert!(!g.is_valid(line).unwrap());
    assert!(!g.is_valid(order).unwrap());
    assert!(!g.is_savable(order).unwrap());

    g.set(line, types.sku, "A-2".to_owned()).unwrap();
    assert!(g.is_valid(order).unwrap());
    assert!(g.is_savable(order).unwrap());
}

#[test]
fn range_error_clears_when_fixed() {
    let types = OrderTypes::new();
    let mut g = graph();
    let (order, _) = types.new_order(&mut g, "ACME");
    let line = types.new_line(&mut g, "A-1", 5000);
    assert!(!g.is_valid(line).unwrap());
    assert_eq!(g.error_messages(line).unwrap().len(), 1);
    g.set(line, types.quantity, 10).unwrap();
    assert!(g.messages(line).unwrap().is_empty());
    assert!(g.is_valid(order).unwrap());
}

#[test]
fn cross_aggregate_attach_leaves_graph_unchanged() {
    let types = OrderTypes::new();
    let mut g = graph();
    let (first, first_lines) = types.new_order(&mut g, "ACME");
    let (second, second_lines) = types.new_order(&mut g, "Globex");
    let line = types.new_line(&mut g, "A-1", 1);
    g.add(first_lines, line).unwrap();
    let before = (g.state(first).unwrap(), g.state(second).unwrap());

    let err = g.add(second_lines, line).unwrap_err();
    assert!(matches!(err, GraphError::CrossAggregate { .. }));
    let err = g.attach(line, second).unwrap_err();
    assert!(matches!(err, GraphError::CrossAggregate { .. }));

    assert_eq!(g.parent(line).unwrap(), Some(first));
    assert_eq!(g.collection_len(first_lines).unwrap(), 1);
    assert_eq!(g.collection_len(second_lines).unwrap(), 0);
    assert_eq!((g.state(first).unwrap(), g.state(second).unwrap()), before);
}

#[test]
fn items_move_between_collections_of_one_aggregate() {
    let types = OrderTypes::new();
    let mut g = graph();
    let (order, open) = types.new_order(&mut g, "ACME");
    let shipped = g.new_collection(order).unwrap();
    let line = types.new_line(&mut g, "A-1", 1);
    g.add(open, line).unwrap();

    g.add(shipped, line).unwrap();
    assert_eq!(g.collection_len(open).unwrap(), 0);
    assert_eq!(g.items(shipped).unwrap().collect::<Vec<_>>(), vec![line]);
    assert!(!g.is_deleted(line).unwrap());
    assert!(g.deleted_items(open).unwrap().is_empty());
}

#[test]
fn subscribers_see_cell_and_cascade_changes() {
    let types = OrderTypes::new();
    let mut g = graph();
    let (order, lines) = types.new_order(&mut g, "ACME");
    let line = types.new_line(&mut g, "A-1", 1);
    g.add(lines, line).unwrap();

    let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let sub = g.subscribe(move |e| sink.lock().unwrap().push(*e));

    g.set(line, types.sku, String::new()).unwrap();
    {
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&ChangeEvent::new(line, ChangeKind::Value(types.sku.id()))));
        assert!(seen.contains(&ChangeEvent::new(line, ChangeKind::Messages(types.sku.id()))));
        assert!(seen.contains(&ChangeEvent::new(line, ChangeKind::IsValid)));
        assert!(seen.contains(&ChangeEvent::new(order, ChangeKind::IsValid)));
        assert!(seen.contains(&ChangeEvent::new(order, ChangeKind::IsSavable)));
    }

    assert!(g.unsubscribe(sub));
    assert!(!g.unsubscribe(sub));
    let count = seen.lock().unwrap().len();
    g.set(line, types.sku, "A-1".to_owned()).unwrap();
    assert_eq!(seen.lock().unwrap().len(), count);
    assert_eq!(g.subscriber_count(), 0);
}

#[test]
fn read_only_cells_ignore_user_edits() {
    let types = OrderTypes::new();
    let mut g = graph();
    let (order, _) = types.new_order(&mut g, "ACME");
    assert!(g.set_read_only(order, types.customer, true).unwrap());
    assert!(!g.set(order, types.customer, "Globex".to_owned()).unwrap());
    assert_eq!(g.get(order, types.customer).unwrap().as_deref(), Some("ACME"));
    assert!(g.cell(order, types.customer).unwrap().is_read_only());
}

#[test]
fn type_mismatch_is_rejected() {
    let types = OrderTypes::new();
    let mut g = graph();
    let (order, _) = types.new_order(&mut g, "ACME");
    let err = g.set_value(order, PropertyId(0), 5_i64.into()).unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
    let err = g.set_value(order, PropertyId(9), 5_i64.into()).unwrap_err();
    assert!(matches!(err, GraphError::UnknownProperty { .. }));
}

#[test]
fn stale_ids_are_unknown_after_discard() {
    let types = OrderTypes::new();
    let mut g = graph();
    let (order, lines) = types.new_order(&mut g, "ACME");
    g.discard(order).unwrap();
    assert_eq!(g.is_valid(order).unwrap_err(), GraphError::UnknownNode(order));
    assert_eq!(
        g.collection_len(lines).unwrap_err(),
        GraphError::UnknownCollection(lines)
    );
    let again = g.create(&types.order).unwrap();
    assert_ne!(again, order);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn root_validity_matches_item_errors(skus in proptest::collection::vec(any::<bool>(), 1..8)) {
        let types = OrderTypes::new();
        let mut g = graph();
        let (order, lines) = types.new_order(&mut g, "ACME");
        for (i, filled) in skus.iter().enumerate() {
            let line = types.new_line(&mut g, "X", 1);
            g.add(lines, line).unwrap();
            let sku = if *filled { format!("SKU-{i}") } else { String::new() };
            g.set(line, types.sku, sku).unwrap();
        }
        prop_assert_eq!(g.is_valid(order).unwrap(), skus.iter().all(|f| *f));
    }

    #[test]
    fn mark_unmodified_twice_equals_once(edits in proptest::collection::vec((0usize..3, 1i64..50), 0..10)) {
        let types = OrderTypes::new();
        let mut g = graph();
        let (order, _, items) = types.persisted_order(&mut g, 3);
        for (index, quantity) in edits {
            g.set(items[index], types.quantity, quantity).unwrap();
        }
        g.mark_unmodified(order).unwrap();
        let once: Vec<_> = items.iter().map(|n| g.state(*n).unwrap()).collect();
        let root_once = g.state(order).unwrap();
        g.mark_unmodified(order).unwrap();
        let twice: Vec<_> = items.iter().map(|n| g.state(*n).unwrap()).collect();
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(root_once, g.state(order).unwrap());
        prop_assert!(!root_once.modified);
        for n in &items {
            prop_assert!(g.modified_properties(*n).unwrap().is_empty());
        }
    }
}
