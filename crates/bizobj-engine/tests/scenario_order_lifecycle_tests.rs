#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use bizobj_core::{BoError, ModelInstance, MutationState, PortalAction, Record, Value};
use chrono::{TimeZone, Utc};
use common::{new_order, order_backend, order_schema};

// ===== VALIDATION BEFORE SAVE =====

#[test]
fn test_invalid_order_reports_every_broken_rule() {
    let schema = order_schema();
    let mut order = new_order(&schema, 2);
    order.set("vendorName", Value::Null).unwrap();
    {
        let items = order.collection_mut("items").unwrap();
        let item = items.get_mut(1).unwrap();
        item.set("productName", "x".repeat(31)).unwrap();
    }

    order.check_rules();

    assert!(!order.is_valid());
    let tree = order.broken_rules();
    assert_eq!(tree.notices("vendorName").len(), 1);
    let item_tree = tree.item("items", 1).unwrap();
    assert_eq!(item_tree.notices("productName").len(), 1);
    assert!(tree.item("items", 0).map_or(true, |t| t.is_empty()));
}

#[tokio::test]
async fn test_fixed_order_saves_and_becomes_pristine() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let schema = order_schema();
    let mut order = new_order(&schema, 2);
    order.set("vendorName", Value::Null).unwrap();
    order.check_rules();
    assert!(!order.is_valid());

    order.set("vendorName", "Acme").unwrap();
    order.check_rules();
    assert!(order.is_valid());

    portal.save(&mut order).await.unwrap();

    assert_eq!(order.state(), MutationState::Pristine);
    assert!(!order.is_dirty());
    assert_eq!(backend.store.row_count("Order"), 1);
    assert_eq!(backend.store.row_count("Address"), 1);
    assert_eq!(backend.store.row_count("OrderItem"), 2);
}

// ===== INSERT THEN FETCH =====

#[tokio::test]
async fn test_insert_then_fetch_reproduces_every_field() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let schema = order_schema();
    let ordered_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();

    let mut order = new_order(&schema, 3);
    order.set("orderDate", ordered_at).unwrap();
    portal.insert(&mut order).await.unwrap();

    let key = order.key();
    assert_eq!(key.get("orderKey"), Some(&Value::Integer(1)));

    let mut fetched = ModelInstance::new(schema.clone());
    portal.fetch(&mut fetched, &key, None).await.unwrap();

    assert_eq!(fetched.state(), MutationState::Pristine);
    assert_eq!(fetched.to_record(), order.to_record());
    assert_eq!(fetched.get("orderDate").unwrap(), &Value::DateTime(ordered_at));
    assert_eq!(
        fetched.child("address").unwrap().to_record(),
        order.child("address").unwrap().to_record()
    );

    let saved = order.collection("items").unwrap();
    let loaded = fetched.collection("items").unwrap();
    assert_eq!(loaded.len(), 3);
    // Siblings are saved concurrently, so match items by key rather than position
    for item in saved {
        let index = loaded.find_by_key(&item.key()).unwrap();
        let reloaded = loaded.get(index).unwrap();
        assert_eq!(reloaded.to_record(), item.to_record());
        assert_eq!(reloaded.get("orderKey").unwrap(), &Value::Integer(1));
    }
}

#[tokio::test]
async fn test_insert_propagates_parent_key_to_children() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let schema = order_schema();
    let mut order = new_order(&schema, 2);

    portal.save(&mut order).await.unwrap();

    let filter = Record::new().with("orderKey", 1);
    assert_eq!(backend.store.find("Address", &filter).unwrap().len(), 1);
    assert_eq!(backend.store.find("OrderItem", &filter).unwrap().len(), 2);
    let mut item_keys: Vec<_> = order
        .collection("items")
        .unwrap()
        .iter()
        .map(|item| item.get("orderItemKey").unwrap().as_i64().unwrap())
        .collect();
    item_keys.sort_unstable();
    assert_eq!(item_keys, vec![1, 2]);
}

// ===== UPDATE =====

#[tokio::test]
async fn test_update_touches_only_changed_nodes() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let schema = order_schema();
    let mut order = new_order(&schema, 2);
    portal.save(&mut order).await.unwrap();
    backend.log.clear();

    let changed_key = order.collection("items").unwrap().get(1).unwrap().key();
    let untouched_key = order.collection("items").unwrap().get(0).unwrap().key();
    {
        let items = order.collection_mut("items").unwrap();
        items.get_mut(1).unwrap().set("quantity", 42).unwrap();
    }
    assert_eq!(order.state(), MutationState::Pristine);
    assert!(order.is_dirty());

    portal.save(&mut order).await.unwrap();

    assert_eq!(backend.log.count(PortalAction::Update), 1);
    assert_eq!(backend.log.count_for("OrderItem", PortalAction::Update), 1);
    let row = backend.store.find("OrderItem", &changed_key).unwrap();
    assert_eq!(row[0].get("quantity"), Some(&Value::Integer(42)));
    let untouched = backend.store.find("OrderItem", &untouched_key).unwrap();
    assert_eq!(untouched[0].get("quantity"), Some(&Value::Integer(1)));
    assert!(!order.is_dirty());
}

#[tokio::test]
async fn test_save_without_changes_opens_no_transaction() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let schema = order_schema();
    let mut order = new_order(&schema, 1);
    portal.save(&mut order).await.unwrap();
    backend.log.clear();
    backend.connections.log().clear();

    portal.save(&mut order).await.unwrap();

    assert!(backend.log.is_empty());
    assert!(backend.connections.log().events().is_empty());
}

#[tokio::test]
async fn test_update_rejects_new_root() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 0);

    let err = portal.update(&mut order).await.unwrap_err();

    assert!(matches!(err, BoError::InvalidState { .. }));
    assert!(backend.log.is_empty());
}

#[tokio::test]
async fn test_insert_rejects_persisted_root() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 0);
    portal.insert(&mut order).await.unwrap();

    let err = portal.insert(&mut order).await.unwrap_err();

    assert!(matches!(
        err,
        BoError::InvalidState {
            state: MutationState::Pristine,
            ..
        }
    ));
}

#[tokio::test]
async fn test_removed_collection_item_is_deleted_and_purged() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 3);
    portal.save(&mut order).await.unwrap();

    order.collection_mut("items").unwrap().remove_at(0).unwrap();
    portal.save(&mut order).await.unwrap();

    let items = order.collection("items").unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(backend.store.row_count("OrderItem"), 2);
    assert_eq!(backend.log.count_for("OrderItem", PortalAction::Remove), 1);
}

// ===== CASCADING REMOVE =====

#[tokio::test]
async fn test_remove_deletes_children_before_parent() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 2);
    portal.save(&mut order).await.unwrap();
    backend.log.clear();

    portal.remove(&mut order).await.unwrap();

    let order_removes = backend.log.positions("Order", PortalAction::Remove);
    let address_removes = backend.log.positions("Address", PortalAction::Remove);
    let item_removes = backend.log.positions("OrderItem", PortalAction::Remove);
    assert_eq!(order_removes.len(), 1);
    assert_eq!(address_removes.len(), 1);
    assert_eq!(item_removes.len(), 2);
    assert!(address_removes
        .iter()
        .chain(item_removes.iter())
        .all(|p| *p < order_removes[0]));

    assert_eq!(order.state(), MutationState::Removed);
    assert_eq!(order.child("address").unwrap().state(), MutationState::Removed);
    assert_eq!(order.collection("items").unwrap().len(), 0);
    assert_eq!(backend.store.row_count("Order"), 0);
    assert_eq!(backend.store.row_count("Address"), 0);
    assert_eq!(backend.store.row_count("OrderItem"), 0);
}

#[tokio::test]
async fn test_remove_drops_items_that_were_never_saved() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 0);
    portal.save(&mut order).await.unwrap();
    order
        .collection_mut("items")
        .unwrap()
        .add_new()
        .set("productName", "Late addition")
        .unwrap();
    backend.log.clear();

    portal.remove(&mut order).await.unwrap();

    assert_eq!(order.state(), MutationState::Removed);
    assert_eq!(order.collection("items").unwrap().len(), 0);
    assert_eq!(backend.log.count_for("OrderItem", PortalAction::Remove), 0);
    assert_eq!(backend.log.count_for("Order", PortalAction::Remove), 1);
    assert_eq!(backend.store.row_count("Order"), 0);
}

#[tokio::test]
async fn test_remove_of_unsaved_root_needs_no_storage() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 2);

    portal.remove(&mut order).await.unwrap();

    assert_eq!(order.state(), MutationState::Removed);
    assert!(backend.log.is_empty());
    assert!(backend.connections.log().events().is_empty());

    let err = portal.remove(&mut order).await.unwrap_err();
    assert!(matches!(err, BoError::InvalidState { .. }));
}

#[tokio::test]
async fn test_save_dispatches_on_root_state() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 1);

    portal.save(&mut order).await.unwrap();
    order.set("vendorName", "Globex").unwrap();
    portal.save(&mut order).await.unwrap();
    order.remove();
    portal.save(&mut order).await.unwrap();

    assert_eq!(backend.log.count_for("Order", PortalAction::Insert), 1);
    assert_eq!(backend.log.count_for("Order", PortalAction::Update), 1);
    assert_eq!(backend.log.count_for("Order", PortalAction::Remove), 1);
    assert_eq!(order.state(), MutationState::Removed);

    let err = portal.save(&mut order).await.unwrap_err();
    assert!(matches!(err, BoError::InvalidState { .. }));
}
