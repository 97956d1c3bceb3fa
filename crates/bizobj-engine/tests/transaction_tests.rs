#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use bizobj_core::errors::TransactionPhase;
use bizobj_core::{BoError, ModelInstance, MutationState, PortalAction, Record};
use bizobj_store::TxEventKind;
use common::{new_order, order_backend, order_schema, Backend};

// ===== ATOMICITY =====

#[tokio::test]
async fn test_child_failure_rolls_back_whole_graph() {
    let (backend, daos) = order_backend();
    let portal = backend.portal();
    daos.item.fail_on(PortalAction::Insert);
    let mut order = new_order(&order_schema(), 2);

    let err = portal.save(&mut order).await.unwrap_err();

    match &err {
        BoError::DataAccess { action, model, .. } => {
            assert_eq!(*action, PortalAction::Insert);
            assert_eq!(model, "OrderItem");
        }
        other => panic!("expected DataAccess, got {other:?}"),
    }
    assert_eq!(backend.store.row_count("Order"), 0);
    assert_eq!(backend.store.row_count("Address"), 0);
    assert_eq!(backend.store.row_count("OrderItem"), 0);
    assert_eq!(
        backend.connections.log().kinds(),
        vec![TxEventKind::Begin, TxEventKind::Rollback]
    );
}

#[tokio::test]
async fn test_every_call_shares_the_root_transaction() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 3);

    portal.save(&mut order).await.unwrap();

    let tx = backend.connections.log().events();
    assert_eq!(tx.len(), 2);
    assert_eq!(tx[0].kind, TxEventKind::Begin);
    assert_eq!(tx[1].kind, TxEventKind::Commit);
    let calls = backend.log.calls();
    assert_eq!(calls.len(), 5);
    assert!(calls
        .iter()
        .all(|c| c.connection == tx[0].connection && c.transactional));
}

#[tokio::test]
async fn test_failed_update_leaves_store_as_before() {
    let (backend, daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 2);
    portal.save(&mut order).await.unwrap();
    let before = backend.store.snapshot().unwrap();

    order.set("vendorName", "Globex").unwrap();
    order
        .collection_mut("items")
        .unwrap()
        .get_mut(0)
        .unwrap()
        .set("quantity", 99)
        .unwrap();
    daos.item.fail_on(PortalAction::Update);

    assert!(portal.save(&mut order).await.is_err());
    assert_eq!(backend.store.snapshot().unwrap(), before);

    daos.item.heal();
    portal.save(&mut order).await.unwrap();
    assert_ne!(backend.store.snapshot().unwrap(), before);
}

#[tokio::test]
async fn test_rollback_failure_carries_both_errors() {
    let (backend, daos) = order_backend();
    let portal = backend.portal();
    daos.address.fail_on(PortalAction::Insert);
    backend.connections.fail_rollback(true);
    let mut order = new_order(&order_schema(), 1);

    let err = portal.save(&mut order).await.unwrap_err();

    match err {
        BoError::RollbackFailed { original, .. } => {
            assert!(matches!(
                *original,
                BoError::DataAccess {
                    action: PortalAction::Insert,
                    ..
                }
            ));
            assert_eq!(original.model(), Some("Address"));
        }
        other => panic!("expected RollbackFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_commit_failure_is_a_transaction_error() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    backend.connections.fail_commit(true);
    let mut order = new_order(&order_schema(), 1);

    let err = portal.save(&mut order).await.unwrap_err();

    assert!(matches!(
        err,
        BoError::Transaction {
            phase: TransactionPhase::Commit,
            ..
        }
    ));
    assert_eq!(backend.store.row_count("Order"), 0);
}

#[tokio::test]
async fn test_begin_failure_touches_nothing() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    backend.connections.fail_begin(true);
    let mut order = new_order(&order_schema(), 1);

    let err = portal.save(&mut order).await.unwrap_err();

    assert!(matches!(
        err,
        BoError::Transaction {
            phase: TransactionPhase::Begin,
            ..
        }
    ));
    assert!(backend.log.is_empty());
    assert_eq!(order.state(), MutationState::Created);
}

// ===== NON-TRANSACTIONAL ACTIONS =====

#[tokio::test]
async fn test_fetch_uses_plain_connection() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 2);
    portal.save(&mut order).await.unwrap();
    backend.log.clear();
    backend.connections.log().clear();

    let mut fetched = ModelInstance::new(order_schema());
    portal
        .fetch(&mut fetched, &order.key(), None)
        .await
        .unwrap();

    assert_eq!(
        backend.connections.log().kinds(),
        vec![TxEventKind::Open, TxEventKind::Release]
    );
    assert!(backend.log.calls().iter().all(|c| !c.transactional));
}

#[tokio::test]
async fn test_create_uses_plain_connection() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = ModelInstance::new(order_schema());

    portal.create(&mut order).await.unwrap();

    assert_eq!(
        backend.connections.log().kinds(),
        vec![TxEventKind::Open, TxEventKind::Release]
    );
    // root and its child object; collections start empty
    assert_eq!(backend.log.count(PortalAction::Create), 2);
    assert_eq!(order.state(), MutationState::Created);
}

// ===== DAO RESOLUTION =====

#[tokio::test]
async fn test_unsupported_action_aborts_save() {
    let mut backend = Backend::new();
    let order = backend.dao("Order").auto_key("orderKey");
    let address = backend
        .dao("Address")
        .only([PortalAction::Fetch, PortalAction::Create]);
    let item = backend.dao("OrderItem").auto_key("orderItemKey");
    backend.register("Order", order);
    backend.register("Address", address);
    backend.register("OrderItem", item);
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 1);

    let err = portal.save(&mut order).await.unwrap_err();

    match &err {
        BoError::UnsupportedOperation { action, model } => {
            assert_eq!(*action, PortalAction::Insert);
            assert_eq!(model, "Address");
        }
        other => panic!("expected UnsupportedOperation, got {other:?}"),
    }
    assert_eq!(backend.store.row_count("Order"), 0);
}

#[tokio::test]
async fn test_missing_dao_is_reported_by_model() {
    let mut backend = Backend::new();
    let order = backend.dao("Order").auto_key("orderKey");
    backend.register("Order", order);
    let portal = backend.portal();
    let mut order = new_order(&order_schema(), 0);

    let err = portal.save(&mut order).await.unwrap_err();

    assert!(matches!(err, BoError::DaoNotRegistered { ref model } if model == "Address"));
    assert_eq!(backend.store.row_count("Order"), 0);
    assert_eq!(
        backend.connections.log().kinds(),
        vec![TxEventKind::Begin, TxEventKind::Rollback]
    );
}

#[tokio::test]
async fn test_missing_root_row_is_not_found() {
    let (backend, _daos) = order_backend();
    let portal = backend.portal();
    let mut order = ModelInstance::new(order_schema());

    let err = portal
        .fetch(&mut order, &Record::new().with("orderKey", 404), None)
        .await
        .unwrap_err();

    assert!(matches!(err, BoError::NotFound { ref model, .. } if model == "Order"));
    assert_eq!(order.state(), MutationState::Created);
    assert_eq!(backend.log.count(PortalAction::Fetch), 1);
}
