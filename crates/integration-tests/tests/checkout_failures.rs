//! Checkout under store failures and lost stock races, and the
//! reconciliation that settles what they leave behind.

use mercado_core::OrderStatus;
use mercado_integration_tests::{TestApp, cents};
use mercado_storefront::models::{CommitState, ReportRange};
use mercado_storefront::services::{CheckoutError, OrderReadError, ReconcileService};

#[tokio::test]
async fn test_lost_race_is_compensated() {
    let app = TestApp::new();
    let soap = app.product("Soap", "Bath", cents(500), 10).await;
    let mug = app.product("Mug", "Kitchen", cents(1200), 1).await;
    app.add_to_cart(app.alice, &soap, 2).await;
    app.add_to_cart(app.alice, &mug, 1).await;

    // Someone else buys the last mug between validation and the debit.
    app.faults.steal_before_debit(mug.id, 1).await;

    let err = app
        .state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect_err("lost race");
    assert!(matches!(
        err,
        CheckoutError::InsufficientStock {
            available: 0,
            requested: 1,
            ..
        }
    ));

    // Soap was debited and then restocked.
    assert_eq!(app.catalog.stock_of(soap.id).await, Some(10));
    assert_eq!(app.catalog.stock_of(mug.id).await, Some(0));

    let orders = app.orders.all_orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Cancelled);
    let entry = app.orders.journal_entry(orders[0].id).await.expect("journal");
    assert_eq!(entry.state, CommitState::Compensated);

    let cart = app.state.carts().get_cart(app.alice).await.expect("cart");
    assert_eq!(cart.items.len(), 2);
}

#[tokio::test]
async fn test_debit_failure_is_flagged_then_reconciled() {
    let app = TestApp::new();
    let soap = app.product("Soap", "Bath", cents(500), 10).await;
    let mug = app.product("Mug", "Kitchen", cents(1200), 4).await;
    app.add_to_cart(app.alice, &soap, 2).await;
    app.add_to_cart(app.alice, &mug, 1).await;

    app.faults.fail_debit_of(mug.id).await;

    let err = app
        .state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect_err("partial commit");
    let CheckoutError::PartialCommit { order_id, .. } = err else {
        panic!("expected PartialCommit, got {err}");
    };

    assert_eq!(app.catalog.stock_of(soap.id).await, Some(8));
    assert_eq!(app.catalog.stock_of(mug.id).await, Some(4));
    let entry = app.orders.journal_entry(order_id).await.expect("journal");
    assert_eq!(entry.state, CommitState::NeedsReconciliation);
    assert!(entry.detail.is_some());

    app.faults.heal().await;
    let summary = app
        .state
        .reconcile()
        .run(ReconcileService::DEFAULT_GRACE)
        .await
        .expect("reconcile");

    assert_eq!(summary.completed, 1);
    // Soap is not debited twice; the mug is now debited.
    assert_eq!(app.catalog.stock_of(soap.id).await, Some(8));
    assert_eq!(app.catalog.stock_of(mug.id).await, Some(3));
    assert_eq!(app.catalog.debited(order_id, soap.id).await, Some(2));
    assert_eq!(app.catalog.debited(order_id, mug.id).await, Some(1));
    let entry = app.orders.journal_entry(order_id).await.expect("journal");
    assert_eq!(entry.state, CommitState::Completed);
}

#[tokio::test]
async fn test_retry_after_partial_commit_resumes_the_same_order() {
    let app = TestApp::new();
    let soap = app.product("Soap", "Bath", cents(500), 10).await;
    let mug = app.product("Mug", "Kitchen", cents(1200), 4).await;
    app.add_to_cart(app.alice, &soap, 2).await;
    app.add_to_cart(app.alice, &mug, 1).await;

    app.faults.fail_debit_of(mug.id).await;
    let err = app
        .state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect_err("partial commit");
    let CheckoutError::PartialCommit { order_id, .. } = err else {
        panic!("expected PartialCommit, got {err}");
    };

    app.faults.heal().await;
    let order = app
        .state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect("retry");

    assert_eq!(order.id, order_id);
    assert_eq!(app.orders.order_count().await, 1);
    assert_eq!(app.catalog.stock_of(soap.id).await, Some(8));
    assert_eq!(app.catalog.stock_of(mug.id).await, Some(3));
    let entry = app.orders.journal_entry(order_id).await.expect("journal");
    assert_eq!(entry.state, CommitState::Completed);
    let cart = app.state.carts().get_cart(app.alice).await.expect("cart");
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn test_retry_after_compensation_writes_a_new_order() {
    let app = TestApp::new();
    let mug = app.product("Mug", "Kitchen", cents(1200), 1).await;
    app.add_to_cart(app.alice, &mug, 1).await;
    app.faults.steal_before_debit(mug.id, 1).await;
    app.state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect_err("lost race");
    let cancelled = app.orders.all_orders().await[0].id;

    app.state
        .products()
        .update(
            mug.id,
            mercado_storefront::models::ProductUpdate {
                stock: Some(5),
                ..Default::default()
            },
        )
        .await
        .expect("restock");
    let order = app
        .state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect("retry");

    assert_ne!(order.id, cancelled);
    assert_eq!(app.orders.order_count().await, 2);
    assert_eq!(app.catalog.stock_of(mug.id).await, Some(4));
}

#[tokio::test]
async fn test_failed_restock_leaves_order_for_an_operator() {
    let app = TestApp::new();
    let soap = app.product("Soap", "Bath", cents(500), 10).await;
    let mug = app.product("Mug", "Kitchen", cents(1200), 1).await;
    app.add_to_cart(app.alice, &soap, 2).await;
    app.add_to_cart(app.alice, &mug, 1).await;

    app.faults.steal_before_debit(mug.id, 1).await;
    app.faults.fail_restock();

    let err = app
        .state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect_err("partial commit");
    let CheckoutError::PartialCommit { order_id, .. } = err else {
        panic!("expected PartialCommit, got {err}");
    };
    assert_eq!(app.catalog.stock_of(soap.id).await, Some(8));

    // The mug is gone for good, so rolling forward cannot finish the order.
    app.faults.heal().await;
    let summary = app
        .state
        .reconcile()
        .run(ReconcileService::DEFAULT_GRACE)
        .await
        .expect("reconcile");

    assert_eq!(summary.unresolved, 1);
    let entry = app.orders.journal_entry(order_id).await.expect("journal");
    assert_eq!(entry.state, CommitState::NeedsReconciliation);
    assert!(
        entry
            .detail
            .as_deref()
            .is_some_and(|detail| detail.contains(&mug.id.to_string()))
    );

    // Cancelling hands it back to reconciliation, which restocks the soap.
    app.state
        .orders()
        .update_status(order_id, OrderStatus::Cancelled)
        .await
        .expect("cancel");
    let summary = app
        .state
        .reconcile()
        .run(ReconcileService::DEFAULT_GRACE)
        .await
        .expect("reconcile");

    assert_eq!(summary.compensated, 1);
    assert_eq!(app.catalog.stock_of(soap.id).await, Some(10));
}

#[tokio::test]
async fn test_compensated_order_cannot_be_revived() {
    let app = TestApp::new();
    let mug = app.product("Mug", "Kitchen", cents(1200), 1).await;
    app.add_to_cart(app.alice, &mug, 1).await;
    app.faults.steal_before_debit(mug.id, 1).await;

    app.state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect_err("lost race");
    let order_id = app.orders.all_orders().await[0].id;

    let err = app
        .state
        .orders()
        .update_status(order_id, OrderStatus::Shipped)
        .await
        .expect_err("cancelled orders stay cancelled");
    assert!(matches!(err, OrderReadError::Cancelled(id) if id == order_id));

    let orders = app.orders.all_orders().await;
    assert_eq!(orders[0].status, OrderStatus::Cancelled);
    assert_eq!(app.catalog.stock_of(mug.id).await, Some(0));
    assert_eq!(app.catalog.debited(order_id, mug.id).await, None);
    let revenue = app
        .state
        .reports()
        .daily_revenue(ReportRange::Last7Days)
        .await
        .expect("report");
    assert!(revenue.is_empty());

    let summary = app
        .state
        .reconcile()
        .run(ReconcileService::DEFAULT_GRACE)
        .await
        .expect("reconcile");
    assert_eq!(summary.scanned, 0);
}

#[tokio::test]
async fn test_cart_clear_failure_does_not_fail_checkout() {
    let app = TestApp::new();
    let soap = app.product("Soap", "Bath", cents(500), 10).await;
    app.add_to_cart(app.alice, &soap, 3).await;
    app.faults.fail_clear();

    let order = app
        .state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect("commit");

    assert_eq!(order.total, cents(1500));
    assert_eq!(app.catalog.stock_of(soap.id).await, Some(7));
    let entry = app.orders.journal_entry(order.id).await.expect("journal");
    assert_eq!(entry.state, CommitState::Completed);

    // The stale cart is still there for the user to clear.
    let cart = app.state.carts().get_cart(app.alice).await.expect("cart");
    assert_eq!(cart.items.len(), 1);
}

#[tokio::test]
async fn test_insufficient_stock_writes_nothing() {
    let app = TestApp::new();
    let soap = app.product("Soap", "Bath", cents(1000), 20).await;
    app.add_to_cart(app.alice, &soap, 10).await;
    app.state
        .products()
        .update(
            soap.id,
            mercado_storefront::models::ProductUpdate {
                stock: Some(3),
                ..Default::default()
            },
        )
        .await
        .expect("restock down");

    let err = app
        .state
        .checkout()
        .commit_order(app.alice)
        .await
        .expect_err("insufficient");

    assert!(matches!(
        err,
        CheckoutError::InsufficientStock {
            available: 3,
            requested: 10,
            ..
        }
    ));
    assert_eq!(app.catalog.stock_of(soap.id).await, Some(3));
    assert_eq!(app.orders.order_count().await, 0);
    let cart = app.state.carts().get_cart(app.alice).await.expect("cart");
    assert_eq!(cart.items.len(), 1);
}
