mod common;

use assert_matches::assert_matches;
use barista_api::{
    entities::{
        order::{OrderStatus, PaymentStatus},
        payment::PaymentMethod,
    },
    errors::ServiceError,
    services::payments::{CardDetails, PaymentDetails},
};
use common::{order_request, setup_branch, setup_variant, stock_of, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn pending_order(app: &TestApp) -> (Uuid, Uuid) {
    let branch_id = setup_branch(app).await;
    let variant_id = setup_variant(app, dec!(100.00), 5).await;
    let order = app
        .services
        .orders
        .create_order(None, order_request(branch_id, &[(variant_id, 1, dec!(100.00))]))
        .await
        .unwrap();
    (order.id, variant_id)
}

async fn settle(app: &TestApp, order_id: Uuid, method: PaymentMethod, amount: Decimal) {
    let card = matches!(method, PaymentMethod::Card).then(|| CardDetails {
        card_number: "4111111111111111".into(),
        expiry: "12/28".into(),
        cvv: "123".into(),
    });
    app.services
        .payments
        .process_payment(order_id, method, PaymentDetails { amount, card })
        .await
        .expect("settlement");
}

#[tokio::test]
async fn full_forward_chain_is_accepted() {
    let app = TestApp::new().await;
    let (order_id, _) = pending_order(&app).await;

    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed,
    ] {
        let updated = app
            .services
            .orders
            .update_order_status(order_id, status)
            .await
            .unwrap();
        assert_eq!(updated.status, status);
    }
}

#[tokio::test]
async fn skipping_ahead_is_rejected() {
    let app = TestApp::new().await;
    let (order_id, _) = pending_order(&app).await;

    let err = app
        .services
        .orders
        .update_order_status(order_id, OrderStatus::Ready)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));

    // The failed transition left the order where it was.
    let order = app.services.orders.get_order(order_id).await.unwrap();
    assert_eq!(order.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn terminal_states_reject_further_transitions() {
    let app = TestApp::new().await;
    let (order_id, _) = pending_order(&app).await;

    app.services
        .orders
        .cancel_order(order_id)
        .await
        .expect("cancel pending order");

    for status in [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Completed,
    ] {
        let err = app
            .services
            .orders
            .update_order_status(order_id, status)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidStatus(_));
    }
}

#[tokio::test]
async fn same_status_update_is_a_no_op() {
    let app = TestApp::new().await;
    let (order_id, _) = pending_order(&app).await;

    let updated = app
        .services
        .orders
        .update_order_status(order_id, OrderStatus::Pending)
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Pending);
}

#[tokio::test]
async fn cancellation_reachable_from_mid_chain() {
    let app = TestApp::new().await;
    let (order_id, _) = pending_order(&app).await;

    app.services
        .orders
        .update_order_status(order_id, OrderStatus::Confirmed)
        .await
        .unwrap();
    app.services
        .orders
        .update_order_status(order_id, OrderStatus::Preparing)
        .await
        .unwrap();

    let cancelled = app.services.orders.cancel_order(order_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn completing_cash_order_also_completes_payment() {
    let app = TestApp::new().await;
    let (order_id, _) = pending_order(&app).await;

    settle(&app, order_id, PaymentMethod::Cash, dec!(102.00)).await;

    // Cash settlement leaves both statuses pending until pickup.
    let order = app.services.orders.get_order(order_id).await.unwrap();
    assert_eq!(order.order.payment_status, PaymentStatus::Pending);

    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
    ] {
        app.services
            .orders
            .update_order_status(order_id, status)
            .await
            .unwrap();
    }

    let completed = app
        .services
        .orders
        .update_order_status(order_id, OrderStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);
    // Confirming pickup confirmed the cash payment.
    assert_eq!(completed.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn completing_card_order_does_not_touch_payment_status() {
    let app = TestApp::new().await;
    let (order_id, _) = pending_order(&app).await;

    settle(&app, order_id, PaymentMethod::Card, dec!(102.00)).await;

    for status in [OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::Completed] {
        app.services
            .orders
            .update_order_status(order_id, status)
            .await
            .unwrap();
    }

    let order = app.services.orders.get_order(order_id).await.unwrap();
    assert_eq!(order.order.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn cancelling_settled_order_does_not_restore_stock() {
    let app = TestApp::new().await;
    let (order_id, variant_id) = pending_order(&app).await;

    settle(&app, order_id, PaymentMethod::Card, dec!(102.00)).await;
    assert_eq!(stock_of(&app, variant_id).await, 4);

    app.services.orders.cancel_order(order_id).await.unwrap();

    // Known gap carried over from the storefront: the decremented unit is
    // not returned to the shelf on cancellation.
    assert_eq!(stock_of(&app, variant_id).await, 4);
}

#[tokio::test]
async fn unknown_order_transition_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .services
        .orders
        .update_order_status(Uuid::new_v4(), OrderStatus::Confirmed)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
