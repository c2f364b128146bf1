//! Integration tests for the payment flow: settlement modes, the
//! simulated gateway, signed callbacks and refunds.

mod common;

use common::{checkout_request, TestApp, CALLBACK_SECRET};
use grocermart_api::entities::{
    order::OrderStatus,
    payment::{PaymentMethod, PaymentStatus},
};
use grocermart_api::services::gateways::{sign_callback, CallbackPayload};
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Seeds a product, fills the cart and checks out, returning the
/// created order id.
async fn place_order(app: &TestApp, customer: Uuid, method: PaymentMethod) -> Uuid {
    let product = app.seed_product("Jasmine rice 5kg", dec!(25000), 0, 10).await;
    app.state
        .cart_service()
        .add_item(customer, product.id, 2)
        .await
        .expect("add to cart");
    app.state
        .checkout_service()
        .checkout(customer, checkout_request(method, None))
        .await
        .expect("checkout should succeed")
        .order
        .id
}

async fn order_status(app: &TestApp, order_id: Uuid) -> OrderStatus {
    app.state
        .order_service()
        .get_order(order_id, None)
        .await
        .expect("order lookup failed")
        .status
}

#[tokio::test]
async fn cod_settles_immediately_and_starts_fulfillment() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let order_id = place_order(&app, customer, PaymentMethod::Cod).await;

    let payment = app
        .state
        .payment_service()
        .create_payment(order_id, PaymentMethod::Cod)
        .await
        .expect("cod payment should be created");

    // COD never enters the gateway leg: it is created, not processing.
    assert_eq!(payment.status, PaymentStatus::Created);
    assert!(payment.transaction_id.is_none());
    assert!(payment.qr_reference.is_none());
    assert_eq!(payment.amount, dec!(50000));
    assert_eq!(order_status(&app, order_id).await, OrderStatus::Processing);
}

#[tokio::test]
async fn bank_transfer_waits_for_manual_confirmation() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let order_id = place_order(&app, customer, PaymentMethod::BankTransfer).await;

    let payment = app
        .state
        .payment_service()
        .create_payment(order_id, PaymentMethod::BankTransfer)
        .await
        .expect("bank transfer payment should be created");

    assert_eq!(payment.status, PaymentStatus::AwaitingConfirmation);
    assert!(payment.qr_reference.is_some());
    assert_eq!(order_status(&app, order_id).await, OrderStatus::Pending);

    let confirmed = app
        .state
        .payment_service()
        .confirm_payment(&payment.payment_code)
        .await
        .expect("confirmation should succeed");

    assert_eq!(confirmed.status, PaymentStatus::Success);
    assert_eq!(order_status(&app, order_id).await, OrderStatus::Processing);
}

#[tokio::test]
async fn gateway_approval_records_transaction_and_pays_the_order() {
    let app = TestApp::with_gateway(1.0).await;
    let customer = Uuid::new_v4();
    let order_id = place_order(&app, customer, PaymentMethod::ZaloPay).await;

    let payments = app.state.payment_service();
    let payment = payments
        .create_payment(order_id, PaymentMethod::ZaloPay)
        .await
        .expect("gateway payment should be created");
    assert_eq!(payment.status, PaymentStatus::Processing);

    let settled = payments
        .process_payment(&payment.payment_code)
        .await
        .expect("forced-approval gateway must succeed");

    assert_eq!(settled.status, PaymentStatus::Success);
    assert!(settled.transaction_id.is_some());
    assert_eq!(order_status(&app, order_id).await, OrderStatus::Processing);
}

#[tokio::test]
async fn gateway_decline_leaves_the_order_payable() {
    let app = TestApp::with_gateway(0.0).await;
    let customer = Uuid::new_v4();
    let order_id = place_order(&app, customer, PaymentMethod::ZaloPay).await;

    let payments = app.state.payment_service();
    let payment = payments
        .create_payment(order_id, PaymentMethod::ZaloPay)
        .await
        .expect("gateway payment should be created");

    let err = payments
        .process_payment(&payment.payment_code)
        .await
        .expect_err("forced-decline gateway must fail");
    assert_eq!(err.kind(), "payment_failed");

    let failed = payments
        .get_payment(&payment.payment_code)
        .await
        .expect("payment lookup failed");
    assert_eq!(failed.status, PaymentStatus::Failed);

    // The order stays pending so the customer can retry with a fresh
    // payment attempt.
    assert_eq!(order_status(&app, order_id).await, OrderStatus::Pending);
    let retry = payments
        .create_payment(order_id, PaymentMethod::PayPal)
        .await
        .expect("retry payment should be created");
    assert_eq!(retry.status, PaymentStatus::Processing);
}

#[tokio::test]
async fn signed_callback_settles_a_processing_payment() {
    let app = TestApp::with_gateway(1.0).await;
    let customer = Uuid::new_v4();
    let order_id = place_order(&app, customer, PaymentMethod::PayPal).await;

    let payments = app.state.payment_service();
    let payment = payments
        .create_payment(order_id, PaymentMethod::PayPal)
        .await
        .expect("gateway payment should be created");

    let transaction_id = "GW-TEST-0001".to_string();
    let payload = CallbackPayload {
        signature: sign_callback(
            CALLBACK_SECRET,
            &payment.payment_code,
            &transaction_id,
            "success",
        ),
        payment_code: payment.payment_code.clone(),
        transaction_id: transaction_id.clone(),
        status: "success".to_string(),
    };

    let settled = payments
        .handle_callback(payload.clone())
        .await
        .expect("valid callback should settle");
    assert_eq!(settled.status, PaymentStatus::Success);
    assert_eq!(settled.transaction_id, Some(transaction_id));
    assert_eq!(order_status(&app, order_id).await, OrderStatus::Processing);

    // Delivery is at-least-once: the duplicate is a no-op, not an error.
    let replay = payments
        .handle_callback(payload)
        .await
        .expect("duplicate callback must be accepted");
    assert_eq!(replay.status, PaymentStatus::Success);
}

#[tokio::test]
async fn tampered_callback_is_rejected_without_state_change() {
    let app = TestApp::with_gateway(1.0).await;
    let customer = Uuid::new_v4();
    let order_id = place_order(&app, customer, PaymentMethod::ZaloPay).await;

    let payments = app.state.payment_service();
    let payment = payments
        .create_payment(order_id, PaymentMethod::ZaloPay)
        .await
        .expect("gateway payment should be created");

    let payload = CallbackPayload {
        signature: sign_callback(
            "not-the-configured-secret-not-the-configured",
            &payment.payment_code,
            "GW-FORGED",
            "success",
        ),
        payment_code: payment.payment_code.clone(),
        transaction_id: "GW-FORGED".to_string(),
        status: "success".to_string(),
    };

    let err = payments
        .handle_callback(payload)
        .await
        .expect_err("bad signature must be rejected");
    assert_eq!(err.kind(), "invalid_callback");

    let unchanged = payments
        .get_payment(&payment.payment_code)
        .await
        .expect("payment lookup failed");
    assert_eq!(unchanged.status, PaymentStatus::Processing);
    assert_eq!(order_status(&app, order_id).await, OrderStatus::Pending);
}

#[tokio::test]
async fn only_successful_payments_can_be_refunded() {
    let app = TestApp::with_gateway(1.0).await;
    let customer = Uuid::new_v4();
    let order_id = place_order(&app, customer, PaymentMethod::ZaloPay).await;

    let payments = app.state.payment_service();
    let payment = payments
        .create_payment(order_id, PaymentMethod::ZaloPay)
        .await
        .expect("gateway payment should be created");

    // Refunding while still processing is an invalid transition.
    let err = payments
        .refund_payment(&payment.payment_code)
        .await
        .expect_err("processing payment cannot be refunded");
    assert_eq!(err.kind(), "invalid_status");

    payments
        .process_payment(&payment.payment_code)
        .await
        .expect("forced-approval gateway must succeed");

    let refunded = payments
        .refund_payment(&payment.payment_code)
        .await
        .expect("successful payment can be refunded");
    assert_eq!(refunded.status, PaymentStatus::Refunded);

    let err = payments
        .refund_payment(&payment.payment_code)
        .await
        .expect_err("refund is not repeatable");
    assert_eq!(err.kind(), "invalid_status");
}

#[tokio::test]
async fn cancelled_orders_cannot_take_payments() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let order_id = place_order(&app, customer, PaymentMethod::Momo).await;

    app.state
        .order_service()
        .cancel_order(order_id, Some(customer))
        .await
        .expect("pending order can be cancelled");

    let err = app
        .state
        .payment_service()
        .create_payment(order_id, PaymentMethod::Momo)
        .await
        .expect_err("cancelled order must not accept payments");
    assert_eq!(err.kind(), "invalid_operation");
}

#[tokio::test]
async fn a_paid_order_rejects_a_second_payment() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let order_id = place_order(&app, customer, PaymentMethod::Momo).await;

    let payments = app.state.payment_service();
    let payment = payments
        .create_payment(order_id, PaymentMethod::Momo)
        .await
        .expect("momo payment should be created");
    assert_eq!(payment.status, PaymentStatus::AwaitingConfirmation);

    payments
        .confirm_payment(&payment.payment_code)
        .await
        .expect("confirmation should succeed");

    let err = payments
        .create_payment(order_id, PaymentMethod::Cod)
        .await
        .expect_err("paid order must reject further payments");
    assert_eq!(err.kind(), "invalid_operation");
}
