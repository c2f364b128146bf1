use crate::{
    entities::payment::PaymentMethod,
    errors::ServiceError,
    services::orders::{CreateOrderRequest, OrderResponse, OrderService},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Client-submitted cart line. Quantities and prices here are advisory
/// only — the server always rebuilds the order from the stored cart and
/// live catalog prices.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub price: Decimal,
}

/// Checkout request, the external shape of the checkout operation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 100))]
    pub shipping_name: String,
    #[validate(length(min = 1, max = 20))]
    pub shipping_phone: String,
    #[validate(length(min = 1, max = 255))]
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub voucher_code: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    /// Advisory snapshot of what the client believes is in the cart
    #[serde(default)]
    #[validate]
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
}

/// Thin coordination layer over the order writer.
///
/// Checkout is not idempotent: resubmitting the same request creates a
/// new order. Deduplication, if desired, is the caller's concern, and
/// order-writer failures are surfaced verbatim with no retry.
#[derive(Clone)]
pub struct CheckoutService {
    order_service: Arc<OrderService>,
}

impl CheckoutService {
    pub fn new(order_service: Arc<OrderService>) -> Self {
        Self { order_service }
    }

    #[instrument(skip(self, request), fields(customer_id = %customer_id))]
    pub async fn checkout(
        &self,
        customer_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;

        if !request.items.is_empty() {
            // Purely informational; the stored cart is authoritative.
            info!(
                advisory_items = request.items.len(),
                "client sent an advisory cart snapshot"
            );
        }

        let order = self
            .order_service
            .create_order(
                customer_id,
                CreateOrderRequest {
                    shipping_name: request.shipping_name,
                    shipping_phone: request.shipping_phone,
                    shipping_address: request.shipping_address,
                    payment_method: request.payment_method,
                    voucher_code: request.voucher_code,
                    note: request.note,
                },
            )
            .await
            .map_err(|e| {
                warn!(error = %e, kind = e.kind(), "checkout failed");
                e
            })?;

        Ok(CheckoutResponse { order })
    }
}
