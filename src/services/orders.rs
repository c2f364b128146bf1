use crate::{
    entities::{
        cart::{self, Entity as CartEntity},
        cart_item::{self, Entity as CartItemEntity},
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
        order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
        payment::PaymentMethod,
        product::{Entity as ProductEntity, ProductStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{stock::StockLedger, vouchers::VoucherService},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Order creation input. Items are not part of this request: the order
/// is built from the customer's stored cart, priced from the live
/// catalog at the moment of purchase.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "Shipping name is required"))]
    pub shipping_name: String,
    #[validate(length(min = 1, max = 20, message = "Shipping phone is required"))]
    pub shipping_phone: String,
    #[validate(length(min = 1, max = 255, message = "Shipping address is required"))]
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub voucher_code: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub voucher_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub shipping_name: String,
    pub shipping_phone: String,
    pub shipping_address: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Order writer and order queries.
///
/// `create_order` is the atomic commit-or-abort heart of checkout:
/// stock verification, live pricing, voucher consumption, order and
/// line-item persistence and cart clearing all happen inside one
/// transaction. Any failure rolls the whole thing back, leaving cart,
/// stock and voucher budgets untouched.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Converts the customer's cart into a persisted order.
    ///
    /// Inside one transaction: resolve the cart (`EmptyCart` if it has
    /// no lines), re-price every line from the live catalog, reserve
    /// stock per line with a guarded decrement, apply the voucher (hard
    /// error on any invalid code), insert the order and its immutable
    /// line items, clear the cart, commit. After commit an
    /// `OrderCreated` event is emitted for the admin notification sink;
    /// event failure never fails the order.
    #[instrument(skip(self, request), fields(customer_id = %customer_id))]
    pub async fn create_order(
        &self,
        customer_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "failed to start order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        let cart = CartEntity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or(ServiceError::EmptyCart)?;

        let lines = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(ProductEntity)
            .all(&txn)
            .await?;

        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        // Re-price from the live catalog and reserve stock line by line.
        // The cart's cached unit_price is deliberately ignored.
        let mut subtotal = Decimal::ZERO;
        let mut priced_lines = Vec::with_capacity(lines.len());
        for (item, product) in lines {
            let product = product.ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "product {} no longer exists",
                    item.product_id
                ))
            })?;

            if product.status != ProductStatus::Active {
                return Err(ServiceError::InvalidOperation(format!(
                    "product {} is no longer available",
                    product.name
                )));
            }

            StockLedger::check_and_reserve(&txn, product.id, item.quantity).await?;

            let unit_price = product.discounted_price();
            let line_total = unit_price * Decimal::from(item.quantity);
            subtotal += line_total;
            priced_lines.push((item, unit_price, line_total));
        }

        let applied_voucher = match &request.voucher_code {
            Some(code) => {
                Some(VoucherService::validate_and_consume(&txn, code, subtotal).await?)
            }
            None => None,
        };

        let discount_amount = applied_voucher
            .as_ref()
            .map(|v| v.discount_amount)
            .unwrap_or(Decimal::ZERO);
        let total_amount = (subtotal - discount_amount).max(Decimal::ZERO);

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(customer_id),
            shipping_name: Set(request.shipping_name.clone()),
            shipping_phone: Set(request.shipping_phone.clone()),
            shipping_address: Set(request.shipping_address.clone()),
            note: Set(request.note.clone()),
            total_amount: Set(total_amount),
            discount_amount: Set(discount_amount),
            voucher_id: Set(applied_voucher.as_ref().map(|v| v.voucher_id)),
            payment_method: Set(request.payment_method),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        let mut item_responses = Vec::with_capacity(priced_lines.len());
        for (item, unit_price, line_total) in &priced_lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price: Set(*unit_price),
                total_price: Set(*line_total),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;

            item_responses.push(OrderItemResponse {
                product_id: item.product_id,
                quantity: item.quantity,
                price: *unit_price,
                total_price: *line_total,
            });
        }

        CartItemEntity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, %total_amount, "order created");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderCreated {
                order_id,
                customer_id,
                total_amount,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "failed to send order created event");
        }

        Ok(Self::to_response(order_model, item_responses))
    }

    /// Fetches an order with its items. When `requesting_customer` is
    /// set, enforces that the order belongs to that customer.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        requesting_customer: Option<Uuid>,
    ) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        if let Some(customer_id) = requesting_customer {
            if order.customer_id != customer_id {
                return Err(ServiceError::NotFound(format!(
                    "order {} not found",
                    order_id
                )));
            }
        }

        let items = self.load_items(order_id).await?;
        Ok(Self::to_response(order, items))
    }

    /// Lists a customer's orders, most recent first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let paginator = OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.load_items(order.id).await?;
            responses.push(Self::to_response(order, items));
        }

        Ok(OrderListResponse {
            orders: responses,
            total,
            page,
            per_page,
        })
    }

    /// Lists all orders, optionally filtered by status (admin).
    #[instrument(skip(self))]
    pub async fn list_all_orders(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        let paginator = query.paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.load_items(order.id).await?;
            responses.push(Self::to_response(order, items));
        }

        Ok(OrderListResponse {
            orders: responses,
            total,
            page,
            per_page,
        })
    }

    /// Moves an order to a new status, enforcing the closed transition
    /// table (admin operation).
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        let old_status = order.status;
        if !old_status.can_transition(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "order cannot move from {:?} to {:?}",
                old_status, new_status
            )));
        }

        let updated = self.apply_status(order, new_status).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "failed to send status change event");
        }

        let items = self.load_items(order_id).await?;
        Ok(Self::to_response(updated, items))
    }

    /// Cancels a `pending` order. When `requesting_customer` is set,
    /// the order must belong to that customer.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        requesting_customer: Option<Uuid>,
    ) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        if let Some(customer_id) = requesting_customer {
            if order.customer_id != customer_id {
                return Err(ServiceError::NotFound(format!(
                    "order {} not found",
                    order_id
                )));
            }
        }

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(
                "only pending orders can be cancelled".to_string(),
            ));
        }

        let updated = self.apply_status(order, OrderStatus::Cancelled).await?;

        if let Err(e) = self.event_sender.send(Event::OrderCancelled(order_id)).await {
            warn!(error = %e, order_id = %order_id, "failed to send order cancelled event");
        }

        let items = self.load_items(order_id).await?;
        Ok(Self::to_response(updated, items))
    }

    async fn apply_status(
        &self,
        order: OrderModel,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        Ok(active.update(&*self.db).await?)
    }

    async fn load_items(&self, order_id: Uuid) -> Result<Vec<OrderItemResponse>, ServiceError> {
        let items: Vec<OrderItemModel> = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(items
            .into_iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.unit_price,
                total_price: item.total_price,
            })
            .collect())
    }

    fn to_response(model: OrderModel, items: Vec<OrderItemResponse>) -> OrderResponse {
        OrderResponse {
            id: model.id,
            customer_id: model.customer_id,
            status: model.status,
            total_amount: model.total_amount,
            discount_amount: model.discount_amount,
            voucher_id: model.voucher_id,
            payment_method: model.payment_method,
            shipping_name: model.shipping_name,
            shipping_phone: model.shipping_phone,
            shipping_address: model.shipping_address,
            note: model.note,
            created_at: model.created_at,
            items,
        }
    }
}
