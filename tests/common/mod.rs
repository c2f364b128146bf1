use std::sync::Arc;

use chrono::{Duration, Utc};
use grocermart_api::{
    config::AppConfig,
    db,
    entities::{
        payment::PaymentMethod,
        product::{self, ProductStatus},
        voucher::{self, DiscountType, VoucherStatus},
    },
    events,
    services::checkout::CheckoutRequest,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

pub const CALLBACK_SECRET: &str = "integration_test_callback_secret_32chars";

/// Test harness backed by a private in-memory SQLite database with all
/// migrations applied. Each harness gets its own database (one pooled
/// connection per in-memory SQLite instance).
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Harness with deterministic settlement: zero gateway delay,
    /// forced success.
    pub async fn new() -> Self {
        Self::with_gateway(1.0).await
    }

    /// Harness with deterministic settlement and a forced outcome
    /// probability (0.0 = always declined, 1.0 = always approved).
    pub async fn with_gateway(success_rate: f64) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:", "test");
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment.gateway_delay_ms = 0;
        cfg.payment.gateway_success_rate = success_rate;
        cfg.payment.callback_secret = CALLBACK_SECRET.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, rx) = events::channel(64);
        let event_task = tokio::spawn(events::process_events(rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);

        Self {
            state,
            _event_task: event_task,
        }
    }

    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        discount_percent: i32,
        stock: i32,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            discount_percent: Set(discount_percent),
            stock: Set(stock),
            status: Set(ProductStatus::Active),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product")
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn seed_voucher(
        &self,
        code: &str,
        discount_type: DiscountType,
        discount_value: Decimal,
        max_discount_amount: Option<Decimal>,
        min_order_value: Option<Decimal>,
        usage_limit: Option<i32>,
        active_window: bool,
    ) -> voucher::Model {
        let now = Utc::now();
        let (start, end) = if active_window {
            (now - Duration::days(1), now + Duration::days(30))
        } else {
            (now - Duration::days(30), now - Duration::days(1))
        };

        voucher::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            min_order_value: Set(min_order_value),
            max_discount_amount: Set(max_discount_amount),
            usage_limit: Set(usage_limit),
            start_date: Set(start),
            end_date: Set(end),
            status: Set(VoucherStatus::Active),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed voucher")
    }

    /// Current stock for a product, read outside any transaction.
    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("stock query failed")
            .expect("product missing")
            .stock
    }

    /// Remaining usage budget for a voucher code.
    pub async fn usage_left(&self, code: &str) -> Option<i32> {
        voucher::Entity::find()
            .filter(voucher::Column::Code.eq(code))
            .one(&*self.state.db)
            .await
            .expect("voucher query failed")
            .expect("voucher missing")
            .usage_limit
    }

    /// Number of items currently in a customer's cart.
    pub async fn cart_item_count(&self, customer_id: Uuid) -> usize {
        self.state
            .cart_service()
            .get_cart_with_items(customer_id)
            .await
            .expect("cart query failed")
            .items
            .len()
    }
}

/// A plain checkout request with the given method and optional voucher.
pub fn checkout_request(
    method: PaymentMethod,
    voucher_code: Option<&str>,
) -> CheckoutRequest {
    CheckoutRequest {
        shipping_name: "Nguyen Van A".to_string(),
        shipping_phone: "0901234567".to_string(),
        shipping_address: "12 Le Loi, District 1".to_string(),
        payment_method: method,
        voucher_code: voucher_code.map(str::to_string),
        note: None,
        items: Vec::new(),
    }
}
