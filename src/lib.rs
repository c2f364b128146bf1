//! GrocerMart API Library
//!
//! This crate provides the checkout and payment core for the GrocerMart
//! grocery storefront: converting carts into durable orders inside one
//! atomic unit of work, and driving payment records through a
//! multi-method settlement state machine.
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::{
    carts::CartService, checkout::CheckoutService, orders::OrderService,
    payments::PaymentService, vouchers::VoucherService,
};

/// Shared application state wiring the database, configuration and
/// services together. Hosts (servers, jobs, tests) construct one of
/// these and hand out the services.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

#[derive(Clone)]
pub struct AppServices {
    pub carts: Arc<CartService>,
    pub vouchers: Arc<VoucherService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let carts = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let vouchers = Arc::new(VoucherService::new(db.clone()));
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(orders.clone()));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            event_sender.clone(),
            config.payment.clone(),
        ));

        Self {
            db,
            config,
            event_sender,
            services: AppServices {
                carts,
                vouchers,
                orders,
                checkout,
                payments,
            },
        }
    }

    pub fn checkout_service(&self) -> Arc<CheckoutService> {
        self.services.checkout.clone()
    }

    pub fn payment_service(&self) -> Arc<PaymentService> {
        self.services.payments.clone()
    }

    pub fn order_service(&self) -> Arc<OrderService> {
        self.services.orders.clone()
    }

    pub fn cart_service(&self) -> Arc<CartService> {
        self.services.carts.clone()
    }
}
