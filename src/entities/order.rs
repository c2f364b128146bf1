use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use super::payment::PaymentMethod;

/// Persisted order. `total_amount` and the line items are immutable
/// after the creating transaction commits; only `status` may change,
/// through the transitions in [`OrderStatus::can_transition`].
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub shipping_name: String,
    pub shipping_phone: String,
    pub shipping_address: String,
    pub note: Option<String>,
    /// `max(0, subtotal - discount_amount)` at the moment of purchase
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub voucher_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Closed order-status vocabulary. One-directional except that a
/// `pending` order may be cancelled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "delivered")]
    Delivered,
}

impl OrderStatus {
    pub fn can_transition(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Processing) | (Pending, Cancelled) | (Processing, Delivered)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn transitions_are_one_directional() {
        assert!(Pending.can_transition(Processing));
        assert!(Pending.can_transition(Cancelled));
        assert!(Processing.can_transition(Delivered));

        assert!(!Processing.can_transition(Pending));
        assert!(!Processing.can_transition(Cancelled));
        assert!(!Cancelled.can_transition(Pending));
        assert!(!Delivered.can_transition(Processing));
    }

    #[test]
    fn terminal_states() {
        assert!(Cancelled.is_terminal());
        assert!(Delivered.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!Processing.is_terminal());
    }
}
