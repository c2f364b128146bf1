use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

/// Payment record for an order. One active payment per order in
/// practice; lifecycle is governed by [`PaymentStatus::can_transition`].
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    /// Merchant-side reference, unique, handed to gateways and callbacks
    #[sea_orm(unique)]
    pub payment_code: String,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub status: PaymentStatus,
    /// Gateway-issued id, present once settled
    pub transaction_id: Option<String>,
    /// Locally generated QR/transfer reference for QR-based methods
    pub qr_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Closed payment-method vocabulary. Dispatch over this enum is
/// compile-checked; adding a gateway means adding a variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "cod")]
    Cod,
    #[sea_orm(string_value = "bank_transfer")]
    BankTransfer,
    #[sea_orm(string_value = "momo")]
    Momo,
    #[sea_orm(string_value = "zalopay")]
    ZaloPay,
    #[sea_orm(string_value = "paypal")]
    PayPal,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "awaiting_confirmation")]
    AwaitingConfirmation,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl PaymentStatus {
    /// Legal state-machine transitions. Callback-driven success from
    /// `created`, `processing` and `awaiting_confirmation`; settlement
    /// outcome from `processing`; manual confirmation from
    /// `awaiting_confirmation`; refund only from `success`.
    pub fn can_transition(self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, to),
            (Created, Success)
                | (AwaitingConfirmation, Success)
                | (Processing, Success)
                | (Processing, Failed)
                | (Success, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }
}

#[cfg(test)]
mod tests {
    use super::PaymentStatus::*;

    #[test]
    fn settlement_transitions() {
        assert!(Processing.can_transition(Success));
        assert!(Processing.can_transition(Failed));
        assert!(AwaitingConfirmation.can_transition(Success));
        assert!(Created.can_transition(Success));
        assert!(Success.can_transition(Refunded));
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(!Failed.can_transition(Success));
        assert!(!Refunded.can_transition(Success));
        assert!(!Success.can_transition(Failed));
        assert!(!Created.can_transition(Refunded));
        assert!(!AwaitingConfirmation.can_transition(Failed));
    }
}
