use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discount voucher with a bounded usage budget.
///
/// `usage_limit` is the remaining-use counter: `None` means unlimited;
/// once finite it only ever decreases, and never below zero (the
/// decrement is guarded by `usage_limit > 0` in the WHERE clause).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_value: Option<Decimal>,
    /// Cap on the computed discount; only meaningful for percent vouchers
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: VoucherStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum DiscountType {
    #[sea_orm(string_value = "percent")]
    Percent,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum VoucherStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
}
