use crate::{
    entities::voucher::{self, DiscountType, Entity as VoucherEntity, Model as VoucherModel, VoucherStatus},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of applying a voucher to a subtotal.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedVoucher {
    pub voucher_id: Uuid,
    pub code: String,
    pub discount_amount: Decimal,
}

/// Voucher validator: checks a discount code against a subtotal and
/// consumes one unit of its usage budget.
///
/// Policy: any invalid voucher (unknown, inactive, out of window,
/// exhausted, or below minimum order value) is a hard
/// [`ServiceError::InvalidVoucher`] — never a silent zero discount.
#[derive(Clone)]
pub struct VoucherService {
    db: Arc<DatabaseConnection>,
}

impl VoucherService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Computes the discount a code would yield for `subtotal` without
    /// consuming the usage budget. Used to quote before checkout.
    pub async fn preview(
        &self,
        code: &str,
        subtotal: Decimal,
    ) -> Result<AppliedVoucher, ServiceError> {
        let voucher = Self::find_usable(&*self.db, code).await?;
        let discount_amount = Self::discount_for(&voucher, subtotal)?;
        Ok(AppliedVoucher {
            voucher_id: voucher.id,
            code: voucher.code,
            discount_amount,
        })
    }

    /// Validates `code` against `subtotal` and consumes one use of a
    /// finite budget, all on the caller's transaction. Rules, in order:
    /// existence + active status + date window; finite budget > 0;
    /// subtotal at or above the minimum order value; discount computed
    /// per type, capped, and never exceeding the subtotal.
    ///
    /// The budget decrement is guarded (`usage_limit > 0` in the WHERE
    /// clause), so two racing orders cannot both consume the last use.
    pub async fn validate_and_consume<C: ConnectionTrait>(
        conn: &C,
        code: &str,
        subtotal: Decimal,
    ) -> Result<AppliedVoucher, ServiceError> {
        let voucher = Self::find_usable(conn, code).await?;
        let discount_amount = Self::discount_for(&voucher, subtotal)?;

        if voucher.usage_limit.is_some() {
            let result = VoucherEntity::update_many()
                .col_expr(
                    voucher::Column::UsageLimit,
                    Expr::col(voucher::Column::UsageLimit).sub(1),
                )
                .filter(voucher::Column::Id.eq(voucher.id))
                .filter(voucher::Column::UsageLimit.gt(0))
                .exec(conn)
                .await?;

            if result.rows_affected == 0 {
                warn!(code, "voucher usage budget exhausted during checkout");
                return Err(ServiceError::InvalidVoucher(format!(
                    "voucher {} has no remaining uses",
                    code
                )));
            }
        }

        debug!(code, %discount_amount, "voucher applied");
        Ok(AppliedVoucher {
            voucher_id: voucher.id,
            code: voucher.code,
            discount_amount,
        })
    }

    async fn find_usable<C: ConnectionTrait>(
        conn: &C,
        code: &str,
    ) -> Result<VoucherModel, ServiceError> {
        let now = Utc::now();

        let voucher = VoucherEntity::find()
            .filter(voucher::Column::Code.eq(code))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidVoucher(format!("voucher {} does not exist", code))
            })?;

        if voucher.status != VoucherStatus::Active {
            return Err(ServiceError::InvalidVoucher(format!(
                "voucher {} is inactive",
                code
            )));
        }
        if now < voucher.start_date || now > voucher.end_date {
            return Err(ServiceError::InvalidVoucher(format!(
                "voucher {} is outside its validity window",
                code
            )));
        }
        if let Some(limit) = voucher.usage_limit {
            if limit <= 0 {
                return Err(ServiceError::InvalidVoucher(format!(
                    "voucher {} has no remaining uses",
                    code
                )));
            }
        }

        Ok(voucher)
    }

    /// Pure discount computation: percent of subtotal or fixed amount,
    /// capped by `max_discount_amount` when set and non-zero, and never
    /// more than the subtotal itself.
    fn discount_for(
        voucher: &VoucherModel,
        subtotal: Decimal,
    ) -> Result<Decimal, ServiceError> {
        if let Some(min_order) = voucher.min_order_value {
            if subtotal < min_order {
                return Err(ServiceError::InvalidVoucher(format!(
                    "order subtotal {} is below the voucher minimum {}",
                    subtotal, min_order
                )));
            }
        }

        let raw = match voucher.discount_type {
            DiscountType::Percent => {
                subtotal * voucher.discount_value / Decimal::from(100)
            }
            DiscountType::Fixed => voucher.discount_value,
        };

        let capped = match voucher.max_discount_amount {
            Some(cap) if cap > Decimal::ZERO => raw.min(cap),
            _ => raw,
        };

        Ok(capped.min(subtotal).max(Decimal::ZERO))
    }
}
