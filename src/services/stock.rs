use crate::{
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Stock ledger: bounded reads and guarded decrements of per-product
/// availability.
///
/// `check_and_reserve` must only be called on the caller's active
/// transaction; on failure the caller aborts the whole transaction,
/// which is the only release path (there is no separate reservation
/// protocol).
pub struct StockLedger;

impl StockLedger {
    /// Atomically checks availability and decrements stock by
    /// `quantity` in a single guarded UPDATE:
    ///
    /// `UPDATE products SET stock = stock - q WHERE id = ? AND stock >= q`
    ///
    /// Zero affected rows means the product is missing or understocked,
    /// so two concurrent checkouts can never both take the last unit.
    pub async fn check_and_reserve<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be at least 1, got {}",
                quantity
            )));
        }

        let result = ProductEntity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(%product_id, quantity, "stock reservation rejected");
            return Err(ServiceError::InsufficientStock {
                product_id,
                requested: quantity,
            });
        }

        debug!(%product_id, quantity, "stock reserved");
        Ok(())
    }

    /// Reads the currently available quantity for a product.
    pub async fn available<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("product {} not found", product_id))
            })?;
        Ok(product.stock)
    }
}
