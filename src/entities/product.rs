use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product. The checkout core reads the live price and discount
/// and mutates only the `stock` column, always inside the order-creation
/// transaction.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    /// Product-level discount in whole percent, 0-100
    pub discount_percent: i32,
    /// Available quantity; never negative (guarded decrement)
    pub stock: i32,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ProductStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
}

impl Model {
    /// Live unit price after the product-level discount. This, not the
    /// price cached in the cart, is what checkout charges.
    pub fn discounted_price(&self) -> Decimal {
        let percent = self.discount_percent.clamp(0, 100);
        self.price * Decimal::from(100 - percent) / Decimal::from(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(price: Decimal, discount_percent: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Jasmine rice 5kg".into(),
            price,
            discount_percent,
            stock: 10,
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn discounted_price_applies_percent() {
        assert_eq!(product(dec!(25000), 0).discounted_price(), dec!(25000));
        assert_eq!(product(dec!(20000), 25).discounted_price(), dec!(15000));
    }

    #[test]
    fn discounted_price_clamps_bogus_percent() {
        assert_eq!(product(dec!(10000), 150).discounted_price(), dec!(0));
        assert_eq!(product(dec!(10000), -10).discounted_price(), dec!(10000));
    }
}
