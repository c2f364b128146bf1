use crate::{
    entities::{
        cart::{self, Entity as CartEntity, Model as CartModel},
        cart_item::{self, Entity as CartItemEntity, Model as CartItemModel},
        product::{Entity as ProductEntity, ProductStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A cart together with its line items, for display.
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
}

/// Cart management: one cart per customer, items carry a price snapshot
/// taken at add time. The snapshot is advisory; checkout re-prices from
/// the live catalog.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Fetches the customer's cart, creating an empty one on first use.
    pub async fn get_or_create_cart(
        &self,
        customer_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        if let Some(existing) = CartEntity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: Set(now),
            updated_at: Set(None),
        };

        let created = cart.insert(&*self.db).await?;
        info!(customer_id = %customer_id, cart_id = %created.id, "cart created");
        Ok(created)
    }

    /// Adds a product to the cart, stacking the quantity when the
    /// product is already present. Snapshots the current discounted
    /// price on the line.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("product {} not found", product_id))
            })?;

        if product.status != ProductStatus::Active {
            return Err(ServiceError::InvalidOperation(format!(
                "product {} is not available",
                product.name
            )));
        }

        let cart = self.get_or_create_cart(customer_id).await?;
        let now = Utc::now();

        let existing = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        match existing {
            Some(item) => {
                let new_quantity = item.quantity + quantity;
                let mut update: cart_item::ActiveModel = item.into();
                update.quantity = Set(new_quantity);
                update.updated_at = Set(Some(now));
                update.update(&*self.db).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    unit_price: Set(product.discounted_price()),
                    created_at: Set(now),
                    updated_at: Set(None),
                };
                item.insert(&*self.db).await?;
            }
        }

        if let Err(e) = self
            .event_sender
            .send(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
            })
            .await
        {
            warn!(error = %e, "failed to send cart event");
        }

        self.get_cart_with_items(customer_id).await
    }

    /// Sets the quantity of a cart line; zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "quantity must not be negative".to_string(),
            ));
        }

        let cart = self.require_cart(customer_id).await?;
        let item = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "product {} is not in the cart",
                    product_id
                ))
            })?;

        if quantity == 0 {
            item.delete(&*self.db).await?;
        } else {
            let mut update: cart_item::ActiveModel = item.into();
            update.quantity = Set(quantity);
            update.updated_at = Set(Some(Utc::now()));
            update.update(&*self.db).await?;
        }

        self.get_cart_with_items(customer_id).await
    }

    /// Removes a product from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let cart = self.require_cart(customer_id).await?;

        CartItemEntity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        self.get_cart_with_items(customer_id).await
    }

    /// Empties the cart.
    #[instrument(skip(self))]
    pub async fn clear(&self, customer_id: Uuid) -> Result<(), ServiceError> {
        let cart = self.require_cart(customer_id).await?;
        CartItemEntity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Fetches the cart with its items for display.
    pub async fn get_cart_with_items(
        &self,
        customer_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        let items = cart.find_related(CartItemEntity).all(&*self.db).await?;
        Ok(CartWithItems { cart, items })
    }

    async fn require_cart(&self, customer_id: Uuid) -> Result<CartModel, ServiceError> {
        CartEntity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "customer {} has no cart",
                    customer_id
                ))
            })
    }
}
