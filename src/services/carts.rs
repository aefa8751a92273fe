use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        cart::{self, Entity as CartEntity},
        cart_item::{self, Entity as CartItemEntity},
        product::Entity as ProductEntity,
        product_variant::Entity as ProductVariantEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Shopping cart service. The cart is the shopper's tentative selection:
/// no stock is checked or reserved here — stock is validated only at
/// settlement time, so a cart may legitimately hold more units than are
/// currently available.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Adds a selection to the customer's cart, creating the cart lazily
    /// on first use. An existing (product, variant) row has its quantity
    /// incremented instead of a duplicate being inserted.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddToCartInput,
    ) -> Result<AddItemOutcome, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let variant = ProductVariantEntity::find_by_id(input.variant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product variant {} not found", input.variant_id))
            })?;

        if variant.product_id != input.product_id {
            return Err(ServiceError::ValidationError(format!(
                "Variant {} does not belong to product {}",
                input.variant_id, input.product_id
            )));
        }

        let cart = self.find_or_create_cart(&txn, customer_id).await?;

        let existing_item = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(cart_item::Column::VariantId.eq(input.variant_id))
            .one(&txn)
            .await?;

        let (item_id, updated) = if let Some(item) = existing_item {
            let item_id = item.id;
            let current_quantity = item.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(current_quantity + input.quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
            (item_id, true)
        } else {
            let item_id = Uuid::new_v4();
            let item = cart_item::ActiveModel {
                id: Set(item_id),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                variant_id: Set(input.variant_id),
                quantity: Set(input.quantity),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
            (item_id, false)
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                variant_id: input.variant_id,
            })
            .await;

        info!(
            %customer_id,
            variant_id = %input.variant_id,
            quantity = input.quantity,
            updated,
            "added item to cart"
        );

        Ok(AddItemOutcome {
            cart_id: cart.id,
            item_id,
            updated_existing: updated,
        })
    }

    /// Removes an item. NotFound when the item does not exist or belongs
    /// to another customer's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, customer_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let item = self.find_owned_item(customer_id, item_id).await?;

        CartItemEntity::delete_by_id(item.id).exec(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: item.cart_id,
                item_id,
            })
            .await;

        Ok(())
    }

    /// Sets an item's quantity. Quantities below 1 are rejected; removal
    /// is an explicit, separate operation.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let item = self.find_owned_item(customer_id, item_id).await?;
        let cart_id = item.cart_id;

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated { cart_id, item_id })
            .await;

        Ok(())
    }

    /// Lists the customer's cart joined with live product/variant data.
    /// `stock_quantity` is the current counter, so callers can flag
    /// selections that can no longer be fulfilled before checkout.
    #[instrument(skip(self))]
    pub async fn list_items(&self, customer_id: Uuid) -> Result<Vec<CartItemView>, ServiceError> {
        let cart = CartEntity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?;

        let Some(cart) = cart else {
            return Ok(Vec::new());
        };

        let rows = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(ProductVariantEntity)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = rows.iter().map(|(item, _)| item.product_id).collect();
        let products: HashMap<Uuid, String> = ProductEntity::find()
            .filter(crate::entities::product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut views = Vec::with_capacity(rows.len());
        for (item, variant) in rows {
            let variant = variant.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "cart item {} references missing variant {}",
                    item.id, item.variant_id
                ))
            })?;
            let product_name = products.get(&item.product_id).cloned().unwrap_or_default();
            views.push(CartItemView {
                item_id: item.id,
                product_id: item.product_id,
                product_name,
                variant_id: variant.id,
                variant_name: variant.name,
                unit_price: variant.price,
                quantity: item.quantity,
                line_total: variant.price * Decimal::from(item.quantity),
                stock_quantity: variant.stock_quantity,
                insufficient_stock: variant.stock_quantity < item.quantity,
            });
        }

        Ok(views)
    }

    /// Deletes every item in the customer's cart. Idempotent: clearing an
    /// absent or already-empty cart succeeds.
    #[instrument(skip(self))]
    pub async fn clear(&self, customer_id: Uuid) -> Result<(), ServiceError> {
        let cart_id = clear_customer_cart(&*self.db, customer_id).await?;

        if let Some(cart_id) = cart_id {
            self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;
        }

        Ok(())
    }

    async fn find_or_create_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = CartEntity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?
        {
            return Ok(existing);
        }

        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        Ok(cart.insert(conn).await?)
    }

    async fn find_owned_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        let cart = CartEntity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        CartItemEntity::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))
    }
}

/// Deletes all cart items for a customer on the given connection. Used by
/// the settlement paths inside their transaction so the clear commits or
/// rolls back with the payment. Returns the cart id when one existed.
pub async fn clear_customer_cart<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
) -> Result<Option<Uuid>, ServiceError> {
    let cart = CartEntity::find()
        .filter(cart::Column::CustomerId.eq(customer_id))
        .one(conn)
        .await?;

    let Some(cart) = cart else {
        return Ok(None);
    };

    CartItemEntity::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(conn)
        .await?;

    Ok(Some(cart.id))
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
}

/// Result of an add: whether an existing row absorbed the quantity
#[derive(Debug, Serialize)]
pub struct AddItemOutcome {
    pub cart_id: Uuid,
    pub item_id: Uuid,
    pub updated_existing: bool,
}

/// Cart item joined with live catalog data
#[derive(Debug, Serialize)]
pub struct CartItemView {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub variant_id: Uuid,
    pub variant_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub stock_quantity: i32,
    pub insufficient_stock: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_total_uses_live_unit_price() {
        let unit_price = dec!(120.00);
        let quantity = 3;
        assert_eq!(unit_price * Decimal::from(quantity), dec!(360.00));
    }

    #[test]
    fn insufficient_stock_flag_compares_quantity_to_live_stock() {
        let view = CartItemView {
            item_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Espresso Blend".into(),
            variant_id: Uuid::new_v4(),
            variant_name: "250g".into(),
            unit_price: dec!(340.00),
            quantity: 4,
            line_total: dec!(1360.00),
            stock_quantity: 2,
            insufficient_stock: 2 < 4,
        };
        assert!(view.insufficient_stock);
    }

    #[test]
    fn add_to_cart_input_deserialization() {
        let json = r#"{
            "product_id": "550e8400-e29b-41d4-a716-446655440000",
            "variant_id": "550e8400-e29b-41d4-a716-446655440001",
            "quantity": 2
        }"#;
        let input: AddToCartInput = serde_json::from_str(json).expect("deserialize");
        assert_eq!(input.quantity, 2);
    }
}
