use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::warn;
use uuid::Uuid;

use crate::{
    entities::product_variant::{self, Entity as ProductVariantEntity},
    errors::ServiceError,
};

/// Atomic compare-and-decrement of a variant's stock counter.
///
/// Issues a single conditional update:
///
/// ```sql
/// UPDATE product_variants
///    SET stock_quantity = stock_quantity - ?
///  WHERE id = ? AND stock_quantity >= ?
/// ```
///
/// The guard and the decrement are one statement, so two concurrent
/// settlements racing for the last unit cannot both succeed: exactly one
/// affects a row, the other observes zero affected rows and fails with
/// `InsufficientStock`. Callers must run this on the settlement
/// transaction handle so a failed line item rolls the whole settlement
/// back.
pub async fn try_decrement<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::ValidationError(format!(
            "decrement quantity must be at least 1, got {}",
            quantity
        )));
    }

    let result = ProductVariantEntity::update_many()
        .col_expr(
            product_variant::Column::StockQuantity,
            Expr::col(product_variant::Column::StockQuantity).sub(quantity),
        )
        .col_expr(
            product_variant::Column::UpdatedAt,
            Expr::value(chrono::Utc::now()),
        )
        .filter(product_variant::Column::Id.eq(variant_id))
        .filter(product_variant::Column::StockQuantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        // Zero rows: either the variant is gone or the stock ran short.
        // Re-read for the error payload; the read races with other writers
        // but is only used for display.
        let available = ProductVariantEntity::find_by_id(variant_id)
            .one(conn)
            .await?
            .map(|v| v.stock_quantity)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product variant {} not found", variant_id))
            })?;

        warn!(%variant_id, requested = quantity, available, "stock decrement rejected");
        return Err(ServiceError::InsufficientStock {
            variant_id,
            requested: quantity,
            available,
        });
    }

    Ok(())
}

/// Current stock level for a variant.
pub async fn available<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
) -> Result<i32, ServiceError> {
    ProductVariantEntity::find_by_id(variant_id)
        .one(conn)
        .await?
        .map(|v| v.stock_quantity)
        .ok_or_else(|| ServiceError::NotFound(format!("Product variant {} not found", variant_id)))
}
