use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        branch::{self, Entity as BranchEntity},
        product::{self, Entity as ProductEntity},
        product_variant::{self, Entity as ProductVariantEntity},
    },
    errors::ServiceError,
};

/// Product with its purchasable variants and live stock
#[derive(Debug, Serialize)]
pub struct ProductWithVariants {
    #[serde(flatten)]
    pub product: product::Model,
    pub variants: Vec<product_variant::Model>,
}

/// Read-only catalog for the storefront: products with variants (live
/// stock included, so clients can flag short selections pre-checkout)
/// and pickup branches.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<ProductWithVariants>, ServiceError> {
        let products = ProductEntity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name)
            .find_with_related(ProductVariantEntity)
            .all(&*self.db)
            .await?;

        Ok(products
            .into_iter()
            .map(|(product, variants)| ProductWithVariants { product, variants })
            .collect())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductWithVariants, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let variants = ProductVariantEntity::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;

        Ok(ProductWithVariants { product, variants })
    }

    #[instrument(skip(self))]
    pub async fn list_branches(&self) -> Result<Vec<branch::Model>, ServiceError> {
        Ok(BranchEntity::find()
            .filter(branch::Column::IsActive.eq(true))
            .order_by_asc(branch::Column::Name)
            .all(&*self.db)
            .await?)
    }
}
