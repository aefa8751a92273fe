use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::common::success_response;
use crate::{errors::ServiceError, AppState};

/// Creates the router for product catalog endpoints
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}

/// Creates the router for branch endpoints
pub fn branches_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_branches))
}

async fn list_products(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let products = state.services.catalog.list_products().await?;
    Ok(success_response(products))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(success_response(product))
}

async fn list_branches(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let branches = state.services.catalog.list_branches().await?;
    Ok(success_response(branches))
}
