use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::common::{no_content_response, success_response};
use crate::{errors::ServiceError, services::carts::AddToCartInput, AppState};

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:customer_id", get(list_cart))
        .route("/:customer_id/items", post(add_to_cart))
        .route("/:customer_id/items/:item_id", put(update_cart_item))
        .route("/:customer_id/items/:item_id", delete(remove_cart_item))
        .route("/:customer_id/clear", post(clear_cart))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// Add item to cart (cart is created lazily on first add)
async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    payload.validate().map_err(ServiceError::from)?;

    let outcome = state
        .services
        .cart
        .add_item(
            customer_id,
            AddToCartInput {
                product_id: payload.product_id,
                variant_id: payload.variant_id,
                quantity: payload.quantity,
            },
        )
        .await?;

    Ok(success_response(outcome))
}

/// List cart items with live stock data
async fn list_cart(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let items = state.services.cart.list_items(customer_id).await?;
    Ok(success_response(items))
}

/// Update cart item quantity
async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    payload.validate().map_err(ServiceError::from)?;

    state
        .services
        .cart
        .update_item_quantity(customer_id, item_id, payload.quantity)
        .await?;

    Ok(no_content_response())
}

/// Remove item from cart
async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    state.services.cart.remove_item(customer_id, item_id).await?;
    Ok(no_content_response())
}

/// Clear all items from cart (idempotent)
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    state.services.cart.clear(customer_id).await?;
    Ok(success_response(serde_json::json!({
        "message": "Cart cleared successfully"
    })))
}
