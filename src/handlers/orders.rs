use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::common::{created_response, success_response, PaginationParams};
use crate::{
    entities::order::OrderStatus, errors::ServiceError, services::orders::CreateOrderRequest,
    AppState,
};

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/payment", get(get_order_payment))
        .route("/:id/status", put(update_order_status))
        .route("/:id/cancel", post(cancel_order))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    /// Owning customer; absent for guest checkout
    pub customer_id: Option<Uuid>,
    #[serde(flatten)]
    pub order: CreateOrderRequest,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub order_number: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Create an order with its line items (checkout step 1). Payment is a
/// separate call against the returned order id.
async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderBody>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .create_order(payload.customer_id, payload.order)
        .await?;

    Ok(created_response(CreateOrderResponse {
        order_id: order.id,
        order_number: order.order_number,
    }))
}

/// List orders with pagination (back office)
async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let orders = state
        .services
        .orders
        .list_orders(params.page, params.per_page)
        .await?;
    Ok(success_response(orders))
}

/// Get an order with branch and items
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let details = state.services.orders.get_order(id).await?;
    Ok(success_response(details))
}

/// Get the order's most recent payment record
async fn get_order_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let payment = state.services.orders.get_order_payment(id).await?;
    Ok(success_response(payment))
}

/// Back-office status transition
async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .update_order_status(id, payload.status)
        .await?;
    Ok(success_response(order))
}

/// Back-office cancellation. Does not restore settled stock.
async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let order = state.services.orders.cancel_order(id).await?;
    Ok(success_response(order))
}
