use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::common::{created_response, success_response};
use crate::{errors::ServiceError, services::orders::CreateOrderRequest, AppState};

/// Creates the router for the PayPal checkout path
pub fn paypal_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_paypal_order))
        .route("/capture", post(capture_paypal_payment))
}

#[derive(Debug, Deserialize)]
pub struct CreatePayPalOrderRequest {
    /// Explicit session reference: the pending payload is keyed by this
    /// id and consumed by the matching capture call.
    pub session_id: String,
    pub customer_id: Option<Uuid>,
    pub order_data: CreateOrderRequest,
}

#[derive(Debug, Serialize)]
pub struct CreatePayPalOrderResponse {
    /// PayPal's order id — no local order exists yet
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CapturePayPalRequest {
    pub session_id: String,
    /// PayPal's order id returned by the create call
    pub order_id: String,
}

async fn create_paypal_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePayPalOrderRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let paypal = state.services.paypal.as_ref().ok_or_else(|| {
        ServiceError::InvalidOperation("PayPal payments are not enabled".to_string())
    })?;

    if payload.session_id.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "session_id is required".to_string(),
        ));
    }

    let order_id = paypal
        .create_paypal_order(&payload.session_id, payload.customer_id, payload.order_data)
        .await?;

    Ok(created_response(CreatePayPalOrderResponse { order_id }))
}

async fn capture_paypal_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CapturePayPalRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let paypal = state.services.paypal.as_ref().ok_or_else(|| {
        ServiceError::InvalidOperation("PayPal payments are not enabled".to_string())
    })?;

    let receipt = paypal
        .capture_payment(&payload.session_id, &payload.order_id)
        .await?;

    Ok(success_response(receipt))
}
