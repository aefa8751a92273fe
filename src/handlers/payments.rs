use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::common::created_response;
use crate::{
    entities::payment::PaymentMethod,
    errors::ServiceError,
    services::payments::{CardDetails, PaymentDetails},
    AppState,
};

/// Creates the router for payment endpoints
pub fn payments_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(process_payment))
}

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    pub order_id: Uuid,
    /// One of: cash, cash_on_pickup, card, gcash, paypal
    pub payment_method: String,
    pub amount: Decimal,
    pub card_details: Option<CardDetails>,
}

/// Settle a previously created order (checkout step 2)
async fn process_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProcessPaymentRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let method = PaymentMethod::parse(&payload.payment_method).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Invalid payment method: {}",
            payload.payment_method
        ))
    })?;

    let receipt = state
        .services
        .payments
        .process_payment(
            payload.order_id,
            method,
            PaymentDetails {
                amount: payload.amount,
                card: payload.card_details,
            },
        )
        .await?;

    Ok(created_response(receipt))
}
