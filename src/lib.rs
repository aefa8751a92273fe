//! barista-api
//!
//! Backend for a coffee-shop storefront: carts, order creation, payment
//! settlement with an atomic stock ledger, a PayPal capture path, and
//! back-office order lifecycle transitions.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

// Common response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

/// Full v1 API surface
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/carts", handlers::carts::carts_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/payments", handlers::payments::payments_routes())
        .nest("/paypal", handlers::paypal::paypal_routes())
        .nest("/products", handlers::catalog::products_routes())
        .nest("/branches", handlers::catalog::branches_routes())
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_response_carries_data() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, Some("ok"));
        assert!(response.message.is_none());
    }

    #[test]
    fn error_response_carries_message() {
        let response = ApiResponse::<()>::error("oops".into());
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.message.as_deref(), Some("oops"));
    }
}
