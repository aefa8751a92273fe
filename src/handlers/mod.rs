pub mod carts;
pub mod catalog;
pub mod common;
pub mod orders;
pub mod payments;
pub mod paypal;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    events::EventSender,
    services::{CartService, CatalogService, OrderService, PayPalService, PaymentService},
};

/// Services shared by the HTTP handlers through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub cart: CartService,
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub payments: PaymentService,
    /// Present only when PayPal credentials are configured.
    pub paypal: Option<PayPalService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        paypal: Option<PayPalService>,
    ) -> Self {
        Self {
            cart: CartService::new(db.clone(), event_sender.clone()),
            catalog: CatalogService::new(db.clone()),
            orders: OrderService::new(db.clone(), event_sender.clone()),
            payments: PaymentService::new(db, event_sender),
            paypal,
        }
    }
}
