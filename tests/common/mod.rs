#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use barista_api::{
    api_v1_routes,
    config::AppConfig,
    db,
    entities::{branch, product, product_variant},
    events::{self, EventSender},
    handlers::AppServices,
    services::orders::{CreateOrderItem, CreateOrderRequest},
    AppState,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Helper harness: application services backed by a file-based SQLite
/// database in a fresh temp directory, so pooled connections all see the
/// same schema.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub event_sender: Arc<EventSender>,
    pub services: AppServices,
    _event_task: tokio::task::JoinHandle<()>,
    _tmp: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let db_path = tmp.path().join("barista_test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = db::establish_connection(&url)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let db = Arc::new(pool);
        let services = AppServices::new(db.clone(), event_sender.clone(), None);

        Self {
            db,
            event_sender,
            services,
            _event_task: event_task,
            _tmp: tmp,
        }
    }

    /// Builds the v1 API router over this app's state, for request-level
    /// tests driven through `tower::ServiceExt::oneshot`.
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            db: self.db.clone(),
            config: AppConfig::new(
                "sqlite://unused".to_string(),
                "127.0.0.1".to_string(),
                0,
                "test".to_string(),
            ),
            event_sender: (*self.event_sender).clone(),
            services: self.services.clone(),
        });

        Router::new().nest("/api/v1", api_v1_routes()).with_state(state)
    }
}

/// Inserts a pickup branch and returns its id.
pub async fn setup_branch(app: &TestApp) -> Uuid {
    let branch_id = Uuid::new_v4();
    let branch = branch::ActiveModel {
        id: Set(branch_id),
        name: Set("Katipunan Branch".to_string()),
        street: Set("321 Katipunan Ave".to_string()),
        city: Set("Quezon City".to_string()),
        zipcode: Set("1108".to_string()),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };
    branch
        .insert(&*app.db)
        .await
        .expect("failed to create test branch");
    branch_id
}

/// Inserts a product with a single variant and returns the variant id.
pub async fn setup_variant(app: &TestApp, price: Decimal, stock: i32) -> Uuid {
    setup_named_variant(app, "House Blend", "250g", price, stock).await
}

pub async fn setup_named_variant(
    app: &TestApp,
    product_name: &str,
    variant_name: &str,
    price: Decimal,
    stock: i32,
) -> Uuid {
    let product_id = Uuid::new_v4();
    let product = product::ActiveModel {
        id: Set(product_id),
        name: Set(product_name.to_string()),
        description: Set(None),
        category: Set(Some("coffee".to_string())),
        image_url: Set(None),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };
    product
        .insert(&*app.db)
        .await
        .expect("failed to create test product");

    let variant_id = Uuid::new_v4();
    let variant = product_variant::ActiveModel {
        id: Set(variant_id),
        product_id: Set(product_id),
        name: Set(variant_name.to_string()),
        price: Set(price),
        stock_quantity: Set(stock),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };
    variant
        .insert(&*app.db)
        .await
        .expect("failed to create test variant");

    variant_id
}

/// The product id a variant belongs to.
pub async fn product_of(app: &TestApp, variant_id: Uuid) -> Uuid {
    use sea_orm::EntityTrait;
    product_variant::Entity::find_by_id(variant_id)
        .one(&*app.db)
        .await
        .expect("query failed")
        .expect("variant missing")
        .product_id
}

/// Builds a create-order request for (variant, quantity, unit_price)
/// selections with a 2% tax line and a consistent total.
pub fn order_request(branch_id: Uuid, selections: &[(Uuid, i32, Decimal)]) -> CreateOrderRequest {
    let items: Vec<CreateOrderItem> = selections
        .iter()
        .map(|(variant_id, quantity, unit_price)| CreateOrderItem {
            product_variant_id: *variant_id,
            quantity: *quantity,
            unit_price: *unit_price,
            total_price: *unit_price * Decimal::from(*quantity),
        })
        .collect();

    let subtotal: Decimal = items.iter().map(|i| i.total_price).sum();
    let tax = (subtotal * Decimal::new(2, 2)).round_dp(2);

    CreateOrderRequest {
        full_name: "Juan dela Cruz".to_string(),
        email: "juan@example.com".to_string(),
        phone: "+63-917-000-0000".to_string(),
        branch_id,
        notes: None,
        items,
        subtotal,
        tax,
        discount: Decimal::ZERO,
        total: subtotal + tax,
    }
}

/// Current stock counter for a variant.
pub async fn stock_of(app: &TestApp, variant_id: Uuid) -> i32 {
    use sea_orm::EntityTrait;
    product_variant::Entity::find_by_id(variant_id)
        .one(&*app.db)
        .await
        .expect("query failed")
        .expect("variant missing")
        .stock_quantity
}
