use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Json, Router};
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use barista_api as api;
use barista_api::services::paypal::{PayPalClient, PayPalService, PendingOrderStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // PayPal path is served only when credentials are configured
    let paypal_service = if cfg.paypal_enabled() {
        let client = Arc::new(PayPalClient::from_config(&cfg)?);
        let store = Arc::new(PendingOrderStore::new(Duration::from_secs(
            cfg.pending_order_ttl_secs,
        )));

        // Bound the store's memory: expired payloads are also dropped
        // lazily on read, this sweep just keeps abandoned ones from piling up.
        let sweep_store = store.clone();
        let sweep_interval = Duration::from_secs(cfg.pending_order_ttl_secs.max(60) / 2);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                sweep_store.purge_expired();
            }
        });

        info!("PayPal checkout path enabled ({})", cfg.paypal_base_url);
        Some(PayPalService::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            client,
            store,
        ))
    } else {
        info!("PayPal credentials not configured; PayPal checkout path disabled");
        None
    };

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        Arc::new(event_sender.clone()),
        paypal_service,
    );

    // Compose shared app state
    let app_state = Arc::new(api::AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        services,
    });

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::permissive()
    };

    let app = Router::new()
        .route("/", get(|| async { "barista-api up" }))
        .route(
            "/health",
            get(|| async { Json(api::ApiResponse::success(serde_json::json!({"status": "ok"}))) }),
        )
        .nest("/api/v1", api::api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("barista-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
