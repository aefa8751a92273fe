use chrono::Utc;
use dashmap::DashMap;
use reqwest::Client;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    entities::{
        branch::Entity as BranchEntity,
        order::{self, OrderStatus, PaymentStatus},
        order_item,
        payment::{self, PaymentMethod},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::clear_customer_cart,
        orders::{CreateOrderRequest, TOTAL_TOLERANCE},
        stock,
    },
};

const CURRENCY: &str = "PHP";

/// Pending order payload stashed between order-create and capture.
/// Contract: written once at create, read at capture, deleted only after
/// the capture transaction commits (or expired by TTL).
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub customer_id: Option<Uuid>,
    pub paypal_order_id: String,
    pub order: CreateOrderRequest,
}

struct PendingEntry {
    pending: PendingOrder,
    stored_at: Instant,
}

/// In-process key-value store for pending PayPal orders, keyed by the
/// caller-supplied session id with an explicit TTL. Replaces the implicit
/// framework session the storefront used to lean on.
pub struct PendingOrderStore {
    entries: DashMap<String, PendingEntry>,
    ttl: Duration,
}

impl PendingOrderStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Stores the payload for a session. A repeat create for the same
    /// session replaces the previous payload: only the latest PayPal
    /// order is capturable.
    pub fn put(&self, session_id: &str, pending: PendingOrder) {
        self.entries.insert(
            session_id.to_string(),
            PendingEntry {
                pending,
                stored_at: Instant::now(),
            },
        );
    }

    /// Reads the payload without consuming it. Expired entries are
    /// dropped on access and read as absent.
    pub fn get(&self, session_id: &str) -> Option<PendingOrder> {
        let expired = match self.entries.get(session_id) {
            Some(entry) => entry.stored_at.elapsed() > self.ttl,
            None => return None,
        };

        if expired {
            self.entries.remove(session_id);
            return None;
        }

        self.entries.get(session_id).map(|e| e.pending.clone())
    }

    pub fn remove(&self, session_id: &str) {
        self.entries.remove(session_id);
    }

    /// Drops every expired entry. Called periodically from a background
    /// task; `get` also expires lazily, so this only bounds memory.
    pub fn purge_expired(&self) {
        self.entries.retain(|_, entry| entry.stored_at.elapsed() <= self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Thin client for the PayPal Orders v2 REST API.
pub struct PayPalClient {
    http: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    status: String,
    #[serde(default)]
    purchase_units: Vec<CapturePurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct CapturePurchaseUnit {
    #[serde(default)]
    payments: Option<CapturePayments>,
}

#[derive(Debug, Deserialize)]
struct CapturePayments {
    #[serde(default)]
    captures: Vec<CaptureRecord>,
}

#[derive(Debug, Deserialize)]
struct CaptureRecord {
    id: String,
}

/// Outcome of a capture call, before local persistence.
#[derive(Debug)]
pub struct CaptureOutcome {
    pub status: String,
    pub transaction_id: String,
}

impl PayPalClient {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let client_id = cfg.paypal_client_id.clone().ok_or_else(|| {
            ServiceError::InternalError("PayPal client id is not configured".to_string())
        })?;
        let client_secret = cfg.paypal_client_secret.clone().ok_or_else(|| {
            ServiceError::InternalError("PayPal client secret is not configured".to_string())
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to construct http client: {}", e))
            })?;

        Ok(Self::with_client(
            http,
            cfg.paypal_base_url.clone(),
            client_id,
            client_secret,
        ))
    }

    /// Build a client against an arbitrary base URL (useful for testing).
    pub fn with_client(
        http: Client,
        base_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        }
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("PayPal token request: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "PayPal token request failed with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("PayPal token response: {}", e)))?;

        Ok(token.access_token)
    }

    /// Creates a PayPal order with an amount breakdown (item total + tax)
    /// and returns PayPal's order id.
    pub async fn create_order(
        &self,
        subtotal: Decimal,
        tax: Decimal,
        total: Decimal,
    ) -> Result<String, ServiceError> {
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": CURRENCY,
                    "value": total.round_dp(2).to_string(),
                    "breakdown": {
                        "item_total": {
                            "currency_code": CURRENCY,
                            "value": subtotal.round_dp(2).to_string(),
                        },
                        "tax_total": {
                            "currency_code": CURRENCY,
                            "value": tax.round_dp(2).to_string(),
                        },
                    },
                },
            }],
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("PayPal order create: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "PayPal order create failed with status {}",
                response.status()
            )));
        }

        let created: CreateOrderResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalService(format!("PayPal order create response: {}", e))
        })?;

        Ok(created.id)
    }

    /// Captures a previously approved PayPal order. Returns the raw
    /// status and the capture transaction id (falling back to the order
    /// id when the capture record is absent).
    pub async fn capture_order(&self, paypal_order_id: &str) -> Result<CaptureOutcome, ServiceError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, paypal_order_id
            ))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("PayPal capture: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "PayPal capture failed with status {}",
                response.status()
            )));
        }

        let captured: CaptureResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("PayPal capture response: {}", e)))?;

        let transaction_id = captured
            .purchase_units
            .iter()
            .filter_map(|u| u.payments.as_ref())
            .flat_map(|p| p.captures.iter())
            .map(|c| c.id.clone())
            .next()
            .unwrap_or_else(|| paypal_order_id.to_string());

        Ok(CaptureOutcome {
            status: captured.status,
            transaction_id,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CaptureReceipt {
    pub order_id: Uuid,
    pub transaction_id: String,
}

/// PayPal checkout path. Unlike the synchronous methods, no local order
/// row exists until capture succeeds: PayPal approval is asynchronous and
/// reversible up to capture, so persistence is deferred to the one moment
/// the money is actually confirmed. Abandoned checkouts therefore need no
/// compensation — their payload simply expires out of the store.
#[derive(Clone)]
pub struct PayPalService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    client: Arc<PayPalClient>,
    store: Arc<PendingOrderStore>,
}

impl PayPalService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        client: Arc<PayPalClient>,
        store: Arc<PendingOrderStore>,
    ) -> Self {
        Self {
            db,
            event_sender,
            client,
            store,
        }
    }

    pub fn store(&self) -> &PendingOrderStore {
        &self.store
    }

    /// Validates the order payload, stashes it for the session, and
    /// creates the order on PayPal's side. Returns PayPal's order id —
    /// no local order exists yet.
    #[instrument(skip(self, order_data), fields(session_id = %session_id))]
    pub async fn create_paypal_order(
        &self,
        session_id: &str,
        customer_id: Option<Uuid>,
        order_data: CreateOrderRequest,
    ) -> Result<String, ServiceError> {
        order_data.validate().map_err(ServiceError::from)?;

        let items_total: Decimal = order_data.items.iter().map(|i| i.total_price).sum();
        let expected = items_total + order_data.tax - order_data.discount;
        if (expected - order_data.total).abs() > TOTAL_TOLERANCE {
            return Err(ServiceError::ValidationError(format!(
                "Order total {} does not match items total {}",
                order_data.total, items_total
            )));
        }

        BranchEntity::find_by_id(order_data.branch_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("Branch {} not found", order_data.branch_id))
            })?;

        let paypal_order_id = self
            .client
            .create_order(order_data.subtotal, order_data.tax, order_data.total)
            .await?;

        self.store.put(
            session_id,
            PendingOrder {
                customer_id,
                paypal_order_id: paypal_order_id.clone(),
                order: order_data,
            },
        );

        info!(%paypal_order_id, "paypal order created, payload stashed");

        self.event_sender
            .send_or_log(Event::PayPalOrderCreated {
                paypal_order_id: paypal_order_id.clone(),
            })
            .await;

        Ok(paypal_order_id)
    }

    /// Captures the PayPal payment and, only then, persists the order:
    /// order + items + payment row + stock decrements + cart clear, all
    /// in one transaction. The session payload is consumed only after
    /// commit, so a replayed capture finds nothing and fails with
    /// `NoPendingOrder` instead of settling twice.
    #[instrument(skip(self), fields(session_id = %session_id, paypal_order_id = %paypal_order_id))]
    pub async fn capture_payment(
        &self,
        session_id: &str,
        paypal_order_id: &str,
    ) -> Result<CaptureReceipt, ServiceError> {
        let pending = self
            .store
            .get(session_id)
            .ok_or(ServiceError::NoPendingOrder)?;

        if pending.paypal_order_id != paypal_order_id {
            warn!(
                stored = %pending.paypal_order_id,
                "capture attempted against a different paypal order"
            );
            return Err(ServiceError::NoPendingOrder);
        }

        let capture = self.client.capture_order(paypal_order_id).await?;
        if capture.status != "COMPLETED" {
            return Err(ServiceError::PaymentNotCompleted(capture.status));
        }

        let order_data = &pending.order;
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let contact_info = serde_json::json!({
            "full_name": order_data.full_name,
            "email": order_data.email,
            "phone": order_data.phone,
        })
        .to_string();

        let txn = self.db.begin().await?;

        // PayPal confirmed the money out-of-band, so the order is born
        // settled instead of passing through pending.
        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!(
                "ORD-{}",
                &order_id.simple().to_string()[..8].to_uppercase()
            )),
            customer_id: Set(pending.customer_id),
            branch_id: Set(order_data.branch_id),
            status: Set(OrderStatus::Confirmed),
            payment_status: Set(PaymentStatus::Completed),
            payment_method: Set(Some(PaymentMethod::Paypal)),
            contact_info: Set(contact_info),
            notes: Set(order_data.notes.clone()),
            subtotal: Set(order_data.subtotal),
            tax_total: Set(order_data.tax),
            discount_total: Set(order_data.discount),
            total_amount: Set(order_data.total),
            order_date: Set(now),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        order_model.insert(&txn).await?;

        for item in &order_data.items {
            let order_item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                variant_id: Set(item.product_variant_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total_price: Set(item.total_price),
                created_at: Set(now),
            };
            order_item.insert(&txn).await?;
        }

        let payment_id = Uuid::new_v4();
        let payment_row = payment::ActiveModel {
            id: Set(payment_id),
            order_id: Set(order_id),
            payment_method: Set(PaymentMethod::Paypal),
            payment_status: Set(PaymentStatus::Completed),
            transaction_id: Set(Some(capture.transaction_id.clone())),
            amount_paid: Set(order_data.total),
            payment_date: Set(now),
        };
        payment_row.insert(&txn).await?;

        for item in &order_data.items {
            stock::try_decrement(&txn, item.product_variant_id, item.quantity).await?;
        }

        if let Some(customer_id) = pending.customer_id {
            clear_customer_cart(&txn, customer_id).await?;
        }

        txn.commit().await?;

        // Consume the payload only now that the order is durable.
        self.store.remove(session_id);

        info!(%order_id, transaction_id = %capture.transaction_id, "paypal capture settled");

        self.event_sender
            .send_or_log(Event::PayPalPaymentCaptured {
                order_id,
                transaction_id: capture.transaction_id.clone(),
            })
            .await;

        Ok(CaptureReceipt {
            order_id,
            transaction_id: capture.transaction_id,
        })
    }
}
