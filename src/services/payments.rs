use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus},
        order_item::{self, Entity as OrderItemEntity},
        payment::{self, PaymentMethod},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{carts::clear_customer_cart, orders::TOTAL_TOLERANCE, stock},
};

/// Card fields are checked for presence only; real validation belongs to
/// the (out-of-scope) acquiring gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDetails {
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
}

#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub amount: Decimal,
    pub card: Option<CardDetails>,
}

/// What a settlement attempt decided, before any of it is persisted.
#[derive(Debug)]
pub struct PaymentOutcome {
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub transaction_id: String,
    pub payment_url: Option<String>,
}

/// Settlement seam: one implementation per payment method. Adding a
/// method means one `PaymentMethod` variant plus one impl here — nothing
/// else changes.
pub trait SettlementHandler: Send + Sync {
    fn settle(
        &self,
        order: &order::Model,
        details: &PaymentDetails,
    ) -> Result<PaymentOutcome, ServiceError>;
}

/// Cash settles physically at pickup; the order stays pending on both
/// axes until the back office confirms handover.
struct CashSettlement;

impl SettlementHandler for CashSettlement {
    fn settle(
        &self,
        _order: &order::Model,
        _details: &PaymentDetails,
    ) -> Result<PaymentOutcome, ServiceError> {
        Ok(PaymentOutcome {
            payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Pending,
            transaction_id: format!("CASH-{}", Uuid::new_v4().simple()),
            payment_url: None,
        })
    }
}

struct CardSettlement;

impl SettlementHandler for CardSettlement {
    fn settle(
        &self,
        _order: &order::Model,
        details: &PaymentDetails,
    ) -> Result<PaymentOutcome, ServiceError> {
        let card = details.card.as_ref().ok_or_else(|| {
            ServiceError::ValidationError("Card details are required for card payments".to_string())
        })?;

        if card.card_number.trim().is_empty()
            || card.expiry.trim().is_empty()
            || card.cvv.trim().is_empty()
        {
            return Err(ServiceError::ValidationError(
                "Card number, expiry, and CVV are required".to_string(),
            ));
        }

        Ok(PaymentOutcome {
            payment_status: PaymentStatus::Completed,
            order_status: OrderStatus::Confirmed,
            transaction_id: format!("TXN-{}", Uuid::new_v4().simple()),
            payment_url: None,
        })
    }
}

/// Placeholder redirect flow; no real capture happens through this path.
struct GcashSettlement;

impl SettlementHandler for GcashSettlement {
    fn settle(
        &self,
        order: &order::Model,
        _details: &PaymentDetails,
    ) -> Result<PaymentOutcome, ServiceError> {
        let transaction_id = format!("GCASH-{}", Uuid::new_v4().simple());
        Ok(PaymentOutcome {
            payment_url: Some(format!(
                "https://payments.gcash.example/checkout/{}?ref={}",
                transaction_id, order.order_number
            )),
            payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Pending,
            transaction_id,
        })
    }
}

/// Legacy simulated PayPal path kept for clients that post PayPal through
/// the synchronous endpoint. The real capture flow is `services::paypal`.
struct PaypalRedirectSettlement;

impl SettlementHandler for PaypalRedirectSettlement {
    fn settle(
        &self,
        order: &order::Model,
        _details: &PaymentDetails,
    ) -> Result<PaymentOutcome, ServiceError> {
        let transaction_id = format!("PAYPAL-{}", Uuid::new_v4().simple());
        Ok(PaymentOutcome {
            payment_url: Some(format!(
                "https://www.sandbox.paypal.com/checkoutnow?token={}&ref={}",
                transaction_id, order.order_number
            )),
            payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Pending,
            transaction_id,
        })
    }
}

fn settlement_for(method: PaymentMethod) -> &'static dyn SettlementHandler {
    match method {
        PaymentMethod::Cash => &CashSettlement,
        PaymentMethod::Card => &CardSettlement,
        PaymentMethod::Gcash => &GcashSettlement,
        PaymentMethod::Paypal => &PaypalRedirectSettlement,
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentReceipt {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

/// Settles a previously created order (checkout step 2). Everything the
/// settlement writes — payment row, order update, stock decrements, cart
/// clear — happens in one transaction; any failure rolls all of it back
/// and leaves the order exactly as retryable as before the call.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PaymentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, details), fields(order_id = %order_id, method = %method))]
    pub async fn process_payment(
        &self,
        order_id: Uuid,
        method: PaymentMethod,
        details: PaymentDetails,
    ) -> Result<PaymentReceipt, ServiceError> {
        let txn = self.db.begin().await?;

        let order_model = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order_model.payment_status == PaymentStatus::Completed {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is already paid",
                order_id
            )));
        }
        if order_model.status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is {} and cannot be paid",
                order_id, order_model.status
            )));
        }

        if (details.amount - order_model.total_amount).abs() > TOTAL_TOLERANCE {
            return Err(ServiceError::ValidationError(format!(
                "Payment amount {} does not match order total {}",
                details.amount, order_model.total_amount
            )));
        }

        let outcome = settlement_for(method).settle(&order_model, &details)?;

        // The payment row is inserted and the order updated whichever
        // settlement branch ran; pending outcomes record the attempt too.
        let payment_id = Uuid::new_v4();
        let payment_row = payment::ActiveModel {
            id: Set(payment_id),
            order_id: Set(order_id),
            payment_method: Set(method),
            payment_status: Set(outcome.payment_status),
            transaction_id: Set(Some(outcome.transaction_id.clone())),
            amount_paid: Set(details.amount),
            payment_date: Set(Utc::now()),
        };
        payment_row.insert(&txn).await?;

        let customer_id = order_model.customer_id;
        let mut active: order::ActiveModel = order_model.into();
        active.payment_method = Set(Some(method));
        active.payment_status = Set(outcome.payment_status);
        active.status = Set(outcome.order_status);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        // Decrement stock for every line item; the first shortage aborts
        // the whole transaction, taking the payment row and order update
        // with it.
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        for item in &items {
            stock::try_decrement(&txn, item.variant_id, item.quantity).await?;
        }

        if let Some(customer_id) = customer_id {
            clear_customer_cart(&txn, customer_id).await?;
        }

        txn.commit().await?;

        info!(%order_id, %payment_id, transaction_id = %outcome.transaction_id, "payment settled");

        self.event_sender
            .send_or_log(Event::PaymentRecorded {
                order_id,
                payment_id,
            })
            .await;
        for item in &items {
            self.event_sender
                .send_or_log(Event::StockDecremented {
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                })
                .await;
        }

        Ok(PaymentReceipt {
            payment_id,
            transaction_id: outcome.transaction_id,
            payment_method: method,
            payment_url: outcome.payment_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn dummy_order() -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            order_number: "ORD-TEST1234".into(),
            customer_id: None,
            branch_id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            contact_info: "{}".into(),
            notes: None,
            subtotal: dec!(200.00),
            tax_total: dec!(4.00),
            discount_total: Decimal::ZERO,
            total_amount: dec!(204.00),
            order_date: Utc::now(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn details(card: Option<CardDetails>) -> PaymentDetails {
        PaymentDetails {
            amount: dec!(204.00),
            card,
        }
    }

    #[test]
    fn cash_settlement_stays_pending() {
        let outcome = settlement_for(PaymentMethod::Cash)
            .settle(&dummy_order(), &details(None))
            .unwrap();
        assert_eq!(outcome.payment_status, PaymentStatus::Pending);
        assert_eq!(outcome.order_status, OrderStatus::Pending);
        assert!(outcome.payment_url.is_none());
        assert!(outcome.transaction_id.starts_with("CASH-"));
    }

    #[test]
    fn card_settlement_requires_card_details() {
        let err = settlement_for(PaymentMethod::Card)
            .settle(&dummy_order(), &details(None))
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));

        let err = settlement_for(PaymentMethod::Card)
            .settle(
                &dummy_order(),
                &details(Some(CardDetails {
                    card_number: "4111111111111111".into(),
                    expiry: "12/28".into(),
                    cvv: "   ".into(),
                })),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn card_settlement_confirms_order() {
        let outcome = settlement_for(PaymentMethod::Card)
            .settle(
                &dummy_order(),
                &details(Some(CardDetails {
                    card_number: "4111111111111111".into(),
                    expiry: "12/28".into(),
                    cvv: "123".into(),
                })),
            )
            .unwrap();
        assert_eq!(outcome.payment_status, PaymentStatus::Completed);
        assert_eq!(outcome.order_status, OrderStatus::Confirmed);
    }

    #[test]
    fn gcash_settlement_returns_redirect() {
        let outcome = settlement_for(PaymentMethod::Gcash)
            .settle(&dummy_order(), &details(None))
            .unwrap();
        assert_eq!(outcome.payment_status, PaymentStatus::Pending);
        let url = outcome.payment_url.expect("gcash returns a payment url");
        assert!(url.contains(&outcome.transaction_id));
    }
}
