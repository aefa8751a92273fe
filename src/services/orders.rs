use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        branch::{self, Entity as BranchEntity},
        order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus},
        order_item::{self, Entity as OrderItemEntity},
        payment::{self, Entity as PaymentEntity, PaymentMethod},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Orders may drift from their items by at most one centavo before
/// creation is rejected.
pub(crate) const TOTAL_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    pub branch_id: Uuid,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<CreateOrderItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderItem {
    pub product_variant_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub branch_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub contact_info: String,
    pub notes: Option<String>,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub discount_total: Decimal,
    pub total_amount: Decimal,
    pub order_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub branch: Option<branch::Model>,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service for the order aggregate: creation (checkout step 1), reads,
/// and back-office status transitions. Settlement lives in
/// `services::payments` and `services::paypal`.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates the order header and its line items in one transaction,
    /// in pending/pending state. This is deliberately a separate
    /// transaction from payment settlement: a created-but-unpaid order is
    /// valid state, against which payment can be retried (and is how
    /// cash-on-pickup works at all).
    #[instrument(skip(self, request), fields(branch_id = %request.branch_id))]
    pub async fn create_order(
        &self,
        customer_id: Option<Uuid>,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate().map_err(ServiceError::from)?;

        for item in &request.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Item quantity must be at least 1 for variant {}",
                    item.product_variant_id
                )));
            }
        }

        // Creation-time monetary invariant: the header total must equal
        // the sum of line totals (within rounding tolerance).
        let items_total: Decimal = request.items.iter().map(|i| i.total_price).sum();
        let expected = items_total + request.tax - request.discount;
        if (expected - request.total).abs() > TOTAL_TOLERANCE {
            return Err(ServiceError::ValidationError(format!(
                "Order total {} does not match items total {} (+tax {}, -discount {})",
                request.total, items_total, request.tax, request.discount
            )));
        }

        let txn = self.db.begin().await?;

        BranchEntity::find_by_id(request.branch_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("Branch {} not found", request.branch_id))
            })?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let contact_info = serde_json::json!({
            "full_name": request.full_name,
            "email": request.email,
            "phone": request.phone,
        })
        .to_string();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!("ORD-{}", &order_id.simple().to_string()[..8].to_uppercase())),
            customer_id: Set(customer_id),
            branch_id: Set(request.branch_id),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(None),
            contact_info: Set(contact_info),
            notes: Set(request.notes),
            subtotal: Set(request.subtotal),
            tax_total: Set(request.tax),
            discount_total: Set(request.discount),
            total_amount: Set(request.total),
            order_date: Set(now),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let order_model = order_model.insert(&txn).await?;

        for item in &request.items {
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

        txn.commit().await?;

        info!(%order_id, ?customer_id, total = %request.total, "order created");

        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;

        Ok(model_to_response(order_model))
    }

    /// Retrieves an order with its branch and line items.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let (order_model, branch_model) = OrderEntity::find_by_id(order_id)
            .find_also_related(BranchEntity)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderDetails {
            order: model_to_response(order_model),
            branch: branch_model,
            items,
        })
    }

    /// The order's current payment: latest row by payment date. Retries
    /// append rows, so multiple may exist.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order_payment(
        &self,
        order_id: Uuid,
    ) -> Result<payment::Model, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::PaymentDate)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No payment recorded for order {}", order_id))
            })
    }

    /// Lists orders with pagination, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderListResponse {
            orders: orders.into_iter().map(model_to_response).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Back-office status transition. Terminal states reject everything;
    /// the forward chain and cancellation rules live on `OrderStatus`.
    /// Completing a cash order also marks its payment completed: the
    /// admin confirming pickup is confirming the cash changed hands.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let order_model = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order_model.status;
        if old_status == new_status {
            txn.commit().await?;
            return Ok(model_to_response(order_model));
        }

        if !old_status.can_transition_to(new_status) {
            warn!(%order_id, %old_status, %new_status, "rejected status transition");
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot transition order from '{}' to '{}'",
                old_status, new_status
            )));
        }

        let settles_cash_payment = new_status == OrderStatus::Completed
            && order_model.payment_method.map(PaymentMethod::is_cash).unwrap_or(false);

        let mut active: order::ActiveModel = order_model.into();
        active.status = Set(new_status);
        if settles_cash_payment {
            active.payment_status = Set(PaymentStatus::Completed);
        }
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(%order_id, %old_status, %new_status, "order status updated");

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        Ok(model_to_response(updated))
    }

    /// Cancels an order through the same transition rules. Stock is NOT
    /// restored: settled decrements stand even when the order is later
    /// cancelled from the back office.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let response = self
            .update_order_status(order_id, OrderStatus::Cancelled)
            .await?;

        self.event_sender.send_or_log(Event::OrderCancelled(order_id)).await;

        Ok(response)
    }
}

pub(crate) fn model_to_response(model: order::Model) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        customer_id: model.customer_id,
        branch_id: model.branch_id,
        status: model.status,
        payment_status: model.payment_status,
        payment_method: model.payment_method,
        contact_info: model.contact_info,
        notes: model.notes,
        subtotal: model.subtotal,
        tax_total: model.tax_total,
        discount_total: model.discount_total,
        total_amount: model.total_amount,
        order_date: model.order_date,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request_with_totals(items: Vec<CreateOrderItem>, tax: Decimal, total: Decimal) -> CreateOrderRequest {
        CreateOrderRequest {
            full_name: "Juan dela Cruz".into(),
            email: "juan@example.com".into(),
            phone: "+63-917-000-0000".into(),
            branch_id: Uuid::new_v4(),
            notes: None,
            subtotal: items.iter().map(|i| i.total_price).sum(),
            items,
            tax,
            discount: Decimal::ZERO,
            total,
        }
    }

    fn item(quantity: i32, unit_price: Decimal) -> CreateOrderItem {
        CreateOrderItem {
            product_variant_id: Uuid::new_v4(),
            quantity,
            unit_price,
            total_price: unit_price * Decimal::from(quantity),
        }
    }

    #[test]
    fn total_tolerance_is_one_centavo() {
        assert_eq!(TOTAL_TOLERANCE, dec!(0.01));
    }

    #[test]
    fn validation_rejects_missing_contact_fields() {
        let mut request = request_with_totals(vec![item(2, dec!(100.00))], dec!(4.00), dec!(204.00));
        request.full_name = String::new();
        assert!(request.validate().is_err());

        let mut request = request_with_totals(vec![item(1, dec!(50.00))], dec!(1.00), dec!(51.00));
        request.email = "not-an-email".into();
        assert!(request.validate().is_err());
    }

    #[test]
    fn validation_rejects_empty_items() {
        let request = request_with_totals(vec![], Decimal::ZERO, Decimal::ZERO);
        assert!(request.validate().is_err());
    }

    #[test]
    fn totals_within_tolerance_line_up() {
        let items = vec![item(2, dec!(100.00))];
        let request = request_with_totals(items, dec!(4.00), dec!(204.00));
        let items_total: Decimal = request.items.iter().map(|i| i.total_price).sum();
        let expected = items_total + request.tax - request.discount;
        assert!((expected - request.total).abs() <= TOTAL_TOLERANCE);
    }

    #[test]
    fn totals_outside_tolerance_are_detected() {
        let items = vec![item(2, dec!(100.00))];
        let request = request_with_totals(items, dec!(4.00), dec!(210.00));
        let items_total: Decimal = request.items.iter().map(|i| i.total_price).sum();
        let expected = items_total + request.tax - request.discount;
        assert!((expected - request.total).abs() > TOTAL_TOLERANCE);
    }
}
