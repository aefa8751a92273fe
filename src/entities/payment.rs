use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::PaymentStatus;

/// Payment record. Rows are appended per settlement attempt (retries
/// produce multiple rows); the current one is the latest by payment_date.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[sea_orm(nullable)]
    pub transaction_id: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount_paid: Decimal,
    pub payment_date: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Supported settlement methods. Adding a method means adding a variant
/// here plus one `SettlementHandler` implementation in
/// `services::payments`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "card")]
    Card,
    #[sea_orm(string_value = "gcash")]
    Gcash,
    #[sea_orm(string_value = "paypal")]
    Paypal,
}

impl PaymentMethod {
    /// Accepts the wire spellings used by storefront clients, including
    /// the legacy "cash_on_pickup" alias.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cash" | "cash_on_pickup" => Some(PaymentMethod::Cash),
            "card" | "credit_card" | "debit_card" => Some(PaymentMethod::Card),
            "gcash" => Some(PaymentMethod::Gcash),
            "paypal" => Some(PaymentMethod::Paypal),
            _ => None,
        }
    }

    /// Cash variants settle physically at pickup; the admin marking the
    /// order completed also confirms the payment.
    pub fn is_cash(self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(PaymentMethod::parse("cash"), Some(PaymentMethod::Cash));
        assert_eq!(
            PaymentMethod::parse("cash_on_pickup"),
            Some(PaymentMethod::Cash)
        );
        assert_eq!(PaymentMethod::parse("CARD"), Some(PaymentMethod::Card));
        assert_eq!(PaymentMethod::parse(" gcash "), Some(PaymentMethod::Gcash));
        assert_eq!(PaymentMethod::parse("paypal"), Some(PaymentMethod::Paypal));
        assert_eq!(PaymentMethod::parse("bitcoin"), None);
    }
}
