use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::infra::db::postgres::schema::payments;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: i32,
    pub customer_id: i32,
    pub requester_type: i32,
    pub requester_id: i32,
    pub secondary_requester_id: Option<i32>,
    pub payment_method: String,
    pub payment_amount: BigDecimal,
    pub status: i32,
    pub psp_transaction_id: Option<String>,
    pub raw_psp_response: Option<serde_json::Value>,
    pub settle_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub customer_id: i32,
    pub requester_type: i32,
    pub requester_id: i32,
    pub secondary_requester_id: Option<i32>,
    pub payment_method: String,
    pub payment_amount: BigDecimal,
    pub status: i32,
}

// NewPaymentEntity is the application-facing alias for inserting rows into `payments`.
pub type NewPaymentEntity = InsertPaymentEntity;
