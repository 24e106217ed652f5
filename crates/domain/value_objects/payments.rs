use anyhow::{Result, anyhow};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::payments::PaymentEntity;
use crate::domain::value_objects::enums::{
    payment_methods::PaymentMethod, payment_statuses::PaymentStatus,
    requester_types::RequesterType,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentModel {
    pub id: i32,
    pub customer_id: i32,
    pub requester_type: RequesterType,
    pub requester_id: i32,
    pub secondary_requester_id: Option<i32>,
    pub payment_method: PaymentMethod,
    pub payment_amount: BigDecimal,
    pub status: PaymentStatus,
    pub psp_transaction_id: Option<String>,
    pub raw_psp_response: Option<serde_json::Value>,
    pub settle_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentEntity> for PaymentModel {
    type Error = anyhow::Error;

    fn try_from(value: PaymentEntity) -> Result<Self> {
        let requester_type = RequesterType::from_code(value.requester_type).ok_or_else(|| {
            anyhow!(
                "payment {} has unknown requester_type {}",
                value.id,
                value.requester_type
            )
        })?;
        let payment_method = PaymentMethod::from_str(&value.payment_method).ok_or_else(|| {
            anyhow!(
                "payment {} has unknown payment_method {}",
                value.id,
                value.payment_method
            )
        })?;
        let status = PaymentStatus::from_code(value.status)
            .ok_or_else(|| anyhow!("payment {} has unknown status {}", value.id, value.status))?;

        Ok(Self {
            id: value.id,
            customer_id: value.customer_id,
            requester_type,
            requester_id: value.requester_id,
            secondary_requester_id: value.secondary_requester_id,
            payment_method,
            payment_amount: value.payment_amount,
            status,
            psp_transaction_id: value.psp_transaction_id,
            raw_psp_response: value.raw_psp_response,
            settle_date: value.settle_date,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Create request as it arrives from the HTTP layer. Every field is optional so that
/// missing values are reported by validation rather than by the extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePaymentModel {
    pub customer_id: Option<i32>,
    pub requester_type: Option<i32>,
    pub requester_id: Option<i32>,
    pub secondary_requester_id: Option<i32>,
    pub payment_method: Option<String>,
    pub payment_amount: Option<BigDecimal>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallbackModel {
    pub transaction_id: String,
    pub transaction_status: String,
    pub order_id: Option<String>,
    pub status_code: Option<String>,
    pub gross_amount: Option<String>,
    pub signature_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusDto {
    pub payment_id: i32,
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize)]
pub struct PaymentAmountDto {
    pub payment_id: i32,
    pub payment_amount: BigDecimal,
}
