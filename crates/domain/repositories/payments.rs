use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use mockall::automock;

use crate::domain::entities::payments::{NewPaymentEntity, PaymentEntity};
use crate::domain::value_objects::enums::{
    payment_statuses::PaymentStatus, requester_types::RequesterType,
};

#[async_trait]
#[automock]
pub trait PaymentRepository {
    async fn insert_payment(&self, payment: NewPaymentEntity) -> Result<PaymentEntity>;

    async fn find_by_id(&self, payment_id: i32) -> Result<Option<PaymentEntity>>;

    async fn find_by_psp_transaction_id(
        &self,
        psp_transaction_id: &str,
    ) -> Result<Option<PaymentEntity>>;

    async fn list_payments(&self) -> Result<Vec<PaymentEntity>>;

    async fn list_by_customer_id(&self, customer_id: i32) -> Result<Vec<PaymentEntity>>;

    async fn list_by_requester(
        &self,
        requester_type: RequesterType,
        requester_id: i32,
    ) -> Result<Vec<PaymentEntity>>;

    async fn find_status(&self, payment_id: i32) -> Result<Option<i32>>;

    async fn find_amount(&self, payment_id: i32) -> Result<Option<BigDecimal>>;

    /// Records the processor reference returned when a transaction was opened.
    async fn attach_psp_transaction(
        &self,
        payment_id: i32,
        psp_transaction_id: String,
        raw_psp_response: serde_json::Value,
    ) -> Result<PaymentEntity>;

    async fn update_raw_psp_response(
        &self,
        payment_id: i32,
        raw_psp_response: serde_json::Value,
    ) -> Result<()>;

    /// Moves a payment out of Pending. Returns `None` when the row is missing or
    /// no longer Pending, so at most one caller wins per payment.
    async fn finalize_pending(
        &self,
        payment_id: i32,
        status: PaymentStatus,
    ) -> Result<Option<PaymentEntity>>;
}
