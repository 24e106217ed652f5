use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::payments},
};
use domain::{
    entities::payments::{NewPaymentEntity, PaymentEntity},
    repositories::payments::PaymentRepository,
    value_objects::enums::{payment_statuses::PaymentStatus, requester_types::RequesterType},
};

pub struct PaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn insert_payment(&self, payment: NewPaymentEntity) -> Result<PaymentEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let inserted = insert_into(payments::table)
            .values(&payment)
            .returning(PaymentEntity::as_returning())
            .get_result::<PaymentEntity>(&mut conn)?;

        Ok(inserted)
    }

    async fn find_by_id(&self, payment_id: i32) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = payments::table
            .filter(payments::id.eq(payment_id))
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_by_psp_transaction_id(
        &self,
        psp_transaction_id: &str,
    ) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = payments::table
            .filter(payments::psp_transaction_id.eq(psp_transaction_id))
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn list_payments(&self) -> Result<Vec<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = payments::table
            .order(payments::id.desc())
            .select(PaymentEntity::as_select())
            .load::<PaymentEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_by_customer_id(&self, customer_id: i32) -> Result<Vec<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = payments::table
            .filter(payments::customer_id.eq(customer_id))
            .order(payments::id.desc())
            .select(PaymentEntity::as_select())
            .load::<PaymentEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_by_requester(
        &self,
        requester_type: RequesterType,
        requester_id: i32,
    ) -> Result<Vec<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = payments::table
            .filter(payments::requester_type.eq(requester_type.code()))
            .filter(payments::requester_id.eq(requester_id))
            .order(payments::id.desc())
            .select(PaymentEntity::as_select())
            .load::<PaymentEntity>(&mut conn)?;

        Ok(results)
    }

    async fn find_status(&self, payment_id: i32) -> Result<Option<i32>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let status = payments::table
            .filter(payments::id.eq(payment_id))
            .select(payments::status)
            .first::<i32>(&mut conn)
            .optional()?;

        Ok(status)
    }

    async fn find_amount(&self, payment_id: i32) -> Result<Option<BigDecimal>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let amount = payments::table
            .filter(payments::id.eq(payment_id))
            .select(payments::payment_amount)
            .first::<BigDecimal>(&mut conn)
            .optional()?;

        Ok(amount)
    }

    async fn attach_psp_transaction(
        &self,
        payment_id: i32,
        psp_transaction_id: String,
        raw_psp_response: serde_json::Value,
    ) -> Result<PaymentEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(payments::table)
            .filter(payments::id.eq(payment_id))
            .set((
                payments::psp_transaction_id.eq(Some(psp_transaction_id)),
                payments::raw_psp_response.eq(Some(raw_psp_response)),
                payments::updated_at.eq(Utc::now()),
            ))
            .returning(PaymentEntity::as_returning())
            .get_result::<PaymentEntity>(&mut conn)?;

        Ok(updated)
    }

    async fn update_raw_psp_response(
        &self,
        payment_id: i32,
        raw_psp_response: serde_json::Value,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(payments::table)
            .filter(payments::id.eq(payment_id))
            .set((
                payments::raw_psp_response.eq(Some(raw_psp_response)),
                payments::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn finalize_pending(
        &self,
        payment_id: i32,
        status: PaymentStatus,
    ) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        // Single statement: the status predicate is the row-level guard.
        let updated = update(payments::table)
            .filter(payments::id.eq(payment_id))
            .filter(payments::status.eq(PaymentStatus::Pending.code()))
            .set((
                payments::status.eq(status.code()),
                payments::settle_date.eq(Some(now)),
                payments::updated_at.eq(now),
            ))
            .returning(PaymentEntity::as_returning())
            .get_result::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(updated)
    }
}
