use std::sync::Arc;

use anyhow::{Result as AnyResult, anyhow};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use payments_core::{
    domain::{
        entities::payments::{NewPaymentEntity, PaymentEntity},
        repositories::payments::PaymentRepository,
        value_objects::{
            enums::{
                payment_methods::PaymentMethod, payment_statuses::PaymentStatus,
                remote_statuses::RemoteStatus, requester_types::RequesterType,
            },
            payments::{CreatePaymentModel, PaymentModel},
            requesters::RequesterUpdate,
        },
    },
    psp::midtrans_client::{ChargeRequest, MidtransClient, PspError, PspStatus, PspTransaction},
    requesters::RequesterNotifier,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PspGateway: Send + Sync {
    async fn open_transaction(&self, request: ChargeRequest) -> Result<PspTransaction, PspError>;

    async fn query_status(&self, psp_transaction_id: &str) -> Result<PspStatus, PspError>;

    async fn cancel_transaction(
        &self,
        psp_transaction_id: &str,
    ) -> Result<serde_json::Value, PspError>;
}

#[async_trait]
impl PspGateway for MidtransClient {
    async fn open_transaction(&self, request: ChargeRequest) -> Result<PspTransaction, PspError> {
        self.open_transaction(&request).await
    }

    async fn query_status(&self, psp_transaction_id: &str) -> Result<PspStatus, PspError> {
        self.query_status(psp_transaction_id).await
    }

    async fn cancel_transaction(
        &self,
        psp_transaction_id: &str,
    ) -> Result<serde_json::Value, PspError> {
        self.cancel_transaction(psp_transaction_id).await
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait RequesterGateway: Send + Sync {
    fn notify(&self, update: RequesterUpdate);
}

impl RequesterGateway for RequesterNotifier {
    fn notify(&self, update: RequesterUpdate) {
        RequesterNotifier::notify(self, update)
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("payment amount must be greater than zero")]
    InvalidAmount,
    #[error("payment {0} not found")]
    NotFound(i32),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            PaymentError::Validation(_) | PaymentError::InvalidAmount => StatusCode::BAD_REQUEST,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PaymentError>;

/// 13 integer digits, the integer part of `NUMERIC(15,2)`.
const MAX_AMOUNT_EXCLUSIVE: i64 = 10_000_000_000_000;

/// Result of an operation that may move a payment out of Pending.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Transitioned(PaymentModel),
    NotFound,
    AlreadyFinalized(PaymentStatus),
    InvalidRemoteStatus(String),
    StillPending,
    NotReconcilable,
    /// Internal failure; the operation is safe to retry.
    Failed,
}

impl TransitionOutcome {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            TransitionOutcome::Transitioned(_) | TransitionOutcome::StillPending => StatusCode::OK,
            TransitionOutcome::NotFound => StatusCode::NOT_FOUND,
            TransitionOutcome::AlreadyFinalized(_) => StatusCode::CONFLICT,
            TransitionOutcome::InvalidRemoteStatus(_) | TransitionOutcome::NotReconcilable => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TransitionOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransitionOutcome::Transitioned(_) => "transitioned",
            TransitionOutcome::NotFound => "not_found",
            TransitionOutcome::AlreadyFinalized(_) => "already_finalized",
            TransitionOutcome::InvalidRemoteStatus(_) => "invalid_remote_status",
            TransitionOutcome::StillPending => "still_pending",
            TransitionOutcome::NotReconcilable => "not_reconcilable",
            TransitionOutcome::Failed => "failed",
        }
    }
}

struct ValidatedPayment {
    insert: NewPaymentEntity,
    payment_method: PaymentMethod,
    customer_phone: Option<String>,
}

pub struct PaymentUseCase<R, Psp, N>
where
    R: PaymentRepository + Send + Sync + 'static,
    Psp: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    payment_repo: Arc<R>,
    psp_client: Arc<Psp>,
    requesters: Arc<N>,
}

impl<R, Psp, N> PaymentUseCase<R, Psp, N>
where
    R: PaymentRepository + Send + Sync + 'static,
    Psp: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    pub fn new(payment_repo: Arc<R>, psp_client: Arc<Psp>, requesters: Arc<N>) -> Self {
        Self {
            payment_repo,
            psp_client,
            requesters,
        }
    }

    pub async fn create_payment(&self, request: CreatePaymentModel) -> UseCaseResult<PaymentModel> {
        let validated = Self::validate(request).inspect_err(|err| {
            warn!(
                error = %err,
                status = err.status_code().as_u16(),
                "payments: create request rejected"
            );
        })?;

        let inserted = self
            .payment_repo
            .insert_payment(validated.insert)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "payments: failed to insert payment");
                PaymentError::Internal(err)
            })?;
        let mut payment = PaymentModel::try_from(inserted)?;

        info!(
            payment_id = payment.id,
            customer_id = payment.customer_id,
            requester_type = %payment.requester_type,
            requester_id = payment.requester_id,
            payment_method = %payment.payment_method,
            payment_amount = %payment.payment_amount,
            "payments: payment created"
        );

        if !validated.payment_method.requires_psp() {
            return Ok(payment);
        }

        let charge = ChargeRequest {
            payment_id: payment.id,
            payment_method: validated.payment_method,
            amount: payment.payment_amount.clone(),
            customer_phone: validated.customer_phone,
        };

        match self.psp_client.open_transaction(charge).await {
            Ok(transaction) => {
                match self
                    .payment_repo
                    .attach_psp_transaction(
                        payment.id,
                        transaction.transaction_id.clone(),
                        transaction.raw.clone(),
                    )
                    .await
                {
                    Ok(updated) => {
                        info!(
                            payment_id = payment.id,
                            psp_transaction_id = %transaction.transaction_id,
                            "payments: psp transaction opened"
                        );
                        Ok(PaymentModel::try_from(updated)?)
                    }
                    Err(err) => {
                        // The processor charge is already open; the row stays Pending.
                        error!(
                            payment_id = payment.id,
                            psp_transaction_id = %transaction.transaction_id,
                            db_error = ?err,
                            "payments: failed to store psp transaction"
                        );
                        let raw = json!({
                            "error": "store_failed",
                            "transaction_id": transaction.transaction_id,
                            "charge": transaction.raw,
                        });
                        self.record_psp_response(payment.id, raw.clone()).await;
                        payment.raw_psp_response = Some(raw);
                        Ok(payment)
                    }
                }
            }
            Err(psp_error) => {
                // The row stays Pending without a processor reference.
                warn!(
                    payment_id = payment.id,
                    payment_method = %payment.payment_method,
                    error = %psp_error,
                    "payments: psp transaction could not be opened"
                );

                let raw = psp_error.to_json();
                self.record_psp_response(payment.id, raw.clone()).await;
                payment.raw_psp_response = Some(raw);
                Ok(payment)
            }
        }
    }

    pub async fn complete_payment(&self, payment_id: i32) -> TransitionOutcome {
        info!(payment_id, "payments: complete requested");
        let result = self.try_finalize_by_id(payment_id, PaymentStatus::Completed).await;
        Self::report("complete", payment_id, result)
    }

    pub async fn cancel_payment(&self, payment_id: i32) -> TransitionOutcome {
        info!(payment_id, "payments: cancel requested");
        let result = self.try_finalize_by_id(payment_id, PaymentStatus::Cancelled).await;
        Self::report("cancel", payment_id, result)
    }

    pub async fn handle_callback(
        &self,
        psp_transaction_id: &str,
        remote_status: &str,
    ) -> TransitionOutcome {
        info!(psp_transaction_id, remote_status, "payments: psp callback received");
        match self.try_handle_callback(psp_transaction_id, remote_status).await {
            Ok(outcome) => {
                info!(
                    psp_transaction_id,
                    remote_status,
                    outcome = outcome.label(),
                    "payments: psp callback handled"
                );
                outcome
            }
            Err(err) => {
                error!(
                    psp_transaction_id,
                    remote_status,
                    error = ?err,
                    "payments: psp callback failed"
                );
                TransitionOutcome::Failed
            }
        }
    }

    /// Pulls the processor's view of a Pending payment and applies it.
    pub async fn reconcile_payment(&self, payment_id: i32) -> TransitionOutcome {
        info!(payment_id, "payments: reconcile requested");
        let result = self.try_reconcile(payment_id).await;
        Self::report("reconcile", payment_id, result)
    }

    pub async fn get_payment(&self, payment_id: i32) -> UseCaseResult<PaymentModel> {
        let payment = self
            .payment_repo
            .find_by_id(payment_id)
            .await
            .map_err(|err| {
                error!(payment_id, db_error = ?err, "payments: failed to load payment");
                PaymentError::Internal(err)
            })?
            .ok_or(PaymentError::NotFound(payment_id))?;

        Ok(PaymentModel::try_from(payment)?)
    }

    pub async fn find_by_psp_transaction(
        &self,
        psp_transaction_id: &str,
    ) -> UseCaseResult<Option<PaymentModel>> {
        let payment = self
            .payment_repo
            .find_by_psp_transaction_id(psp_transaction_id)
            .await
            .map_err(|err| {
                error!(psp_transaction_id, db_error = ?err, "payments: failed to load payment");
                PaymentError::Internal(err)
            })?;

        payment
            .map(PaymentModel::try_from)
            .transpose()
            .map_err(PaymentError::Internal)
    }

    pub async fn list_payments(&self) -> UseCaseResult<Vec<PaymentModel>> {
        let payments = self.payment_repo.list_payments().await.map_err(|err| {
            error!(db_error = ?err, "payments: failed to list payments");
            PaymentError::Internal(err)
        })?;
        Self::into_models(payments)
    }

    pub async fn list_by_customer(&self, customer_id: i32) -> UseCaseResult<Vec<PaymentModel>> {
        let payments = self
            .payment_repo
            .list_by_customer_id(customer_id)
            .await
            .map_err(|err| {
                error!(customer_id, db_error = ?err, "payments: failed to list customer payments");
                PaymentError::Internal(err)
            })?;
        Self::into_models(payments)
    }

    pub async fn list_by_requester(
        &self,
        requester_type: i32,
        requester_id: i32,
    ) -> UseCaseResult<Vec<PaymentModel>> {
        let requester_type = RequesterType::from_code(requester_type).ok_or_else(|| {
            PaymentError::Validation(format!("requester_type {requester_type} is not supported"))
        })?;

        let payments = self
            .payment_repo
            .list_by_requester(requester_type, requester_id)
            .await
            .map_err(|err| {
                error!(
                    requester_type = %requester_type,
                    requester_id,
                    db_error = ?err,
                    "payments: failed to list requester payments"
                );
                PaymentError::Internal(err)
            })?;
        Self::into_models(payments)
    }

    pub async fn get_payment_status(&self, payment_id: i32) -> UseCaseResult<PaymentStatus> {
        let code = self
            .payment_repo
            .find_status(payment_id)
            .await
            .map_err(|err| {
                error!(payment_id, db_error = ?err, "payments: failed to load status");
                PaymentError::Internal(err)
            })?
            .ok_or(PaymentError::NotFound(payment_id))?;

        PaymentStatus::from_code(code)
            .ok_or_else(|| PaymentError::Internal(anyhow!("payment {payment_id} has unknown status {code}")))
    }

    pub async fn get_payment_amount(&self, payment_id: i32) -> UseCaseResult<BigDecimal> {
        self.payment_repo
            .find_amount(payment_id)
            .await
            .map_err(|err| {
                error!(payment_id, db_error = ?err, "payments: failed to load amount");
                PaymentError::Internal(err)
            })?
            .ok_or(PaymentError::NotFound(payment_id))
    }

    fn validate(request: CreatePaymentModel) -> UseCaseResult<ValidatedPayment> {
        let mut errors = Vec::new();

        if request.customer_id.is_none() {
            errors.push("customer_id is required".to_string());
        }
        if request.requester_id.is_none() {
            errors.push("requester_id is required".to_string());
        }

        let requester_type = match request.requester_type {
            None => {
                errors.push("requester_type is required".to_string());
                None
            }
            Some(code) => {
                let parsed = RequesterType::from_code(code);
                if parsed.is_none() {
                    errors.push(format!("requester_type {code} is not supported"));
                }
                parsed
            }
        };

        let payment_method = match request.payment_method.as_deref() {
            None => {
                errors.push("payment_method is required".to_string());
                None
            }
            Some(raw) => {
                let parsed = PaymentMethod::from_str(raw);
                if parsed.is_none() {
                    errors.push(format!("payment_method {raw:?} is not supported"));
                }
                parsed
            }
        };

        let customer_phone = request
            .customer_phone
            .map(|phone| phone.trim().to_string())
            .filter(|phone| !phone.is_empty());
        if payment_method == Some(PaymentMethod::Ovo) && customer_phone.is_none() {
            errors.push("customer_phone is required for ovo".to_string());
        }

        if request.payment_amount.is_none() {
            errors.push("payment_amount is required".to_string());
        }

        match (
            request.customer_id,
            request.requester_id,
            requester_type,
            payment_method,
            request.payment_amount,
        ) {
            (
                Some(customer_id),
                Some(requester_id),
                Some(requester_type),
                Some(payment_method),
                Some(payment_amount),
            ) if errors.is_empty() => {
                if payment_amount <= BigDecimal::zero() {
                    return Err(PaymentError::InvalidAmount);
                }
                Self::validate_amount_shape(&payment_amount, payment_method)?;

                Ok(ValidatedPayment {
                    insert: NewPaymentEntity {
                        customer_id,
                        requester_type: requester_type.code(),
                        requester_id,
                        secondary_requester_id: request.secondary_requester_id,
                        payment_method: payment_method.to_string(),
                        payment_amount,
                        status: PaymentStatus::Pending.code(),
                    },
                    payment_method,
                    customer_phone,
                })
            }
            _ => Err(PaymentError::Validation(errors.join("; "))),
        }
    }

    /// Amounts must fit `NUMERIC(15,2)`; processor charges are whole rupiah.
    fn validate_amount_shape(
        payment_amount: &BigDecimal,
        payment_method: PaymentMethod,
    ) -> UseCaseResult<()> {
        if payment_amount.with_scale(2) != *payment_amount {
            return Err(PaymentError::Validation(
                "payment_amount must have at most 2 decimal places".to_string(),
            ));
        }
        if *payment_amount >= BigDecimal::from(MAX_AMOUNT_EXCLUSIVE) {
            return Err(PaymentError::Validation(format!(
                "payment_amount must be below {MAX_AMOUNT_EXCLUSIVE}"
            )));
        }
        if payment_method.requires_psp() && !payment_amount.is_integer() {
            return Err(PaymentError::Validation(format!(
                "payment_amount must be a whole number for {payment_method}"
            )));
        }
        Ok(())
    }

    async fn try_finalize_by_id(
        &self,
        payment_id: i32,
        target: PaymentStatus,
    ) -> AnyResult<TransitionOutcome> {
        let Some(payment) = self.payment_repo.find_by_id(payment_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };

        let outcome = self.finalize(payment, target).await?;
        if let TransitionOutcome::Transitioned(payment) = &outcome {
            if target == PaymentStatus::Cancelled && payment.payment_method.requires_psp() {
                self.cancel_remote(payment).await;
            }
            self.notify_requester(payment);
        }
        Ok(outcome)
    }

    async fn try_handle_callback(
        &self,
        psp_transaction_id: &str,
        remote_status: &str,
    ) -> AnyResult<TransitionOutcome> {
        let Some(payment) = self
            .payment_repo
            .find_by_psp_transaction_id(psp_transaction_id)
            .await?
        else {
            return Ok(TransitionOutcome::NotFound);
        };

        let current = Self::current_status(&payment)?;
        if current.is_terminal() {
            return Ok(TransitionOutcome::AlreadyFinalized(current));
        }

        let target = match RemoteStatus::parse(remote_status) {
            RemoteStatus::Final(target) => target,
            RemoteStatus::InFlight | RemoteStatus::Unrecognized(_) => {
                return Ok(TransitionOutcome::InvalidRemoteStatus(remote_status.to_string()));
            }
        };

        let outcome = self.finalize(payment, target).await?;
        if let TransitionOutcome::Transitioned(payment) = &outcome {
            self.notify_requester(payment);
        }
        Ok(outcome)
    }

    async fn try_reconcile(&self, payment_id: i32) -> AnyResult<TransitionOutcome> {
        let Some(payment) = self.payment_repo.find_by_id(payment_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };

        let current = Self::current_status(&payment)?;
        if current.is_terminal() {
            return Ok(TransitionOutcome::AlreadyFinalized(current));
        }

        let Some(psp_transaction_id) = payment.psp_transaction_id.clone() else {
            return Ok(TransitionOutcome::NotReconcilable);
        };

        let remote = match self.psp_client.query_status(&psp_transaction_id).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(
                    payment_id,
                    psp_transaction_id = %psp_transaction_id,
                    error = %err,
                    "payments: psp status query failed"
                );
                return Ok(TransitionOutcome::Failed);
            }
        };

        debug!(
            payment_id,
            psp_transaction_id = %psp_transaction_id,
            transaction_status = %remote.transaction_status,
            "payments: psp status received"
        );

        match RemoteStatus::parse(&remote.transaction_status) {
            RemoteStatus::Final(target) => {
                let outcome = self.finalize(payment, target).await?;
                if let TransitionOutcome::Transitioned(payment) = &outcome {
                    self.notify_requester(payment);
                }
                Ok(outcome)
            }
            RemoteStatus::InFlight => Ok(TransitionOutcome::StillPending),
            RemoteStatus::Unrecognized(value) => Ok(TransitionOutcome::InvalidRemoteStatus(value)),
        }
    }

    /// Pending guard plus compare-and-swap; no lock is held across processor calls.
    async fn finalize(
        &self,
        payment: PaymentEntity,
        target: PaymentStatus,
    ) -> AnyResult<TransitionOutcome> {
        let current = Self::current_status(&payment)?;
        if current.is_terminal() {
            return Ok(TransitionOutcome::AlreadyFinalized(current));
        }

        match self.payment_repo.finalize_pending(payment.id, target).await? {
            Some(updated) => Ok(TransitionOutcome::Transitioned(PaymentModel::try_from(updated)?)),
            None => {
                // Another request finalized the payment between our read and write.
                let status = self.payment_repo.find_status(payment.id).await?;
                Ok(match status.and_then(PaymentStatus::from_code) {
                    Some(status) => TransitionOutcome::AlreadyFinalized(status),
                    None => TransitionOutcome::NotFound,
                })
            }
        }
    }

    async fn cancel_remote(&self, payment: &PaymentModel) {
        let Some(psp_transaction_id) = payment.psp_transaction_id.as_deref() else {
            debug!(
                payment_id = payment.id,
                "payments: no psp transaction to cancel"
            );
            return;
        };

        match self.psp_client.cancel_transaction(psp_transaction_id).await {
            Ok(raw) => {
                info!(
                    payment_id = payment.id,
                    psp_transaction_id, "payments: psp transaction cancelled"
                );
                self.record_psp_response(payment.id, raw).await;
            }
            Err(err) => {
                // Local cancellation stands; the processor record may still be open.
                warn!(
                    payment_id = payment.id,
                    psp_transaction_id,
                    error = %err,
                    "payments: psp cancel failed; local and processor state may differ"
                );
            }
        }
    }

    async fn record_psp_response(&self, payment_id: i32, raw: serde_json::Value) {
        if let Err(err) = self
            .payment_repo
            .update_raw_psp_response(payment_id, raw)
            .await
        {
            warn!(
                payment_id,
                db_error = ?err,
                "payments: failed to record psp response"
            );
        }
    }

    fn notify_requester(&self, payment: &PaymentModel) {
        self.requesters.notify(RequesterUpdate {
            payment_id: payment.id,
            requester_type: payment.requester_type,
            requester_id: payment.requester_id,
            secondary_requester_id: payment.secondary_requester_id,
            status: payment.status,
        });
    }

    fn current_status(payment: &PaymentEntity) -> AnyResult<PaymentStatus> {
        PaymentStatus::from_code(payment.status)
            .ok_or_else(|| anyhow!("payment {} has unknown status {}", payment.id, payment.status))
    }

    fn into_models(payments: Vec<PaymentEntity>) -> UseCaseResult<Vec<PaymentModel>> {
        payments
            .into_iter()
            .map(|payment| PaymentModel::try_from(payment).map_err(PaymentError::Internal))
            .collect()
    }

    fn report(
        operation: &'static str,
        payment_id: i32,
        result: AnyResult<TransitionOutcome>,
    ) -> TransitionOutcome {
        match result {
            Ok(outcome) => {
                match &outcome {
                    TransitionOutcome::Transitioned(payment) => info!(
                        payment_id,
                        operation,
                        status = %payment.status,
                        "payments: payment finalized"
                    ),
                    other => info!(
                        payment_id,
                        operation,
                        outcome = other.label(),
                        "payments: payment left unchanged"
                    ),
                }
                outcome
            }
            Err(err) => {
                error!(
                    payment_id,
                    operation,
                    error = ?err,
                    "payments: transition failed"
                );
                TransitionOutcome::Failed
            }
        }
    }
}
