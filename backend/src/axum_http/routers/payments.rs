use crate::{
    axum_http::error_responses::AppError,
    config::config_model::DotEnvyConfig,
    usecases::payments::{PaymentUseCase, PspGateway, RequesterGateway, TransitionOutcome},
};
use anyhow::{Context, Result, bail};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use payments_core::{
    domain::{
        repositories::payments::PaymentRepository,
        value_objects::{
            enums::remote_statuses::RemoteStatus,
            payments::{
                CreatePaymentModel, PaymentAmountDto, PaymentCallbackModel, PaymentModel,
                PaymentStatusDto,
            },
        },
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad, repositories::payments::PaymentPostgres,
    },
    psp::midtrans_client::{MidtransClient, notification_status_codes},
    requesters::{HttpStatusSink, RequesterNotifier},
};
use bigdecimal::BigDecimal;
use std::{str::FromStr, sync::Arc};
use tracing::{info, warn};

pub struct PaymentsState<R, P, N>
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    pub usecase: PaymentUseCase<R, P, N>,
    /// Set when callbacks must carry a valid Midtrans signature.
    pub signature_verifier: Option<Arc<MidtransClient>>,
}

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Result<Router> {
    let payment_repository = PaymentPostgres::new(Arc::clone(&db_pool));
    let midtrans_client = Arc::new(MidtransClient::new(
        config.midtrans.server_key.clone(),
        config.midtrans.base_url.clone(),
        config.midtrans.timeout,
    )?);
    let status_sink = HttpStatusSink::new(config.requesters.request_timeout)?;
    let requester_notifier =
        RequesterNotifier::new(config.requesters.clone(), Arc::new(status_sink));

    let usecase = PaymentUseCase::new(
        Arc::new(payment_repository),
        Arc::clone(&midtrans_client),
        Arc::new(requester_notifier),
    );
    let signature_verifier = config
        .midtrans
        .verify_signature
        .then(|| Arc::clone(&midtrans_client));

    Ok(router(PaymentsState {
        usecase,
        signature_verifier,
    }))
}

pub fn router<R, P, N>(state: PaymentsState<R, P, N>) -> Router
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    Router::new()
        .route("/", post(create_payment).get(list_payments))
        .route("/callback", post(handle_callback))
        .route("/customers/:customer_id", get(list_by_customer))
        .route(
            "/requesters/:requester_type/:requester_id",
            get(list_by_requester),
        )
        .route("/:payment_id", get(get_payment))
        .route("/:payment_id/status", get(get_payment_status))
        .route("/:payment_id/amount", get(get_payment_amount))
        .route("/:payment_id/complete", post(complete_payment))
        .route("/:payment_id/cancel", post(cancel_payment))
        .route("/:payment_id/reconcile", post(reconcile_payment))
        .with_state(Arc::new(state))
}

fn outcome_response(outcome: TransitionOutcome) -> Response {
    if let Some(err) = AppError::from_outcome(&outcome) {
        return err.into_response();
    }
    match outcome {
        TransitionOutcome::Transitioned(payment) => Json(payment).into_response(),
        other => (
            other.status_code(),
            Json(serde_json::json!({ "outcome": other.label() })),
        )
            .into_response(),
    }
}

pub async fn create_payment<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Json(create_payment_model): Json<CreatePaymentModel>,
) -> Result<impl IntoResponse, AppError>
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    let payment = state.usecase.create_payment(create_payment_model).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn list_payments<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
) -> Result<impl IntoResponse, AppError>
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    Ok(Json(state.usecase.list_payments().await?))
}

pub async fn get_payment<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Path(payment_id): Path<i32>,
) -> Result<impl IntoResponse, AppError>
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    Ok(Json(state.usecase.get_payment(payment_id).await?))
}

pub async fn get_payment_status<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Path(payment_id): Path<i32>,
) -> Result<impl IntoResponse, AppError>
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    let status = state.usecase.get_payment_status(payment_id).await?;
    Ok(Json(PaymentStatusDto { payment_id, status }))
}

pub async fn get_payment_amount<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Path(payment_id): Path<i32>,
) -> Result<impl IntoResponse, AppError>
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    let payment_amount = state.usecase.get_payment_amount(payment_id).await?;
    Ok(Json(PaymentAmountDto {
        payment_id,
        payment_amount,
    }))
}

pub async fn list_by_customer<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Path(customer_id): Path<i32>,
) -> Result<impl IntoResponse, AppError>
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    Ok(Json(state.usecase.list_by_customer(customer_id).await?))
}

pub async fn list_by_requester<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Path((requester_type, requester_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError>
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    Ok(Json(
        state
            .usecase
            .list_by_requester(requester_type, requester_id)
            .await?,
    ))
}

pub async fn complete_payment<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Path(payment_id): Path<i32>,
) -> Response
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    outcome_response(state.usecase.complete_payment(payment_id).await)
}

pub async fn cancel_payment<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Path(payment_id): Path<i32>,
) -> Response
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    outcome_response(state.usecase.cancel_payment(payment_id).await)
}

pub async fn reconcile_payment<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Path(payment_id): Path<i32>,
) -> Response
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    outcome_response(state.usecase.reconcile_payment(payment_id).await)
}

pub async fn handle_callback<R, P, N>(
    State(state): State<Arc<PaymentsState<R, P, N>>>,
    Json(callback): Json<PaymentCallbackModel>,
) -> Response
where
    R: PaymentRepository + Send + Sync + 'static,
    P: PspGateway + 'static,
    N: RequesterGateway + 'static,
{
    if let Some(verifier) = &state.signature_verifier {
        let payment = match state
            .usecase
            .find_by_psp_transaction(&callback.transaction_id)
            .await
        {
            Ok(payment) => payment,
            Err(err) => return AppError::from(err).into_response(),
        };

        if let Err(err) = authenticate_callback(verifier, &callback, payment.as_ref()) {
            warn!(
                psp_transaction_id = %callback.transaction_id,
                transaction_status = %callback.transaction_status,
                error = %err,
                "payments: callback rejected"
            );
            return AppError::Unauthorized.into_response();
        }
    }

    info!(
        psp_transaction_id = %callback.transaction_id,
        transaction_status = %callback.transaction_status,
        "payments: callback request received"
    );
    let outcome = match state
        .usecase
        .handle_callback(&callback.transaction_id, &callback.transaction_status)
        .await
    {
        // In-flight notices are acknowledged without a transition.
        TransitionOutcome::InvalidRemoteStatus(value)
            if RemoteStatus::parse(&value) == RemoteStatus::InFlight =>
        {
            TransitionOutcome::StillPending
        }
        outcome => outcome,
    };
    outcome_response(outcome)
}

/// The signature covers only `order_id`, `status_code` and `gross_amount`, so the
/// unsigned `transaction_id` and `transaction_status` must agree with them.
fn authenticate_callback(
    verifier: &MidtransClient,
    callback: &PaymentCallbackModel,
    payment: Option<&PaymentModel>,
) -> Result<()> {
    let (Some(order_id), Some(status_code), Some(gross_amount), Some(signature_key)) = (
        callback.order_id.as_deref(),
        callback.status_code.as_deref(),
        callback.gross_amount.as_deref(),
        callback.signature_key.as_deref(),
    ) else {
        bail!("callback is missing signature fields");
    };

    verifier.verify_notification_signature(order_id, status_code, gross_amount, signature_key)?;

    if let Some(expected) = notification_status_codes(&callback.transaction_status) {
        if !expected.contains(&status_code) {
            bail!(
                "status_code {status_code} does not match transaction_status {}",
                callback.transaction_status
            );
        }
    }

    if let Some(payment) = payment {
        if order_id != payment.id.to_string() {
            bail!("order_id {order_id} does not match payment {}", payment.id);
        }
        let signed_amount = BigDecimal::from_str(gross_amount)
            .with_context(|| format!("gross_amount {gross_amount} is not a number"))?;
        if signed_amount != payment.payment_amount {
            bail!(
                "gross_amount {gross_amount} does not match payment amount {}",
                payment.payment_amount
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::payments::{MockPspGateway, MockRequesterGateway};
    use chrono::Utc;
    use payments_core::{
        domain::{
            entities::payments::PaymentEntity,
            repositories::payments::MockPaymentRepository,
            value_objects::enums::{
                payment_methods::PaymentMethod, payment_statuses::PaymentStatus,
                requester_types::RequesterType,
            },
        },
        psp::midtrans_client::notification_signature_hex,
    };
    use std::time::Duration;

    const SERVER_KEY: &str = "SB-Mid-server-abc";

    fn pending_payment(id: i32, amount: &str, psp_transaction_id: &str) -> PaymentEntity {
        let now = Utc::now();
        PaymentEntity {
            id,
            customer_id: 1,
            requester_type: RequesterType::Order.code(),
            requester_id: 10,
            secondary_requester_id: None,
            payment_method: PaymentMethod::Qris.to_string(),
            payment_amount: BigDecimal::from_str(amount).unwrap(),
            status: PaymentStatus::Pending.code(),
            psp_transaction_id: Some(psp_transaction_id.to_string()),
            raw_psp_response: None,
            settle_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn signed_callback(
        transaction_id: &str,
        transaction_status: &str,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
    ) -> PaymentCallbackModel {
        PaymentCallbackModel {
            transaction_id: transaction_id.to_string(),
            transaction_status: transaction_status.to_string(),
            order_id: Some(order_id.to_string()),
            status_code: Some(status_code.to_string()),
            gross_amount: Some(gross_amount.to_string()),
            signature_key: Some(notification_signature_hex(
                order_id,
                status_code,
                gross_amount,
                SERVER_KEY,
            )),
        }
    }

    /// Repository holding one stored payment, reachable by its processor id.
    fn repo_with(payment: PaymentEntity) -> MockPaymentRepository {
        let mut payment_repo = MockPaymentRepository::new();
        payment_repo
            .expect_find_by_psp_transaction_id()
            .returning(move |psp_transaction_id| {
                let found = (payment.psp_transaction_id.as_deref() == Some(psp_transaction_id))
                    .then(|| payment.clone());
                Box::pin(async move { Ok(found) })
            });
        payment_repo
    }

    fn verifying_state(
        payment_repo: MockPaymentRepository,
        requesters: MockRequesterGateway,
    ) -> Arc<PaymentsState<MockPaymentRepository, MockPspGateway, MockRequesterGateway>> {
        let verifier = MidtransClient::new(
            SERVER_KEY.to_string(),
            "https://api.sandbox.midtrans.com".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();

        Arc::new(PaymentsState {
            usecase: PaymentUseCase::new(
                Arc::new(payment_repo),
                Arc::new(MockPspGateway::new()),
                Arc::new(requesters),
            ),
            signature_verifier: Some(Arc::new(verifier)),
        })
    }

    #[tokio::test]
    async fn signed_settlement_completes_payment() {
        let stored = pending_payment(5, "1000.00", "TXN5");
        let mut payment_repo = repo_with(stored.clone());
        payment_repo
            .expect_finalize_pending()
            .times(1)
            .returning(move |_, status| {
                let mut payment = stored.clone();
                payment.status = status.code();
                payment.settle_date = Some(Utc::now());
                Box::pin(async move { Ok(Some(payment)) })
            });
        let mut requesters = MockRequesterGateway::new();
        requesters.expect_notify().times(1).return_const(());

        let response = handle_callback(
            State(verifying_state(payment_repo, requesters)),
            Json(signed_callback("TXN5", "settlement", "5", "200", "1000.00")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tampered_or_unsigned_callbacks_are_unauthorized() {
        let mut tampered = signed_callback("TXN5", "settlement", "5", "200", "1000.00");
        tampered.gross_amount = Some("1.00".to_string());

        let mut unsigned = signed_callback("TXN5", "settlement", "5", "200", "1000.00");
        unsigned.signature_key = None;

        for callback in [tampered, unsigned] {
            let mut payment_repo = repo_with(pending_payment(5, "1000.00", "TXN5"));
            payment_repo.expect_finalize_pending().never();
            let mut requesters = MockRequesterGateway::new();
            requesters.expect_notify().never();

            let response =
                handle_callback(State(verifying_state(payment_repo, requesters)), Json(callback))
                    .await;

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn signed_notice_cannot_be_replayed_against_another_payment() {
        // Genuinely signed for payment 5, pointed at payment 9's transaction.
        let mut payment_repo = repo_with(pending_payment(9, "1000.00", "TXN-OTHER"));
        payment_repo.expect_finalize_pending().never();
        let mut requesters = MockRequesterGateway::new();
        requesters.expect_notify().never();

        let response = handle_callback(
            State(verifying_state(payment_repo, requesters)),
            Json(signed_callback("TXN-OTHER", "settlement", "5", "200", "1000.00")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn pending_notice_cannot_be_upgraded_to_settlement() {
        let mut payment_repo = repo_with(pending_payment(5, "1000.00", "TXN5"));
        payment_repo.expect_finalize_pending().never();
        let mut requesters = MockRequesterGateway::new();
        requesters.expect_notify().never();

        let response = handle_callback(
            State(verifying_state(payment_repo, requesters)),
            Json(signed_callback("TXN5", "settlement", "5", "201", "1000.00")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signed_amount_must_match_stored_amount() {
        let mut payment_repo = repo_with(pending_payment(5, "1000.00", "TXN5"));
        payment_repo.expect_finalize_pending().never();

        let response = handle_callback(
            State(verifying_state(payment_repo, MockRequesterGateway::new())),
            Json(signed_callback("TXN5", "settlement", "5", "200", "10.00")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn in_flight_notice_is_acknowledged_without_change() {
        let mut payment_repo = repo_with(pending_payment(5, "1000.00", "TXN5"));
        payment_repo.expect_finalize_pending().never();
        let mut requesters = MockRequesterGateway::new();
        requesters.expect_notify().never();

        let response = handle_callback(
            State(verifying_state(payment_repo, requesters)),
            Json(signed_callback("TXN5", "pending", "5", "201", "1000.00")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unrecognized_status_is_still_unprocessable() {
        let mut payment_repo = repo_with(pending_payment(5, "1000.00", "TXN5"));
        payment_repo.expect_finalize_pending().never();

        let response = handle_callback(
            State(verifying_state(payment_repo, MockRequesterGateway::new())),
            Json(signed_callback("TXN5", "refund", "5", "200", "1000.00")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
