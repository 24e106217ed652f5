use std::time::Duration;

use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bigdecimal::{BigDecimal, ToPrimitive};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Value, json};
use sha2::{Digest, Sha512};
use thiserror::Error;
use tracing::{debug, error};

use crate::domain::value_objects::enums::payment_methods::PaymentMethod;

pub const DEFAULT_BASE_URL: &str = "https://api.sandbox.midtrans.com";

/// Midtrans core API client. One instance is shared so connections are pooled.
pub struct MidtransClient {
    http: reqwest::Client,
    server_key: String,
    base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub payment_id: i32,
    pub payment_method: PaymentMethod,
    pub amount: BigDecimal,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PspTransaction {
    pub transaction_id: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PspStatus {
    pub transaction_status: String,
    pub raw: Value,
}

/// Processor failures are values: callers decide whether to carry on without a reference.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PspError {
    #[error("invalid charge request: {0}")]
    InvalidRequest(String),
    #[error("processor unreachable: {0}")]
    Transport(String),
    #[error("processor request timed out")]
    Timeout,
    #[error("processor rejected request with status {status}")]
    Rejected { status: u16, body: String },
    #[error("processor response could not be decoded: {0}")]
    Decode(String),
    #[error("processor response has no {0}")]
    MissingField(&'static str),
}

impl PspError {
    /// Structured form kept alongside the payment for later inspection.
    pub fn to_json(&self) -> Value {
        let kind = match self {
            PspError::InvalidRequest(_) => "invalid_request",
            PspError::Transport(_) => "transport",
            PspError::Timeout => "timeout",
            PspError::Rejected { .. } => "rejected",
            PspError::Decode(_) => "decode",
            PspError::MissingField(_) => "missing_field",
        };

        let mut object = json!({
            "error": kind,
            "message": self.to_string(),
        });
        if let PspError::Rejected { status, body } = self {
            object["status"] = json!(status);
            object["body"] = json!(body);
        }
        object
    }
}

impl MidtransClient {
    pub fn new(server_key: String, base_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            server_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn authorization_header(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:", self.server_key)))
    }

    /// Opens a transaction for a non-cash payment. https://docs.midtrans.com/reference/charge-transactions-1
    pub async fn open_transaction(
        &self,
        request: &ChargeRequest,
    ) -> std::result::Result<PspTransaction, PspError> {
        let body = charge_body(request)?;
        debug!(
            payment_id = request.payment_id,
            payment_method = %request.payment_method,
            "midtrans: opening transaction"
        );

        let builder = self
            .http
            .post(format!("{}/v2/charge", self.base_url))
            .json(&body);
        let raw = self.send(builder, "charge").await?;

        let transaction_id = raw
            .get("transaction_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(PspError::MissingField("transaction_id"))?;

        Ok(PspTransaction {
            transaction_id,
            raw,
        })
    }

    pub async fn query_status(
        &self,
        psp_transaction_id: &str,
    ) -> std::result::Result<PspStatus, PspError> {
        let builder = self
            .http
            .get(format!("{}/v2/{}/status", self.base_url, psp_transaction_id));
        let raw = self.send(builder, "status").await?;

        let transaction_status = raw
            .get("transaction_status")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(PspError::MissingField("transaction_status"))?;

        Ok(PspStatus {
            transaction_status,
            raw,
        })
    }

    pub async fn cancel_transaction(
        &self,
        psp_transaction_id: &str,
    ) -> std::result::Result<Value, PspError> {
        let builder = self
            .http
            .post(format!("{}/v2/{}/cancel", self.base_url, psp_transaction_id));
        self.send(builder, "cancel").await
    }

    /// Checks a notification's `signature_key`. https://docs.midtrans.com/docs/https-notification-webhooks
    pub fn verify_notification_signature(
        &self,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature_key: &str,
    ) -> Result<()> {
        let expected = notification_signature(order_id, status_code, gross_amount, &self.server_key);
        let provided = hex::decode(signature_key.trim())?;

        if expected[..] != provided[..] {
            anyhow::bail!("invalid notification signature");
        }
        Ok(())
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        context: &str,
    ) -> std::result::Result<Value, PspError> {
        let resp = builder
            .header(AUTHORIZATION, self.authorization_header())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|err| {
                error!(context = %context, error = %err, "midtrans api request failed to send");
                if err.is_timeout() {
                    PspError::Timeout
                } else {
                    PspError::Transport(err.to_string())
                }
            })?;

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) => text,
            Err(err) => {
                error!(context = %context, error = %err, "midtrans api response body unreadable");
                return Err(if err.is_timeout() {
                    PspError::Timeout
                } else {
                    PspError::Transport(err.to_string())
                });
            }
        };

        if !status.is_success() {
            error!(
                status = %status,
                response_body = %body,
                context = %context,
                "midtrans api request failed"
            );
            return Err(PspError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = serde_json::from_str(&body).map_err(|err| {
            error!(context = %context, error = %err, response_body = %body, "midtrans api response is not json");
            PspError::Decode(err.to_string())
        })?;

        check_body_status(raw).inspect_err(|err| {
            error!(context = %context, error = %err, "midtrans api rejected request in body");
        })
    }
}

/// Midtrans answers HTTP 200 with an error `status_code` in the body.
fn check_body_status(raw: Value) -> std::result::Result<Value, PspError> {
    let code = raw
        .get("status_code")
        .and_then(Value::as_str)
        .and_then(|code| code.parse::<u16>().ok());

    match code {
        Some(code) if !(200..300).contains(&code) => Err(PspError::Rejected {
            status: code,
            body: raw.to_string(),
        }),
        _ => Ok(raw),
    }
}

/// IDR gross amounts are whole rupiah; fractional amounts are refused, never rounded.
fn gross_amount(amount: &BigDecimal) -> std::result::Result<i64, PspError> {
    if !amount.is_integer() {
        return Err(PspError::InvalidRequest(format!(
            "gross amount {amount} is not a whole number"
        )));
    }

    amount
        .to_i64()
        .filter(|value| *value > 0)
        .ok_or_else(|| PspError::InvalidRequest(format!("gross amount {amount} out of range")))
}

/// Notification `status_code` values that may accompany a final `transaction_status`.
/// https://docs.midtrans.com/docs/https-notification-webhooks
pub fn notification_status_codes(transaction_status: &str) -> Option<&'static [&'static str]> {
    match transaction_status {
        "settlement" => Some(&["200"]),
        "cancel" => Some(&["200", "202"]),
        "expire" => Some(&["202", "407"]),
        _ => None,
    }
}

pub(crate) fn charge_body(request: &ChargeRequest) -> std::result::Result<Value, PspError> {
    let amount = gross_amount(&request.amount)?;
    let transaction_details = json!({
        "order_id": request.payment_id.to_string(),
        "gross_amount": amount,
    });

    let body = match request.payment_method {
        PaymentMethod::Cash => {
            return Err(PspError::InvalidRequest(
                "cash payments are not charged through the processor".to_string(),
            ));
        }
        PaymentMethod::BcaVa => json!({
            "payment_type": "bank_transfer",
            "transaction_details": transaction_details,
            "bank_transfer": { "bank": "bca" },
        }),
        PaymentMethod::Qris => json!({
            "payment_type": "qris",
            "transaction_details": transaction_details,
            "qris": { "acquirer": "gopay" },
        }),
        PaymentMethod::Gopay => json!({
            "payment_type": "gopay",
            "transaction_details": transaction_details,
            "gopay": { "enable_callback": false },
        }),
        PaymentMethod::Ovo => {
            let phone = request
                .customer_phone
                .as_deref()
                .filter(|phone| !phone.trim().is_empty())
                .ok_or_else(|| {
                    PspError::InvalidRequest("ovo charges need a customer phone".to_string())
                })?;
            json!({
                "payment_type": "ovo",
                "transaction_details": transaction_details,
                "ovo": { "phone_number": phone.trim() },
            })
        }
    };

    Ok(body)
}

/// Hex `signature_key` Midtrans sends for a notification.
pub fn notification_signature_hex(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    hex::encode(notification_signature(
        order_id,
        status_code,
        gross_amount,
        server_key,
    ))
}

fn notification_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn request(method: PaymentMethod, amount: &str) -> ChargeRequest {
        ChargeRequest {
            payment_id: 42,
            payment_method: method,
            amount: BigDecimal::from_str(amount).unwrap(),
            customer_phone: None,
        }
    }

    fn client() -> MidtransClient {
        MidtransClient::new(
            "SB-Mid-server-abc".to_string(),
            "https://api.sandbox.midtrans.com/".to_string(),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn bca_va_charge_uses_bank_transfer() {
        let body = charge_body(&request(PaymentMethod::BcaVa, "20000")).unwrap();
        assert_eq!(body["payment_type"], "bank_transfer");
        assert_eq!(body["bank_transfer"]["bank"], "bca");
        assert_eq!(body["transaction_details"]["order_id"], "42");
        assert_eq!(body["transaction_details"]["gross_amount"], 20000);
    }

    #[test]
    fn qris_and_gopay_bodies_carry_their_payment_type() {
        let qris = charge_body(&request(PaymentMethod::Qris, "15000.00")).unwrap();
        assert_eq!(qris["payment_type"], "qris");
        assert_eq!(qris["transaction_details"]["gross_amount"], 15000);

        let gopay = charge_body(&request(PaymentMethod::Gopay, "1000")).unwrap();
        assert_eq!(gopay["payment_type"], "gopay");
    }

    #[test]
    fn fractional_amount_is_refused_instead_of_rounded() {
        let err = charge_body(&request(PaymentMethod::Qris, "15000.40")).unwrap_err();
        assert!(matches!(err, PspError::InvalidRequest(ref message) if message.contains("15000.40")));

        let err = charge_body(&request(PaymentMethod::BcaVa, "0.00")).unwrap_err();
        assert!(matches!(err, PspError::InvalidRequest(_)));
    }

    #[test]
    fn final_statuses_have_known_notification_codes() {
        assert_eq!(notification_status_codes("settlement"), Some(&["200"][..]));
        assert!(notification_status_codes("expire").unwrap().contains(&"202"));
        assert!(!notification_status_codes("cancel").unwrap().contains(&"201"));
        assert_eq!(notification_status_codes("pending"), None);
    }

    #[test]
    fn ovo_requires_phone_number() {
        let err = charge_body(&request(PaymentMethod::Ovo, "1000")).unwrap_err();
        assert!(matches!(err, PspError::InvalidRequest(_)));

        let mut with_phone = request(PaymentMethod::Ovo, "1000");
        with_phone.customer_phone = Some(" 081234567890 ".to_string());
        let body = charge_body(&with_phone).unwrap();
        assert_eq!(body["ovo"]["phone_number"], "081234567890");
    }

    #[test]
    fn cash_is_never_charged() {
        let err = charge_body(&request(PaymentMethod::Cash, "1000")).unwrap_err();
        assert!(matches!(err, PspError::InvalidRequest(_)));
    }

    #[test]
    fn authorization_is_basic_with_empty_password() {
        let header = client().authorization_header();
        let encoded = header.strip_prefix("Basic ").unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, "SB-Mid-server-abc:");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(client().base_url, "https://api.sandbox.midtrans.com");
    }

    #[test]
    fn error_status_in_body_is_rejected() {
        let raw = json!({ "status_code": "406", "status_message": "duplicate order id" });
        let err = check_body_status(raw).unwrap_err();
        assert!(matches!(err, PspError::Rejected { status: 406, .. }));

        let ok = json!({ "status_code": "201", "transaction_id": "TXN123" });
        assert!(check_body_status(ok).is_ok());
    }

    #[test]
    fn notification_signature_round_trip() {
        let client = client();
        let signature =
            notification_signature_hex("42", "200", "20000.00", "SB-Mid-server-abc");

        assert!(
            client
                .verify_notification_signature("42", "200", "20000.00", &signature)
                .is_ok()
        );
        assert!(
            client
                .verify_notification_signature("42", "200", "99999.00", &signature)
                .is_err()
        );
        assert!(
            client
                .verify_notification_signature("42", "200", "20000.00", "not-hex")
                .is_err()
        );
    }

    #[test]
    fn rejected_error_serializes_status_and_body() {
        let err = PspError::Rejected {
            status: 500,
            body: "boom".to_string(),
        };
        let value = err.to_json();
        assert_eq!(value["error"], "rejected");
        assert_eq!(value["status"], 500);
        assert_eq!(value["body"], "boom");
    }
}
