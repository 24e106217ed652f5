use super::payment_statuses::PaymentStatus;

/// What a processor `transaction_status` means for a local payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Final(PaymentStatus),
    InFlight,
    Unrecognized(String),
}

impl RemoteStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "settlement" => RemoteStatus::Final(PaymentStatus::Completed),
            "cancel" | "expire" => RemoteStatus::Final(PaymentStatus::Cancelled),
            "pending" | "authorize" | "capture" => RemoteStatus::InFlight,
            other => RemoteStatus::Unrecognized(other.to_string()),
        }
    }
}
