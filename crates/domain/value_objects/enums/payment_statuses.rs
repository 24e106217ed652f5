use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle of a payment. Stored as its integer code.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "i32", into = "i32")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl PaymentStatus {
    pub fn code(&self) -> i32 {
        match self {
            PaymentStatus::Pending => 1,
            PaymentStatus::Completed => 2,
            PaymentStatus::Cancelled => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(PaymentStatus::Pending),
            2 => Some(PaymentStatus::Completed),
            3 => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Label shown to delivery staff.
    pub fn delivery_label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Waiting for payment",
            PaymentStatus::Completed => "Payment completed",
            PaymentStatus::Cancelled => "Payment cancelled",
        }
    }
}

impl TryFrom<i32> for PaymentStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        PaymentStatus::from_code(value).ok_or_else(|| format!("unknown payment status code {value}"))
    }
}

impl From<PaymentStatus> for i32 {
    fn from(value: PaymentStatus) -> Self {
        value.code()
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_persisted_values() {
        assert_eq!(PaymentStatus::Pending.code(), 1);
        assert_eq!(PaymentStatus::Completed.code(), 2);
        assert_eq!(PaymentStatus::Cancelled.code(), 3);
        assert_eq!(PaymentStatus::from_code(4), None);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn serializes_as_integer_code() {
        let json = serde_json::to_string(&PaymentStatus::Completed).unwrap();
        assert_eq!(json, "2");

        let parsed: PaymentStatus = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, PaymentStatus::Cancelled);
        assert!(serde_json::from_str::<PaymentStatus>("9").is_err());
    }
}
