use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    #[serde(rename = "tunai")]
    Cash,
    #[serde(rename = "bca_va")]
    BcaVa,
    #[serde(rename = "qris")]
    Qris,
    #[serde(rename = "gopay")]
    Gopay,
    #[serde(rename = "ovo")]
    Ovo,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "tunai",
            PaymentMethod::BcaVa => "bca_va",
            PaymentMethod::Qris => "qris",
            PaymentMethod::Gopay => "gopay",
            PaymentMethod::Ovo => "ovo",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "tunai" => Some(PaymentMethod::Cash),
            "bca_va" => Some(PaymentMethod::BcaVa),
            "qris" => Some(PaymentMethod::Qris),
            "gopay" => Some(PaymentMethod::Gopay),
            "ovo" => Some(PaymentMethod::Ovo),
            _ => None,
        }
    }

    /// Cash is settled in person and never reaches the processor.
    pub fn requires_psp(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
