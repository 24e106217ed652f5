use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Domain that raised the payment obligation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "i32", into = "i32")]
pub enum RequesterType {
    Order,
    Reservation,
    Event,
}

impl RequesterType {
    pub fn code(&self) -> i32 {
        match self {
            RequesterType::Order => 1,
            RequesterType::Reservation => 2,
            RequesterType::Event => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(RequesterType::Order),
            2 => Some(RequesterType::Reservation),
            3 => Some(RequesterType::Event),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequesterType::Order => "order",
            RequesterType::Reservation => "reservation",
            RequesterType::Event => "event",
        }
    }
}

impl TryFrom<i32> for RequesterType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        RequesterType::from_code(value).ok_or_else(|| format!("unknown requester type {value}"))
    }
}

impl From<RequesterType> for i32 {
    fn from(value: RequesterType) -> Self {
        value.code()
    }
}

impl Display for RequesterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
