use serde::Serialize;

use crate::domain::value_objects::enums::{
    payment_statuses::PaymentStatus, requester_types::RequesterType,
};

/// Status change to propagate to the domain that owns a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequesterUpdate {
    pub payment_id: i32,
    pub requester_type: RequesterType,
    pub requester_id: i32,
    pub secondary_requester_id: Option<i32>,
    pub status: PaymentStatus,
}
