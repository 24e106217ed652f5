pub mod payment_methods;
pub mod payment_statuses;
pub mod remote_statuses;
pub mod requester_types;
