//! Entitlement event log
//!
//! Append-only audit rows for entitlement mutations. Events answer
//! "why is this account on this plan?" questions and survive row deletion.

use serde::{Deserialize, Serialize};

/// Types of entitlement events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitlementEventType {
    TrialActivated,
    PaymentActivated,
    AdminGranted,
    AdminDeleted,
}

impl std::fmt::Display for EntitlementEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntitlementEventType::TrialActivated => "TRIAL_ACTIVATED",
            EntitlementEventType::PaymentActivated => "PAYMENT_ACTIVATED",
            EntitlementEventType::AdminGranted => "ADMIN_GRANTED",
            EntitlementEventType::AdminDeleted => "ADMIN_DELETED",
        };
        write!(f, "{}", s)
    }
}
