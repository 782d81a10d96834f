//! Event and context types shared across the pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tenant and project scope attached to every normalized event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Tenant identifier (lowercase alphanumeric plus hyphen).
    pub tenant_id: String,
    /// Project identifier (lowercase alphanumeric plus hyphen/underscore).
    pub project_id: String,
}

impl TenantContext {
    /// Creates a context from owned identifiers.
    pub fn new(tenant_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
        }
    }
}

/// Billing lifecycle event types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    SubscriptionPaused,
    SubscriptionResumed,
    InvoiceCreated,
    InvoicePaid,
    InvoicePaymentFailed,
    InvoiceRefunded,
    InvoiceDisputed,
    InvoiceVoided,
    PaymentSucceeded,
    PaymentFailed,
    PlanChanged,
}

impl EventType {
    /// All event types, in declaration order.
    pub const ALL: [Self; 14] = [
        Self::SubscriptionCreated,
        Self::SubscriptionUpdated,
        Self::SubscriptionCancelled,
        Self::SubscriptionPaused,
        Self::SubscriptionResumed,
        Self::InvoiceCreated,
        Self::InvoicePaid,
        Self::InvoicePaymentFailed,
        Self::InvoiceRefunded,
        Self::InvoiceDisputed,
        Self::InvoiceVoided,
        Self::PaymentSucceeded,
        Self::PaymentFailed,
        Self::PlanChanged,
    ];

    /// Snake-case wire name of the event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SubscriptionCreated => "subscription_created",
            Self::SubscriptionUpdated => "subscription_updated",
            Self::SubscriptionCancelled => "subscription_cancelled",
            Self::SubscriptionPaused => "subscription_paused",
            Self::SubscriptionResumed => "subscription_resumed",
            Self::InvoiceCreated => "invoice_created",
            Self::InvoicePaid => "invoice_paid",
            Self::InvoicePaymentFailed => "invoice_payment_failed",
            Self::InvoiceRefunded => "invoice_refunded",
            Self::InvoiceDisputed => "invoice_disputed",
            Self::InvoiceVoided => "invoice_voided",
            Self::PaymentSucceeded => "payment_succeeded",
            Self::PaymentFailed => "payment_failed",
            Self::PlanChanged => "plan_changed",
        }
    }

    /// Parses a snake-case wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Whether this is an invoice lifecycle event.
    #[must_use]
    pub const fn is_invoice(self) -> bool {
        matches!(
            self,
            Self::InvoiceCreated
                | Self::InvoicePaid
                | Self::InvoicePaymentFailed
                | Self::InvoiceRefunded
                | Self::InvoiceDisputed
                | Self::InvoiceVoided
        )
    }

    /// Whether this event records money being received.
    #[must_use]
    pub const fn is_payment(self) -> bool {
        matches!(self, Self::InvoicePaid | Self::PaymentSucceeded)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated billing event. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingEvent {
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// Unique event identifier from the source system.
    pub event_id: String,
    /// Lifecycle event type.
    pub event_type: EventType,
    /// Event occurrence time.
    pub timestamp: DateTime<Utc>,
    /// Customer the event belongs to.
    pub customer_id: String,
    /// Subscription reference, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// Invoice reference, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    /// Monetary amount in integer cents, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    /// ISO currency code, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Plan reference, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    /// Billing period start carried on the event, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_start: Option<DateTime<Utc>>,
    /// Billing period end carried on the event, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<DateTime<Utc>>,
    /// Free-form metadata from the source system.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// The original raw record, preserved verbatim.
    #[serde(default)]
    pub raw_payload: BTreeMap<String, Value>,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Path of the offending field (e.g. `amount_cents`).
    pub path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A billing event that has passed through the normalizer. Never mutated
/// afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// The validated billing event.
    #[serde(flatten)]
    pub event: BillingEvent,
    /// When normalization ran (the stable sentinel under stable output).
    pub normalized_at: DateTime<Utc>,
    /// Content hash over the fixed billing-content key subset.
    pub source_hash: String,
    /// Violations recorded when validation was skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<FieldError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_names_round_trip() {
        for event_type in EventType::ALL {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type.as_str()));
        }
    }

    #[test]
    fn unknown_event_type_does_not_parse() {
        assert_eq!(EventType::parse("subscription_deleted"), None);
    }

    #[test]
    fn invoice_and_payment_classification() {
        assert!(EventType::InvoicePaid.is_invoice());
        assert!(EventType::InvoicePaid.is_payment());
        assert!(EventType::PaymentSucceeded.is_payment());
        assert!(!EventType::PaymentSucceeded.is_invoice());
        assert!(!EventType::SubscriptionCreated.is_invoice());
        assert!(!EventType::PaymentFailed.is_payment());
    }
}
