//! Ledger state types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a subscription.
///
/// `Canceled` is terminal: no event moves a subscription out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// Whether the subscription contributes to MRR totals.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether the status is the terminal canceled state.
    #[must_use]
    pub const fn is_canceled(self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Reconstructed state of a single subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Owning customer.
    pub customer_id: String,
    /// Current plan (default `"unknown"` when the source omitted it).
    pub plan_id: String,
    /// Lifecycle status.
    pub status: SubscriptionStatus,
    /// Current billing period start, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_start: Option<DateTime<Utc>>,
    /// Current billing period end, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    /// Monthly recurring revenue in cents. Never negative.
    pub mrr_cents: i64,
    /// ISO currency code (default `"USD"`).
    pub currency: String,
    /// When the subscription was created.
    pub created_at: DateTime<Utc>,
    /// When the subscription was canceled, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
    /// Whether cancellation takes effect at period end.
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

/// Reconstructed per-customer ledger. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerLedger {
    /// Customer identifier.
    pub customer_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// Subscriptions in creation order.
    pub subscriptions: Vec<SubscriptionState>,
    /// Sum of MRR over this customer's active subscriptions.
    pub total_mrr_cents: i64,
    /// Total cents paid in-window.
    pub total_paid_cents: i64,
    /// Total cents refunded in-window.
    pub total_refunded_cents: i64,
    /// Total cents disputed in-window.
    pub total_disputed_cents: i64,
    /// Payment failures observed in the trailing window.
    pub payment_failure_count_30d: u32,
    /// Most recent invoice activity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_invoice_at: Option<DateTime<Utc>>,
    /// Most recent successful payment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_at: Option<DateTime<Utc>>,
}

impl CustomerLedger {
    pub(crate) fn new(customer_id: &str, tenant_id: &str, project_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            tenant_id: tenant_id.to_string(),
            project_id: project_id.to_string(),
            subscriptions: Vec::new(),
            total_mrr_cents: 0,
            total_paid_cents: 0,
            total_refunded_cents: 0,
            total_disputed_cents: 0,
            payment_failure_count_30d: 0,
            last_invoice_at: None,
            last_payment_at: None,
        }
    }

    /// Looks up a subscription by id.
    #[must_use]
    pub fn subscription(&self, subscription_id: &str) -> Option<&SubscriptionState> {
        self.subscriptions
            .iter()
            .find(|s| s.subscription_id == subscription_id)
    }

    pub(crate) fn subscription_mut(
        &mut self,
        subscription_id: &str,
    ) -> Option<&mut SubscriptionState> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.subscription_id == subscription_id)
    }
}

/// Complete reconstructed ledger for one tenant/project window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// When the ledger was computed (stable sentinel under stable output).
    pub computed_at: DateTime<Utc>,
    /// Reconciliation window start.
    pub period_start: DateTime<Utc>,
    /// Reconciliation window end.
    pub period_end: DateTime<Utc>,
    /// Customer ledgers keyed by customer id. Keys are unique by
    /// construction; `BTreeMap` keeps serialization order canonical.
    pub customers: BTreeMap<String, CustomerLedger>,
    /// Sum of MRR over all active subscriptions. Recomputed, never tracked.
    pub total_mrr_cents: i64,
    /// Number of customers touched by in-window events.
    pub total_customers: usize,
    /// Number of active subscriptions. Recomputed, never tracked.
    pub active_subscriptions: usize,
    /// Number of in-window events replayed.
    pub event_count: usize,
}
