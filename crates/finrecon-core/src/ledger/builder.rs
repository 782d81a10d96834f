//! Event replay and ledger construction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use super::state::{CustomerLedger, LedgerState, SubscriptionState, SubscriptionStatus};
use crate::events::{EventType, NormalizedEvent, TenantContext};

/// Inclusive reconciliation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    /// Window start (inclusive).
    pub start: DateTime<Utc>,
    /// Window end (inclusive).
    pub end: DateTime<Utc>,
}

impl Period {
    /// Whether a timestamp falls inside the window.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Errors raised during ledger construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    /// The window is inverted.
    #[error("invalid period: start {start} is after end {end}")]
    InvalidPeriod {
        /// Window start.
        start: DateTime<Utc>,
        /// Window end.
        end: DateTime<Utc>,
    },

    /// The constructed ledger violated its own shape. A programming error,
    /// not bad input; construction aborts.
    #[error("ledger output shape violation: {detail}")]
    OutputShape {
        /// Description of the broken invariant.
        detail: String,
    },
}

/// Replays ordered events into a [`LedgerState`].
#[derive(Debug)]
pub struct LedgerBuilder {
    ctx: TenantContext,
    period: Period,
}

impl LedgerBuilder {
    /// Creates a builder for one tenant/project window.
    #[must_use]
    pub const fn new(ctx: TenantContext, period: Period) -> Self {
        Self { ctx, period }
    }

    /// Replays `events` (already ordered by the normalizer) and returns the
    /// reconstructed ledger.
    ///
    /// Events outside the window are skipped entirely; they never touch
    /// state. After replay, aggregate MRR and active-subscription counts
    /// are recomputed from scratch from `Active` subscriptions only.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidPeriod`] for an inverted window and
    /// [`LedgerError::OutputShape`] if the constructed ledger fails its own
    /// shape check.
    pub fn build(
        &self,
        events: &[NormalizedEvent],
        computed_at: DateTime<Utc>,
    ) -> Result<LedgerState, LedgerError> {
        if self.period.start > self.period.end {
            return Err(LedgerError::InvalidPeriod {
                start: self.period.start,
                end: self.period.end,
            });
        }

        let mut customers: BTreeMap<String, CustomerLedger> = BTreeMap::new();
        let mut event_count = 0usize;

        for normalized in events {
            let event = &normalized.event;
            if !self.period.contains(event.timestamp) {
                continue;
            }
            event_count += 1;

            let customer = customers
                .entry(event.customer_id.clone())
                .or_insert_with(|| {
                    CustomerLedger::new(
                        &event.customer_id,
                        &self.ctx.tenant_id,
                        &self.ctx.project_id,
                    )
                });

            apply(customer, normalized);
        }

        // Recompute aggregates from scratch. Incremental tracking would
        // drift under duplicate or out-of-order events.
        let mut total_mrr_cents = 0i64;
        let mut active_subscriptions = 0usize;
        for customer in customers.values_mut() {
            customer.total_mrr_cents = customer
                .subscriptions
                .iter()
                .filter(|s| s.status.is_active())
                .map(|s| s.mrr_cents)
                .sum();
            total_mrr_cents += customer.total_mrr_cents;
            active_subscriptions += customer
                .subscriptions
                .iter()
                .filter(|s| s.status.is_active())
                .count();
        }

        let state = LedgerState {
            tenant_id: self.ctx.tenant_id.clone(),
            project_id: self.ctx.project_id.clone(),
            computed_at,
            period_start: self.period.start,
            period_end: self.period.end,
            total_customers: customers.len(),
            customers,
            total_mrr_cents,
            active_subscriptions,
            event_count,
        };
        validate_output(&state)?;

        debug!(
            customers = state.total_customers,
            active_subscriptions = state.active_subscriptions,
            total_mrr_cents = state.total_mrr_cents,
            event_count = state.event_count,
            "ledger built"
        );
        Ok(state)
    }
}

/// Applies one in-window event to a customer ledger.
fn apply(customer: &mut CustomerLedger, normalized: &NormalizedEvent) {
    let event = &normalized.event;
    let amount = event.amount_cents.unwrap_or(0);

    match event.event_type {
        EventType::SubscriptionCreated => {
            let Some(subscription_id) = event.subscription_id.clone() else {
                return;
            };
            if let Some(existing) = customer.subscription_mut(&subscription_id) {
                // Replayed create: merge fields, but canceled stays canceled.
                existing.mrr_cents = amount;
                if let Some(plan_id) = &event.plan_id {
                    existing.plan_id = plan_id.clone();
                }
                return;
            }
            customer.subscriptions.push(SubscriptionState {
                subscription_id,
                customer_id: event.customer_id.clone(),
                plan_id: event.plan_id.clone().unwrap_or_else(|| "unknown".to_string()),
                status: SubscriptionStatus::Active,
                current_period_start: event.period_start,
                current_period_end: event.period_end,
                mrr_cents: amount,
                currency: event.currency.clone().unwrap_or_else(|| "USD".to_string()),
                created_at: event.timestamp,
                canceled_at: None,
                cancel_at_period_end: false,
            });
        },
        EventType::SubscriptionUpdated => {
            let Some(subscription) = event
                .subscription_id
                .as_deref()
                .and_then(|id| customer.subscription_mut(id))
            else {
                return;
            };
            if let Some(plan_id) = &event.plan_id {
                subscription.plan_id = plan_id.clone();
            }
            if let Some(cents) = event.amount_cents {
                subscription.mrr_cents = cents;
            }
            if let Some(currency) = &event.currency {
                subscription.currency = currency.clone();
            }
            if event.period_start.is_some() {
                subscription.current_period_start = event.period_start;
            }
            if event.period_end.is_some() {
                subscription.current_period_end = event.period_end;
            }
        },
        EventType::SubscriptionCancelled => {
            if let Some(subscription) = event
                .subscription_id
                .as_deref()
                .and_then(|id| customer.subscription_mut(id))
            {
                subscription.status = SubscriptionStatus::Canceled;
                subscription.canceled_at = Some(event.timestamp);
            }
        },
        EventType::SubscriptionPaused => {
            if let Some(subscription) = event
                .subscription_id
                .as_deref()
                .and_then(|id| customer.subscription_mut(id))
            {
                if !subscription.status.is_canceled() {
                    subscription.status = SubscriptionStatus::Paused;
                }
            }
        },
        EventType::SubscriptionResumed => {
            if let Some(subscription) = event
                .subscription_id
                .as_deref()
                .and_then(|id| customer.subscription_mut(id))
            {
                if !subscription.status.is_canceled() {
                    subscription.status = SubscriptionStatus::Active;
                }
            }
        },
        EventType::InvoiceCreated => {
            customer.last_invoice_at = Some(event.timestamp);
        },
        EventType::InvoicePaid => {
            customer.total_paid_cents += amount;
            customer.last_invoice_at = Some(event.timestamp);
            // A paid invoice is a successful payment.
            customer.last_payment_at = Some(event.timestamp);
        },
        EventType::InvoicePaymentFailed => {
            customer.payment_failure_count_30d += 1;
            if let Some(subscription) = event
                .subscription_id
                .as_deref()
                .and_then(|id| customer.subscription_mut(id))
            {
                if subscription.status.is_active() {
                    subscription.status = SubscriptionStatus::PastDue;
                }
            }
        },
        EventType::InvoiceRefunded => {
            customer.total_refunded_cents += amount;
        },
        EventType::InvoiceDisputed => {
            customer.total_disputed_cents += amount;
        },
        EventType::InvoiceVoided => {
            // Counted in event_count only; no ledger state changes.
        },
        EventType::PaymentSucceeded => {
            customer.last_payment_at = Some(event.timestamp);
        },
        EventType::PaymentFailed => {
            customer.payment_failure_count_30d += 1;
        },
        EventType::PlanChanged => {
            if let Some(subscription) = event
                .subscription_id
                .as_deref()
                .and_then(|id| customer.subscription_mut(id))
            {
                if let Some(plan_id) = &event.plan_id {
                    subscription.plan_id = plan_id.clone();
                }
            }
        },
    }
}

/// Checks the constructed ledger against its own shape invariants.
fn validate_output(state: &LedgerState) -> Result<(), LedgerError> {
    if state.total_customers != state.customers.len() {
        return Err(LedgerError::OutputShape {
            detail: format!(
                "total_customers {} does not match customer map size {}",
                state.total_customers,
                state.customers.len()
            ),
        });
    }
    for (key, customer) in &state.customers {
        if *key != customer.customer_id {
            return Err(LedgerError::OutputShape {
                detail: format!(
                    "customer map key {key} does not match ledger customer_id {}",
                    customer.customer_id
                ),
            });
        }
        if customer.total_paid_cents < 0
            || customer.total_refunded_cents < 0
            || customer.total_disputed_cents < 0
        {
            return Err(LedgerError::OutputShape {
                detail: format!("negative running total for customer {key}"),
            });
        }
        for subscription in &customer.subscriptions {
            if subscription.mrr_cents < 0 {
                return Err(LedgerError::OutputShape {
                    detail: format!(
                        "negative mrr_cents on subscription {}",
                        subscription.subscription_id
                    ),
                });
            }
            if subscription.customer_id != customer.customer_id {
                return Err(LedgerError::OutputShape {
                    detail: format!(
                        "subscription {} attached to wrong customer",
                        subscription.subscription_id
                    ),
                });
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for subscription in &customer.subscriptions {
            if !seen.insert(&subscription.subscription_id) {
                return Err(LedgerError::OutputShape {
                    detail: format!(
                        "duplicate live state for subscription {}",
                        subscription.subscription_id
                    ),
                });
            }
        }
    }
    Ok(())
}
