//! Per-tenant ledger reconstruction from an ordered event stream.
//!
//! The ledger builder replays normalized events through a per-subscription
//! state machine (`uninitialized -> active -> canceled`, no reverse
//! transition) to reconstruct point-in-time customer and subscription
//! state. A ledger is always scoped to exactly one reconciliation window:
//! events outside `[period_start, period_end]` never touch state.
//!
//! # Invariants
//!
//! - One logical subscription has exactly one live state object per
//!   snapshot.
//! - `total_mrr_cents` and `active_subscriptions` are recomputed from
//!   scratch after replay by summing only `Active` subscriptions, never
//!   incrementally tracked, so out-of-order or duplicate events cannot
//!   cause drift.
//! - A cancellation anywhere in-window dominates: the subscription ends the
//!   window canceled and contributes zero MRR regardless of earlier events.
//!
//! Output shape violations abort construction: they indicate a programming
//! error, not bad input.

mod builder;
mod state;

#[cfg(test)]
mod tests;

pub use builder::{LedgerBuilder, LedgerError, Period};
pub use state::{CustomerLedger, LedgerState, SubscriptionState, SubscriptionStatus};
