//! Order status lifecycle and transition planning.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, RecordId};

use crate::error::{OrderError, OrderResult};

/// Order lifecycle status.
///
/// Orders are created `Pending`. `Processed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processed => "processed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processed" => Ok(OrderStatus::Processed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// Status catalog row identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderStatusId(pub RecordId);

impl OrderStatusId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderStatusId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Persisted status-catalog row.
///
/// Each lifecycle status must exist in the catalog before orders can use it;
/// a missing row is a configuration defect surfaced as
/// [`OrderError::StatusNotConfigured`], not a per-request condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusRecord {
    pub status_id: OrderStatusId,
    pub name: OrderStatus,
    pub description: String,
}

/// What a requested status change requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Target already reached; return the order unchanged. Covers the
    /// idempotent `processed` → `processed` request: stock must not be
    /// decremented a second time.
    NoOp,
    /// Move `pending` → `processed`; every line item's stock must be
    /// decremented before the status is persisted.
    Process,
    /// Move `pending` → `cancelled`; no stock side effect.
    Cancel,
}

/// Decide whether `current` may move to `target`, and what doing so entails.
///
/// Pure decision logic: no IO, no mutation. The service applies the plan.
pub fn plan_transition(current: OrderStatus, target: OrderStatus) -> OrderResult<TransitionPlan> {
    match target {
        OrderStatus::Processed => match current {
            OrderStatus::Processed => Ok(TransitionPlan::NoOp),
            OrderStatus::Pending => Ok(TransitionPlan::Process),
            OrderStatus::Cancelled => Err(OrderError::InvalidStatusTransition { target }),
        },
        OrderStatus::Cancelled => match current {
            OrderStatus::Pending => Ok(TransitionPlan::Cancel),
            OrderStatus::Processed | OrderStatus::Cancelled => {
                Err(OrderError::InvalidCancellation)
            }
        },
        OrderStatus::Pending => Err(OrderError::InvalidStatusTransition { target }),
    }
}
