use std::time::Duration;

use chrono::{DateTime, Utc};

/// Timing and retry policy for pushes.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last scheduled write before pushing
    pub debounce: Duration,
    /// Push attempts per flush
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubles on each further failure
    pub backoff_base: Duration,
    /// Delay before trying again after a rate-limit or permission failure
    pub throttle_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1200),
            max_retries: 3,
            backoff_base: Duration::from_millis(1000),
            throttle_delay: Duration::from_millis(2000),
        }
    }
}

impl SyncConfig {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Why a pending write is parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Nobody is signed in; waits for a sign-in.
    NotAuthenticated,
    /// Every attempt failed; waits for the next mutation, reconnect or sign-in.
    RetriesExhausted,
    /// The server refused for now; a retry is already scheduled.
    Throttled,
    /// Recovered from a previous run that ended before the push was confirmed.
    Restored,
}

/// Where the push pipeline is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing waiting to be pushed.
    Idle,
    /// A write is pending and the debounce timer is armed.
    Debounced,
    /// A push attempt is in flight.
    Writing { attempt: u32, rerun_requested: bool },
    /// Attempt `attempt` failed; waiting out the backoff before the next.
    Retrying { attempt: u32, rerun_requested: bool },
    /// A write is pending but no push will happen until something re-triggers it.
    Deferred(DeferReason),
}

impl SyncPhase {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SyncPhase::Writing { .. } | SyncPhase::Retrying { .. })
    }

    pub(crate) fn rerun_requested(&self) -> bool {
        matches!(
            self,
            SyncPhase::Writing {
                rerun_requested: true,
                ..
            } | SyncPhase::Retrying {
                rerun_requested: true,
                ..
            }
        )
    }

    /// Same phase with the coalescing flag raised. No-op outside a flush.
    pub(crate) fn with_rerun(self) -> SyncPhase {
        match self {
            SyncPhase::Writing { attempt, .. } => SyncPhase::Writing {
                attempt,
                rerun_requested: true,
            },
            SyncPhase::Retrying { attempt, .. } => SyncPhase::Retrying {
                attempt,
                rerun_requested: true,
            },
            other => other,
        }
    }
}

/// Point-in-time view of the sync manager.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub has_pending: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}
