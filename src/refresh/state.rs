use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use crate::error::{ErrorKind, RefreshError};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RefreshStatus {
    #[default]
    Idle,
    Running,
}

/// Why the most recent cycle failed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl RefreshFailure {
    pub fn from_error(err: &RefreshError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}

/// The single-flight gate plus the outcome of the last finished cycle.
#[derive(Debug, Default)]
pub struct RefreshState {
    in_flight: AtomicBool,
    last_error: Mutex<Option<RefreshFailure>>,
}

impl RefreshState {
    /// Claims the gate. Exactly one concurrent caller gets `Some`; the guard
    /// reopens the gate when dropped, including on panic or abort.
    pub fn try_begin(self: &Arc<Self>) -> Option<FlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                state: Arc::clone(self),
            })
    }

    pub fn status(&self) -> RefreshStatus {
        if self.in_flight.load(Ordering::Acquire) {
            RefreshStatus::Running
        } else {
            RefreshStatus::Idle
        }
    }

    pub fn last_error(&self) -> Option<RefreshFailure> {
        self.errors().clone()
    }

    pub fn record_success(&self) {
        *self.errors() = None;
    }

    pub fn record_failure(&self, failure: RefreshFailure) {
        *self.errors() = Some(failure);
    }

    fn errors(&self) -> MutexGuard<'_, Option<RefreshFailure>> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct FlightGuard {
    state: Arc<RefreshState>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.state.in_flight.store(false, Ordering::Release);
    }
}
