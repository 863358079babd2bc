//! Instrument ownership.
//!
//! An instrument accepts one command stream at a time. Every task that drives it
//! (alignment, calibration, a kinetic acquisition run, a manual reference capture)
//! takes a [`TaskLease`] from the instrument's [`TaskArbiter`] first. A request made
//! while another task holds a lease is rejected with
//! [`DaqError::InstrumentBusy`]; nothing is queued.

use optodaq_core::{AppResult, DaqError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Categories of work that can own an instrument, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Beam alignment
    Align,
    /// Residual (background) measurement
    Residuals,
    /// Wavelength calibration
    Calibrate,
    /// Time-resolved optical spectroscopy
    Tros,
    /// Power measurement
    Power,
    /// Kinetic acquisition run
    Kinetic,
    /// Manual dark or blank capture
    Reference,
}

impl TaskKind {
    /// Every kind, in the order [`TaskArbiter::current_owner`] scans them.
    pub const PRIORITY: [TaskKind; 7] = [
        TaskKind::Align,
        TaskKind::Residuals,
        TaskKind::Calibrate,
        TaskKind::Tros,
        TaskKind::Power,
        TaskKind::Kinetic,
        TaskKind::Reference,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TaskKind::Align => "alignment",
            TaskKind::Residuals => "residuals",
            TaskKind::Calibrate => "calibration",
            TaskKind::Tros => "TROS",
            TaskKind::Power => "power",
            TaskKind::Kinetic => "kinetic run",
            TaskKind::Reference => "reference capture",
        };
        f.write_str(label)
    }
}

/// Ownership gate for one instrument.
#[derive(Debug)]
pub struct TaskArbiter {
    instrument: String,
    active: Mutex<[bool; TaskKind::PRIORITY.len()]>,
}

impl TaskArbiter {
    /// A free instrument.
    pub fn new(instrument: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            instrument: instrument.into(),
            active: Mutex::new([false; TaskKind::PRIORITY.len()]),
        })
    }

    /// Instrument identifier.
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// First active task in priority order, or `None` when the instrument is free.
    pub fn current_owner(&self) -> Option<TaskKind> {
        let active = self.active.lock();
        scan(&active)
    }

    /// True when no task holds the instrument.
    pub fn is_free(&self) -> bool {
        self.current_owner().is_none()
    }

    /// Claim the instrument for `kind`.
    ///
    /// The check and the claim happen under one lock, so two concurrent requests
    /// can never both succeed.
    pub fn try_acquire(self: &Arc<Self>, kind: TaskKind) -> AppResult<TaskLease> {
        let mut active = self.active.lock();
        if let Some(owner) = scan(&active) {
            warn!(
                instrument = %self.instrument,
                requested = %kind,
                owner = %owner,
                "Instrument busy, request rejected"
            );
            return Err(DaqError::InstrumentBusy {
                owner: owner.to_string(),
            });
        }
        active[kind.index()] = true;
        debug!(instrument = %self.instrument, task = %kind, "Instrument acquired");
        Ok(TaskLease {
            arbiter: Arc::clone(self),
            kind,
        })
    }

    fn release(&self, kind: TaskKind) {
        self.active.lock()[kind.index()] = false;
        debug!(instrument = %self.instrument, task = %kind, "Instrument released");
    }
}

fn scan(active: &[bool; TaskKind::PRIORITY.len()]) -> Option<TaskKind> {
    TaskKind::PRIORITY
        .iter()
        .copied()
        .find(|kind| active[kind.index()])
}

/// Proof of ownership; the instrument is released when this is dropped.
#[derive(Debug)]
#[must_use = "the instrument is released as soon as the lease is dropped"]
pub struct TaskLease {
    arbiter: Arc<TaskArbiter>,
    kind: TaskKind,
}

impl TaskLease {
    /// Task category holding the instrument.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

impl Drop for TaskLease {
    fn drop(&mut self) {
        self.arbiter.release(self.kind);
    }
}

/// Arbiters keyed by instrument identifier.
#[derive(Debug, Default)]
pub struct OwnerRegistry {
    arbiters: Mutex<HashMap<String, Arc<TaskArbiter>>>,
}

impl OwnerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The arbiter for `instrument`, created on first use.
    pub fn arbiter_for(&self, instrument: &str) -> Arc<TaskArbiter> {
        self.arbiters
            .lock()
            .entry(instrument.to_string())
            .or_insert_with(|| TaskArbiter::new(instrument))
            .clone()
    }

    /// Current owner of `instrument`; `None` for free or unknown instruments.
    pub fn current_owner(&self, instrument: &str) -> Option<TaskKind> {
        let arbiter = self.arbiters.lock().get(instrument).cloned();
        arbiter.and_then(|a| a.current_owner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_instrument_has_no_owner() {
        let arbiter = TaskArbiter::new("lui");
        assert_eq!(arbiter.current_owner(), None);
        assert!(arbiter.is_free());
    }

    #[test]
    fn test_second_request_rejected() {
        let arbiter = TaskArbiter::new("lui");
        let lease = arbiter.try_acquire(TaskKind::Kinetic).unwrap();
        assert_eq!(lease.kind(), TaskKind::Kinetic);
        assert_eq!(arbiter.current_owner(), Some(TaskKind::Kinetic));

        let err = arbiter.try_acquire(TaskKind::Reference).unwrap_err();
        match err {
            DaqError::InstrumentBusy { owner } => assert_eq!(owner, "kinetic run"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(arbiter.try_acquire(TaskKind::Kinetic).is_err());
    }

    #[test]
    fn test_drop_releases() {
        let arbiter = TaskArbiter::new("lui");
        {
            let _lease = arbiter.try_acquire(TaskKind::Align).unwrap();
            assert!(!arbiter.is_free());
        }
        assert!(arbiter.is_free());
        assert!(arbiter.try_acquire(TaskKind::Power).is_ok());
    }

    #[test]
    fn test_scan_follows_priority_order() {
        let mut active = [false; TaskKind::PRIORITY.len()];
        active[TaskKind::Reference.index()] = true;
        active[TaskKind::Calibrate.index()] = true;
        assert_eq!(scan(&active), Some(TaskKind::Calibrate));
    }

    #[test]
    fn test_concurrent_acquire_has_one_winner() {
        let arbiter = TaskArbiter::new("lui");
        let leases: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| arbiter.try_acquire(TaskKind::Kinetic).ok()))
                .collect();
            handles.into_iter().filter_map(|h| h.join().ok()).collect()
        });
        assert_eq!(leases.iter().filter(|l| l.is_some()).count(), 1);
    }

    #[test]
    fn test_registry_isolates_instruments() {
        let registry = OwnerRegistry::new();
        let a = registry.arbiter_for("lui");
        let _lease = a.try_acquire(TaskKind::Tros).unwrap();

        assert_eq!(registry.current_owner("lui"), Some(TaskKind::Tros));
        assert_eq!(registry.current_owner("detector-tester"), None);
        assert_eq!(registry.current_owner("never-registered"), None);
        assert!(Arc::ptr_eq(&a, &registry.arbiter_for("lui")));
        assert!(registry.arbiter_for("detector-tester").is_free());
    }
}
