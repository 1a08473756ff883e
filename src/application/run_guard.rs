//! Single-flight guard for full-catalog runs
//!
//! At most one full-catalog run may be active process-wide, and two
//! consecutive full-catalog runs must be separated by a cooldown measured
//! from the start of the earlier run. Other modes are never guarded.
//!
//! The guard is an explicit shared object (no module-level globals); the
//! returned [`RunPermit`] releases the active flag on drop, so every exit
//! path of the orchestrator — completion, cancellation, fatal error, panic —
//! releases deterministically.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::domain::events::SyncMode;

/// Default cooldown between full-catalog run starts
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Rejection returned before any paging starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardRejection {
    #[error("a full catalog sync is already in progress")]
    AlreadyRunning,
    #[error(
        "full catalog sync was run recently; wait {} more second(s) before starting another",
        remaining.as_secs().max(1)
    )]
    Cooldown { remaining: Duration },
}

#[derive(Debug, Default)]
struct GuardState {
    active: bool,
    last_started: Option<Instant>,
}

/// Cross-invocation mutual exclusion and cooldown for full-catalog runs
#[derive(Debug)]
pub struct RunGuard {
    state: Mutex<GuardState>,
    cooldown: Duration,
}

impl RunGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(GuardState::default()),
            cooldown,
        }
    }

    /// Try to reserve the run slot for `mode`.
    ///
    /// Non-full-catalog modes always succeed. The active-run check takes
    /// precedence over the cooldown check so a concurrent attempt is reported
    /// as such, not as a cooldown violation.
    pub fn try_acquire(self: &Arc<Self>, mode: SyncMode) -> Result<RunPermit, GuardRejection> {
        if mode != SyncMode::All {
            return Ok(RunPermit { guard: None });
        }

        let mut state = self.lock();
        if state.active {
            return Err(GuardRejection::AlreadyRunning);
        }
        if let Some(last) = state.last_started {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                return Err(GuardRejection::Cooldown {
                    remaining: self.cooldown - elapsed,
                });
            }
        }

        state.active = true;
        state.last_started = Some(Instant::now());
        Ok(RunPermit {
            guard: Some(Arc::clone(self)),
        })
    }

    /// Whether a full-catalog run currently holds the slot
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

/// Proof of a reserved run slot; releases on drop
#[derive(Debug)]
pub struct RunPermit {
    guard: Option<Arc<RunGuard>>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.lock().active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_full_modes_are_never_guarded() {
        let guard = Arc::new(RunGuard::new(DEFAULT_COOLDOWN));
        let _full = guard.try_acquire(SyncMode::All).unwrap();
        // Skus and Dates still acquire while a full run is active
        assert!(guard.try_acquire(SyncMode::Skus).is_ok());
        assert!(guard.try_acquire(SyncMode::Dates).is_ok());
    }

    #[test]
    fn second_full_run_is_rejected_while_active() {
        let guard = Arc::new(RunGuard::new(Duration::ZERO));
        let permit = guard.try_acquire(SyncMode::All).unwrap();
        assert_eq!(
            guard.try_acquire(SyncMode::All).unwrap_err(),
            GuardRejection::AlreadyRunning
        );
        drop(permit);
        assert!(guard.try_acquire(SyncMode::All).is_ok());
    }

    #[test]
    fn cooldown_rejects_with_remaining_time() {
        let guard = Arc::new(RunGuard::new(Duration::from_secs(900)));
        drop(guard.try_acquire(SyncMode::All).unwrap());

        match guard.try_acquire(SyncMode::All) {
            Err(GuardRejection::Cooldown { remaining }) => {
                assert!(remaining <= Duration::from_secs(900));
                assert!(remaining > Duration::from_secs(890));
            }
            other => panic!("expected cooldown rejection, got {other:?}"),
        }
    }

    #[test]
    fn cooldown_message_states_the_wait() {
        let rejection = GuardRejection::Cooldown {
            remaining: Duration::from_secs(120),
        };
        let message = rejection.to_string();
        assert!(message.contains("120"));
        assert!(message.contains("wait"));
    }

    #[test]
    fn permit_releases_even_after_unit_panic() {
        let guard = Arc::new(RunGuard::new(Duration::ZERO));
        let inner = Arc::clone(&guard);
        let result = std::panic::catch_unwind(move || {
            let _permit = inner.try_acquire(SyncMode::All).unwrap();
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(!guard.is_active());
    }
}
