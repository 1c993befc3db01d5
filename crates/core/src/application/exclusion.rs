// Run-level mutual exclusion
//
// Two layers, consolidated behind ExclusionGuard:
// - ProcessLock: PID-stamped lock token with staleness detection
// - Companion check: no check/notify job from an earlier run may still be alive

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::constants::LOCK_ACQUIRE_ATTEMPTS;
use crate::domain::LockToken;
use crate::error::{AppError, Result};
use crate::port::{CompanionProcess, LockStore, ProcessProbe};

/// Outcome of a lock attempt
#[derive(Debug)]
pub enum LockAcquire {
    Acquired(LockHandle),
    /// A live process owns the token
    AlreadyRunning { pid: u32 },
}

/// Current lock holder, for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub raw: String,
    pub pid: Option<u32>,
    pub alive: bool,
}

/// Singleton lock backed by a `LockStore`
///
/// Liveness of the recorded owner is decided by the injected `ProcessProbe`.
pub struct ProcessLock {
    store: Arc<dyn LockStore>,
    probe: Arc<dyn ProcessProbe>,
}

impl ProcessLock {
    pub fn new(store: Arc<dyn LockStore>, probe: Arc<dyn ProcessProbe>) -> Self {
        Self { store, probe }
    }

    fn environment_error(&self, err: AppError) -> AppError {
        AppError::Environment(format!("lock {}: {}", self.store.describe(), err))
    }

    /// Acquire the lock, replacing a stale token if necessary
    ///
    /// # Errors
    /// AppError::Environment if the token cannot be read, removed or created
    pub fn acquire(&self) -> Result<LockAcquire> {
        let token = LockToken::for_pid(self.probe.current_pid());

        for attempt in 1..=LOCK_ACQUIRE_ATTEMPTS {
            if let Some(content) = self.store.read().map_err(|e| self.environment_error(e))? {
                match LockToken::parse(&content) {
                    Ok(existing) if existing.pid != token.pid && self.probe.is_alive(existing.pid) => {
                        info!(
                            lock = %self.store.describe(),
                            pid = existing.pid,
                            "Lock held by a live process"
                        );
                        return Ok(LockAcquire::AlreadyRunning { pid: existing.pid });
                    }
                    Ok(existing) => {
                        warn!(lock = %self.store.describe(), pid = existing.pid, "Removing stale lock token");
                    }
                    Err(e) => {
                        warn!(lock = %self.store.describe(), error = %e, "Removing unreadable lock token");
                    }
                }

                self.store
                    .remove_if(&content)
                    .map_err(|e| self.environment_error(e))?;
            }

            if self
                .store
                .try_create(&token)
                .map_err(|e| self.environment_error(e))?
            {
                info!(lock = %self.store.describe(), pid = token.pid, "Lock acquired");
                return Ok(LockAcquire::Acquired(LockHandle {
                    store: Arc::clone(&self.store),
                    token,
                    released: false,
                }));
            }

            debug!(attempt = attempt, "Lock token reappeared, retrying");
        }

        Err(AppError::Environment(format!(
            "lock {}: could not be acquired after {} attempts",
            self.store.describe(),
            LOCK_ACQUIRE_ATTEMPTS
        )))
    }

    /// Inspect the current token without touching it
    pub fn holder(&self) -> Result<Option<LockHolder>> {
        Ok(self.store.read()?.map(|raw| {
            let pid = LockToken::parse(&raw).ok().map(|t| t.pid);
            LockHolder {
                alive: pid.map(|p| self.probe.is_alive(p)).unwrap_or(false),
                pid,
                raw: raw.trim().to_string(),
            }
        }))
    }
}

/// Ownership of the lock token
///
/// Dropping an unreleased handle removes the token as a last resort.
pub struct LockHandle {
    store: Arc<dyn LockStore>,
    token: LockToken,
    released: bool,
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("lock", &self.store.describe())
            .field("pid", &self.token.pid)
            .field("released", &self.released)
            .finish()
    }
}

impl LockHandle {
    pub fn token(&self) -> LockToken {
        self.token
    }

    /// Remove the token if it still names this process
    ///
    /// Returns false if another instance took the lock over in the meantime.
    pub fn release(mut self) -> Result<bool> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<bool> {
        if self.released {
            return Ok(false);
        }
        self.released = true;

        let removed = match self.store.read()? {
            Some(content) if self.token.matches(&content) => self.store.remove_if(&content)?,
            _ => false,
        };
        if removed {
            info!(lock = %self.store.describe(), pid = self.token.pid, "Lock released");
        } else {
            warn!(
                lock = %self.store.describe(),
                pid = self.token.pid,
                "Lock token no longer ours, leaving it in place"
            );
        }
        Ok(removed)
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            error!(error = %e, "Failed to release lock on drop");
        }
    }
}

/// Why a run did not start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contention {
    LockHeld { pid: u32 },
    CompanionActive { processes: Vec<CompanionProcess> },
}

impl fmt::Display for Contention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contention::LockHeld { pid } => write!(f, "already running (pid {pid})"),
            Contention::CompanionActive { processes } => {
                let pids: Vec<String> = processes.iter().map(|p| p.pid.to_string()).collect();
                write!(f, "companion job still active (pid {})", pids.join(", "))
            }
        }
    }
}

#[derive(Debug)]
pub enum Exclusion {
    Acquired(LockHandle),
    Contended(Contention),
}

/// Single entry point for run-level mutual exclusion
pub struct ExclusionGuard {
    lock: ProcessLock,
    probe: Arc<dyn ProcessProbe>,
    companion_patterns: Vec<String>,
}

impl ExclusionGuard {
    pub fn new(
        lock_store: Arc<dyn LockStore>,
        probe: Arc<dyn ProcessProbe>,
        companion_patterns: Vec<String>,
    ) -> Self {
        Self {
            lock: ProcessLock::new(lock_store, Arc::clone(&probe)),
            probe,
            companion_patterns,
        }
    }

    pub fn lock(&self) -> &ProcessLock {
        &self.lock
    }

    /// Take the lock, then make sure no companion job is still running
    pub fn acquire(&self) -> Result<Exclusion> {
        let handle = match self.lock.acquire()? {
            LockAcquire::Acquired(handle) => handle,
            LockAcquire::AlreadyRunning { pid } => {
                return Ok(Exclusion::Contended(Contention::LockHeld { pid }));
            }
        };

        let companions = self.active_companions();
        if !companions.is_empty() {
            for companion in &companions {
                warn!(pid = companion.pid, command = %companion.command, "Companion job still active");
            }
            handle.release()?;
            return Ok(Exclusion::Contended(Contention::CompanionActive {
                processes: companions,
            }));
        }

        Ok(Exclusion::Acquired(handle))
    }

    /// Companion job processes other than ourselves
    pub fn active_companions(&self) -> Vec<CompanionProcess> {
        if self.companion_patterns.is_empty() {
            return Vec::new();
        }
        let me = self.probe.current_pid();
        self.probe
            .find_companions(&self.companion_patterns)
            .into_iter()
            .filter(|p| p.pid != me)
            .collect()
    }

    /// Terminate every still-running companion job. Failures are logged.
    pub async fn terminate_companions(&self) -> usize {
        let mut terminated = 0;
        for companion in self.active_companions() {
            match self.probe.terminate(companion.pid).await {
                Ok(()) => {
                    info!(pid = companion.pid, command = %companion.command, "Terminated companion job");
                    terminated += 1;
                }
                Err(e) => {
                    error!(pid = companion.pid, error = %e, "Failed to terminate companion job");
                }
            }
        }
        terminated
    }
}
