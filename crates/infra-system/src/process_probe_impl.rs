// Process probe implementation
// reason: sysinfo for the process table, nix for signal-based liveness and
// termination
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use sysinfo::System;
use tracing::{debug, info, warn};

use vacancy_watch_core::application::constants::GRACEFUL_SHUTDOWN_TIMEOUT_MS;
use vacancy_watch_core::port::job_executor::ExecutionError;
use vacancy_watch_core::port::process_probe::{CompanionProcess, ProcessProbe};
use vacancy_watch_core::port::TimeProvider;

/// Interval between liveness checks while waiting for SIGTERM to take effect
const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ProcessProbeImpl {
    system: Mutex<System>,
    time_provider: Arc<dyn TimeProvider>,
    graceful_timeout_ms: i64,
}

impl ProcessProbeImpl {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            time_provider,
            graceful_timeout_ms: GRACEFUL_SHUTDOWN_TIMEOUT_MS as i64,
        }
    }

    pub fn with_graceful_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Kill process with SIGTERM first, then SIGKILL if needed
    #[cfg(unix)]
    async fn kill_graceful(&self, pid: u32) -> Result<(), ExecutionError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| ExecutionError::Killed(format!("invalid pid {pid}")))?;
        let target = Pid::from_raw(raw);

        // Step 1: Send SIGTERM for graceful shutdown
        info!(pid = %pid, "Sending SIGTERM for graceful shutdown");
        match kill(target, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(()),
            Err(e) => return Err(ExecutionError::Killed(format!("SIGTERM failed: {e}"))),
        }

        // Step 2: Wait for process to exit
        let start_time = self.time_provider.now_millis();
        loop {
            tokio::time::sleep(TERMINATE_POLL_INTERVAL).await;

            if !self.is_alive(pid) {
                info!(pid = %pid, "Process exited gracefully after SIGTERM");
                return Ok(());
            }

            // Timeout: force kill with SIGKILL
            if self.time_provider.now_millis() - start_time > self.graceful_timeout_ms {
                warn!(pid = %pid, "Process did not exit after SIGTERM, sending SIGKILL");
                return match kill(target, Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => Ok(()),
                    Err(e) => Err(ExecutionError::Killed(format!("SIGKILL failed: {e}"))),
                };
            }
        }
    }

    #[cfg(not(unix))]
    async fn kill_graceful(&self, pid: u32) -> Result<(), ExecutionError> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let target = sysinfo::Pid::from_u32(pid);
        if !system.refresh_process(target) {
            return Ok(());
        }
        match system.process(target) {
            Some(process) if !process.kill() => {
                Err(ExecutionError::Killed(format!("kill failed for pid {pid}")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ProcessProbe for ProcessProbeImpl {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn is_alive(&self, pid: u32) -> bool {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::kill;
            use nix::unistd::Pid;

            let Ok(raw) = i32::try_from(pid) else {
                return false;
            };
            if raw <= 0 {
                return false;
            }

            // Signal 0 checks existence; EPERM means it exists under another user
            matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
        }

        #[cfg(not(unix))]
        {
            let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_process(sysinfo::Pid::from_u32(pid))
        }
    }

    fn find_companions(&self, patterns: &[String]) -> Vec<CompanionProcess> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes();

        let mut found: Vec<CompanionProcess> = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let command = process.cmd().join(" ");
                patterns
                    .iter()
                    .any(|pattern| command.contains(pattern.as_str()))
                    .then(|| CompanionProcess {
                        pid: pid.as_u32(),
                        command,
                    })
            })
            .collect();

        found.sort_by_key(|p| p.pid);
        debug!(patterns = ?patterns, found = found.len(), "Scanned process table for companion jobs");
        found
    }

    async fn terminate(&self, pid: u32) -> Result<(), ExecutionError> {
        self.kill_graceful(pid).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use vacancy_watch_core::port::SystemTimeProvider;

    fn probe() -> ProcessProbeImpl {
        ProcessProbeImpl::new(Arc::new(SystemTimeProvider))
    }

    /// Child that is reaped as soon as it exits
    fn spawn_reaped(script: &str) -> u32 {
        let mut child = std::process::Command::new("/bin/sh")
            .args(["-c", script])
            .spawn()
            .unwrap();
        let pid = child.id();
        std::thread::spawn(move || child.wait());
        pid
    }

    #[test]
    fn test_current_process_is_alive() {
        let probe = probe();
        assert!(probe.is_alive(probe.current_pid()));
        assert!(!probe.is_alive(0));
        assert!(!probe.is_alive(u32::MAX));
    }

    #[tokio::test]
    async fn test_find_and_terminate_companion() {
        let marker = format!("vw-companion-{}", std::process::id());
        let pid = spawn_reaped(&format!("sleep 30; echo {marker}"));
        let probe = probe();

        let companions = probe.find_companions(&[marker.clone()]);
        assert_eq!(companions.len(), 1);
        assert_eq!(companions[0].pid, pid);
        assert!(companions[0].command.contains(&marker));

        probe.terminate(pid).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!probe.is_alive(pid));
        assert!(probe.find_companions(&[marker]).is_empty());
    }

    #[tokio::test]
    async fn test_terminate_gone_process_is_ok() {
        let pid = spawn_reaped("exit 0");
        tokio::time::sleep(Duration::from_millis(200)).await;
        probe().terminate(pid).await.unwrap();
    }
}
