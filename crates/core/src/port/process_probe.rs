// Process Probe Port
// Liveness checks and companion-job discovery. Injected into the lock so
// staleness can be tested without spawning real processes.

use async_trait::async_trait;

use super::job_executor::ExecutionError;

/// A running process whose command line matches a companion job pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionProcess {
    pub pid: u32,
    pub command: String,
}

#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// PID of the calling process
    fn current_pid(&self) -> u32;

    /// Whether `pid` belongs to a live process
    fn is_alive(&self, pid: u32) -> bool;

    /// Processes whose command line contains any of `patterns`
    fn find_companions(&self, patterns: &[String]) -> Vec<CompanionProcess>;

    /// Terminate a process gracefully, forcibly if it does not exit in time
    async fn terminate(&self, pid: u32) -> Result<(), ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    pub struct MockProcessProbe {
        current_pid: u32,
        alive: Mutex<HashSet<u32>>,
        companions: Mutex<Vec<CompanionProcess>>,
        terminated: Mutex<Vec<u32>>,
    }

    impl MockProcessProbe {
        pub fn new(current_pid: u32) -> Self {
            Self {
                current_pid,
                alive: Mutex::new(HashSet::from([current_pid])),
                companions: Mutex::new(Vec::new()),
                terminated: Mutex::new(Vec::new()),
            }
        }

        pub fn set_alive(&self, pid: u32, alive: bool) {
            let mut set = self.alive.lock().unwrap();
            if alive {
                set.insert(pid);
            } else {
                set.remove(&pid);
            }
        }

        pub fn add_companion(&self, pid: u32, command: impl Into<String>) {
            self.set_alive(pid, true);
            self.companions.lock().unwrap().push(CompanionProcess {
                pid,
                command: command.into(),
            });
        }

        pub fn terminated(&self) -> Vec<u32> {
            self.terminated.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessProbe for MockProcessProbe {
        fn current_pid(&self) -> u32 {
            self.current_pid
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }

        fn find_companions(&self, patterns: &[String]) -> Vec<CompanionProcess> {
            self.companions
                .lock()
                .unwrap()
                .iter()
                .filter(|p| patterns.iter().any(|pat| p.command.contains(pat.as_str())))
                .cloned()
                .collect()
        }

        async fn terminate(&self, pid: u32) -> Result<(), ExecutionError> {
            self.terminated.lock().unwrap().push(pid);
            self.companions.lock().unwrap().retain(|p| p.pid != pid);
            self.set_alive(pid, false);
            Ok(())
        }
    }
}
