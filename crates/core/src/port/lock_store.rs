// Lock Store Port
// Persistence of the singleton lock token. The token must stay observable
// from outside the process (a plain file in production).

use crate::domain::LockToken;
use crate::Result;

pub trait LockStore: Send + Sync {
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    /// Raw token content, None if no token exists
    fn read(&self) -> Result<Option<String>>;

    /// Create the token exclusively
    ///
    /// Returns false if a token already exists. Two concurrent callers can
    /// never both get true.
    fn try_create(&self, token: &LockToken) -> Result<bool>;

    /// Remove the token only if its content still equals `expected`
    ///
    /// Returns true if a token was removed.
    fn remove_if(&self, expected: &str) -> Result<bool>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::AppError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryLockStore {
        content: Mutex<Option<String>>,
        fail_create: AtomicBool,
    }

    impl InMemoryLockStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_content(content: impl Into<String>) -> Self {
            let store = Self::new();
            *store.content.lock().unwrap() = Some(content.into());
            store
        }

        /// Make `try_create` fail like a permission error
        pub fn fail_create(&self, fail: bool) {
            self.fail_create.store(fail, Ordering::SeqCst);
        }

        pub fn content(&self) -> Option<String> {
            self.content.lock().unwrap().clone()
        }
    }

    impl LockStore for InMemoryLockStore {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        fn read(&self) -> Result<Option<String>> {
            Ok(self.content())
        }

        fn try_create(&self, token: &LockToken) -> Result<bool> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "lock store is read-only",
                )));
            }

            let mut content = self.content.lock().unwrap();
            if content.is_some() {
                return Ok(false);
            }
            *content = Some(token.to_file_content());
            Ok(true)
        }

        fn remove_if(&self, expected: &str) -> Result<bool> {
            let mut content = self.content.lock().unwrap();
            if content.as_deref() == Some(expected) {
                *content = None;
                return Ok(true);
            }
            Ok(false)
        }
    }
}
