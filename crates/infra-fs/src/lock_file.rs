// PID lock file
//
// The token is written to a private temp file and hard-linked into place, so
// the lock file never exists without its content. Linking fails if the lock
// already exists, which makes creation exclusive.
//
// Removal compares content first. Compare and remove run under an flock on
// `<lock>.guard`, so a takeover can never delete a token that another
// process created after the compare.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use vacancy_watch_core::domain::LockToken;
use vacancy_watch_core::port::LockStore;
use vacancy_watch_core::Result;

pub struct PidLockFile {
    path: PathBuf,
}

impl PidLockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn staging_path(&self, token: &LockToken) -> PathBuf {
        self.sibling(&format!(".{}.tmp", token.pid))
    }

    pub fn guard_path(&self) -> PathBuf {
        self.sibling(".guard")
    }

    /// Exclusive advisory lock, held until the returned value is dropped
    #[cfg(unix)]
    fn lock_guard(&self) -> Result<nix::fcntl::Flock<fs::File>> {
        use nix::fcntl::{Flock, FlockArg};

        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.guard_path())?;
        Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| std::io::Error::from(errno).into())
    }

    #[cfg(not(unix))]
    fn lock_guard(&self) -> Result<()> {
        Ok(())
    }
}

impl LockStore for PidLockFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn try_create(&self, token: &LockToken) -> Result<bool> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = self.staging_path(token);
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(token.to_file_content().as_bytes())?;
            file.sync_all()?;
        }

        let linked = fs::hard_link(&staging, &self.path);
        let _ = fs::remove_file(&staging);

        match linked {
            Ok(()) => {
                debug!(path = %self.path.display(), pid = token.pid, "Lock file created");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_if(&self, expected: &str) -> Result<bool> {
        if self.read()?.is_none() {
            return Ok(false);
        }

        let _guard = self.lock_guard()?;
        let Some(current) = self.read()? else {
            return Ok(false);
        };
        if current != expected {
            debug!(path = %self.path.display(), "Lock token changed, not removing");
            return Ok(false);
        }

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
