// Settings: defaults -> TOML file -> VACANCY_WATCH__* env -> CLI flags
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vacancy_watch_core::application::constants::{
    DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_DELAY, DEFAULT_RETENTION_DAYS, DEFAULT_SUBJECT_PREFIX,
};
use vacancy_watch_core::domain::snapshot::DEFAULT_SNAPSHOT_PREFIX;
use vacancy_watch_core::domain::{CommandTemplate, NotificationConfig};

const ENV_PREFIX: &str = "VACANCY_WATCH";
const ENV_SEPARATOR: &str = "__";
const LOCAL_CONFIG_FILE: &str = "vacancy-watch.toml";

/// Keys of the notification file that the process environment may override
pub const NOTIFICATION_KEYS: [&str; 7] = [
    "DEFAULT_TO_ADDR",
    "SMTP_USER",
    "SMTP_PASS",
    "SMTP_SERVER",
    "SMTP_PORT",
    "FROM_ADDR",
    "BCC_ADDR",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub results_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub lock_path: PathBuf,
    /// URL list handed to the check job
    pub catalogue: PathBuf,
    /// `KEY=VALUE` file shared with the mail job
    pub notify_config_file: PathBuf,
    pub snapshot_prefix: String,
    pub job_name_prefix: String,
    pub image: String,
    pub request_delay_secs: u64,
    pub poll_attempts: u32,
    pub poll_delay_secs: u64,
    pub job_timeout_secs: Option<u64>,
    pub snapshot_retention_days: u32,
    pub log_retention_days: u32,
    pub notify_on_first_run: bool,
    pub subject_prefix: String,
    pub check_job: CommandTemplate,
    pub mail_job: CommandTemplate,
    /// Must exit zero before any job is started
    pub availability_probe: Option<CommandTemplate>,
    /// Environment variables passed through to jobs
    pub env_allowlist: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            logs_dir: PathBuf::from("logs"),
            lock_path: PathBuf::from("vacancy-watch.lock"),
            catalogue: PathBuf::from("urls.txt"),
            notify_config_file: PathBuf::from(".env"),
            snapshot_prefix: DEFAULT_SNAPSHOT_PREFIX.to_string(),
            job_name_prefix: "ur-net".to_string(),
            image: "ur-net-checker".to_string(),
            request_delay_secs: 3,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_delay_secs: DEFAULT_POLL_DELAY.as_secs(),
            job_timeout_secs: Some(3600),
            snapshot_retention_days: DEFAULT_RETENTION_DAYS,
            log_retention_days: DEFAULT_RETENTION_DAYS,
            notify_on_first_run: true,
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            check_job: CommandTemplate::new(
                "docker",
                [
                    "run",
                    "--rm",
                    "--name",
                    "{job_name}",
                    "-v",
                    "{results_dir}:/app/results",
                    "-v",
                    "{catalogue}:/app/urls.txt:ro",
                    "{image}",
                    "python",
                    "ur_net_batch_property_checker.py",
                    "-f",
                    "/app/urls.txt",
                    "-d",
                    "{delay}",
                    "-o",
                    "json",
                    "-p",
                    "/app/results/ur_net_results_{stamp}.json",
                ],
            ),
            mail_job: CommandTemplate::new(
                "docker",
                [
                    "run",
                    "--rm",
                    "--name",
                    "{job_name}",
                    "--env-file",
                    "{config_file}",
                    "-v",
                    "{results_dir}:/app/results:ro",
                    "{image}",
                    "python",
                    "ur_net_email_sender.py",
                    "-j",
                    "/app/results/{snapshot_name}",
                    "-s",
                    "{subject}",
                ],
            ),
            availability_probe: Some(CommandTemplate::new("docker", ["image", "inspect", "{image}"])),
            env_allowlist: vec!["PATH".to_string(), "HOME".to_string(), "USER".to_string()],
        }
    }
}

/// Command-line values that win over every other layer
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
}

impl Settings {
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let file = match &overrides.config_file {
            Some(path) => File::from(path.as_path()).format(FileFormat::Toml).required(true),
            None => File::from(default_config_file().as_path())
                .format(FileFormat::Toml)
                .required(false),
        };

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("env_allowlist");

        let mut settings: Settings = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")?;

        if let Some(dir) = &overrides.results_dir {
            settings.results_dir = dir.clone();
        }
        if let Some(dir) = &overrides.logs_dir {
            settings.logs_dir = dir.clone();
        }

        Ok(settings.expanded())
    }

    /// Expand `~` in every path setting
    pub fn expanded(mut self) -> Self {
        for path in [
            &mut self.results_dir,
            &mut self.logs_dir,
            &mut self.lock_path,
            &mut self.catalogue,
            &mut self.notify_config_file,
        ] {
            *path = expand_tilde(path);
        }
        self
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

/// `vacancy-watch.toml` in the working directory, else the platform config dir
fn default_config_file() -> PathBuf {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return local;
    }
    directories::ProjectDirs::from("", "", "vacancy-watch")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or(local)
}

fn expand_tilde(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

/// Notification settings from the key-value file, overridden by same-named
/// process environment variables
pub fn load_notification(path: &Path) -> Result<Option<NotificationConfig>> {
    load_notification_with(path, |key| std::env::var(key).ok())
}

pub fn load_notification_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Option<NotificationConfig>> {
    let mut pairs = read_key_values(path)?;
    for key in NOTIFICATION_KEYS {
        if let Some(value) = env(key) {
            pairs.insert(key.to_ascii_lowercase(), value);
        }
    }
    Ok(NotificationConfig::from_pairs(&pairs))
}

/// Top-level `KEY=VALUE` lines; a missing file yields no pairs
fn read_key_values(path: &Path) -> Result<HashMap<String, String>> {
    let pairs: HashMap<String, String> = Config::builder()
        .add_source(File::from(path).format(FileFormat::Ini).required(false))
        .build()
        .with_context(|| format!("Failed to read {}", path.display()))?
        .try_deserialize()
        .with_context(|| format!("{} is not a flat KEY=VALUE file", path.display()))?;

    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect())
}
