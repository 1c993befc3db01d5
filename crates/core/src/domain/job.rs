// Job Domain Model
//
// The check and mail jobs are opaque external commands. The orchestrator only
// knows how to name them, render their command line and where their combined
// output goes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::error::{DomainError, Result};
use super::run::RunStamp;

/// External job kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Scrapes the catalogue and writes one snapshot
    Check,
    /// Sends the notification email
    Notify,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Check => "check",
            JobKind::Notify => "notify",
        }
    }

    /// Name of the job instance for one run, e.g. `ur-net-check-20251006_231825`
    pub fn job_name(&self, prefix: &str, stamp: &RunStamp) -> String {
        format!("{}{}", self.companion_pattern(prefix), stamp)
    }

    /// Prefix shared by every instance of this job kind
    pub fn companion_pattern(&self, prefix: &str) -> String {
        format!("{}-{}-", prefix, self.as_str())
    }

    /// Patterns for all companion jobs under `prefix`
    pub fn all_companion_patterns(prefix: &str) -> Vec<String> {
        [JobKind::Check, JobKind::Notify]
            .iter()
            .map(|kind| kind.companion_pattern(prefix))
            .collect()
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placeholder values substituted into command templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars(BTreeMap<String, String>);

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Replace every `{key}` in `input`. Unknown placeholders are an error.
    pub fn substitute(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                return Err(DomainError::ValidationError(format!(
                    "unterminated placeholder in '{input}'"
                )));
            };

            let key = &after[..end];
            let value = self.get(key).ok_or_else(|| {
                DomainError::ValidationError(format!("unknown placeholder '{{{key}}}' in '{input}'"))
            })?;
            out.push_str(value);
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Command line with `{placeholder}` arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Render into `(program, args)`
    pub fn render(&self, vars: &TemplateVars) -> Result<(String, Vec<String>)> {
        if self.program.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "command template has an empty program".to_string(),
            ));
        }

        let program = vars.substitute(&self.program)?;
        let args = self
            .args
            .iter()
            .map(|arg| vars.substitute(arg))
            .collect::<Result<Vec<_>>>()?;
        Ok((program, args))
    }
}

/// Fully rendered invocation of an external job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub kind: JobKind,
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Combined stdout/stderr destination
    pub log_path: PathBuf,
    /// Files that must exist before the job may start
    pub inputs: Vec<PathBuf>,
    pub timeout: Option<Duration>,
}

impl JobSpec {
    pub fn from_template(
        kind: JobKind,
        name: impl Into<String>,
        template: &CommandTemplate,
        vars: &TemplateVars,
        log_path: PathBuf,
    ) -> Result<Self> {
        let (program, args) = template.render(vars)?;
        Ok(Self {
            kind,
            name: name.into(),
            program,
            args,
            log_path,
            inputs: Vec::new(),
            timeout: None,
        })
    }

    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-like rendering for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
