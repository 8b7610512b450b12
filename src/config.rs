//! Settings (`wsup.toml`).
//!
//! Every field has a default, so an empty or missing file is valid. Unknown
//! keys are rejected to catch typos early.
//!
//! ```toml
//! [commit]
//! author = "wsup-bot"
//! project_config_path = "project.json"
//!
//! [rebase]
//! poll_attempts = 120
//! poll_interval_ms = 500
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::retry::{PollPolicy, RetryPolicy};

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

/// Tunables for the workspace protocol.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub commit: CommitSettings,

    /// Retries for host reads that fail transiently.
    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub rebase: RebaseSettings,

    /// Verification of branch creation and deletion.
    #[serde(default)]
    pub branch: BranchSettings,

    /// Background deletion of scratch branches.
    #[serde(default)]
    pub cleanup: CleanupSettings,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Commits the protocol writes itself (squash, conflict replay).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitSettings {
    #[serde(default = "default_author")]
    pub author: String,

    /// File whose presence on the default branch marks a project as set up.
    #[serde(default = "default_project_config_path")]
    pub project_config_path: String,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            author: default_author(),
            project_config_path: default_project_config_path(),
        }
    }
}

fn default_author() -> String {
    "wsup".to_owned()
}

fn default_project_config_path() -> String {
    "project.json".to_owned()
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

const fn default_retry_attempts() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    8_000
}

/// Polling of an asynchronous merge-request rebase.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RebaseSettings {
    #[serde(default = "default_rebase_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_one_second_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RebaseSettings {
    fn default() -> Self {
        Self {
            poll_attempts: default_rebase_poll_attempts(),
            poll_interval_ms: default_one_second_ms(),
        }
    }
}

const fn default_rebase_poll_attempts() -> u32 {
    600
}

const fn default_one_second_ms() -> u64 {
    1_000
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchSettings {
    #[serde(default = "default_create_verify_attempts")]
    pub create_verify_attempts: u32,
    #[serde(default = "default_delete_verify_attempts")]
    pub delete_verify_attempts: u32,
    #[serde(default = "default_one_second_ms")]
    pub verify_interval_ms: u64,
}

impl Default for BranchSettings {
    fn default() -> Self {
        Self {
            create_verify_attempts: default_create_verify_attempts(),
            delete_verify_attempts: default_delete_verify_attempts(),
            verify_interval_ms: default_one_second_ms(),
        }
    }
}

const fn default_create_verify_attempts() -> u32 {
    30
}

const fn default_delete_verify_attempts() -> u32 {
    20
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupSettings {
    /// Delay before a scheduled deletion first runs.
    #[serde(default = "default_cleanup_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_cleanup_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_cleanup_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// How long to wait for pipelines on a temporary branch to finish.
    #[serde(default = "default_pipeline_wait_attempts")]
    pub pipeline_wait_attempts: u32,
    #[serde(default = "default_pipeline_wait_interval_ms")]
    pub pipeline_wait_interval_ms: u64,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            delay_ms: default_cleanup_delay_ms(),
            max_attempts: default_cleanup_attempts(),
            retry_interval_ms: default_cleanup_retry_interval_ms(),
            pipeline_wait_attempts: default_pipeline_wait_attempts(),
            pipeline_wait_interval_ms: default_pipeline_wait_interval_ms(),
        }
    }
}

const fn default_cleanup_delay_ms() -> u64 {
    5_000
}

const fn default_cleanup_attempts() -> u32 {
    5
}

const fn default_cleanup_retry_interval_ms() -> u64 {
    2_000
}

const fn default_pipeline_wait_attempts() -> u32 {
    60
}

const fn default_pipeline_wait_interval_ms() -> u64 {
    5_000
}

// ---------------------------------------------------------------------------
// Derived policies
// ---------------------------------------------------------------------------

impl Settings {
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    #[must_use]
    pub const fn rebase_poll(&self) -> PollPolicy {
        PollPolicy::new(
            self.rebase.poll_attempts,
            Duration::from_millis(self.rebase.poll_interval_ms),
        )
    }

    #[must_use]
    pub const fn create_verify_poll(&self) -> PollPolicy {
        PollPolicy::new(
            self.branch.create_verify_attempts,
            Duration::from_millis(self.branch.verify_interval_ms),
        )
    }

    #[must_use]
    pub const fn delete_verify_poll(&self) -> PollPolicy {
        PollPolicy::new(
            self.branch.delete_verify_attempts,
            Duration::from_millis(self.branch.verify_interval_ms),
        )
    }

    #[must_use]
    pub const fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup.delay_ms)
    }

    /// Retry policy the scheduler applies to each background task.
    #[must_use]
    pub const fn cleanup_retry(&self) -> PollPolicy {
        PollPolicy::new(
            self.cleanup.max_attempts,
            Duration::from_millis(self.cleanup.retry_interval_ms),
        )
    }

    #[must_use]
    pub const fn pipeline_wait_poll(&self) -> PollPolicy {
        PollPolicy::new(
            self.cleanup.pipeline_wait_attempts,
            Duration::from_millis(self.cleanup.pipeline_wait_interval_ms),
        )
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a settings file.
#[derive(Debug)]
pub struct ConfigError {
    pub path: Option<PathBuf>,
    /// Message with the offending line when known.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl Settings {
    /// Load settings from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse settings from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start].matches('\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let s = Settings::default();
        assert_eq!(s.commit.author, "wsup");
        assert_eq!(s.commit.project_config_path, "project.json");
        assert_eq!(s.retry_policy(), RetryPolicy::default());
        assert_eq!(s.rebase_poll(), PollPolicy::new(600, Duration::from_secs(1)));
        assert_eq!(s.create_verify_poll(), PollPolicy::new(30, Duration::from_secs(1)));
        assert_eq!(s.delete_verify_poll(), PollPolicy::new(20, Duration::from_secs(1)));
        assert_eq!(s.cleanup_delay(), Duration::from_secs(5));
        assert_eq!(s.cleanup_retry(), PollPolicy::new(5, Duration::from_secs(2)));
        assert_eq!(s.pipeline_wait_poll(), PollPolicy::new(60, Duration::from_secs(5)));
    }

    #[test]
    fn parse_empty_string() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let toml = r#"
[commit]
author = "bot"

[rebase]
poll_interval_ms = 250
"#;
        let s = Settings::parse(toml).unwrap();
        assert_eq!(s.commit.author, "bot");
        assert_eq!(s.commit.project_config_path, "project.json");
        assert_eq!(s.rebase.poll_attempts, 600);
        assert_eq!(s.rebase_poll().interval, Duration::from_millis(250));
        assert_eq!(s.cleanup, CleanupSettings::default());
    }

    #[test]
    fn parse_rejects_unknown_nested_field() {
        let toml = "[branch]\ncreate_verify_attempts = 3\nverify_every = 2\n";
        let err = Settings::parse(toml).unwrap_err();
        assert!(err.message.contains("unknown field"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_unknown_section() {
        let err = Settings::parse("[merge]\nx = 1\n").unwrap_err();
        assert!(err.message.contains("unknown field"), "{}", err.message);
    }

    #[test]
    fn parse_includes_line_number_on_error() {
        let toml = "[retry]\nmax_attempts = 3\ninitial_backoff_ms = \"fast\"\n";
        let err = Settings::parse(toml).unwrap_err();
        assert!(err.message.contains("line 3"), "{}", err.message);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let s = Settings::load(Path::new("/nonexistent/wsup.toml")).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn load_existing_file_and_tag_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wsup.toml");

        std::fs::write(&path, "[cleanup]\ndelay_ms = 0\n").unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.cleanup_delay(), Duration::ZERO);

        std::fs::write(&path, "[cleanup\n").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(err.to_string().contains("wsup.toml"));
    }
}
