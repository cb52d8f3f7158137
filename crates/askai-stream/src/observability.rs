//! Process-wide `tracing` setup for binaries built on this crate.
//!
//! Library code only emits events; the `reply` span wrapped around every
//! request carries `session_id` and `message_id`, which the JSON layer
//! records on each line.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

pub const OBSERVABILITY_VAR: &str = "ASKAI_OBSERVABILITY";
pub const LOG_LEVEL_VAR: &str = "ASKAI_LOG_LEVEL";
pub const JSON_LOG_PATH_VAR: &str = "ASKAI_JSON_LOG_PATH";

const DEFAULT_FILTER: &str = "warn";
const DEFAULT_LOG_FILE: &str = "askai.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

/// What to log and where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// `EnvFilter` directives; `warn` when unset or unparseable.
    pub filter: Option<String>,
    /// JSON lines go here when set, compact text to stderr otherwise.
    pub json_path: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            json_path: None,
        }
    }
}

impl LogSettings {
    /// Reads `ASKAI_OBSERVABILITY`, `ASKAI_LOG_LEVEL` (then `RUST_LOG`) and
    /// `ASKAI_JSON_LOG_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            enabled: lookup(OBSERVABILITY_VAR)
                .and_then(|value| parse_bool(&value))
                .unwrap_or(true),
            filter: non_blank(LOG_LEVEL_VAR).or_else(|| non_blank("RUST_LOG")),
            json_path: non_blank(JSON_LOG_PATH_VAR).map(PathBuf::from),
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn json_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_path = Some(path.into());
        self
    }

    /// The filter to install, plus the rejected directives if they did not
    /// parse.
    fn env_filter(&self) -> (EnvFilter, Option<&str>) {
        match self.filter.as_deref() {
            Some(directives) => match EnvFilter::try_new(directives) {
                Ok(filter) => (filter, None),
                Err(_) => (EnvFilter::new(DEFAULT_FILTER), Some(directives)),
            },
            None => (EnvFilter::new(DEFAULT_FILTER), None),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Splits a log file path into the directory and file name the appender
/// wants.
fn log_file_target(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Installs the global subscriber described by `settings`.
///
/// Only the first call in a process has any effect. Console output goes to
/// stderr so it never mixes with answers printed on stdout.
pub fn init_observability(settings: &LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }

        let (env_filter, rejected) = settings.env_filter();
        let installed = match settings.json_path.as_deref() {
            Some(path) => {
                let (dir, file_name) = log_file_target(path);
                let _ = std::fs::create_dir_all(&dir);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init()
            }
            None => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init()
            }
        };
        if installed.is_ok()
            && let Some(directives) = rejected
        {
            tracing::warn!(filter = directives, "unparseable log filter, using {DEFAULT_FILTER}");
        }
    });
}
