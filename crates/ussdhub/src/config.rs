use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub actor: ActorConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_yaml::from_str(&expanded)?)
    }
}

/// Anchor a configured path to the config file's directory.
///
/// Absolute paths are returned as-is; relative paths are joined with the
/// config file's parent directory, so behavior does not depend on the
/// current working directory.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

// ============================================================================
// Defaults
// ============================================================================

/// Default config file name (relative to the working directory).
pub const DEFAULT_CONFIG_PATH: &str = "ussdhub.yaml";

fn default_lock_wait_ms() -> u64 {
    5000
}

fn default_system_actor() -> String {
    "system".to_string()
}

fn default_sim_channel() -> String {
    "sim-ussd".to_string()
}

fn default_sim_subscriber() -> String {
    "+256700000001".to_string()
}

fn default_sim_starcode() -> String {
    "*123#".to_string()
}

fn default_sim_flow() -> String {
    "account_menu".to_string()
}

fn default_sim_menu() -> String {
    "Welcome.\n1. Balance\n2. Airtime".to_string()
}

fn default_sim_steps() -> Vec<SimulatorStep> {
    vec![SimulatorStep {
        reply: "Your balance is USh 25,000.".to_string(),
        end: true,
    }]
}

// ============================================================================
// StoreConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Directory for session rows. Unset means sessions live in memory and
    /// vanish on exit.
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,
}

// ============================================================================
// ReconcilerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ReconcilerConfig {
    /// Bound on the wait for a session row lock, in milliseconds. Events
    /// that cannot take the lock in time fail as retryable contention.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
}

impl ReconcilerConfig {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            lock_wait_ms: default_lock_wait_ms(),
        }
    }
}

// ============================================================================
// ActorConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ActorConfig {
    /// Audit identity used when a channel carries no creator of its own.
    #[serde(default = "default_system_actor")]
    pub system_actor: String,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            system_actor: default_system_actor(),
        }
    }
}

// ============================================================================
// SimulatorConfig
// ============================================================================

/// Scripted dialog the `simulate` subcommand replays.
#[derive(Debug, Deserialize)]
pub struct SimulatorConfig {
    /// Channel id events are stamped with.
    #[serde(default = "default_sim_channel")]
    pub channel: String,

    /// Subscriber address dialing in.
    #[serde(default = "default_sim_subscriber")]
    pub subscriber: String,

    /// Service code that opens the dialog.
    #[serde(default = "default_sim_starcode")]
    pub starcode: String,

    /// Flow the starcode triggers.
    #[serde(default = "default_sim_flow")]
    pub flow: String,

    /// First screen the flow renders.
    #[serde(default = "default_sim_menu")]
    pub menu: String,

    /// Replies the flow gives to successive inputs, in order.
    #[serde(default = "default_sim_steps")]
    pub steps: Vec<SimulatorStep>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            channel: default_sim_channel(),
            subscriber: default_sim_subscriber(),
            starcode: default_sim_starcode(),
            flow: default_sim_flow(),
            menu: default_sim_menu(),
            steps: default_sim_steps(),
        }
    }
}

/// One scripted flow reply.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorStep {
    /// Text sent back to the subscriber.
    pub reply: String,

    /// Whether the flow asks to end the session after this reply.
    #[serde(default)]
    pub end: bool,
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variable references in raw config text.
///
/// Shell-style syntax:
/// - `${VAR}` errors when the variable is not set
/// - `${VAR:-default}` falls back to the default
/// - `${VAR:-}` falls back to the empty string
/// - `$$` escapes a `$` (only needed before `{`)
///
/// Nested references like `${VAR:-${OTHER}}` are not supported, and an
/// unclosed `${` is an error.
///
/// ```yaml
/// store:
///   sessions_dir: ${USSDHUB_DATA:-.ussdhub}/sessions
/// actor:
///   system_actor: ${USSDHUB_ACTOR:-system}
/// ```
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                result.push_str(&parse_var_reference(&mut chars)?);
            }
            // Plain $ stays literal
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Parse a variable reference after the opening `${`, up to and including
/// the closing `}`.
fn parse_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut var_name = String::new();
    let mut default_value: Option<String> = None;
    let mut in_default = false;
    let mut closed = false;

    while let Some(&c) = chars.peek() {
        match c {
            '}' => {
                chars.next();
                closed = true;
                break;
            }
            ':' if !in_default => {
                chars.next();
                if chars.peek() == Some(&'-') {
                    chars.next();
                    in_default = true;
                    default_value = Some(String::new());
                } else {
                    // ':' without '-' stays part of the name
                    var_name.push(':');
                }
            }
            _ => {
                chars.next();
                if let Some(default) = default_value.as_mut() {
                    default.push(c);
                } else {
                    var_name.push(c);
                }
            }
        }
    }

    if !closed {
        return Err(ConfigError::UnclosedVarReference);
    }

    match std::env::var(&var_name) {
        Ok(value) => Ok(value),
        Err(_) => match default_value {
            Some(default) => Ok(default),
            None => Err(ConfigError::MissingEnvVar(var_name)),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
