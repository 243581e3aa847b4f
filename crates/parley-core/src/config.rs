//! Configuration system for Parley.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::Error;
use crate::retry::RetryPolicy;

/// Main configuration struct for Parley.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application identity
    pub app: AppConfig,
    /// Agent settings
    pub agent: AgentConfig,
    /// Event compaction
    pub compaction: CompactionSettings,
    /// Retry policy for upstream calls
    pub retry: RetryPolicy,
    /// Session storage backend
    pub storage: StorageConfig,
    /// External tool servers
    pub tool_servers: Vec<ToolServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name used in session keys
    pub name: String,
    /// Default user ID
    pub user_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            user_id: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent name, used as the author of its events
    pub name: String,
    /// Short description
    pub description: String,
    /// Instruction passed to the generator
    pub instruction: Option<String>,
    /// Model identifier passed to the generator
    pub model: String,
    /// Maximum generate/tool rounds per turn
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "text_chat_bot".to_string(),
            description: "A text chatbot".to_string(),
            instruction: None,
            model: "gemini-2.5-flash".to_string(),
            max_steps: 8,
        }
    }
}

/// Validated compaction parameters.
///
/// `interval` is the number of turns between compactions, `overlap` the number
/// of trailing turns kept verbatim. `overlap < interval` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionConfig {
    interval: u32,
    overlap: u32,
}

impl CompactionConfig {
    /// Create a compaction config, rejecting parameters that never shrink the log.
    pub fn new(interval: u32, overlap: u32) -> Result<Self, Error> {
        if interval == 0 {
            return Err(Error::Config(
                "compaction interval must be greater than 0".to_string(),
            ));
        }
        if overlap >= interval {
            return Err(Error::Config(format!(
                "compaction overlap ({}) must be smaller than interval ({})",
                overlap, interval
            )));
        }
        Ok(Self { interval, overlap })
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn overlap(&self) -> u32 {
        self.overlap
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionSettings {
    /// Enable event compaction
    pub enabled: bool,
    /// Turns between compactions
    pub interval: u32,
    /// Trailing turns preserved verbatim
    pub overlap: u32,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 3,
            overlap: 1,
        }
    }
}

impl CompactionSettings {
    /// Resolve into a validated config, or `None` when disabled.
    pub fn resolve(&self) -> Result<Option<CompactionConfig>, Error> {
        if !self.enabled {
            return Ok(None);
        }
        CompactionConfig::new(self.interval, self.overlap).map(Some)
    }
}

/// Session storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Sessions live for the process lifetime
    Memory,
    /// Sessions persist in a SQLite database
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind
    pub backend: StorageBackend,
    /// Database file (sqlite only)
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
        }
    }
}

impl StorageConfig {
    /// Database file to use for the sqlite backend.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("sessions.db"))
    }
}

/// An external tool server whose capabilities are bridged in as tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolServerConfig {
    /// Server name, used in tool name prefixes
    pub name: String,
    /// Command that launches the server
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Only expose these capabilities (empty = all)
    pub tool_filter: Vec<String>,
    /// Per-invocation timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            args: vec![],
            tool_filter: vec![],
            timeout_secs: 30,
        }
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue
    pub severity: IssueSeverity,
    /// Field path (e.g., "compaction.overlap")
    pub field: String,
    /// Human-readable message
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// The layered configuration sources.
    pub fn figment() -> Figment {
        Figment::new()
            // Default values
            .merge(Serialized::defaults(Config::default()))
            // User config
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            // Project config
            .merge(Toml::file(".parley/config.toml"))
            // Project local config (gitignored)
            .merge(Toml::file(".parley/config.local.toml"))
            // Environment variables, e.g. PARLEY_COMPACTION__INTERVAL=5
            .merge(Env::prefixed("PARLEY_").split("__"))
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        let result = config.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.app.name.is_empty() {
            result.add_error("app.name", "App name cannot be empty");
        }

        if self.app.user_id.is_empty() {
            result.add_error("app.user_id", "User ID cannot be empty");
        }

        if self.agent.name.is_empty() {
            result.add_error("agent.name", "Agent name cannot be empty");
        }

        if self.agent.max_steps == 0 {
            result.add_error("agent.max_steps", "max_steps must be greater than 0");
        }

        // Compaction
        if self.compaction.interval == 0 {
            result.add_error("compaction.interval", "interval must be greater than 0");
        } else if self.compaction.overlap >= self.compaction.interval {
            result.add_error(
                "compaction.overlap",
                format!(
                    "overlap ({}) must be smaller than interval ({})",
                    self.compaction.overlap, self.compaction.interval
                ),
            );
        }

        // Retry
        if self.retry.max_attempts == 0 {
            result.add_error("retry.max_attempts", "max_attempts must be at least 1");
        }

        if self.retry.exp_base < 1.0 {
            result.add_error("retry.exp_base", "exp_base cannot be smaller than 1.0");
        }

        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            result.add_warning(
                "retry.max_delay_ms",
                "max_delay_ms is below initial_delay_ms, every retry waits max_delay_ms",
            );
        }

        if self.retry.retryable_status_codes.is_empty() && self.retry.max_attempts > 1 {
            result.add_warning(
                "retry.retryable_status_codes",
                "No retryable status codes configured, failures will never be retried",
            );
        }

        // Tool servers
        let mut seen = HashSet::new();
        for (i, server) in self.tool_servers.iter().enumerate() {
            let field = format!("tool_servers[{}]", i);
            if server.name.is_empty() {
                result.add_error(format!("{}.name", field), "Server name cannot be empty");
            } else if !seen.insert(server.name.as_str()) {
                result.add_error(
                    format!("{}.name", field),
                    format!("Duplicate server name '{}'", server.name),
                );
            }
            if server.command.is_empty() {
                result.add_error(format!("{}.command", field), "Command cannot be empty");
            }
            if server.timeout_secs == 0 {
                result.add_error(
                    format!("{}.timeout_secs", field),
                    "timeout_secs must be greater than 0",
                );
            }
        }

        result
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("parley"))
            .unwrap_or_else(|| PathBuf::from("~/.config/parley"))
    }

    /// Get the data directory (for the session database).
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("parley"))
            .unwrap_or_else(|| PathBuf::from("~/.local/share/parley"))
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
