//! Per-run resource configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Where OS-level ceilings are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    /// Per execution unit; safe when many runs share a process
    #[default]
    Thread,
    /// Process-wide rlimits; only for a process that hosts a single run
    Process,
}

impl FromStr for LimitScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(LimitScope::Thread),
            "process" => Ok(LimitScope::Process),
            _ => Err(ConfigError::Invalid {
                var: "limit scope",
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for one sandboxed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Wall-clock ceiling, not counting time spent waiting for input
    pub timeout: Duration,
    /// Memory ceiling in megabytes
    pub max_memory_mb: usize,
    /// Executed-line budget
    pub max_instructions: u64,
    pub max_recursion_depth: usize,
    pub max_output_bytes: usize,
    /// How long one `input()` call may wait for a value
    pub input_wait: Duration,
    pub limit_scope: LimitScope,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_memory_mb: 100,
            max_instructions: 1_000_000,
            max_recursion_depth: 1000,
            max_output_bytes: 1024 * 1024, // 1 MiB
            input_wait: Duration::from_secs(300),
            limit_scope: LimitScope::Thread,
        }
    }
}

impl SandboxConfig {
    /// Profile used for coordinator runs
    pub fn interactive() -> Self {
        Self::default().with_timeout(Duration::from_secs(30))
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_memory_mb(mut self, mb: usize) -> Self {
        self.max_memory_mb = mb;
        self
    }

    pub fn with_max_instructions(mut self, count: u64) -> Self {
        self.max_instructions = count;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_input_wait(mut self, wait: Duration) -> Self {
        self.input_wait = wait;
        self
    }

    pub fn with_limit_scope(mut self, scope: LimitScope) -> Self {
        self.limit_scope = scope;
        self
    }

    /// Defaults overridden by any `SANDPIT_*` variables that are set
    ///
    /// Recognised: `SANDPIT_TIMEOUT_SECS`, `SANDPIT_MAX_MEMORY_MB`,
    /// `SANDPIT_MAX_INSTRUCTIONS`, `SANDPIT_MAX_RECURSION_DEPTH`,
    /// `SANDPIT_MAX_OUTPUT_BYTES`, `SANDPIT_INPUT_WAIT_SECS` and
    /// `SANDPIT_LIMIT_SCOPE` (`thread` or `process`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// `self` with any `SANDPIT_*` variables applied on top
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = self;
        if let Some(secs) = parse_var(&lookup, "SANDPIT_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(mb) = parse_var(&lookup, "SANDPIT_MAX_MEMORY_MB")? {
            config.max_memory_mb = mb;
        }
        if let Some(count) = parse_var(&lookup, "SANDPIT_MAX_INSTRUCTIONS")? {
            config.max_instructions = count;
        }
        if let Some(depth) = parse_var(&lookup, "SANDPIT_MAX_RECURSION_DEPTH")? {
            config.max_recursion_depth = depth;
        }
        if let Some(bytes) = parse_var(&lookup, "SANDPIT_MAX_OUTPUT_BYTES")? {
            config.max_output_bytes = bytes;
        }
        if let Some(secs) = parse_var(&lookup, "SANDPIT_INPUT_WAIT_SECS")? {
            config.input_wait = Duration::from_secs(secs);
        }
        if let Some(scope) = parse_var(&lookup, "SANDPIT_LIMIT_SCOPE")? {
            config.limit_scope = scope;
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Errors reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_memory_mb, 100);
        assert_eq!(config.max_instructions, 1_000_000);
        assert_eq!(config.input_wait, Duration::from_secs(300));
        assert_eq!(config.limit_scope, LimitScope::Thread);
        assert_eq!(SandboxConfig::interactive().timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builders() {
        let config = SandboxConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_max_memory_mb(8)
            .with_max_instructions(100)
            .with_limit_scope(LimitScope::Process);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_memory_bytes(), 8 * 1024 * 1024);
        assert_eq!(config.max_instructions, 100);
        assert_eq!(config.limit_scope, LimitScope::Process);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SANDPIT_TIMEOUT_SECS", "12"),
            ("SANDPIT_MAX_INSTRUCTIONS", " 5000 "),
            ("SANDPIT_LIMIT_SCOPE", "Process"),
        ]
        .into_iter()
        .collect();
        let config = SandboxConfig::default()
            .with_overrides(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.max_instructions, 5000);
        assert_eq!(config.limit_scope, LimitScope::Process);
        assert_eq!(config.max_memory_mb, 100);

        let interactive = SandboxConfig::interactive()
            .with_overrides(|var| (var == "SANDPIT_MAX_OUTPUT_BYTES").then(|| "64".to_string()))
            .unwrap();
        assert_eq!(interactive.timeout, Duration::from_secs(30));
        assert_eq!(interactive.max_output_bytes, 64);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = SandboxConfig::interactive()
            .with_overrides(|var| (var == "SANDPIT_MAX_MEMORY_MB").then(|| "lots".to_string()))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value \"lots\" for SANDPIT_MAX_MEMORY_MB"
        );
    }
}
