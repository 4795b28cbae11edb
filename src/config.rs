//! Engine configuration
//!
//! Timeouts and limits for check execution, loaded from environment or set
//! per run.

use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard limit on one check's total duration in seconds (default: 60s)
    pub check_timeout_secs: u64,
    /// How long `stdout`/`reject` wait for output in milliseconds (default: 3000ms)
    pub stdout_timeout_ms: u64,
    /// How long `exit` waits for termination in milliseconds (default: 5000ms)
    pub exit_timeout_ms: u64,
    /// Compile time limit in milliseconds (default: 30000ms = 30s)
    pub compile_timeout_ms: u64,
    /// Compiler output lines kept in a failed check's log (default: 50)
    pub max_log_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_timeout_secs: 60,
            stdout_timeout_ms: 3_000,
            exit_timeout_ms: 5_000,
            compile_timeout_ms: 30_000,
            max_log_lines: 50,
        }
    }
}

impl EngineConfig {
    /// Load configuration, overriding defaults with `GRADER_*` variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            check_timeout_secs: env_or("GRADER_CHECK_TIMEOUT_SECS", defaults.check_timeout_secs),
            stdout_timeout_ms: env_or("GRADER_STDOUT_TIMEOUT_MS", defaults.stdout_timeout_ms),
            exit_timeout_ms: env_or("GRADER_EXIT_TIMEOUT_MS", defaults.exit_timeout_ms),
            compile_timeout_ms: env_or("GRADER_COMPILE_TIMEOUT_MS", defaults.compile_timeout_ms),
            max_log_lines: env_or("GRADER_MAX_LOG_LINES", defaults.max_log_lines),
        }
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn stdout_timeout(&self) -> Duration {
        Duration::from_millis(self.stdout_timeout_ms)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Ignoring invalid value for {}: {:?}", key, value);
                default
            }
        },
        Err(_) => default,
    }
}

/// Global engine configuration
static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Install the process-wide configuration
pub fn init_config(config: EngineConfig) -> anyhow::Result<()> {
    ENGINE_CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Engine configuration already initialized"))?;

    Ok(())
}

/// Get engine configuration
pub fn get_config() -> &'static EngineConfig {
    ENGINE_CONFIG.get().unwrap_or_else(|| {
        static DEFAULT: OnceLock<EngineConfig> = OnceLock::new();

        DEFAULT.get_or_init(EngineConfig::default)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let config = EngineConfig::default();
        assert_eq!(config.check_timeout(), Duration::from_secs(60));
        assert_eq!(config.stdout_timeout(), Duration::from_secs(3));
        assert_eq!(config.exit_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_log_lines, 50);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("GRADER_TEST_GARBAGE_VALUE", "not-a-number");
        assert_eq!(env_or("GRADER_TEST_GARBAGE_VALUE", 7u64), 7);
        std::env::set_var("GRADER_TEST_GARBAGE_VALUE", " 12 ");
        assert_eq!(env_or("GRADER_TEST_GARBAGE_VALUE", 7u64), 12);
        std::env::remove_var("GRADER_TEST_GARBAGE_VALUE");
    }
}
