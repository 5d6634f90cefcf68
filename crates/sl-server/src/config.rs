use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration loaded from `config.toml` in the working directory,
/// falling back to defaults when the file does not exist.
///
/// The worker count sizes the runtime before any async code runs, so the
/// config is loaded synchronously at the very top of `main`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Runtime worker threads; defaults to half the CPU cores, floor two.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Default log level when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Access-log file (one line per request).
    #[serde(default = "default_access_log")]
    pub access_log: PathBuf,
    /// Error-log file (all other application logs).
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workers: default_workers(),
            log_level: default_log_level(),
            access_log: default_access_log(),
            error_log: default_error_log(),
        }
    }
}

impl ServerConfig {
    /// Load config from `./config.toml`, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = PathBuf::from("config.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Self::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load config from an explicit path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: ServerConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Validation(
                "workers must be at least 1".to_string(),
            ));
        }
        self.bind
            .parse::<std::net::SocketAddr>()
            .map_err(|e| ConfigError::Validation(format!("bind address {}: {}", self.bind, e)))?;
        Ok(())
    }
}

/// Worker-count formula: half the CPU cores, never fewer than two.
pub fn workers_for(cpu_count: usize) -> usize {
    std::cmp::max(2, cpu_count / 2)
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    workers_for(cpus)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_access_log() -> PathBuf {
    std::env::temp_dir().join("sightline_access.log")
}

fn default_error_log() -> PathBuf {
    std::env::temp_dir().join("sightline_error.log")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_formula_small_hosts() {
        // Half the cores, floor two.
        assert_eq!(workers_for(1), 2);
        assert_eq!(workers_for(2), 2);
        assert_eq!(workers_for(3), 2);
        assert_eq!(workers_for(4), 2);
    }

    #[test]
    fn test_worker_formula_large_hosts() {
        assert_eq!(workers_for(8), 4);
        assert_eq!(workers_for(16), 8);
        assert_eq!(workers_for(64), 32);
    }

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind, "0.0.0.0:8000");
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.workers >= 2);
        assert!(cfg.access_log.ends_with("sightline_access.log"));
        assert!(cfg.error_log.ends_with("sightline_error.log"));
        cfg.validate().expect("defaults must validate");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("bind = \"127.0.0.1:9000\"").unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:9000");
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.workers >= 2);
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let cfg = ServerConfig {
            workers: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_bad_bind() {
        let cfg = ServerConfig {
            bind: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }
}
