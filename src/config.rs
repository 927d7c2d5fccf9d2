// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Risk monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Evaluation engine windows and cooldowns
    pub engine: EngineConfig,

    /// Periodic batch evaluation
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Engine windows. Defaults: 30 minute cooldown for open-trade rules,
/// 10 minutes for the rest, a 24 hour accumulation window for soft rules
/// and a 60 second batch lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cooldown before an OPEN_TRADES rule may re-fire for an account
    pub open_trades_cooldown_minutes: i64,

    /// Cooldown before any other rule may re-fire for the same key
    pub default_cooldown_minutes: i64,

    /// Rolling window for counting soft-rule incidents
    pub soft_rule_window_hours: i64,

    /// How far back the duration rule scans closed trades in account mode
    pub duration_scan_window_hours: i64,

    /// TTL of the per-account advisory lock held during batch evaluation
    pub account_lock_ttl_secs: u64,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between periodic evaluations of all active accounts
    pub evaluation_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let engine = EngineConfig {
            open_trades_cooldown_minutes: env_parse("OPEN_TRADES_COOLDOWN_MINUTES", 30),
            default_cooldown_minutes: env_parse("DEFAULT_COOLDOWN_MINUTES", 10),
            soft_rule_window_hours: env_parse("SOFT_RULE_WINDOW_HOURS", 24),
            duration_scan_window_hours: env_parse("DURATION_SCAN_WINDOW_HOURS", 24),
            account_lock_ttl_secs: env_parse("ACCOUNT_LOCK_TTL_SECS", 60),
        };

        let scheduler = SchedulerConfig {
            evaluation_interval_secs: env_parse("EVALUATION_INTERVAL_SECS", 300),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env_parse("LOG_TO_FILE", false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        Ok(Config {
            engine,
            scheduler,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| AppError::Config(format!("Failed to open config file: {}", e)))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| AppError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path)
                    .map_err(|e| AppError::Config(format!("Failed to create log file: {}", e)))?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        // Initialize the logger
        builder.init();

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            scheduler: SchedulerConfig {
                evaluation_interval_secs: 300,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            open_trades_cooldown_minutes: 30,
            default_cooldown_minutes: 10,
            soft_rule_window_hours: 24,
            duration_scan_window_hours: 24,
            account_lock_ttl_secs: 60,
        }
    }
}
