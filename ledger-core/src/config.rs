//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Escrow timing knobs
    pub escrow: EscrowConfig,

    /// Sweeper knobs
    pub sweeper: SweeperConfig,

    /// Arms the irreversible administrative reset. Must never be set in a
    /// production deployment; the reset additionally requires a literal
    /// confirmation phrase.
    pub allow_reset: bool,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            service_name: "ledger-core".to_string(),
            escrow: EscrowConfig::default(),
            sweeper: SweeperConfig::default(),
            allow_reset: false,
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// Escrow timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Days from order completion until the escrow timer matures
    pub hold_days: i64,

    /// Days after delivery before locked funds unlock (the return window)
    pub return_window_days: i64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            hold_days: 7,
            return_window_days: 7,
        }
    }
}

/// Sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Orders examined per sweep; a backlog drains over multiple runs
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { batch_size: 50 }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(days) = std::env::var("LEDGER_RETURN_WINDOW_DAYS") {
            config.escrow.return_window_days = days
                .parse()
                .map_err(|_| crate::Error::Config(format!("Invalid return window: {}", days)))?;
        }

        if let Ok(days) = std::env::var("LEDGER_ESCROW_HOLD_DAYS") {
            config.escrow.hold_days = days
                .parse()
                .map_err(|_| crate::Error::Config(format!("Invalid escrow hold: {}", days)))?;
        }

        if let Ok(flag) = std::env::var("LEDGER_ALLOW_RESET") {
            config.allow_reset = flag == "1" || flag.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}
