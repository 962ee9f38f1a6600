//! YAML configuration loading and validation.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Unpartitioned operational database.
    pub operational: ConnectionConfig,
    /// Partitioned audit database.
    pub audit: ConnectionConfig,
    /// Pipeline tuning knobs.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Connection settings for one PostgreSQL database.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Pool size. The pipeline is single-writer so this stays small.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Tuning parameters for seeding and migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory where staged COPY files and ID exports are written.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    /// Rows per export chunk during migration.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Number of empty partitions created past the observed data span.
    #[serde(default = "default_future_partitions")]
    pub future_partitions: u32,
    /// UPDATE audit records generated per seeded entity.
    #[serde(default = "default_update_audits")]
    pub update_audits: u32,
    /// Seconds between consecutive audit timestamps for one entity.
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            staging_dir: default_staging_dir(),
            chunk_size: default_chunk_size(),
            future_partitions: default_future_partitions(),
            update_audits: default_update_audits(),
            update_interval_secs: default_update_interval_secs(),
        }
    }
}

fn default_port() -> u16 {
    5432
}

fn default_pool_size() -> usize {
    4
}

fn default_staging_dir() -> String {
    "/tmp".to_string()
}

fn default_chunk_size() -> u64 {
    100_000
}

fn default_future_partitions() -> u32 {
    3
}

fn default_update_audits() -> u32 {
    6
}

fn default_update_interval_secs() -> i64 {
    3600
}

impl Config {
    /// Load configuration from a YAML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check for values that would fail at runtime in confusing ways.
    pub fn validate(&self) -> Result<()> {
        self.operational.validate("operational")?;
        self.audit.validate("audit")?;

        if self.pipeline.staging_dir.is_empty() {
            return Err(PipelineError::Config(
                "pipeline.staging_dir must not be empty".to_string(),
            ));
        }
        if self.pipeline.chunk_size == 0 {
            return Err(PipelineError::Config(
                "pipeline.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.pipeline.update_interval_secs <= 0 {
            return Err(PipelineError::Config(
                "pipeline.update_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl ConnectionConfig {
    fn validate(&self, section: &str) -> Result<()> {
        if self.host.is_empty() {
            return Err(PipelineError::Config(format!(
                "{}.host must not be empty",
                section
            )));
        }
        if self.database.is_empty() {
            return Err(PipelineError::Config(format!(
                "{}.database must not be empty",
                section
            )));
        }
        if self.username.is_empty() {
            return Err(PipelineError::Config(format!(
                "{}.username must not be empty",
                section
            )));
        }
        if self.pool_size == 0 {
            return Err(PipelineError::Config(format!(
                "{}.pool_size must be at least 1",
                section
            )));
        }
        Ok(())
    }
}
