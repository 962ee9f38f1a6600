//! Error types for the pipeline library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for seeding and migration operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration error (invalid YAML, missing fields, bad argument).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested date range has start after end.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// The tenant does not exist in the operational database.
    #[error("Tenant {0} does not exist in the operational database")]
    TenantNotFound(uuid::Uuid),

    /// Precondition check failed before any write happened.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A bulk load batch failed; the whole operation aborts.
    #[error("Bulk load failed for table {table}: {message}")]
    BulkLoad { table: String, message: String },

    /// Range partition DDL failed (e.g. the partition already exists).
    #[error("Failed to create partition {partition}: {message}")]
    PartitionCreation { partition: String, message: String },

    /// Post-migration checksum comparison failed. Artifacts are preserved.
    #[error(
        "Migration integrity check failed for {table}: ID checksums do not match. \
         Operational count: {source_count}, audit count: {target_count}. \
         Check files: {source_file:?} and {target_file:?}"
    )]
    IntegrityMismatch {
        table: String,
        source_count: i64,
        target_count: i64,
        source_file: PathBuf,
        target_file: PathBuf,
    },

    /// Connection pool error with context about where it occurred.
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Database query or protocol error.
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),

    /// IO error (staging files, ID exports).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Create a Pool error with context about where it occurred.
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        PipelineError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a BulkLoad error.
    pub fn bulk_load(table: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::BulkLoad {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a PartitionCreation error.
    pub fn partition(partition: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::PartitionCreation {
            partition: partition.into(),
            message: message.to_string(),
        }
    }

    /// Format error with full details including the error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\n\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config(_) | PipelineError::Yaml(_) | PipelineError::Json(_) => 1,
            PipelineError::InvalidRange { .. }
            | PipelineError::TenantNotFound(_)
            | PipelineError::Validation(_) => 2,
            PipelineError::BulkLoad { .. } => 3,
            PipelineError::IntegrityMismatch { .. } => 4,
            PipelineError::PartitionCreation { .. } => 5,
            PipelineError::Db(_) | PipelineError::Pool { .. } => 6,
            PipelineError::Io(_) => 7,
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(PipelineError::Config("x".into()).exit_code(), 1);
        assert_eq!(
            PipelineError::InvalidRange {
                start: chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                end: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            }
            .exit_code(),
            2
        );
        assert_eq!(PipelineError::bulk_load("users", "boom").exit_code(), 3);
        assert_eq!(
            PipelineError::IntegrityMismatch {
                table: "user_audits".into(),
                source_count: 10,
                target_count: 9,
                source_file: "a.txt".into(),
                target_file: "b.txt".into(),
            }
            .exit_code(),
            4
        );
        assert_eq!(
            PipelineError::partition("user_audits_2024_01", "exists").exit_code(),
            5
        );
    }

    #[test]
    fn integrity_mismatch_reports_counts_and_files() {
        let err = PipelineError::IntegrityMismatch {
            table: "user_audits".into(),
            source_count: 700,
            target_count: 699,
            source_file: "/tmp/user_audits_operational_ids.txt".into(),
            target_file: "/tmp/user_audits_audit_ids.txt".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("700"));
        assert!(msg.contains("699"));
        assert!(msg.contains("user_audits_operational_ids.txt"));
    }
}
