//! # audit-pipeline
//!
//! Bulk data pipeline for a multi-tenant, PostgreSQL-backed audit trail.
//!
//! Two jobs, both built on the COPY protocol:
//!
//! - **Seeding**: generate large synthetic datasets (entities plus their
//!   CREATE/UPDATE audit trails) distributed over calendar-month time
//!   buckets, and bulk-load them.
//! - **Migration**: move audit rows from the unpartitioned operational
//!   store into a range-partitioned audit store month by month, through a
//!   staging table, then verify the transfer by comparing SHA-256 digests
//!   of ordered primary-key exports from both sides.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use audit_pipeline::{Config, DbPool, EntityKind, Migrator};
//!
//! #[tokio::main]
//! async fn main() -> audit_pipeline::Result<()> {
//!     let config = Config::load(Path::new("config.yaml"))?;
//!     let operational = DbPool::connect(&config.operational, "operational").await?;
//!     let audit = DbPool::connect(&config.audit, "audit").await?;
//!     let migrator = Migrator::new(&operational, &audit, &config.pipeline);
//!     let summary = migrator.migrate(EntityKind::User).await?;
//!     println!("Migrated {} rows over {} months", summary.rows, summary.months);
//!     Ok(())
//! }
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod generator;
pub mod loader;
pub mod migrate;
pub mod partition;
pub mod pool;
pub mod seeder;
pub mod stage;
pub mod validate;

// Re-exports for convenient access
pub use allocator::{monthly_distribution, TimeBucket};
pub use config::{Config, ConnectionConfig, PipelineConfig};
pub use error::{PipelineError, Result};
pub use generator::{AuditKind, EnrollmentPools, EntityKind, RecordStream, SeedRecord};
pub use loader::StagingTable;
pub use migrate::{MigrationSummary, Migrator};
pub use partition::PartitionSpec;
pub use pool::DbPool;
pub use seeder::{AuditTarget, SeedRequest, SeedSummary, Seeder};
pub use stage::ColumnValue;
pub use validate::{validate_table, ValidationReport};
