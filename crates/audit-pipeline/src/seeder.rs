//! Bulk seeding: synthetic entities plus their audit trails.

use std::path::Path;

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::allocator::monthly_distribution;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::generator::{EnrollmentPools, EntityKind, RecordStream, AUDIT_COLUMNS};
use crate::loader::{direct_load, staged_load_once};
use crate::pool::{quote_ident, DbPool};
use crate::stage::{seed_file_name, RowWriter};

/// Which connection the generated audit rows are loaded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditTarget {
    /// Direct COPY into the unpartitioned operational audit table.
    Operational,
    /// Staged load into the partitioned audit store. The destination and
    /// its partitions must already exist there.
    Audit,
}

/// One seeding request as it arrives from the CLI.
#[derive(Debug)]
pub struct SeedRequest {
    pub kind: EntityKind,
    /// Required for every kind except tenants, which create their own.
    pub tenant_id: Option<Uuid>,
    pub count: u64,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub keep_files: bool,
    pub audit_target: AuditTarget,
}

/// Row counts written by a completed seeding run.
#[derive(Debug)]
pub struct SeedSummary {
    pub buckets: usize,
    pub entity_rows: u64,
    pub audit_rows: u64,
}

pub struct Seeder<'a> {
    operational: &'a DbPool,
    audit: &'a DbPool,
    config: &'a PipelineConfig,
}

impl<'a> Seeder<'a> {
    pub fn new(operational: &'a DbPool, audit: &'a DbPool, config: &'a PipelineConfig) -> Self {
        Seeder {
            operational,
            audit,
            config,
        }
    }

    /// Generate and load `count` entities with their audit trails, spread
    /// over the requested date range.
    pub async fn seed(&self, request: &SeedRequest) -> Result<SeedSummary> {
        let tenant_id = match (request.kind, request.tenant_id) {
            // Tenants carry their own identity; the audit rows reference
            // the generated tenant, not a requesting one.
            (EntityKind::Tenant, _) => Uuid::nil(),
            (_, Some(id)) => {
                self.check_tenant(id).await?;
                id
            }
            (kind, None) => {
                return Err(PipelineError::Validation(format!(
                    "--tenant is required when seeding {} records",
                    kind.as_str()
                )))
            }
        };

        let pools = if request.kind == EntityKind::Enrollment {
            self.sample_enrollment_pools(tenant_id).await?
        } else {
            EnrollmentPools::default()
        };

        let buckets = monthly_distribution(request.count, request.start, request.end)?;
        info!(
            "Seeding {} {} records across {} time buckets",
            request.count,
            request.kind.as_str(),
            buckets.len()
        );

        let staging_dir = Path::new(&self.config.staging_dir);
        let entity_table = request.kind.entity_table();
        let audit_table = request.kind.audit_table();
        let audit_columns: Vec<&str> = AUDIT_COLUMNS.to_vec();

        let mut summary = SeedSummary {
            buckets: buckets.len(),
            entity_rows: 0,
            audit_rows: 0,
        };

        for bucket in buckets {
            let bucket_count = bucket.count;
            let stream = RecordStream::new(
                request.kind,
                tenant_id,
                bucket,
                self.config.update_audits,
                self.config.update_interval_secs,
            )
            .with_pools(pools.clone());

            let mut entity_writer =
                RowWriter::create(staging_dir.join(seed_file_name(entity_table))).await?;
            let mut audit_writer =
                RowWriter::create(staging_dir.join(seed_file_name(audit_table))).await?;

            for record in stream {
                entity_writer.write_row(&record.entity_row).await?;
                for audit_row in &record.audit_rows {
                    audit_writer.write_row(audit_row).await?;
                }
            }

            let (entity_file, entity_rows) = entity_writer.finish().await?;
            let (audit_file, audit_rows) = audit_writer.finish().await?;

            let loaded_entities = direct_load(
                self.operational,
                entity_table,
                request.kind.entity_columns(),
                &entity_file,
                request.keep_files,
            )
            .await?;

            let loaded_audits = match request.audit_target {
                AuditTarget::Operational => {
                    direct_load(
                        self.operational,
                        audit_table,
                        &audit_columns,
                        &audit_file,
                        request.keep_files,
                    )
                    .await?
                }
                AuditTarget::Audit => {
                    staged_load_once(
                        self.audit,
                        audit_table,
                        &audit_columns,
                        &audit_file,
                        request.keep_files,
                    )
                    .await?
                }
            };

            info!(
                "Bucket of {} seeded: {} entity rows, {} audit rows",
                bucket_count, entity_rows, audit_rows
            );
            summary.entity_rows += loaded_entities;
            summary.audit_rows += loaded_audits;
        }

        info!(
            "Seeding complete: {} rows into {}, {} rows into {}",
            summary.entity_rows, entity_table, summary.audit_rows, audit_table
        );
        Ok(summary)
    }

    /// Enrollments reference existing rows: draw a bounded random sample of
    /// user and course ids for the tenant. Either table being empty is a
    /// precondition failure, not a partial run.
    async fn sample_enrollment_pools(&self, tenant_id: Uuid) -> Result<EnrollmentPools> {
        let user_ids = self.sample_ids("users", tenant_id).await?;
        if user_ids.is_empty() {
            return Err(PipelineError::Validation(format!(
                "No users found for tenant {}; seed users first",
                tenant_id
            )));
        }
        let course_ids = self.sample_ids("courses", tenant_id).await?;
        if course_ids.is_empty() {
            return Err(PipelineError::Validation(format!(
                "No courses found for tenant {}; seed courses first",
                tenant_id
            )));
        }
        info!(
            "Sampled {} users and {} courses for enrollments",
            user_ids.len(),
            course_ids.len()
        );
        Ok(EnrollmentPools {
            user_ids,
            course_ids,
        })
    }

    async fn sample_ids(&self, table: &str, tenant_id: Uuid) -> Result<Vec<Uuid>> {
        let client = self.operational.client().await?;
        let sql = format!(
            "SELECT id FROM {} WHERE tenant_id = $1 ORDER BY random() LIMIT {}",
            quote_ident(table),
            self.config.chunk_size
        );
        let rows = client.query(&sql, &[&tenant_id]).await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    /// The tenant must already exist; seeding never creates tenants.
    async fn check_tenant(&self, tenant_id: Uuid) -> Result<()> {
        let client = self.operational.client().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM tenants WHERE id = $1)",
                &[&tenant_id],
            )
            .await?;
        let exists: bool = row.get(0);
        if !exists {
            return Err(PipelineError::TenantNotFound(tenant_id));
        }
        Ok(())
    }
}
