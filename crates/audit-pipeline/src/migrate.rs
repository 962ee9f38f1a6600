//! Month-by-month migration of audit tables into the partitioned store.

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime};
use tracing::{debug, info};

use crate::allocator::{month_start, next_month_start};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::generator::{EntityKind, AUDIT_COLUMNS};
use crate::loader::StagingTable;
use crate::partition::{
    create_audit_indexes, create_partitions, ensure_partitioned_table, partition_plan,
};
use crate::pool::{quote_ident, DbPool};
use crate::stage::{clean_staged_files, month_file_name, ColumnValue, RowWriter};
use crate::validate::validate_table;

/// What a completed migration run did.
#[derive(Debug)]
pub struct MigrationSummary {
    pub table: String,
    pub months: u32,
    pub rows: u64,
}

/// Columns exported from the operational audit table. The source `id` is
/// carried so both sides can be compared by ordered primary key afterwards.
fn export_columns() -> Vec<&'static str> {
    let mut columns = vec!["id"];
    columns.extend_from_slice(&AUDIT_COLUMNS);
    columns
}

pub struct Migrator<'a> {
    operational: &'a DbPool,
    audit: &'a DbPool,
    config: &'a PipelineConfig,
}

impl<'a> Migrator<'a> {
    pub fn new(operational: &'a DbPool, audit: &'a DbPool, config: &'a PipelineConfig) -> Self {
        Migrator {
            operational,
            audit,
            config,
        }
    }

    /// Migrate one kind's audit table from the operational store into the
    /// partitioned audit store, then verify the transfer.
    ///
    /// Staged files and ID exports are only deleted once validation passes;
    /// any failure leaves them behind for inspection. There is no retry and
    /// no rollback: months loaded before a failure stay committed.
    pub async fn migrate(&self, kind: EntityKind) -> Result<MigrationSummary> {
        let table = kind.audit_table();
        let staging_dir = Path::new(&self.config.staging_dir);

        clean_staged_files(staging_dir, table).await?;
        ensure_partitioned_table(self.audit, table).await?;
        create_audit_indexes(self.audit, table).await?;

        let Some((min, max)) = self.date_span(table).await? else {
            info!("No rows to migrate for {}", table);
            return Ok(MigrationSummary {
                table: table.to_string(),
                months: 0,
                rows: 0,
            });
        };
        info!("Migrating {} rows spanning {} to {}", table, min, max);

        let plan = partition_plan(
            table,
            min.date(),
            max.date(),
            self.config.future_partitions,
        );
        create_partitions(self.audit, table, &plan).await?;

        let columns = export_columns();
        let staging = StagingTable::create(self.audit, table, &columns, false).await?;

        let outcome = self
            .migrate_months(table, &staging, staging_dir, min, max)
            .await;
        let (months, rows, staged_files) = match outcome {
            Ok(result) => result,
            Err(e) => {
                let _ = staging.drop_table().await;
                return Err(e);
            }
        };

        // The staging table is released whether or not validation passes;
        // the staged files survive a mismatch.
        let validation = validate_table(self.operational, self.audit, table, staging_dir).await;
        let released = staging.drop_table().await;
        let report = validation?;
        released?;
        report.remove_artifacts().await?;
        for file in &staged_files {
            tokio::fs::remove_file(file).await?;
        }

        info!(
            "Migration complete for {}: {} rows over {} months, {} rows verified",
            table, rows, months, report.row_count
        );
        Ok(MigrationSummary {
            table: table.to_string(),
            months,
            rows,
        })
    }

    /// MIN/MAX(created_at) of the operational audit table.
    async fn date_span(&self, table: &str) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        let client = self.operational.client().await?;
        let sql = format!(
            "SELECT MIN(created_at), MAX(created_at) FROM {}",
            quote_ident(table)
        );
        let row = client.query_one(&sql, &[]).await?;
        let min: Option<NaiveDateTime> = row.get(0);
        let max: Option<NaiveDateTime> = row.get(1);
        Ok(min.zip(max))
    }

    async fn migrate_months(
        &self,
        table: &str,
        staging: &StagingTable<'_>,
        staging_dir: &Path,
        min: NaiveDateTime,
        max: NaiveDateTime,
    ) -> Result<(u32, u64, Vec<PathBuf>)> {
        let mut months = 0u32;
        let mut total_rows = 0u64;
        let mut staged_files = Vec::new();

        let mut cursor = month_start(min.date());
        let last_month = month_start(max.date());
        while cursor <= last_month {
            let from = cursor.and_hms_opt(0, 0, 0).unwrap_or_default();
            let to = next_month_start(cursor).and_hms_opt(0, 0, 0).unwrap_or_default();

            let count = self.month_count(table, from, to).await?;
            if count == 0 {
                debug!("Skipping empty month {}-{:02} for {}", cursor.year(), cursor.month(), table);
                cursor = next_month_start(cursor);
                continue;
            }

            let path = staging_dir.join(month_file_name(table, cursor.year(), cursor.month()));
            let exported = self.export_month(table, from, to, path.clone()).await?;
            let loaded = staging.load_file(&path, true).await?;
            info!(
                "Migrated {}-{:02} for {}: {} exported, {} loaded",
                cursor.year(),
                cursor.month(),
                table,
                exported,
                loaded
            );

            staged_files.push(path);
            months += 1;
            total_rows += loaded;
            cursor = next_month_start(cursor);
        }

        Ok((months, total_rows, staged_files))
    }

    async fn month_count(&self, table: &str, from: NaiveDateTime, to: NaiveDateTime) -> Result<i64> {
        let client = self.operational.client().await?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE created_at >= $1 AND created_at < $2",
            quote_ident(table)
        );
        let row = client.query_one(&sql, &[&from, &to]).await?;
        Ok(row.get(0))
    }

    /// Export one month to a staged COPY file, in keyset-paginated chunks
    /// ordered by `id`.
    async fn export_month(
        &self,
        table: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
        path: PathBuf,
    ) -> Result<u64> {
        let client = self.operational.client().await?;
        let sql = format!(
            "SELECT id, tenant_id, object_id, type, diffs, transaction_hash, \
                    blame_id, blame_user, created_at \
             FROM {} \
             WHERE created_at >= $1 AND created_at < $2 AND id > $3 \
             ORDER BY id \
             LIMIT {}",
            quote_ident(table),
            self.config.chunk_size
        );

        let mut writer = RowWriter::create(path).await?;
        let mut last_id = 0i64;
        loop {
            let rows = client.query(&sql, &[&from, &to, &last_id]).await?;
            if rows.is_empty() {
                break;
            }
            for row in &rows {
                let id: i64 = row.get(0);
                writer
                    .write_row(&[
                        ColumnValue::I64(id),
                        ColumnValue::Uuid(row.get(1)),
                        ColumnValue::Uuid(row.get(2)),
                        ColumnValue::I16(row.get(3)),
                        ColumnValue::Json(row.get(4)),
                        ColumnValue::Text(row.get(5)),
                        ColumnValue::Text(row.get(6)),
                        ColumnValue::Text(row.get(7)),
                        ColumnValue::Timestamp(row.get(8)),
                    ])
                    .await?;
                last_id = id;
            }
            if (rows.len() as u64) < self.config.chunk_size {
                break;
            }
        }

        let (_, exported) = writer.finish().await?;
        Ok(exported)
    }
}
