//! Bulk loading of staged files, directly or through a staging table.

use std::path::Path;

use rand::Rng;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::pool::{quote_ident, DbPool};

/// Concrete column type for staging-table DDL. The staged files carry only
/// text, so the staging table re-applies the destination types at insert
/// time.
pub fn staging_column_type(column: &str) -> &'static str {
    match column {
        "id" => "BIGINT",
        "object_id" | "tenant_id" | "user_id" | "course_id" => "UUID",
        "type" => "SMALLINT",
        "diffs" => "JSONB",
        "transaction_hash" | "blame_id" | "blame_user" | "name" | "full_name" | "email"
        | "title" | "description" => "VARCHAR(255)",
        "enabled" | "is_completed" => "BOOLEAN",
        "created_at" | "updated_at" => "TIMESTAMP",
        "enrolled_at" => "DATE",
        _ => "TEXT",
    }
}

/// COPY a staged file straight into its destination table.
///
/// The file is deleted on success unless `keep_file` is set; on failure it
/// stays behind for inspection.
pub async fn direct_load(
    pool: &DbPool,
    table: &str,
    columns: &[&str],
    path: &Path,
    keep_file: bool,
) -> Result<u64> {
    let rows = pool
        .copy_in_file(table, columns, path)
        .await
        .map_err(|e| match e {
            PipelineError::BulkLoad { .. } => e,
            other => PipelineError::bulk_load(table, other),
        })?;

    if !keep_file {
        tokio::fs::remove_file(path).await?;
    }
    debug!("Loaded {} rows into {} (direct)", rows, table);
    Ok(rows)
}

/// Staging table owned for the duration of one run.
///
/// Created once, truncated before each batch, and dropped explicitly on
/// every exit path. Never relies on connection-scoped TEMP semantics since
/// pooled connections are recycled between batches.
pub struct StagingTable<'a> {
    pool: &'a DbPool,
    name: String,
    dest: String,
    columns: Vec<String>,
}

impl<'a> StagingTable<'a> {
    /// Create the staging table for a destination. `unique` appends a random
    /// suffix so unrelated runs against the same destination cannot collide.
    pub async fn create(
        pool: &'a DbPool,
        dest: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<StagingTable<'a>> {
        let name = if unique {
            format!("{}_temp_import_{:08x}", dest, rand::thread_rng().gen::<u32>())
        } else {
            format!("{}_temp_import", dest)
        };

        let column_defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(c), staging_column_type(c)))
            .collect();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&name),
            column_defs.join(", ")
        );
        pool.execute(&ddl).await?;
        debug!("Created staging table {}", name);

        Ok(StagingTable {
            pool,
            name,
            dest: dest.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load one staged file: truncate, COPY in, then a single
    /// `INSERT INTO dest SELECT ... FROM staging`.
    ///
    /// The file is deleted on success unless `keep_file` is set. A failure
    /// aborts the batch; rows from earlier batches stay committed.
    pub async fn load_file(&self, path: &Path, keep_file: bool) -> Result<u64> {
        let columns: Vec<&str> = self.columns.iter().map(|c| c.as_str()).collect();

        self.pool
            .execute(&format!("TRUNCATE TABLE {}", quote_ident(&self.name)))
            .await?;

        self.pool
            .copy_in_file(&self.name, &columns, path)
            .await
            .map_err(|e| rewrap_staging_error(&self.dest, &self.name, e))?;

        let col_list: String = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&self.dest),
            col_list,
            col_list,
            quote_ident(&self.name)
        );
        let rows = self
            .pool
            .execute(&insert)
            .await
            .map_err(|e| PipelineError::bulk_load(self.dest.as_str(), e))?;

        if !keep_file {
            tokio::fs::remove_file(path).await?;
        }
        info!("Loaded {} rows into {} via {}", rows, self.dest, self.name);
        Ok(rows)
    }

    /// Drop the staging table. Consumes the handle; call on every exit path.
    pub async fn drop_table(self) -> Result<()> {
        self.pool
            .execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&self.name)))
            .await?;
        debug!("Dropped staging table {}", self.name);
        Ok(())
    }
}

/// Failures inside the staging table are reported against the destination
/// the load was for; the staging table only appears in the message.
fn rewrap_staging_error(dest: &str, staging: &str, e: PipelineError) -> PipelineError {
    let message = match e {
        PipelineError::BulkLoad { table, message } => {
            format!("staging table {}: {}", table, message)
        }
        other => format!("staging table {}: {}", staging, other),
    };
    PipelineError::BulkLoad {
        table: dest.to_string(),
        message,
    }
}

/// One-shot staged load for seeding: create a uniquely named staging table,
/// load the file, and drop the table whether or not the load succeeded.
pub async fn staged_load_once(
    pool: &DbPool,
    dest: &str,
    columns: &[&str],
    path: &Path,
    keep_file: bool,
) -> Result<u64> {
    let staging = StagingTable::create(pool, dest, columns, true).await?;
    let result = staging.load_file(path, keep_file).await;
    match result {
        Ok(rows) => {
            staging.drop_table().await?;
            Ok(rows)
        }
        Err(e) => {
            // Best effort; the load error is the one worth reporting.
            let _ = staging.drop_table().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_types_cover_audit_columns() {
        assert_eq!(staging_column_type("id"), "BIGINT");
        assert_eq!(staging_column_type("tenant_id"), "UUID");
        assert_eq!(staging_column_type("object_id"), "UUID");
        assert_eq!(staging_column_type("type"), "SMALLINT");
        assert_eq!(staging_column_type("diffs"), "JSONB");
        assert_eq!(staging_column_type("transaction_hash"), "VARCHAR(255)");
        assert_eq!(staging_column_type("created_at"), "TIMESTAMP");
    }

    #[test]
    fn staging_types_cover_entity_columns() {
        assert_eq!(staging_column_type("full_name"), "VARCHAR(255)");
        assert_eq!(staging_column_type("email"), "VARCHAR(255)");
        assert_eq!(staging_column_type("enabled"), "BOOLEAN");
        assert_eq!(staging_column_type("is_completed"), "BOOLEAN");
        assert_eq!(staging_column_type("enrolled_at"), "DATE");
    }

    #[test]
    fn unknown_columns_fall_back_to_text() {
        assert_eq!(staging_column_type("unmapped_column"), "TEXT");
    }

    #[test]
    fn staging_types_cover_tenant_and_enrollment_columns() {
        assert_eq!(staging_column_type("name"), "VARCHAR(255)");
        assert_eq!(staging_column_type("user_id"), "UUID");
        assert_eq!(staging_column_type("course_id"), "UUID");
        assert_eq!(staging_column_type("enrolled_at"), "DATE");
    }

    #[test]
    fn staging_copy_failures_name_the_destination() {
        let inner = PipelineError::bulk_load("user_audits_temp_import", "COPY send failed: boom");
        let err = rewrap_staging_error("user_audits", "user_audits_temp_import", inner);
        match err {
            PipelineError::BulkLoad { table, message } => {
                assert_eq!(table, "user_audits");
                assert!(message.contains("user_audits_temp_import"));
                assert!(message.contains("boom"));
            }
            other => panic!("expected BulkLoad, got {:?}", other),
        }
    }

    #[test]
    fn non_copy_failures_still_name_the_destination() {
        let inner = PipelineError::Validation("connection dropped".to_string());
        let err = rewrap_staging_error("user_audits", "user_audits_temp_import", inner);
        match err {
            PipelineError::BulkLoad { table, message } => {
                assert_eq!(table, "user_audits");
                assert!(message.contains("user_audits_temp_import"));
            }
            other => panic!("expected BulkLoad, got {:?}", other),
        }
    }
}
