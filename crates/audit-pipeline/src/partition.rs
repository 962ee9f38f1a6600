//! Range-partitioned audit table DDL and monthly partition planning.

use chrono::{Datelike, NaiveDate};
use tracing::info;

use crate::allocator::{month_start, next_month_start};
use crate::error::{PipelineError, Result};
use crate::pool::{quote_ident, DbPool};

/// One monthly partition: `[from, to)` on `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub name: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Create the partitioned audit destination if it does not exist.
///
/// `created_at` is part of the primary key because it is the partition key.
pub async fn ensure_partitioned_table(pool: &DbPool, table: &str) -> Result<()> {
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (\
           id BIGSERIAL, \
           tenant_id UUID NOT NULL, \
           object_id UUID NOT NULL, \
           type SMALLINT NOT NULL, \
           diffs JSONB NOT NULL, \
           transaction_hash VARCHAR(255) NOT NULL, \
           blame_id VARCHAR(255) NOT NULL, \
           blame_user VARCHAR(255) NOT NULL, \
           created_at TIMESTAMP NOT NULL, \
           PRIMARY KEY (id, created_at)\
         ) PARTITION BY RANGE (created_at)",
        quote_ident(table)
    );
    pool.execute(&ddl).await?;
    Ok(())
}

/// Secondary-index DDL for an audit destination, matching the tenant-scoped
/// lookup paths the audit tables serve.
pub fn audit_index_statements(table: &str) -> Vec<String> {
    [
        (
            "tenant_created_at_type_object_id",
            "tenant_id, created_at, type, object_id",
        ),
        ("tenant_type_object_id", "tenant_id, type, object_id"),
        ("tenant_object_id", "tenant_id, object_id"),
    ]
    .iter()
    .map(|(suffix, columns)| {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&format!("{}_{}", table, suffix)),
            quote_ident(table),
            columns
        )
    })
    .collect()
}

/// Ensure the audit destination's secondary indexes exist. Idempotent, so it
/// runs on every migration unlike partition creation.
pub async fn create_audit_indexes(pool: &DbPool, table: &str) -> Result<()> {
    for sql in audit_index_statements(table) {
        pool.execute(&sql).await?;
    }
    info!("Ensured secondary indexes for {}", table);
    Ok(())
}

/// Plan one partition per calendar month covering `[min, max]`, plus
/// `future` empty months past the last observed one.
pub fn partition_plan(
    table: &str,
    min: NaiveDate,
    max: NaiveDate,
    future: u32,
) -> Vec<PartitionSpec> {
    let mut plan = Vec::new();
    let mut cursor = month_start(min);
    let last_observed = month_start(max);

    let mut extra = 0u32;
    loop {
        let from = cursor;
        let to = next_month_start(cursor);
        plan.push(PartitionSpec {
            name: format!("{}_{}_{:02}", table, from.year(), from.month()),
            from,
            to,
        });
        if cursor >= last_observed {
            if extra == future {
                break;
            }
            extra += 1;
        }
        cursor = to;
    }
    plan
}

/// Create every partition in the plan. A partition that already exists makes
/// the DDL fail; that failure is fatal by design, so re-runs against a
/// half-migrated destination are caught loudly rather than silently merged.
pub async fn create_partitions(pool: &DbPool, table: &str, plan: &[PartitionSpec]) -> Result<()> {
    for spec in plan {
        let ddl = format!(
            "CREATE TABLE {} PARTITION OF {} FOR VALUES FROM ('{}') TO ('{}')",
            quote_ident(&spec.name),
            quote_ident(table),
            spec.from,
            spec.to
        );
        pool.execute(&ddl)
            .await
            .map_err(|e| PipelineError::partition(spec.name.as_str(), e))?;
    }
    info!("Created {} partitions for {}", plan.len(), table);
    Ok(())
}
