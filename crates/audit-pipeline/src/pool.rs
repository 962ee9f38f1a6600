//! PostgreSQL connection pools and bulk COPY plumbing.

use std::path::Path;

use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{PipelineError, Result};

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Connection pool for one of the two databases.
///
/// The pipeline is single-writer, so the pool exists to survive connection
/// recycling between long COPY operations rather than for parallelism.
pub struct DbPool {
    pool: Pool,
    /// "operational" or "audit", used in log lines and error context.
    label: &'static str,
}

impl DbPool {
    /// Connect and verify the connection with a `SELECT 1`.
    pub async fn connect(config: &ConnectionConfig, label: &'static str) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.username);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.pool_size)
            .build()
            .map_err(|e| PipelineError::pool(e, format!("creating {} pool", label)))?;

        let db_pool = DbPool { pool, label };
        db_pool.ping().await?;

        info!(
            "Connected to {} database: {}:{}/{}",
            label, config.host, config.port, config.database
        );
        Ok(db_pool)
    }

    /// Get a pooled client.
    pub async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| PipelineError::pool(e, format!("getting {} connection", self.label)))
    }

    /// Check the connection is alive.
    pub async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// Run a statement with no parameters, returning the affected-row count.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let client = self.client().await?;
        let count = client.execute(sql, &[]).await?;
        Ok(count)
    }

    /// COUNT(*) for a table.
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let client = self.client().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }

    /// Stream a staged file into a table via `COPY ... FROM STDIN`.
    ///
    /// The file must already be in COPY text format (tab-delimited, escaped).
    pub async fn copy_in_file(&self, table: &str, columns: &[&str], path: &Path) -> Result<u64> {
        let client = self.client().await?;

        let col_list: String = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let copy_stmt = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            quote_ident(table),
            col_list
        );

        let file = tokio::fs::File::open(path).await?;
        let mut reader = BufReader::new(file);

        let sink = client.copy_in(&copy_stmt).await?;
        futures::pin_mut!(sink);

        let mut buf = BytesMut::with_capacity(1024 * 1024);
        loop {
            buf.reserve(64 * 1024);
            let n = reader.read_buf(&mut buf).await?;
            if n == 0 {
                break;
            }
            if buf.len() >= 1024 * 1024 {
                sink.send(buf.split().freeze())
                    .await
                    .map_err(|e| PipelineError::bulk_load(table, format!("COPY send failed: {}", e)))?;
            }
        }
        if !buf.is_empty() {
            sink.send(buf.split().freeze())
                .await
                .map_err(|e| PipelineError::bulk_load(table, format!("COPY send failed: {}", e)))?;
        }

        let copied = sink.finish().await?;
        debug!("COPY {} rows into {} from {}", copied, table, path.display());
        Ok(copied)
    }

    /// Stream `COPY (<query>) TO STDOUT` into a local file, returning the
    /// number of rows written.
    pub async fn copy_out_query(&self, query: &str, path: &Path) -> Result<u64> {
        let client = self.client().await?;

        let copy_stmt = format!("COPY ({}) TO STDOUT", query);
        let copy_stream = client.copy_out(&copy_stmt).await?;
        tokio::pin!(copy_stream);

        let file = tokio::fs::File::create(path).await?;
        let mut writer = BufWriter::new(file);

        let mut rows = 0u64;
        while let Some(chunk) = copy_stream.next().await {
            let chunk = chunk?;
            rows += bytecount_newlines(&chunk);
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;

        debug!("COPY out {} rows to {}", rows, path.display());
        Ok(rows)
    }
}

fn bytecount_newlines(chunk: &[u8]) -> u64 {
    chunk.iter().filter(|b| **b == b'\n').count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_doubles_embedded_quotes() {
        assert_eq!(quote_ident("user_audits"), "\"user_audits\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn counts_rows_by_newline() {
        assert_eq!(bytecount_newlines(b"1\n2\n3\n"), 3);
        assert_eq!(bytecount_newlines(b""), 0);
    }
}
