//! Post-migration integrity checking via ordered primary-key exports.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pool::{quote_ident, DbPool};

/// Outcome of a successful integrity check.
#[derive(Debug)]
pub struct ValidationReport {
    pub table: String,
    pub row_count: i64,
    pub digest: String,
    pub source_file: PathBuf,
    pub target_file: PathBuf,
}

impl ValidationReport {
    /// Remove the ID export files. Called only after the check passed;
    /// on mismatch both files stay behind for inspection.
    pub async fn remove_artifacts(&self) -> Result<()> {
        tokio::fs::remove_file(&self.source_file).await?;
        tokio::fs::remove_file(&self.target_file).await?;
        Ok(())
    }
}

/// SHA-256 of a file's contents, streamed in chunks.
async fn file_digest(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Export the ordered ID list of `table` from both databases and compare
/// the file digests. Equal ordered exports mean the same ID multiset made
/// it across.
pub async fn validate_table(
    operational: &DbPool,
    audit: &DbPool,
    table: &str,
    staging_dir: &Path,
) -> Result<ValidationReport> {
    let source_file = staging_dir.join(format!("{}_operational_ids.txt", table));
    let target_file = staging_dir.join(format!("{}_audit_ids.txt", table));

    let query = format!("SELECT id FROM {} ORDER BY id", quote_ident(table));
    let source_count = operational.copy_out_query(&query, &source_file).await? as i64;
    let target_count = audit.copy_out_query(&query, &target_file).await? as i64;

    let source_digest = file_digest(&source_file).await?;
    let target_digest = file_digest(&target_file).await?;

    if source_digest != target_digest {
        return Err(PipelineError::IntegrityMismatch {
            table: table.to_string(),
            source_count,
            target_count,
            source_file,
            target_file,
        });
    }

    info!(
        "Integrity check passed for {}: {} rows, sha256 {}",
        table, source_count, source_digest
    );
    Ok(ValidationReport {
        table: table.to_string(),
        row_count: source_count,
        digest: source_digest,
        source_file,
        target_file,
    })
}
