//! Tab-delimited staging files in PostgreSQL COPY text format.

use std::path::{Path, PathBuf};

use rand::Rng;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::Result;

/// A typed cell destined for a COPY text file.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    I16(i16),
    I64(i64),
    Uuid(uuid::Uuid),
    Text(String),
    Json(serde_json::Value),
    Timestamp(chrono::NaiveDateTime),
    Date(chrono::NaiveDate),
}

impl ColumnValue {
    /// Render the cell in COPY text format. NULL is `\N`, booleans are
    /// `t`/`f`, and text cells have backslash, tab, newline and carriage
    /// return escaped.
    pub fn to_copy_text(&self) -> String {
        match self {
            ColumnValue::Null => "\\N".to_string(),
            ColumnValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
            ColumnValue::I16(n) => n.to_string(),
            ColumnValue::I64(n) => n.to_string(),
            ColumnValue::Uuid(u) => u.to_string(),
            ColumnValue::Text(s) => escape_copy_text(s),
            ColumnValue::Json(v) => escape_copy_text(&v.to_string()),
            ColumnValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            ColumnValue::Date(d) => d.to_string(),
        }
    }
}

/// Escape special characters for COPY text format.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

/// Staged-file name for a seeding batch: unique per run so concurrent
/// unrelated runs cannot collide.
pub fn seed_file_name(table: &str) -> String {
    let unix = chrono::Utc::now().timestamp();
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}_{}_{:08x}.csv", table, unix, suffix)
}

/// Staged-file name for one migrated month.
pub fn month_file_name(table: &str, year: i32, month: u32) -> String {
    format!("{}_{}_{:02}.csv", table, year, month)
}

/// Delete leftover staged files for a table, matched by name prefix.
pub async fn clean_staged_files(dir: &Path, table: &str) -> Result<u32> {
    let prefix = format!("{}_", table);
    let mut removed = 0u32;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(&prefix) && (name.ends_with(".csv") || name.ends_with(".txt")) {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("Removed {} leftover staged files for {}", removed, table);
    }
    Ok(removed)
}

/// Streaming writer for one staged COPY file.
pub struct RowWriter {
    writer: BufWriter<tokio::fs::File>,
    path: PathBuf,
    rows: u64,
}

impl RowWriter {
    /// Create (truncating) the staged file.
    pub async fn create(path: PathBuf) -> Result<Self> {
        let file = tokio::fs::File::create(&path).await?;
        Ok(RowWriter {
            writer: BufWriter::new(file),
            path,
            rows: 0,
        })
    }

    /// Append one tab-delimited, newline-terminated row.
    pub async fn write_row(&mut self, row: &[ColumnValue]) -> Result<()> {
        let mut line = String::new();
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                line.push('\t');
            }
            line.push_str(&value.to_copy_text());
        }
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.rows += 1;
        Ok(())
    }

    /// Append one already-encoded line (used for raw COPY pass-through).
    pub async fn write_raw_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close, returning the path and row count.
    pub async fn finish(mut self) -> Result<(PathBuf, u64)> {
        self.writer.flush().await?;
        debug!("Staged {} rows at {}", self.rows, self.path.display());
        Ok((self.path, self.rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Inverse of `to_copy_text` for a single field, per the COPY text
    /// rules: `\N` is SQL NULL, everything else has its backslash escapes
    /// folded back.
    fn from_copy_text(field: &str) -> Option<String> {
        if field == "\\N" {
            return None;
        }
        let mut out = String::with_capacity(field.len());
        let mut chars = field.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('t') => out.push('\t'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        Some(out)
    }

    #[test]
    fn copy_text_round_trips_null_bool_and_control_chars() {
        let text = "col\tumn\nwith\rall\\four";
        let row = [
            ColumnValue::Null,
            ColumnValue::Bool(true),
            ColumnValue::Bool(false),
            ColumnValue::Text(text.to_string()),
        ];

        let line: Vec<String> = row.iter().map(|v| v.to_copy_text()).collect();
        let line = line.join("\t");
        // Escaping keeps the delimiter unambiguous: exactly three real tabs.
        assert_eq!(line.matches('\t').count(), 3);

        let decoded: Vec<Option<String>> = line.split('\t').map(from_copy_text).collect();
        assert_eq!(decoded[0], None);
        assert_eq!(decoded[1].as_deref(), Some("t"));
        assert_eq!(decoded[2].as_deref(), Some("f"));
        assert_eq!(decoded[3].as_deref(), Some(text));
    }

    #[test]
    fn null_and_booleans_use_copy_sentinels() {
        assert_eq!(ColumnValue::Null.to_copy_text(), "\\N");
        assert_eq!(ColumnValue::Bool(true).to_copy_text(), "t");
        assert_eq!(ColumnValue::Bool(false).to_copy_text(), "f");
    }

    #[test]
    fn text_control_characters_are_escaped() {
        let value = ColumnValue::Text("a\tb\nc\rd\\e".to_string());
        assert_eq!(value.to_copy_text(), "a\\tb\\nc\\rd\\\\e");
    }

    #[test]
    fn timestamps_use_second_precision() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(ColumnValue::Timestamp(ts).to_copy_text(), "2024-03-15 08:30:00");
    }

    #[test]
    fn json_cells_are_escaped_like_text() {
        let diffs = serde_json::json!({"old": null, "new": {"name": "A\tB"}});
        let text = ColumnValue::Json(diffs).to_copy_text();
        assert!(!text.contains('\t'));
        assert!(text.contains("\\t"));
    }

    #[test]
    fn month_file_names_are_zero_padded() {
        assert_eq!(month_file_name("user_audits", 2024, 3), "user_audits_2024_03.csv");
        assert_eq!(month_file_name("user_audits", 2024, 11), "user_audits_2024_11.csv");
    }

    #[test]
    fn seed_file_names_carry_table_prefix() {
        let name = seed_file_name("users");
        assert!(name.starts_with("users_"));
        assert!(name.ends_with(".csv"));
    }

    #[tokio::test]
    async fn row_writer_produces_copy_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users_test.csv");
        let mut writer = RowWriter::create(path.clone()).await.unwrap();
        writer
            .write_row(&[
                ColumnValue::Uuid(uuid::Uuid::nil()),
                ColumnValue::Text("Ada".to_string()),
                ColumnValue::Null,
                ColumnValue::Bool(true),
            ])
            .await
            .unwrap();
        let (written_path, rows) = writer.finish().await.unwrap();
        assert_eq!(rows, 1);

        let contents = std::fs::read_to_string(written_path).unwrap();
        assert_eq!(
            contents,
            "00000000-0000-0000-0000-000000000000\tAda\t\\N\tt\n"
        );
        assert_eq!(path.file_name().unwrap(), "users_test.csv");
    }

    #[tokio::test]
    async fn clean_removes_only_matching_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("user_audits_2024_01.csv"), "x").unwrap();
        std::fs::write(dir.path().join("user_audits_operational_ids.txt"), "x").unwrap();
        std::fs::write(dir.path().join("course_audits_2024_01.csv"), "x").unwrap();

        let removed = clean_staged_files(dir.path(), "user_audits").await.unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().join("course_audits_2024_01.csv").exists());
    }
}
