use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::model::{ProcessedFile, Status, ToolKind};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // The CLI thread and the worker each hold their own connection.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS processed_files (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                original_size INTEGER NOT NULL,
                processed_size INTEGER NOT NULL,
                compression_ratio REAL NOT NULL,
                tool TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                output_path TEXT,
                encrypted_key TEXT,
                iv TEXT
            )",
            [],
        )?;

        Ok(Self { conn })
    }

    pub fn insert(&self, file: &ProcessedFile) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO processed_files
                (id, file_name, original_size, processed_size, compression_ratio,
                 tool, status, created_at, output_path, encrypted_key, iv)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                file.id,
                file.file_name,
                file.original_size,
                file.processed_size,
                file.compression_ratio,
                file.tool.as_str(),
                file.status.as_str(),
                file.created_at,
                file.output_path,
                file.encrypted_key,
                file.iv,
            ],
        )?;
        Ok(())
    }

    /// Flips a `processing` row to `completed`, recording the real output
    /// size and the resulting size reduction.
    pub fn mark_completed(
        &self,
        id: &str,
        processed_size: u64,
        output_path: &str,
    ) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE processed_files
             SET status = 'completed',
                 processed_size = ?2,
                 output_path = ?3,
                 compression_ratio = CASE
                     WHEN original_size > 0
                     THEN (original_size - ?2) * 100.0 / original_size
                     ELSE 0
                 END
             WHERE id = ?1",
            params![id, processed_size, output_path],
        )?;
        Ok(())
    }

    pub fn mark_failed(&self, id: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE processed_files SET status = 'failed' WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> rusqlite::Result<Option<ProcessedFile>> {
        self.conn
            .query_row(
                "SELECT id, file_name, original_size, processed_size, compression_ratio,
                        tool, status, created_at, output_path, encrypted_key, iv
                 FROM processed_files WHERE id = ?1",
                params![id],
                row_to_file,
            )
            .optional()
    }

    /// All entries, newest first.
    pub fn list(&self) -> rusqlite::Result<Vec<ProcessedFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_name, original_size, processed_size, compression_ratio,
                    tool, status, created_at, output_path, encrypted_key, iv
             FROM processed_files ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], row_to_file)?;
        rows.collect()
    }

    pub fn list_by_tool(&self, tool: ToolKind) -> rusqlite::Result<Vec<ProcessedFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_name, original_size, processed_size, compression_ratio,
                    tool, status, created_at, output_path, encrypted_key, iv
             FROM processed_files WHERE tool = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![tool.as_str()], row_to_file)?;
        rows.collect()
    }

    /// Returns true when a row was actually removed.
    pub fn delete(&self, id: &str) -> rusqlite::Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM processed_files WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn clear(&self) -> rusqlite::Result<usize> {
        self.conn.execute("DELETE FROM processed_files", [])
    }
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<ProcessedFile> {
    let tool_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let tool = ToolKind::parse(&tool_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown tool kind {tool_str:?}").into(),
        )
    })?;
    let status = Status::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown status {status_str:?}").into(),
        )
    })?;

    Ok(ProcessedFile {
        id: row.get(0)?,
        file_name: row.get(1)?,
        original_size: row.get(2)?,
        processed_size: row.get(3)?,
        compression_ratio: row.get(4)?,
        tool,
        status,
        created_at: row.get(7)?,
        output_path: row.get(8)?,
        encrypted_key: row.get(9)?,
        iv: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("history.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn insert_and_fetch_round_trip() {
        let (_dir, db) = open_test_db();
        let mut record = ProcessedFile::new("notes.txt", 100, ToolKind::Compress);
        record.encrypted_key = Some("a2V5".to_string());
        record.iv = Some("aXY=".to_string());
        db.insert(&record).unwrap();

        let fetched = db.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched.file_name, "notes.txt");
        assert_eq!(fetched.original_size, 100);
        assert_eq!(fetched.tool, ToolKind::Compress);
        assert_eq!(fetched.status, Status::Processing);
        assert_eq!(fetched.encrypted_key.as_deref(), Some("a2V5"));
        assert_eq!(fetched.iv.as_deref(), Some("aXY="));
    }

    #[test]
    fn missing_id_is_none() {
        let (_dir, db) = open_test_db();
        assert!(db.get("nope").unwrap().is_none());
    }

    #[test]
    fn completion_updates_size_ratio_and_output() {
        let (_dir, db) = open_test_db();
        let record = ProcessedFile::new("big.bin", 200, ToolKind::Merge);
        db.insert(&record).unwrap();

        db.mark_completed(&record.id, 150, "/tmp/out.pdf").unwrap();
        let fetched = db.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched.status, Status::Completed);
        assert_eq!(fetched.processed_size, 150);
        assert_eq!(fetched.output_path.as_deref(), Some("/tmp/out.pdf"));
        assert!((fetched.compression_ratio - 25.0).abs() < 1e-9);
    }

    #[test]
    fn failure_keeps_sizes_untouched() {
        let (_dir, db) = open_test_db();
        let record = ProcessedFile::new("x", 10, ToolKind::Decompress);
        db.insert(&record).unwrap();

        db.mark_failed(&record.id).unwrap();
        let fetched = db.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched.status, Status::Failed);
        assert_eq!(fetched.processed_size, 0);
    }

    #[test]
    fn list_is_newest_first() {
        let (_dir, db) = open_test_db();
        let mut first = ProcessedFile::new("first", 1, ToolKind::Split);
        first.created_at = 1000;
        let mut second = ProcessedFile::new("second", 1, ToolKind::Split);
        second.created_at = 2000;
        db.insert(&first).unwrap();
        db.insert(&second).unwrap();

        let all = db.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].file_name, "second");
        assert_eq!(all[1].file_name, "first");
    }

    #[test]
    fn list_by_tool_filters() {
        let (_dir, db) = open_test_db();
        db.insert(&ProcessedFile::new("a", 1, ToolKind::Rotate)).unwrap();
        db.insert(&ProcessedFile::new("b", 1, ToolKind::Merge)).unwrap();
        db.insert(&ProcessedFile::new("c", 1, ToolKind::Rotate)).unwrap();

        let rotated = db.list_by_tool(ToolKind::Rotate).unwrap();
        assert_eq!(rotated.len(), 2);
        assert!(rotated.iter().all(|f| f.tool == ToolKind::Rotate));
    }

    #[test]
    fn delete_and_clear() {
        let (_dir, db) = open_test_db();
        let record = ProcessedFile::new("gone", 1, ToolKind::Extract);
        db.insert(&record).unwrap();

        assert!(db.delete(&record.id).unwrap());
        assert!(!db.delete(&record.id).unwrap());

        db.insert(&ProcessedFile::new("one", 1, ToolKind::Compress)).unwrap();
        db.insert(&ProcessedFile::new("two", 1, ToolKind::Compress)).unwrap();
        assert_eq!(db.clear().unwrap(), 2);
        assert!(db.list().unwrap().is_empty());
    }
}
