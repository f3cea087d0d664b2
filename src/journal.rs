// Append-only trade journal backed by SQLite

use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::error::TradingResult;

/// Persistent record of every decision the bot makes: signals,
/// rejections, fills, trailing transitions, kill-switch actions.
/// Rows are never updated or deleted.
pub struct Journal {
    conn: Connection,
}

impl Journal {
    pub fn open<P: AsRef<Path>>(path: P) -> TradingResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory journal for tests and dry runs.
    pub fn in_memory() -> TradingResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> TradingResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS journal (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_journal_kind ON journal(kind);",
        )?;
        info!("📒 journal ready");
        Ok(Self { conn })
    }

    /// Append one event. `kind` is a short tag for querying; the
    /// payload is the full JSON record.
    pub fn append<T: Serialize>(&self, kind: &str, payload: &T) -> TradingResult<()> {
        let ts = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string(payload)?;
        self.conn.execute(
            "INSERT INTO journal (ts, kind, payload) VALUES (?1, ?2, ?3)",
            params![ts, kind, json],
        )?;
        Ok(())
    }

    pub fn count(&self, kind: &str) -> TradingResult<u64> {
        let n: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM journal WHERE kind = ?1",
            params![kind],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Most recent payloads of a kind, newest first.
    pub fn recent(&self, kind: &str, limit: usize) -> TradingResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM journal WHERE kind = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![kind, limit as i64], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_and_count() {
        let j = Journal::in_memory().unwrap();
        j.append("signal", &json!({"strategy": "swing"})).unwrap();
        j.append("signal", &json!({"strategy": "scalping"})).unwrap();
        j.append("fill", &json!({"price": 100.0})).unwrap();
        assert_eq!(j.count("signal").unwrap(), 2);
        assert_eq!(j.count("fill").unwrap(), 1);
        assert_eq!(j.count("missing").unwrap(), 0);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let j = Journal::in_memory().unwrap();
        for i in 0..5 {
            j.append("tick", &json!({ "i": i })).unwrap();
        }
        let recent = j.recent("tick", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].contains("4"));
    }

    #[test]
    fn test_file_backed_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        {
            let j = Journal::open(&path).unwrap();
            j.append("signal", &json!({"strategy": "swing"})).unwrap();
        }
        // Reopen and confirm persistence
        let j = Journal::open(&path).unwrap();
        assert_eq!(j.count("signal").unwrap(), 1);
    }
}
