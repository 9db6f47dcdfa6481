//! Workspace persistence: named analysis sessions saved in SQLite so the
//! same repositories never need re-cloning or re-indexing twice.
//!
//! Schema:
//!   workspaces
//!     name        TEXT PRIMARY KEY   -- user-defined workspace label
//!     repos_json  TEXT               -- JSON array of repo sources
//!     created_at  TEXT               -- ISO 8601 timestamp (UTC)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A saved analysis session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    /// Repo URLs or local paths that were indexed.
    pub repos: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub struct WorkspaceStore {
    conn: Mutex<Connection>,
}

impl WorkspaceStore {
    /// Open (and initialise) the database, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open workspace db at {}", path.display()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS workspaces (
                name        TEXT PRIMARY KEY,
                repos_json  TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create or overwrite a named workspace record.
    pub fn save(&self, name: &str, repos: &[String]) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO workspaces (name, repos_json, created_at) VALUES (?1, ?2, ?3)",
            (
                name,
                serde_json::to_string(repos)?,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    /// All saved workspaces, newest first.
    pub fn list(&self) -> Result<Vec<Workspace>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, repos_json, created_at FROM workspaces ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_workspace)?;

        let mut workspaces = Vec::new();
        for row in rows {
            workspaces.push(row?);
        }
        Ok(workspaces)
    }

    /// A single workspace by name, or None if not found.
    pub fn load(&self, name: &str) -> Result<Option<Workspace>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, repos_json, created_at FROM workspaces WHERE name = ?1",
        )?;
        let mut rows = stmt.query_map([name], row_to_workspace)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Delete a workspace record. Returns true if a row was deleted.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM workspaces WHERE name = ?1", [name])?;
        Ok(deleted > 0)
    }
}

fn row_to_workspace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    let name: String = row.get(0)?;
    let repos_json: String = row.get(1)?;
    let created_at: String = row.get(2)?;

    let repos = serde_json::from_str(&repos_json).unwrap_or_default();
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default();

    Ok(Workspace {
        name,
        repos,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, WorkspaceStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::open(&dir.path().join("workspaces.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (_dir, store) = store();
        let repos = vec!["https://github.com/acme/widget".to_string()];
        store.save("widget-review", &repos).unwrap();

        let loaded = store.load("widget-review").unwrap().unwrap();
        assert_eq!(loaded.name, "widget-review");
        assert_eq!(loaded.repos, repos);
    }

    #[test]
    fn test_save_overwrites_existing_name() {
        let (_dir, store) = store();
        store.save("ws", &["a".to_string()]).unwrap();
        store.save("ws", &["b".to_string()]).unwrap();

        let loaded = store.load("ws").unwrap().unwrap();
        assert_eq!(loaded.repos, vec!["b"]);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let (_dir, store) = store();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_delete_reports_whether_row_existed() {
        let (_dir, store) = store();
        store.save("ws", &[]).unwrap();
        assert!(store.delete("ws").unwrap());
        assert!(!store.delete("ws").unwrap());
    }

    #[test]
    fn test_list_orders_newest_first() {
        let (_dir, store) = store();
        store.save("older", &[]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.save("newer", &[]).unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["newer", "older"]);
    }
}
