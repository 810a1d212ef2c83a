use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{IN_MEMORY, ReportArchive, ReportRecord, ReportSummary, is_ephemeral, preview};
use crate::crew::{ContextLog, CrewOutput};

const PREVIEW_CHARS: usize = 60;

/// SQLite-backed report archive.
pub struct SqliteArchive {
    conn: Mutex<Connection>,
}

impl SqliteArchive {
    /// Open or create the archive. Parent directories are created as needed.
    pub fn open(path: &str) -> Result<Self> {
        if !is_ephemeral(path)
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path).context("failed to open report archive")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                source TEXT NOT NULL,
                report TEXT NOT NULL,
                log TEXT NOT NULL,
                tokens INTEGER NOT NULL DEFAULT 0
            )",
        )
        .context("failed to create reports table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(IN_MEMORY)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("report archive lock poisoned"))
    }
}

#[async_trait]
impl ReportArchive for SqliteArchive {
    async fn save(&self, source: &str, output: &CrewOutput) -> Result<i64> {
        let log = serde_json::to_string(&output.log)?;
        let tokens = i64::try_from(output.usage.total()).unwrap_or(i64::MAX);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO reports (source, report, log, tokens) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![source, output.raw, log, tokens],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn list(&self, limit: usize) -> Result<Vec<ReportSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, source, report FROM reports ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map([limit], |row| {
                let report: String = row.get(3)?;
                Ok(ReportSummary {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    source: row.get(2)?,
                    preview: preview(&report, PREVIEW_CHARS),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<ReportRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, created_at, source, report, log, tokens FROM reports WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, created_at, source, report, log, tokens)) = row else {
            return Ok(None);
        };
        let log: ContextLog =
            serde_json::from_str(&log).with_context(|| format!("corrupt stage log in report {}", id))?;
        Ok(Some(ReportRecord {
            id,
            created_at,
            source,
            report,
            log,
            tokens: u64::try_from(tokens).unwrap_or(0),
        }))
    }
}
