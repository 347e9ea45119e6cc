use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use super::{
    NewQuizResult, NewSession, QuizResult, ReadingSession, Result, SessionFilter, SessionId,
    SessionStore, StoreError,
};
use crate::app_dirs::AppDirs;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS reading_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        started_at TEXT NOT NULL,
        ended_at TEXT,
        words_read INTEGER NOT NULL DEFAULT 0,
        total_words INTEGER NOT NULL,
        avg_wpm INTEGER NOT NULL DEFAULT 0,
        text_content TEXT NOT NULL,
        completed BOOLEAN NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS quiz_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL REFERENCES reading_sessions(id),
        user_id TEXT NOT NULL,
        score INTEGER NOT NULL,
        max_score INTEGER NOT NULL,
        completed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_reading_sessions_user ON reading_sessions(user_id);
    CREATE INDEX IF NOT EXISTS idx_quiz_results_session ON quiz_results(session_id);
"#;

const SESSION_COLUMNS: &str = "id, user_id, started_at, ended_at, words_read, total_words, \
                               avg_wpm, text_content, completed";

/// SQLite-backed session store
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store at the default state location
    pub fn open_default() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("speedread_sessions.db"));
        Self::open(path)
    }

    /// Open (creating if needed) the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        log::debug!("opening session store at {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn session(&self, id: SessionId) -> Result<ReadingSession> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM reading_sessions WHERE id = ?1");
        self.conn
            .query_row(&sql, [id.0], session_from_row)
            .optional()?
            .ok_or(StoreError::NotFound(id))
    }
}

impl SessionStore for SqliteStore {
    fn insert_session(&mut self, session: &NewSession) -> Result<ReadingSession> {
        self.conn.execute(
            r#"
            INSERT INTO reading_sessions
            (user_id, started_at, words_read, total_words, avg_wpm, text_content, completed)
            VALUES (?1, ?2, 0, ?3, 0, ?4, 0)
            "#,
            params![
                session.user_id,
                session.started_at.to_rfc3339(),
                session.total_words,
                session.text_content,
            ],
        )?;
        let id = SessionId(self.conn.last_insert_rowid());
        self.session(id)
    }

    fn update_progress(&mut self, id: SessionId, words_read: u64) -> Result<bool> {
        // the guard keeps a late write from regressing the stored counter
        let changed = self.conn.execute(
            "UPDATE reading_sessions SET words_read = ?1 WHERE id = ?2 AND words_read < ?1",
            params![words_read, id.0],
        )?;
        if changed == 0 {
            // distinguish "stale write" from "no such row"
            self.session(id)?;
        }
        Ok(changed > 0)
    }

    fn close_session(
        &mut self,
        id: SessionId,
        ended_at: DateTime<Utc>,
        avg_wpm: u32,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE reading_sessions SET ended_at = ?1, completed = 1, avg_wpm = ?2 WHERE id = ?3",
            params![ended_at.to_rfc3339(), avg_wpm, id.0],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn delete_session(&mut self, id: SessionId) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM quiz_results WHERE session_id = ?1", [id.0])?;
        let removed = tx.execute("DELETE FROM reading_sessions WHERE id = ?1", [id.0])?;
        if removed == 0 {
            return Err(StoreError::NotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_quiz_result(&mut self, result: &NewQuizResult) -> Result<QuizResult> {
        self.conn.execute(
            r#"
            INSERT INTO quiz_results (session_id, user_id, score, max_score, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                result.session_id.0,
                result.user_id,
                result.score,
                result.max_score,
                result.completed_at.to_rfc3339(),
            ],
        )?;
        Ok(QuizResult {
            id: self.conn.last_insert_rowid(),
            session_id: result.session_id,
            user_id: result.user_id.clone(),
            score: result.score,
            max_score: result.max_score,
            completed_at: result.completed_at,
        })
    }

    fn sessions(&mut self, filter: &SessionFilter) -> Result<Vec<ReadingSession>> {
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM reading_sessions");
        let mut args: Vec<String> = Vec::new();
        match filter {
            SessionFilter::All => {}
            SessionFilter::Completed => sql.push_str(" WHERE completed = 1"),
            SessionFilter::Owner(user) => {
                sql.push_str(" WHERE user_id = ?1");
                args.push(user.clone());
            }
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), session_from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    fn quiz_results(&mut self) -> Result<Vec<QuizResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, user_id, score, max_score, completed_at FROM quiz_results ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(QuizResult {
                id: row.get(0)?,
                session_id: SessionId(row.get(1)?),
                user_id: row.get(2)?,
                score: row.get(3)?,
                max_score: row.get(4)?,
                completed_at: parse_timestamp(&row.get::<_, String>(5)?, 5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ReadingSession> {
    let ended_at: Option<String> = row.get(3)?;
    Ok(ReadingSession {
        id: SessionId(row.get(0)?),
        user_id: row.get(1)?,
        started_at: parse_timestamp(&row.get::<_, String>(2)?, 2)?,
        ended_at: ended_at
            .as_deref()
            .map(|s| parse_timestamp(s, 3))
            .transpose()?,
        words_read: row.get(4)?,
        total_words: row.get(5)?,
        avg_wpm: row.get(6)?,
        text_content: row.get(7)?,
        completed: row.get(8)?,
    })
}

fn parse_timestamp(s: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(column, "timestamp".to_string(), Type::Text)
        })
}
