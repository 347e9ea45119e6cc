//! Persistent record store for reading sessions and quiz results.
//!
//! The tracker only talks to [`SessionStore`]; `sqlite` is the on-disk
//! backend, `memory` backs tests, `worker` moves any backend onto its own
//! thread so writes never block the reading loop.

pub mod memory;
pub mod sqlite;
pub mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use worker::StoreWorker;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("could not create store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("no reading session with id {0}")]
    NotFound(SessionId),

    #[error("store worker has shut down")]
    WorkerGone,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Retrying cannot help: the row is gone or the worker has stopped
    pub fn is_permanent(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::WorkerGone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One attempt at reading one piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSession {
    pub id: SessionId,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub words_read: u64,
    pub total_words: u64,
    pub avg_wpm: u32,
    pub text_content: String,
    pub completed: bool,
}

/// Fields supplied when a session row is created; the store assigns the id
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub total_words: u64,
    pub text_content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub id: i64,
    pub session_id: SessionId,
    pub user_id: String,
    pub score: u32,
    pub max_score: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewQuizResult {
    pub session_id: SessionId,
    pub user_id: String,
    pub score: u32,
    pub max_score: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionFilter {
    #[default]
    All,
    Completed,
    Owner(String),
}

impl SessionFilter {
    pub fn matches(&self, session: &ReadingSession) -> bool {
        match self {
            SessionFilter::All => true,
            SessionFilter::Completed => session.completed,
            SessionFilter::Owner(user) => &session.user_id == user,
        }
    }
}

/// Record store over the two record kinds. No cross-kind transactions.
pub trait SessionStore {
    fn insert_session(&mut self, session: &NewSession) -> Result<ReadingSession>;

    /// Raise `words_read` for a session. A value that is not greater than the
    /// stored one is discarded; returns whether the row changed.
    fn update_progress(&mut self, id: SessionId, words_read: u64) -> Result<bool>;

    /// Mark a session completed with its realized pace
    fn close_session(&mut self, id: SessionId, ended_at: DateTime<Utc>, avg_wpm: u32)
        -> Result<()>;

    /// Remove a session and the quiz results that point at it
    fn delete_session(&mut self, id: SessionId) -> Result<()>;

    fn insert_quiz_result(&mut self, result: &NewQuizResult) -> Result<QuizResult>;

    /// Sessions matching `filter`, oldest first
    fn sessions(&mut self, filter: &SessionFilter) -> Result<Vec<ReadingSession>>;

    fn quiz_results(&mut self) -> Result<Vec<QuizResult>>;
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn insert_session(&mut self, session: &NewSession) -> Result<ReadingSession> {
        (**self).insert_session(session)
    }

    fn update_progress(&mut self, id: SessionId, words_read: u64) -> Result<bool> {
        (**self).update_progress(id, words_read)
    }

    fn close_session(
        &mut self,
        id: SessionId,
        ended_at: DateTime<Utc>,
        avg_wpm: u32,
    ) -> Result<()> {
        (**self).close_session(id, ended_at, avg_wpm)
    }

    fn delete_session(&mut self, id: SessionId) -> Result<()> {
        (**self).delete_session(id)
    }

    fn insert_quiz_result(&mut self, result: &NewQuizResult) -> Result<QuizResult> {
        (**self).insert_quiz_result(result)
    }

    fn sessions(&mut self, filter: &SessionFilter) -> Result<Vec<ReadingSession>> {
        (**self).sessions(filter)
    }

    fn quiz_results(&mut self) -> Result<Vec<QuizResult>> {
        (**self).quiz_results()
    }
}

/// Write session history as CSV, one row per session
pub fn export_csv<W: std::io::Write>(sessions: &[ReadingSession], out: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "id",
        "user_id",
        "started_at",
        "ended_at",
        "words_read",
        "total_words",
        "avg_wpm",
        "completed",
    ])?;
    for s in sessions {
        writer.write_record([
            s.id.to_string(),
            s.user_id.clone(),
            s.started_at.to_rfc3339(),
            s.ended_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            s.words_read.to_string(),
            s.total_words.to_string(),
            s.avg_wpm.to_string(),
            s.completed.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
