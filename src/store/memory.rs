use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    NewQuizResult, NewSession, QuizResult, ReadingSession, Result, SessionFilter, SessionId,
    SessionStore, StoreError,
};

/// Which operations should fail, for exercising error paths
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub insert: bool,
    pub progress: bool,
    pub close: bool,
    pub delete: bool,
    pub reads: bool,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: Vec<ReadingSession>,
    quiz_results: Vec<QuizResult>,
    faults: Faults,
    next_id: i64,
}

/// In-process store. Clones share the same records, so a test can keep a
/// handle while the tracker owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Snapshot of every session row
    pub fn all_sessions(&self) -> Vec<ReadingSession> {
        self.lock().sessions.clone()
    }

    pub fn all_quiz_results(&self) -> Vec<QuizResult> {
        self.lock().quiz_results.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panicking test thread must not take the other handles down with it
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn fault(op: &str) -> StoreError {
    StoreError::Unavailable(format!("{op} failed (injected)"))
}

impl SessionStore for MemoryStore {
    fn insert_session(&mut self, session: &NewSession) -> Result<ReadingSession> {
        let mut inner = self.lock();
        if inner.faults.insert {
            return Err(fault("insert"));
        }
        inner.next_id += 1;
        let row = ReadingSession {
            id: SessionId(inner.next_id),
            user_id: session.user_id.clone(),
            started_at: session.started_at,
            ended_at: None,
            words_read: 0,
            total_words: session.total_words,
            avg_wpm: 0,
            text_content: session.text_content.clone(),
            completed: false,
        };
        inner.sessions.push(row.clone());
        Ok(row)
    }

    fn update_progress(&mut self, id: SessionId, words_read: u64) -> Result<bool> {
        let mut inner = self.lock();
        if inner.faults.progress {
            return Err(fault("progress update"));
        }
        let row = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if words_read > row.words_read {
            row.words_read = words_read;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn close_session(
        &mut self,
        id: SessionId,
        ended_at: DateTime<Utc>,
        avg_wpm: u32,
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.faults.close {
            return Err(fault("close"));
        }
        let row = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound(id))?;
        row.ended_at = Some(ended_at);
        row.completed = true;
        row.avg_wpm = avg_wpm;
        Ok(())
    }

    fn delete_session(&mut self, id: SessionId) -> Result<()> {
        let mut inner = self.lock();
        if inner.faults.delete {
            return Err(fault("delete"));
        }
        let before = inner.sessions.len();
        inner.sessions.retain(|s| s.id != id);
        if inner.sessions.len() == before {
            return Err(StoreError::NotFound(id));
        }
        inner.quiz_results.retain(|q| q.session_id != id);
        Ok(())
    }

    fn insert_quiz_result(&mut self, result: &NewQuizResult) -> Result<QuizResult> {
        let mut inner = self.lock();
        if inner.faults.insert {
            return Err(fault("insert"));
        }
        let row = QuizResult {
            id: inner.quiz_results.last().map_or(1, |q| q.id + 1),
            session_id: result.session_id,
            user_id: result.user_id.clone(),
            score: result.score,
            max_score: result.max_score,
            completed_at: result.completed_at,
        };
        inner.quiz_results.push(row.clone());
        Ok(row)
    }

    fn sessions(&mut self, filter: &SessionFilter) -> Result<Vec<ReadingSession>> {
        let inner = self.lock();
        if inner.faults.reads {
            return Err(fault("read"));
        }
        Ok(inner
            .sessions
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    fn quiz_results(&mut self) -> Result<Vec<QuizResult>> {
        let inner = self.lock();
        if inner.faults.reads {
            return Err(fault("read"));
        }
        Ok(inner.quiz_results.clone())
    }
}
