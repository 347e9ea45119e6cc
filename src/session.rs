use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::stats::ReadingStats;
use crate::store::{
    NewQuizResult, NewSession, QuizResult, ReadingSession, SessionFilter, SessionId, SessionStore,
    StoreError,
};
use crate::text::{preview, word_count};
use crate::util::round_half_up;

/// Upper bound for a realized pace; a session closed almost as soon as it
/// opened would otherwise divide by (nearly) zero.
pub const MAX_REALIZED_WPM: u32 = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not start reading session: {0}")]
    Start(#[source] StoreError),

    #[error("could not close reading session {id}: {source}")]
    CloseFailed {
        id: SessionId,
        #[source]
        source: StoreError,
    },
}

/// Local bookkeeping for the session currently being read
#[derive(Debug, Clone)]
struct OpenSession {
    record: ReadingSession,
    started: Instant,
    words_read: u64,
    quizzed: bool,
    /// Set once a close has been attempted; retries reuse these values
    pending_close: Option<(DateTime<Utc>, u32)>,
}

/// Owns the open/closed lifecycle of reading sessions for one reader.
///
/// At most one session is current. Progress writes are best effort and
/// monotonic; a close that fails transiently keeps the session current so
/// `end_session` can be retried.
#[derive(Debug)]
pub struct SessionTracker<S: SessionStore> {
    store: S,
    user_id: String,
    current: Option<OpenSession>,
}

impl<S: SessionStore> SessionTracker<S> {
    pub fn new(store: S, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            current: None,
        }
    }

    /// Open a new session for `text`. A session that is still open is closed
    /// first; if that close fails and can be retried, the new session is not
    /// started.
    pub fn start_session(&mut self, text: &str) -> Result<SessionId, SessionError> {
        if self.current.is_some() {
            if let Err(e) = self.end_session() {
                if self.current.is_some() {
                    return Err(e);
                }
                log::warn!("previous session dropped: {e}");
            }
        }

        let total_words = word_count(text) as u64;
        log::info!(
            "starting session: {total_words} words, {:?}",
            preview(text, 50)
        );

        let record = self
            .store
            .insert_session(&NewSession {
                user_id: self.user_id.clone(),
                started_at: Utc::now(),
                total_words,
                text_content: text.to_string(),
            })
            .map_err(|e| {
                log::error!("error starting session: {e}");
                SessionError::Start(e)
            })?;

        let id = record.id;
        self.current = Some(OpenSession {
            record,
            started: Instant::now(),
            words_read: 0,
            quizzed: false,
            pending_close: None,
        });
        Ok(id)
    }

    /// Record that `words_read` words have been shown. Values that do not
    /// exceed the last recorded count are ignored.
    pub fn update_progress(&mut self, words_read: u64, current_rate_wpm: u32) {
        let Some(open) = self.current.as_mut() else {
            log::debug!("no active session to update progress");
            return;
        };
        if open.pending_close.is_some() || words_read <= open.words_read {
            return;
        }
        open.words_read = words_read;

        let id = open.record.id;
        match self.store.update_progress(id, words_read) {
            Ok(_) => log::trace!("session {id}: {words_read} words at {current_rate_wpm} wpm"),
            Err(e) => log::error!("error updating progress for session {id}: {e}"),
        }
    }

    /// Close the current session with its realized pace. Returns the pace,
    /// or `None` when no session was open.
    pub fn end_session(&mut self) -> Result<Option<u32>, SessionError> {
        self.close_at(Instant::now(), Utc::now())
    }

    fn close_at(
        &mut self,
        now: Instant,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<u32>, SessionError> {
        let Some(open) = self.current.as_mut() else {
            log::debug!("no active session to end");
            return Ok(None);
        };

        let elapsed = now.saturating_duration_since(open.started);
        let words_read = open.words_read;
        let (ended_at, avg_wpm) = *open
            .pending_close
            .get_or_insert_with(|| (ended_at, realized_wpm(words_read, elapsed)));
        let id = open.record.id;

        match self.store.close_session(id, ended_at, avg_wpm) {
            Ok(()) => {
                log::info!(
                    "session {id} completed in {:.2} minutes, actual wpm: {avg_wpm}",
                    elapsed.as_secs_f64() / 60.0
                );
                self.current = None;
                Ok(Some(avg_wpm))
            }
            Err(source) if source.is_permanent() => {
                log::error!("error ending session {id}, giving up on it: {source}");
                self.current = None;
                Err(SessionError::CloseFailed { id, source })
            }
            Err(source) => {
                log::error!("error ending session {id}, will retry on next close: {source}");
                Err(SessionError::CloseFailed { id, source })
            }
        }
    }

    /// Delete the current session if nothing was read in it and it has no
    /// quiz result. Returns whether it was removed; when it was not, the
    /// session is still current.
    pub fn discard_unread(&mut self) -> bool {
        let Some(open) = self.current.as_ref() else {
            return false;
        };
        if open.words_read > 0 || open.quizzed || open.pending_close.is_some() {
            return false;
        }

        let id = open.record.id;
        match self.store.delete_session(id) {
            Ok(()) | Err(StoreError::NotFound(_)) => {
                log::info!("session {id} discarded, nothing was read");
                self.current = None;
                true
            }
            Err(e) => {
                log::error!("error discarding session {id}: {e}");
                false
            }
        }
    }

    /// Attach a comprehension score to the current session
    pub fn save_quiz_result(&mut self, score: u32, max_score: u32) -> Option<QuizResult> {
        let open = self.current.as_mut()?;
        let id = open.record.id;
        let result = NewQuizResult {
            session_id: id,
            user_id: self.user_id.clone(),
            score,
            max_score,
            completed_at: Utc::now(),
        };
        let saved = self
            .store
            .insert_quiz_result(&result)
            .map_err(|e| log::error!("error saving quiz result for session {id}: {e}"))
            .ok();
        if saved.is_some() {
            open.quizzed = true;
        }
        saved
    }

    /// Aggregate statistics. Store failures are logged and yield all zeroes.
    pub fn get_stats(&mut self) -> ReadingStats {
        let records = match self.store.sessions(&SessionFilter::All) {
            Ok(sessions) => self.store.quiz_results().map(|quiz| (sessions, quiz)),
            Err(e) => Err(e),
        };
        match records {
            Ok((sessions, quiz_results)) => {
                let stats = ReadingStats::from_records(&sessions, &quiz_results);
                log::debug!("calculated stats: {stats:?}");
                stats
            }
            Err(e) => {
                log::error!("error fetching stats: {e}");
                ReadingStats::default()
            }
        }
    }

    pub fn sessions(&mut self, filter: &SessionFilter) -> crate::store::Result<Vec<ReadingSession>> {
        self.store.sessions(filter)
    }

    pub fn current_session(&self) -> Option<&ReadingSession> {
        self.current.as_ref().map(|open| &open.record)
    }

    /// Words recorded locally for the current session
    pub fn words_tracked(&self) -> u64 {
        self.current.as_ref().map_or(0, |open| open.words_read)
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// A close was attempted and failed; the session is waiting for a retry
    pub fn is_closing(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|open| open.pending_close.is_some())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

/// Words per minute actually achieved, rounded and clamped to
/// `0..=MAX_REALIZED_WPM`. Zero words is always zero.
pub fn realized_wpm(words: u64, elapsed: Duration) -> u32 {
    if words == 0 {
        return 0;
    }
    let minutes = elapsed.as_secs_f64() / 60.0;
    let wpm = words as f64 / minutes;
    if !wpm.is_finite() || wpm >= f64::from(MAX_REALIZED_WPM) {
        MAX_REALIZED_WPM
    } else {
        round_half_up(wpm) as u32
    }
}
