use chrono::{DateTime, Utc};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use super::{
    NewQuizResult, NewSession, QuizResult, ReadingSession, Result, SessionFilter, SessionId,
    SessionStore, StoreError,
};

type Reply<T> = Sender<Result<T>>;

enum Command {
    Insert(NewSession, Reply<ReadingSession>),
    Progress(SessionId, u64),
    Close(SessionId, DateTime<Utc>, u32, Reply<()>),
    Delete(SessionId, Reply<()>),
    InsertQuiz(NewQuizResult, Reply<QuizResult>),
    Sessions(SessionFilter, Reply<Vec<ReadingSession>>),
    QuizResults(Reply<Vec<QuizResult>>),
    Flush(Sender<()>),
}

/// Runs a store on its own thread.
///
/// Commands are applied strictly in the order they were sent. Progress writes
/// are fire-and-forget so the caller never waits on disk; everything else
/// waits for its reply.
pub struct StoreWorker {
    tx: Option<Sender<Command>>,
    handle: Option<JoinHandle<()>>,
}

impl StoreWorker {
    pub fn spawn<S: SessionStore + Send + 'static>(store: S) -> Self {
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("speedread-store".into())
            .spawn(move || run(store, rx))
            .map_err(|e| log::error!("could not start store thread: {e}"))
            .ok();
        Self {
            tx: handle.as_ref().map(|_| tx),
            handle,
        }
    }

    /// Block until every command sent so far has been applied
    pub fn flush(&self) -> Result<()> {
        let (reply, done) = mpsc::channel();
        self.send(Command::Flush(reply))?;
        done.recv().map_err(|_| StoreError::WorkerGone)
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .as_ref()
            .ok_or(StoreError::WorkerGone)?
            .send(cmd)
            .map_err(|_| StoreError::WorkerGone)
    }

    fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = mpsc::channel();
        self.send(make(reply))?;
        response.recv().map_err(|_| StoreError::WorkerGone)?
    }
}

fn run<S: SessionStore>(mut store: S, rx: Receiver<Command>) {
    // replies are best effort: the requester may have given up
    for cmd in rx {
        match cmd {
            Command::Insert(session, reply) => {
                let _ = reply.send(store.insert_session(&session));
            }
            Command::Progress(id, words_read) => match store.update_progress(id, words_read) {
                Ok(true) => log::debug!("session {id}: words_read = {words_read}"),
                Ok(false) => log::debug!("session {id}: stale progress {words_read} dropped"),
                Err(e) => log::error!("session {id}: progress update failed: {e}"),
            },
            Command::Close(id, ended_at, avg_wpm, reply) => {
                let _ = reply.send(store.close_session(id, ended_at, avg_wpm));
            }
            Command::Delete(id, reply) => {
                let _ = reply.send(store.delete_session(id));
            }
            Command::InsertQuiz(result, reply) => {
                let _ = reply.send(store.insert_quiz_result(&result));
            }
            Command::Sessions(filter, reply) => {
                let _ = reply.send(store.sessions(&filter));
            }
            Command::QuizResults(reply) => {
                let _ = reply.send(store.quiz_results());
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
    log::debug!("store worker stopped");
}

impl SessionStore for StoreWorker {
    fn insert_session(&mut self, session: &NewSession) -> Result<ReadingSession> {
        self.request(|reply| Command::Insert(session.clone(), reply))
    }

    /// Queues the write and returns immediately; `Ok(true)` means "queued".
    /// Failures are logged by the worker.
    fn update_progress(&mut self, id: SessionId, words_read: u64) -> Result<bool> {
        self.send(Command::Progress(id, words_read))?;
        Ok(true)
    }

    fn close_session(
        &mut self,
        id: SessionId,
        ended_at: DateTime<Utc>,
        avg_wpm: u32,
    ) -> Result<()> {
        self.request(|reply| Command::Close(id, ended_at, avg_wpm, reply))
    }

    fn delete_session(&mut self, id: SessionId) -> Result<()> {
        self.request(|reply| Command::Delete(id, reply))
    }

    fn insert_quiz_result(&mut self, result: &NewQuizResult) -> Result<QuizResult> {
        self.request(|reply| Command::InsertQuiz(result.clone(), reply))
    }

    fn sessions(&mut self, filter: &SessionFilter) -> Result<Vec<ReadingSession>> {
        self.request(|reply| Command::Sessions(filter.clone(), reply))
    }

    fn quiz_results(&mut self) -> Result<Vec<QuizResult>> {
        self.request(Command::QuizResults)
    }
}

impl Drop for StoreWorker {
    fn drop(&mut self) {
        // closing the channel ends the worker loop once the queue drains
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("store worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::Faults;
    use crate::store::{MemoryStore, SqliteStore};
    use assert_matches::assert_matches;

    fn new_session() -> NewSession {
        NewSession {
            user_id: "ada".into(),
            started_at: Utc::now(),
            total_words: 4,
            text_content: "one two three four".into(),
        }
    }

    #[test]
    fn test_writes_apply_in_order() {
        let mut worker = StoreWorker::spawn(SqliteStore::open_in_memory().unwrap());
        let s = worker.insert_session(&new_session()).unwrap();

        for n in [1, 2, 4, 3] {
            worker.update_progress(s.id, n).unwrap();
        }
        worker.flush().unwrap();

        let rows = worker.sessions(&SessionFilter::All).unwrap();
        assert_eq!(rows[0].words_read, 4);
    }

    #[test]
    fn test_close_reports_errors() {
        let handle = MemoryStore::new();
        let mut worker = StoreWorker::spawn(handle.clone());
        let s = worker.insert_session(&new_session()).unwrap();

        handle.set_faults(Faults {
            close: true,
            ..Faults::default()
        });
        assert_matches!(
            worker.close_session(s.id, Utc::now(), 100),
            Err(StoreError::Unavailable(_))
        );
    }

    #[test]
    fn test_progress_failure_is_not_returned() {
        let handle = MemoryStore::new();
        let mut worker = StoreWorker::spawn(handle.clone());
        let s = worker.insert_session(&new_session()).unwrap();
        handle.set_faults(Faults {
            progress: true,
            ..Faults::default()
        });

        assert!(worker.update_progress(s.id, 2).is_ok());
        worker.flush().unwrap();
        assert_eq!(handle.all_sessions()[0].words_read, 0);
    }

    #[test]
    fn test_delete_after_queued_progress() {
        let handle = MemoryStore::new();
        let mut worker = StoreWorker::spawn(handle.clone());
        let s = worker.insert_session(&new_session()).unwrap();
        worker.update_progress(s.id, 2).unwrap();
        worker.delete_session(s.id).unwrap();
        assert!(handle.all_sessions().is_empty());
        assert_matches!(worker.delete_session(s.id), Err(StoreError::NotFound(_)));
    }

    #[test]
    fn test_drop_drains_queue() {
        let handle = MemoryStore::new();
        {
            let mut worker = StoreWorker::spawn(handle.clone());
            let s = worker.insert_session(&new_session()).unwrap();
            worker.update_progress(s.id, 3).unwrap();
        }
        assert_eq!(handle.all_sessions()[0].words_read, 3);
    }
}
