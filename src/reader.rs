use std::collections::VecDeque;
use std::time::Instant;

use crate::pacer::{PacerError, PacingEngine, PlayStart, Tick};
use crate::runtime::Metronome;
use crate::session::SessionTracker;
use crate::stats::ReadingStats;
use crate::store::{QuizResult, SessionStore};

#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

/// Short user-facing message, shown by the UI until dismissed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub kind: NoticeKind,
}

impl Notice {
    fn new(kind: NoticeKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            kind,
        }
    }
}

/// Ties the pacing engine to its metronome and to session tracking.
///
/// Every clock-dependent call takes `now`, so the whole read-through can be
/// driven by hand in tests.
#[derive(Debug)]
pub struct Reader<S: SessionStore> {
    engine: PacingEngine,
    metronome: Metronome,
    tracker: SessionTracker<S>,
    text: String,
    notices: VecDeque<Notice>,
}

impl<S: SessionStore> Reader<S> {
    pub fn new(store: S, user_id: impl Into<String>, rate_wpm: u32) -> Self {
        Self {
            engine: PacingEngine::new(rate_wpm),
            metronome: Metronome::new(),
            tracker: SessionTracker::new(store, user_id),
            text: String::new(),
            notices: VecDeque::new(),
        }
    }

    /// Replace the text being read. Any open session is left first; a
    /// new one is opened when the text has words.
    pub fn load_text(&mut self, text: &str) {
        self.metronome.cancel();
        self.leave_session();
        self.engine.load(text);
        self.text = text.to_string();
        if !self.engine.words().is_empty() {
            self.open_session();
        }
    }

    pub fn play(&mut self, now: Instant) {
        if self.engine.is_playing() {
            return;
        }
        match self.engine.play() {
            Err(PacerError::NoText) => {
                self.notify(
                    NoticeKind::Warning,
                    "No text to read",
                    "Please enter some text first.",
                );
                return;
            }
            Ok(PlayStart::Restarted) if !self.tracker.is_open() => self.open_session(),
            Ok(_) => {}
        }
        self.metronome.start(now, self.engine.interval());
        self.report_progress();
    }

    pub fn pause(&mut self) {
        self.metronome.cancel();
        self.engine.pause();
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.engine.is_playing() {
            self.pause();
        } else {
            self.play(now);
        }
    }

    /// Back to the first word. The open session stays open.
    pub fn reset(&mut self) {
        self.metronome.cancel();
        self.engine.reset();
    }

    /// Change the pace; the beat already scheduled keeps its time.
    pub fn set_rate(&mut self, wpm: u32) -> u32 {
        self.engine.set_rate(wpm)
    }

    pub fn rate_up(&mut self) -> u32 {
        self.engine.rate_up()
    }

    pub fn rate_down(&mut self) -> u32 {
        self.engine.rate_down()
    }

    /// Advance one word if a beat is due at `now`
    pub fn poll(&mut self, now: Instant) -> Tick {
        if !self.metronome.poll(now, self.engine.interval()) {
            return Tick::Idle;
        }
        let tick = self.engine.tick();
        match tick {
            Tick::Advanced { .. } => self.report_progress(),
            Tick::Finished { .. } => {
                self.metronome.cancel();
                self.report_progress();
                self.finish_session();
            }
            Tick::Idle => self.metronome.cancel(),
        }
        tick
    }

    /// Close the open session, e.g. on quit. A session in which nothing was
    /// read is dropped instead of being recorded as completed.
    pub fn leave_session(&mut self) {
        if self.tracker.discard_unread() {
            return;
        }
        if let Err(e) = self.tracker.end_session() {
            self.notify(NoticeKind::Error, "Could not save session", e.to_string());
        }
    }

    pub fn save_quiz_result(&mut self, score: u32, max_score: u32) -> Option<QuizResult> {
        self.tracker.save_quiz_result(score, max_score)
    }

    pub fn stats(&mut self) -> ReadingStats {
        self.tracker.get_stats()
    }

    pub fn next_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    pub fn engine(&self) -> &PacingEngine {
        &self.engine
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn tracker(&self) -> &SessionTracker<S> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut SessionTracker<S> {
        &mut self.tracker
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn open_session(&mut self) {
        if let Err(e) = self.tracker.start_session(&self.text) {
            self.notify(NoticeKind::Error, "Session not recorded", e.to_string());
        }
    }

    fn report_progress(&mut self) {
        let words_read = self.engine.position() as u64 + 1;
        self.tracker.update_progress(words_read, self.engine.rate());
    }

    fn finish_session(&mut self) {
        let words = self.engine.words().len();
        match self.tracker.end_session() {
            Ok(Some(wpm)) => self.notify(
                NoticeKind::Info,
                "Finished",
                format!("{words} words at {wpm} WPM"),
            ),
            Ok(None) => {}
            Err(e) => self.notify(NoticeKind::Error, "Could not save session", e.to_string()),
        }
    }

    pub fn notify(&mut self, kind: NoticeKind, title: &str, body: impl Into<String>) {
        let notice = Notice::new(kind, title, body);
        log::debug!("{kind}: {} - {}", notice.title, notice.body);
        self.notices.push_back(notice);
    }
}
