use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent};

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum ReaderEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait ReaderEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<ReaderEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if tx.send(ReaderEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if tx.send(ReaderEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<ReaderEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<ReaderEvent>) -> Self {
        Self { rx }
    }
}

impl ReaderEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: ReaderEventSource> {
    event_source: E,
    max_wait: Duration,
}

impl<E: ReaderEventSource> Runner<E> {
    /// `max_wait` bounds how long a step may block when nothing is scheduled
    pub fn new(event_source: E, max_wait: Duration) -> Self {
        Self {
            event_source,
            max_wait,
        }
    }

    /// Blocks until the next event, the metronome's next beat, or `max_wait`,
    /// whichever comes first. Returns Tick when nothing arrived.
    pub fn step(&self, metronome: &Metronome, now: Instant) -> ReaderEvent {
        let timeout = metronome
            .time_until_due(now)
            .map_or(self.max_wait, |d| d.min(self.max_wait));
        match self.event_source.recv_timeout(timeout) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                ReaderEvent::Tick
            }
        }
    }
}

/// Cancelable recurring beat driving the pacing engine.
///
/// Time is always passed in, so tests step it by hand. Once `cancel` returns
/// no beat fires until `start` is called again. A late poll fires at most one
/// beat; missed beats are dropped, not replayed.
#[derive(Debug, Clone, Default)]
pub struct Metronome {
    next_due: Option<Instant>,
}

impl Metronome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the metronome; first beat is one `interval` after `now`.
    pub fn start(&mut self, now: Instant, interval: Duration) {
        self.next_due = Some(now + interval);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Fire if a beat is due at `now`. The next beat is scheduled `interval`
    /// after `now`, so a rate change only affects beats from here on.
    pub fn poll(&mut self, now: Instant, interval: Duration) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + interval);
                true
            }
            _ => false,
        }
    }

    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }
}
