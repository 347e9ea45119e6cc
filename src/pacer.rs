use std::time::Duration;

use crate::text::tokenize;

pub const DEFAULT_WPM: u32 = 250;
pub const MIN_WPM: u32 = 50;
pub const MAX_WPM: u32 = 1000;
/// Increment used by the rate up/down controls
pub const WPM_STEP: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacerError {
    #[error("no text to read")]
    NoText,
}

/// Ordered word tokens of the currently loaded text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordSequence {
    words: Vec<String>,
}

impl WordSequence {
    pub fn from_text(text: &str) -> Self {
        Self {
            words: tokenize(text),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.words.get(idx).map(String::as_str)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.words.len().checked_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub position: usize,
    pub playing: bool,
    pub rate_wpm: u32,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            position: 0,
            playing: false,
            rate_wpm: DEFAULT_WPM,
        }
    }
}

/// Result of one scheduled advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not playing, nothing happened
    Idle,
    Advanced { position: usize },
    /// Reached the end of the sequence and stopped; position stays on the last word
    Finished { position: usize },
}

/// How `play` got the engine going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayStart {
    Resumed,
    /// The cursor was on the last word, so the pass starts over from the top
    Restarted,
}

/// Word-by-word cursor over a loaded text, advanced by `tick`.
///
/// The engine knows nothing about time; whoever owns it decides when a tick
/// is due (see [`crate::runtime::Metronome`]) using [`PacingEngine::interval`].
#[derive(Debug, Clone, Default)]
pub struct PacingEngine {
    words: WordSequence,
    state: PlaybackState,
}

impl PacingEngine {
    pub fn new(rate_wpm: u32) -> Self {
        Self {
            words: WordSequence::default(),
            state: PlaybackState {
                rate_wpm: clamp_rate(rate_wpm),
                ..PlaybackState::default()
            },
        }
    }

    pub fn load(&mut self, text: &str) {
        self.words = WordSequence::from_text(text);
        self.state.position = 0;
        self.state.playing = false;
    }

    pub fn play(&mut self) -> Result<PlayStart, PacerError> {
        let Some(last) = self.words.last_index() else {
            return Err(PacerError::NoText);
        };

        let start = if self.state.position >= last {
            self.state.position = 0;
            PlayStart::Restarted
        } else {
            PlayStart::Resumed
        };
        self.state.playing = true;
        Ok(start)
    }

    pub fn pause(&mut self) {
        self.state.playing = false;
    }

    pub fn reset(&mut self) {
        self.state.playing = false;
        self.state.position = 0;
    }

    /// Set the target pace, clamped to `MIN_WPM..=MAX_WPM`. Returns the applied rate.
    pub fn set_rate(&mut self, wpm: u32) -> u32 {
        self.state.rate_wpm = clamp_rate(wpm);
        self.state.rate_wpm
    }

    pub fn rate_up(&mut self) -> u32 {
        self.set_rate(self.state.rate_wpm.saturating_add(WPM_STEP))
    }

    pub fn rate_down(&mut self) -> u32 {
        self.set_rate(self.state.rate_wpm.saturating_sub(WPM_STEP))
    }

    pub fn tick(&mut self) -> Tick {
        if !self.state.playing {
            return Tick::Idle;
        }
        let Some(last) = self.words.last_index() else {
            self.state.playing = false;
            return Tick::Idle;
        };

        if self.state.position >= last {
            self.state.playing = false;
            self.state.position = last;
            Tick::Finished {
                position: self.state.position,
            }
        } else {
            self.state.position += 1;
            Tick::Advanced {
                position: self.state.position,
            }
        }
    }

    /// Time between two advances at the current rate
    pub fn interval(&self) -> Duration {
        interval_for(self.state.rate_wpm)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn words(&self) -> &WordSequence {
        &self.words
    }

    pub fn position(&self) -> usize {
        self.state.position
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    pub fn rate(&self) -> u32 {
        self.state.rate_wpm
    }

    pub fn current_word(&self) -> Option<&str> {
        self.words.get(self.state.position)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.words.is_empty() {
            0.0
        } else {
            self.state.position as f64 / self.words.len() as f64 * 100.0
        }
    }
}

pub fn clamp_rate(wpm: u32) -> u32 {
    wpm.clamp(MIN_WPM, MAX_WPM)
}

pub fn interval_for(wpm: u32) -> Duration {
    Duration::from_millis(60_000 / u64::from(wpm.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        let engine = PacingEngine::default();
        assert_eq!(engine.state(), PlaybackState::default());
        assert_eq!(engine.rate(), 250);
        assert!(!engine.is_playing());
        assert_eq!(engine.current_word(), None);
    }

    #[test]
    fn test_load_resets_cursor() {
        let mut engine = PacingEngine::new(300);
        engine.load("one two three");
        engine.play().unwrap();
        engine.tick();
        assert_eq!(engine.position(), 1);

        engine.load("four five");
        assert_eq!(engine.position(), 0);
        assert!(!engine.is_playing());
        assert_eq!(engine.words().len(), 2);
        assert_eq!(engine.current_word(), Some("four"));
    }

    #[test]
    fn test_load_empty_text() {
        let mut engine = PacingEngine::default();
        engine.load("a b");
        engine.load("   ");
        assert!(engine.words().is_empty());
        assert_eq!(engine.position(), 0);
    }

    #[test]
    fn test_play_without_text_is_rejected() {
        let mut engine = PacingEngine::default();
        assert_eq!(engine.play(), Err(PacerError::NoText));
        assert!(!engine.is_playing());
        assert_eq!(engine.position(), 0);
    }

    #[test]
    fn test_play_from_last_word_restarts() {
        let mut engine = PacingEngine::default();
        engine.load("alpha beta");
        assert_eq!(engine.play(), Ok(PlayStart::Resumed));
        engine.tick();
        assert_eq!(engine.position(), 1);
        engine.pause();

        assert_eq!(engine.play(), Ok(PlayStart::Restarted));
        assert_eq!(engine.position(), 0);
        assert!(engine.is_playing());
    }

    #[test]
    fn test_single_word_restarts_and_finishes_on_first_tick() {
        let mut engine = PacingEngine::default();
        engine.load("solo");
        assert_eq!(engine.play(), Ok(PlayStart::Restarted));
        assert_matches!(engine.tick(), Tick::Finished { position: 0 });
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_pause_is_idempotent_and_stops_ticks() {
        let mut engine = PacingEngine::default();
        engine.load("a b c");
        engine.play().unwrap();
        engine.pause();
        engine.pause();
        assert_eq!(engine.tick(), Tick::Idle);
        assert_eq!(engine.position(), 0);
    }

    #[test]
    fn test_reset() {
        let mut engine = PacingEngine::default();
        engine.load("a b c");
        engine.play().unwrap();
        engine.tick();
        engine.reset();
        assert_eq!(engine.position(), 0);
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_n_ticks_pin_at_last_index() {
        let text = "w0 w1 w2 w3 w4 w5";
        for n in 0..12 {
            let mut engine = PacingEngine::default();
            engine.load(text);
            engine.play().unwrap();
            for _ in 0..n {
                engine.tick();
            }
            assert_eq!(engine.position(), n.min(5), "after {n} ticks");
            // stops on the tick after the last word was reached
            assert_eq!(engine.is_playing(), n <= 5, "after {n} ticks");
        }
    }

    #[test]
    fn test_tick_sequence_for_three_words() {
        let mut engine = PacingEngine::new(600);
        engine.load("alpha beta gamma");
        engine.play().unwrap();
        assert_eq!(engine.tick(), Tick::Advanced { position: 1 });
        assert_eq!(engine.tick(), Tick::Advanced { position: 2 });
        assert_eq!(engine.tick(), Tick::Finished { position: 2 });
        assert_eq!(engine.tick(), Tick::Idle);
        assert_eq!(engine.current_word(), Some("gamma"));
    }

    #[test]
    fn test_rate_bounds_and_interval() {
        let mut engine = PacingEngine::default();
        assert_eq!(engine.set_rate(10), MIN_WPM);
        assert_eq!(engine.set_rate(5000), MAX_WPM);
        assert_eq!(engine.set_rate(600), 600);
        assert_eq!(engine.interval(), Duration::from_millis(100));
        assert_eq!(interval_for(250), Duration::from_millis(240));
        assert_eq!(PacingEngine::new(0).rate(), MIN_WPM);
    }

    #[test]
    fn test_rate_steps() {
        let mut engine = PacingEngine::new(975);
        assert_eq!(engine.rate_up(), 1000);
        assert_eq!(engine.rate_up(), 1000);
        let mut engine = PacingEngine::new(60);
        assert_eq!(engine.rate_down(), MIN_WPM);
    }

    #[test]
    fn test_progress_percent() {
        let mut engine = PacingEngine::default();
        assert_eq!(engine.progress_percent(), 0.0);
        engine.load("a b c d");
        engine.play().unwrap();
        engine.tick();
        assert_eq!(engine.progress_percent(), 25.0);
    }
}
