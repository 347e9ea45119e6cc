use serde::Serialize;
use std::fmt;

use crate::store::{QuizResult, ReadingSession};
use crate::util::rounded_mean;

/// Aggregate view over the reading history. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadingStats {
    pub total_sessions: u64,
    /// Sum of the declared word counts of completed sessions
    pub total_words_read: u64,
    /// Mean realized WPM over completed sessions
    pub average_wpm: u32,
    /// Mean quiz score, percent
    pub average_quiz_score: u32,
}

impl ReadingStats {
    /// Only completed sessions count; quiz results count whether or not
    /// their session was finished.
    pub fn from_records(sessions: &[ReadingSession], quiz_results: &[QuizResult]) -> Self {
        let completed: Vec<&ReadingSession> = sessions.iter().filter(|s| s.completed).collect();

        let wpms: Vec<f64> = completed.iter().map(|s| f64::from(s.avg_wpm)).collect();
        let scores: Vec<f64> = quiz_results
            .iter()
            .filter(|q| q.max_score > 0)
            .map(|q| f64::from(q.score) / f64::from(q.max_score) * 100.0)
            .collect();

        Self {
            total_sessions: completed.len() as u64,
            total_words_read: completed.iter().map(|s| s.total_words).sum(),
            average_wpm: rounded_mean(&wpms),
            average_quiz_score: rounded_mean(&scores),
        }
    }
}

impl fmt::Display for ReadingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sessions:    {}", self.total_sessions)?;
        writeln!(f, "Words read:  {}", self.total_words_read)?;
        writeln!(f, "Avg WPM:     {}", self.average_wpm)?;
        write!(f, "Quiz score:  {}%", self.average_quiz_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SessionId;
    use chrono::Utc;

    fn session(total_words: u64, words_read: u64, avg_wpm: u32, completed: bool) -> ReadingSession {
        ReadingSession {
            id: SessionId(1),
            user_id: "ada".into(),
            started_at: Utc::now(),
            ended_at: completed.then(Utc::now),
            words_read,
            total_words,
            avg_wpm,
            text_content: String::new(),
            completed,
        }
    }

    fn quiz(score: u32, max_score: u32) -> QuizResult {
        QuizResult {
            id: 1,
            session_id: SessionId(1),
            user_id: "ada".into(),
            score,
            max_score,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(ReadingStats::from_records(&[], &[]), ReadingStats::default());
    }

    #[test]
    fn test_no_completed_sessions_keeps_quiz_average() {
        let stats = ReadingStats::from_records(&[session(10, 4, 0, false)], &[quiz(3, 4)]);
        assert_eq!(
            stats,
            ReadingStats {
                total_sessions: 0,
                total_words_read: 0,
                average_wpm: 0,
                average_quiz_score: 75,
            }
        );
    }

    #[test]
    fn test_words_come_from_declared_totals() {
        // words_read is progress telemetry; totals use the declared count
        let sessions = [session(100, 40, 300, true), session(50, 50, 251, true)];
        let stats = ReadingStats::from_records(&sessions, &[]);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_words_read, 150);
        assert_eq!(stats.average_wpm, 276); // 275.5 rounds up
    }

    #[test]
    fn test_quiz_average_and_zero_max() {
        let stats =
            ReadingStats::from_records(&[], &[quiz(1, 2), quiz(2, 3), quiz(5, 0)]);
        // (50 + 66.67) / 2 = 58.33
        assert_eq!(stats.average_quiz_score, 58);
    }

    #[test]
    fn test_display() {
        let text = ReadingStats {
            total_sessions: 2,
            total_words_read: 120,
            average_wpm: 310,
            average_quiz_score: 80,
        }
        .to_string();
        assert!(text.contains("Sessions:    2"));
        assert!(text.contains("Quiz score:  80%"));
    }
}
