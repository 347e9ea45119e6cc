use chrono::{DateTime, Utc};
use itertools::Itertools;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};
use time_humanize::{Accuracy, HumanTime, Tense};

use crate::App;
use speedread::store::ReadingSession;
use speedread::text::preview;

/// "5 minutes ago" style age of a session
pub fn started_ago(started_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now
        .signed_duration_since(started_at)
        .to_std()
        .unwrap_or_default();
    HumanTime::from(age).to_text_en(Accuracy::Rough, Tense::Past)
}

/// Pure presenter for one row of the history table
pub fn present_row(session: &ReadingSession, now: DateTime<Utc>) -> Row<'static> {
    let (state, state_style) = if session.completed {
        ("done", Style::default().fg(Color::Green))
    } else {
        ("open", Style::default().fg(Color::Yellow))
    };
    let wpm = if session.completed {
        session.avg_wpm.to_string()
    } else {
        "—".to_string()
    };

    Row::new(vec![
        Cell::from(started_ago(session.started_at, now)),
        Cell::from(format!("{}/{}", session.words_read, session.total_words)),
        Cell::from(wpm).style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(state).style(state_style),
        Cell::from(preview(&session.text_content, 40)),
    ])
}

/// Render the Stats screen: aggregate numbers and recent sessions
pub fn render_stats(app: &App, f: &mut Frame) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(4), // aggregate
            Constraint::Min(0),    // history
            Constraint::Length(2), // instructions
        ])
        .split(area);

    let stats = &app.stats;
    let summary = Paragraph::new(format!(
        "{} sessions   {} words read\n{} avg wpm   {}% average quiz score",
        stats.total_sessions, stats.total_words_read, stats.average_wpm, stats.average_quiz_score
    ))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("{} ({})", app.screen, app.reader.tracker().user_id())),
    )
    .style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )
    .alignment(Alignment::Center);
    f.render_widget(summary, chunks[0]);

    if app.history.is_empty() {
        let no_data = Paragraph::new("No reading sessions yet. Press space on the reader to start one.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray));
        f.render_widget(no_data, chunks[1]);
    } else {
        let now = Utc::now();
        let header = Row::new(vec!["Started", "Words", "WPM", "State", "Text"]).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
        let rows = app
            .history
            .iter()
            .map(|session| present_row(session, now))
            .collect_vec();

        let widths = [
            Constraint::Length(20), // Started
            Constraint::Length(12), // Words
            Constraint::Length(6),  // WPM
            Constraint::Length(6),  // State
            Constraint::Min(10),    // Text
        ];

        let table = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title("Recent sessions"))
            .column_spacing(2);
        f.render_widget(table, chunks[1]);
    }

    let instructions = Paragraph::new("(s/backspace) back  (esc) quit")
        .alignment(Alignment::Center)
        .wrap(ratatui::widgets::Wrap { trim: true });
    f.render_widget(instructions, chunks[2]);
}
