pub mod history;
pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Widget, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::App;
use speedread::reader::{Notice, NoticeKind};
use speedread::text::preview;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;
/// Words shown on each side of the current one while paused
const CONTEXT_WORDS: usize = 12;

pub fn draw(app: &App, f: &mut Frame) {
    screen::current_view(app.screen).render(app, f);
}

/// Index of the letter the eye should fix on; a little left of centre
pub fn focus_index(word: &str) -> usize {
    match word.chars().count() {
        0 | 1 => 0,
        2..=5 => 1,
        6..=9 => 2,
        10..=13 => 3,
        _ => 4,
    }
}

/// The word padded so its focus letter sits in the middle column of `width`
pub fn focus_line(word: &str, width: u16) -> Line<'static> {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let focus_style = bold_style.fg(Color::Red);

    let pivot = focus_index(word);
    let before: String = word.chars().take(pivot).collect();
    let focus: String = word.chars().skip(pivot).take(1).collect();
    let after: String = word.chars().skip(pivot + 1).collect();
    let pad = (usize::from(width) / 2).saturating_sub(before.width());

    Line::from(vec![
        Span::raw(" ".repeat(pad)),
        Span::styled(before, bold_style),
        Span::styled(focus, focus_style),
        Span::styled(after, bold_style),
    ])
}

fn context_line(app: &App) -> Line<'static> {
    let engine = app.reader.engine();
    let words = engine.words();
    let pos = engine.position();
    let start = pos.saturating_sub(CONTEXT_WORDS);
    let end = (pos + CONTEXT_WORDS + 1).min(words.len());

    let join = |range: std::ops::Range<usize>| {
        range
            .filter_map(|i| words.get(i))
            .collect::<Vec<&str>>()
            .join(" ")
    };
    let dim_style = Style::default().add_modifier(Modifier::DIM);

    Line::from(vec![
        Span::styled(join(start..pos), dim_style),
        Span::styled(
            format!(" [{}] ", words.get(pos).unwrap_or_default()),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        Span::styled(join(pos + 1..end), dim_style),
    ])
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let engine = self.reader.engine();
        let total = engine.words().len();

        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // source
                Constraint::Fill(1),
                Constraint::Length(1), // word
                Constraint::Length(1), // word i of n
                Constraint::Fill(1),   // context while paused
                Constraint::Length(1), // progress
                Constraint::Length(1), // pace and state
                Constraint::Length(1), // stats
                Constraint::Length(1), // legend
            ])
            .split(area);

        Paragraph::new(Span::styled(self.label.clone(), dim_style.patch(italic_style)))
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        if let Some(loading) = &self.loading {
            Paragraph::new(Span::styled("Generating...", bold_style.fg(Color::Yellow)))
                .alignment(Alignment::Center)
                .render(chunks[2], buf);
            Paragraph::new(Span::styled(preview(loading.assembler.text(), 400), dim_style))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true })
                .render(chunks[4], buf);
        } else if let Some(word) = engine.current_word() {
            Paragraph::new(focus_line(word, chunks[2].width)).render(chunks[2], buf);
            Paragraph::new(Span::styled(
                format!("Word {} of {}", engine.position() + 1, total),
                dim_style,
            ))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);

            if !engine.is_playing() {
                Paragraph::new(context_line(self))
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true })
                    .render(chunks[4], buf);
            }
        } else {
            Paragraph::new(Span::styled("No text loaded", dim_style))
                .alignment(Alignment::Center)
                .render(chunks[2], buf);
        }

        let percent = engine.progress_percent();
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Magenta))
            .ratio((percent / 100.0).clamp(0.0, 1.0))
            .label(format!("{percent:.0}%"))
            .render(chunks[5], buf);

        let state = if engine.is_playing() {
            "Reading..."
        } else {
            "Paused"
        };
        Paragraph::new(Span::styled(
            format!("Reading at {} WPM   {state}", engine.rate()),
            bold_style,
        ))
        .alignment(Alignment::Center)
        .render(chunks[6], buf);

        Paragraph::new(Span::styled(
            format!(
                "{} sessions   {} words read   {} avg wpm   {}% quiz",
                self.stats.total_sessions,
                self.stats.total_words_read,
                self.stats.average_wpm,
                self.stats.average_quiz_score
            ),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(chunks[7], buf);

        Paragraph::new(Span::styled(
            "(space) play/pause / (r)eset / (+/-) pace / (n)ew / (g)enerate / (0-5) rate / (s)tats / (esc)ape",
            italic_style,
        ))
        .render(chunks[8], buf);

        if let Some(notice) = &self.notice {
            render_notice(notice, area, buf);
        }
    }
}

fn render_notice(notice: &Notice, area: Rect, buf: &mut Buffer) {
    let color = match notice.kind {
        NoticeKind::Info => Color::Green,
        NoticeKind::Warning => Color::Yellow,
        NoticeKind::Error => Color::Red,
    };
    let width = area.width.saturating_sub(4).min(60);
    let height = 5.min(area.height);
    let popup = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    );

    Clear.render(popup, buf);
    Paragraph::new(notice.body.clone())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(Span::styled(
                    notice.title.clone(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(popup, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Source, Store};
    use speedread::store::MemoryStore;

    fn create_test_app(text: &str) -> App {
        let store: Store = Box::new(MemoryStore::new());
        let mut app = App::new(store, "tester", 300);
        app.open(Source::Text {
            label: "sample: test".into(),
            text: text.into(),
        });
        app
    }

    fn rendered(app: &App, area: Rect) -> String {
        let mut buffer = Buffer::empty(area);
        app.render(area, &mut buffer);
        buffer
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect::<String>()
    }

    #[test]
    fn test_focus_index() {
        assert_eq!(focus_index(""), 0);
        assert_eq!(focus_index("a"), 0);
        assert_eq!(focus_index("word"), 1);
        assert_eq!(focus_index("reading"), 2);
        assert_eq!(focus_index("comprehension"), 3);
        assert_eq!(focus_index("internationalization"), 4);
    }

    #[test]
    fn test_focus_letter_is_centred() {
        let area = Rect::new(0, 0, 21, 1);
        let mut buffer = Buffer::empty(area);
        Paragraph::new(focus_line("reading", 21)).render(area, &mut buffer);
        // "re" sits left of the middle column, "a" on it
        assert_eq!(buffer[(10, 0)].symbol(), "a");
        assert_eq!(buffer[(8, 0)].symbol(), "r");
    }

    #[test]
    fn test_focus_line_wide_chars() {
        let line = focus_line("日本語", 20);
        // one double-width char before the focus letter
        assert_eq!(line.spans[0].content.len(), 8);
        assert_eq!(line.spans[2].content, "本");
    }

    #[test]
    fn test_reader_screen_paused() {
        let app = create_test_app("alpha beta gamma");
        let out = rendered(&app, Rect::new(0, 0, 100, 24));
        assert!(out.contains("Word 1 of 3"));
        assert!(out.contains("Reading at 300 WPM"));
        assert!(out.contains("Paused"));
        assert!(out.contains("[alpha]"));
        assert!(out.contains("sample: test"));
    }

    #[test]
    fn test_gauge_shows_words_passed() {
        let mut app = create_test_app("one two three four");
        let now = std::time::Instant::now();
        app.reader.play(now);
        app.reader.poll(now + std::time::Duration::from_secs(1));
        let out = rendered(&app, Rect::new(0, 0, 100, 24));
        assert!(out.contains("Word 2 of 4"));
        assert!(out.contains("25%"));
    }

    #[test]
    fn test_reader_screen_playing() {
        let mut app = create_test_app("alpha beta gamma");
        app.reader.play(std::time::Instant::now());
        let out = rendered(&app, Rect::new(0, 0, 100, 24));
        assert!(out.contains("Reading..."));
        assert!(!out.contains("[alpha]"));
    }

    #[test]
    fn test_notice_popup() {
        let store: Store = Box::new(MemoryStore::new());
        let mut app = App::new(store, "tester", 300);
        app.reader.play(std::time::Instant::now());
        app.update(std::time::Instant::now());
        let out = rendered(&app, Rect::new(0, 0, 100, 24));
        assert!(out.contains("No text to read"));
        assert!(out.contains("Please enter some text first."));
    }

    #[test]
    fn test_small_area_does_not_panic() {
        let app = create_test_app("alpha beta gamma");
        let _ = rendered(&app, Rect::new(0, 0, 10, 3));
    }
}
