use ratatui::Frame;

use crate::{ui::history::render_stats, App, Screen};

/// One full-terminal screen
pub trait View {
    fn render(&self, app: &App, f: &mut Frame);
}

/// The word display; `&App` is itself the widget
pub struct ReaderView;

impl View for ReaderView {
    fn render(&self, app: &App, f: &mut Frame) {
        f.render_widget(app, f.area());
    }
}

/// Reading history and aggregates
pub struct StatsView;

impl View for StatsView {
    fn render(&self, app: &App, f: &mut Frame) {
        render_stats(app, f);
    }
}

pub fn current_view(screen: Screen) -> &'static dyn View {
    match screen {
        Screen::Reader => &ReaderView,
        Screen::Stats => &StatsView,
    }
}
