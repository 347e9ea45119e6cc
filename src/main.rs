mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use speedread::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    generate::{
        spawn_generation, Assembly, ContentGenerator, GenerateError, GenerationHandle,
        OpenAiGenerator, SentenceGenerator, TextAssembler,
    },
    pacer::Tick,
    reader::{Notice, NoticeKind, Reader},
    runtime::{CrosstermEventSource, ReaderEvent, Runner},
    samples,
    stats::ReadingStats,
    store::{export_csv, ReadingSession, SessionFilter, SessionStore, SqliteStore, StoreWorker},
};
use std::{
    error::Error,
    fs,
    io::{self, stdin},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

/// Longest the loop sleeps when no beat is scheduled
const MAX_WAIT_MS: u64 = 250;
/// Rows shown on the stats screen
const HISTORY_LEN: usize = 20;

/// terminal speed reader: one word at a time, at the pace you choose
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal speed reading trainer. Words are shown one at a time at a target pace; every pass is recorded as a reading session with its realized words per minute."
)]
pub struct Cli {
    /// target reading pace in words per minute (50-1000)
    #[clap(short = 'w', long)]
    wpm: Option<u32>,

    /// text to read
    #[clap(short = 'p', long, conflicts_with_all = ["file", "sample", "generate"])]
    prompt: Option<String>,

    /// read the contents of a file
    #[clap(short = 'f', long, conflicts_with_all = ["sample", "generate"])]
    file: Option<PathBuf>,

    /// read a bundled sample passage, random unless a name is given
    #[clap(long, value_name = "NAME", num_args = 0..=1, default_missing_value = "", conflicts_with = "generate")]
    sample: Option<String>,

    /// generate a passage from a prompt (needs OPENAI_API_KEY, otherwise offline sentences)
    #[clap(short = 'g', long)]
    generate: Option<String>,

    /// session database to use instead of the default location
    #[clap(long)]
    db: Option<PathBuf>,

    /// name recorded as the owner of new sessions
    #[clap(long)]
    user: Option<String>,

    /// print reading statistics and exit
    #[clap(long)]
    stats: bool,

    /// write session history as CSV to this path and exit
    #[clap(long, value_name = "CSV")]
    export: Option<PathBuf>,
}

impl Cli {
    fn wants_tui(&self) -> bool {
        !self.stats && self.export.is_none()
    }
}

/// Where the text to read comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Text { label: String, text: String },
    Generate(String),
}

impl Source {
    fn from_cli(cli: &Cli) -> Result<Self, Box<dyn Error>> {
        if let Some(prompt) = &cli.prompt {
            return Ok(Source::Text {
                label: "prompt".into(),
                text: prompt.clone(),
            });
        }
        if let Some(path) = &cli.file {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("could not read {}: {e}", path.display()))?;
            return Ok(Source::Text {
                label: path.display().to_string(),
                text,
            });
        }
        if let Some(prompt) = &cli.generate {
            return Ok(Source::Generate(prompt.clone()));
        }
        let sample = match cli.sample.as_deref() {
            Some(name) if !name.is_empty() => samples::by_name(name).ok_or_else(|| {
                let names: Vec<&str> = samples::all().iter().map(|s| s.name).collect();
                format!("no sample named {name:?} (have: {})", names.join(", "))
            })?,
            Some(_) => samples::random().ok_or("no bundled samples")?,
            None => samples::by_name("welcome").ok_or("no bundled samples")?,
        };
        Ok(Source::Text {
            label: format!("sample: {}", sample.name),
            text: sample.text.to_string(),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum Screen {
    Reader,
    Stats,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub type Store = Box<dyn SessionStore + Send>;

/// A generation in flight and the text received so far
pub struct Loading {
    pub prompt: String,
    pub handle: GenerationHandle,
    pub assembler: TextAssembler,
}

pub struct App {
    pub reader: Reader<Store>,
    pub screen: Screen,
    pub label: String,
    pub stats: ReadingStats,
    pub history: Vec<ReadingSession>,
    pub notice: Option<Notice>,
    pub loading: Option<Loading>,
    generator: Option<Arc<dyn ContentGenerator>>,
}

impl App {
    pub fn new(store: Store, user: &str, rate_wpm: u32) -> Self {
        let mut app = Self {
            reader: Reader::new(store, user, rate_wpm),
            screen: Screen::Reader,
            label: String::new(),
            stats: ReadingStats::default(),
            history: Vec::new(),
            notice: None,
            loading: None,
            generator: None,
        };
        app.refresh_stats();
        app
    }

    pub fn with_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn open(&mut self, source: Source) {
        match source {
            Source::Text { label, text } => {
                self.cancel_loading();
                self.label = label;
                self.reader.load_text(&text);
            }
            Source::Generate(prompt) => self.start_generation(prompt),
        }
        self.pull_notices();
    }

    fn start_generation(&mut self, prompt: String) {
        self.cancel_loading();
        let generator = self
            .generator
            .get_or_insert_with(|| Arc::new(SentenceGenerator::default()))
            .clone();
        // nothing plays while the new text is arriving
        self.reader.load_text("");
        self.label = format!("generated: {prompt}");
        self.loading = Some(Loading {
            handle: spawn_generation(generator, prompt.clone()),
            prompt,
            assembler: TextAssembler::new(),
        });
    }

    fn cancel_loading(&mut self) {
        if let Some(loading) = self.loading.take() {
            loading.handle.cancel();
        }
    }

    /// Apply everything that is due at `now`: a pacing beat, generated text,
    /// queued notices.
    pub fn update(&mut self, now: Instant) {
        if let Tick::Finished { .. } = self.reader.poll(now) {
            self.refresh_stats();
        }
        self.poll_loading();
        self.pull_notices();
    }

    fn poll_loading(&mut self) {
        let Some(loading) = self.loading.as_mut() else {
            return;
        };
        match loading.handle.drain_into(&mut loading.assembler) {
            Assembly::Loading => {}
            Assembly::Complete => {
                if let Some(loading) = self.loading.take() {
                    self.reader.load_text(loading.assembler.text());
                }
            }
            Assembly::Failed(msg) => {
                self.loading = None;
                self.reader
                    .notify(NoticeKind::Error, "Could not generate text", msg);
            }
            Assembly::Cancelled => {
                self.loading = None;
                self.reader.notify(
                    NoticeKind::Warning,
                    "Generation stopped",
                    "The generator ended before finishing the text.",
                );
            }
        }
    }

    fn pull_notices(&mut self) {
        if self.notice.is_none() {
            self.notice = self.reader.next_notice();
        }
    }

    pub fn refresh_stats(&mut self) {
        self.stats = self.reader.stats();
        self.history = match self.reader.tracker_mut().sessions(&SessionFilter::All) {
            Ok(mut sessions) => {
                sessions.reverse();
                sessions.truncate(HISTORY_LEN);
                sessions
            }
            Err(e) => {
                log::error!("error loading session history: {e}");
                Vec::new()
            }
        };
    }

    fn on_key(&mut self, key: KeyEvent, now: Instant) -> Flow {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Flow::Quit;
        }
        if self.notice.is_some() {
            // any key dismisses the notice; Esc/q still quit below
            self.notice = None;
            self.pull_notices();
            if !matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
                return Flow::Continue;
            }
        }

        match (self.screen, key.code) {
            (_, KeyCode::Esc) | (_, KeyCode::Char('q')) => return Flow::Quit,
            (Screen::Stats, KeyCode::Char('s')) | (Screen::Stats, KeyCode::Backspace) => {
                self.screen = Screen::Reader;
            }
            (Screen::Stats, _) => {}
            (Screen::Reader, KeyCode::Char(' ')) => self.reader.toggle(now),
            (Screen::Reader, KeyCode::Char('r')) => self.reader.reset(),
            (Screen::Reader, KeyCode::Up)
            | (Screen::Reader, KeyCode::Char('+'))
            | (Screen::Reader, KeyCode::Char('=')) => {
                self.reader.rate_up();
            }
            (Screen::Reader, KeyCode::Down) | (Screen::Reader, KeyCode::Char('-')) => {
                self.reader.rate_down();
            }
            (Screen::Reader, KeyCode::Char('n')) => {
                if let Some(sample) = samples::random() {
                    self.open(Source::Text {
                        label: format!("sample: {}", sample.name),
                        text: sample.text.to_string(),
                    });
                }
            }
            (Screen::Reader, KeyCode::Char('g')) => {
                let prompt = self
                    .loading
                    .as_ref()
                    .map(|l| l.prompt.clone())
                    .unwrap_or_else(|| "a short story".to_string());
                self.open(Source::Generate(prompt));
            }
            (Screen::Reader, KeyCode::Char(c @ '0'..='5')) => {
                let score = c.to_digit(10).unwrap_or_default();
                self.rate_comprehension(score);
            }
            (Screen::Reader, KeyCode::Char('s')) => {
                self.refresh_stats();
                self.screen = Screen::Stats;
            }
            _ => {}
        }
        self.pull_notices();
        Flow::Continue
    }

    /// Self-rated comprehension, recorded as a quiz result out of 5
    fn rate_comprehension(&mut self, score: u32) {
        match self.reader.save_quiz_result(score, 5) {
            Some(result) => self.reader.notify(
                NoticeKind::Info,
                "Comprehension saved",
                format!("{}/{} for session {}", result.score, result.max_score, result.session_id),
            ),
            None => self.reader.notify(
                NoticeKind::Warning,
                "No session to rate",
                "Comprehension can be rated while a session is open.",
            ),
        }
    }

    /// Close the open session before the process exits
    pub fn shutdown(&mut self) {
        self.cancel_loading();
        self.reader.leave_session();
    }
}

fn init_logging() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let file = match fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(_) => return,
    };
    // the terminal belongs to the TUI, so logs go to a file
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init();
}

fn open_store(cli: &Cli, config: &Config) -> Result<SqliteStore, Box<dyn Error>> {
    let store = match cli.db.as_ref().or(config.db_path.as_ref()) {
        Some(path) => SqliteStore::open(path)?,
        None => SqliteStore::open_default()?,
    };
    Ok(store)
}

fn make_generator(config: &Config) -> Arc<dyn ContentGenerator> {
    match OpenAiGenerator::from_env(config.api_base.as_deref(), config.model.as_deref()) {
        Ok(generator) => Arc::new(generator),
        Err(GenerateError::MissingApiKey) => {
            log::warn!("OPENAI_API_KEY not set, generating offline sentences");
            Arc::new(SentenceGenerator::default())
        }
        Err(e) => {
            log::error!("could not set up generator, generating offline sentences: {e}");
            Arc::new(SentenceGenerator::default())
        }
    }
}

/// `--stats` / `--export`: no terminal UI
fn run_batch(cli: &Cli, mut store: SqliteStore) -> Result<(), Box<dyn Error>> {
    if let Some(path) = &cli.export {
        let sessions = store.sessions(&SessionFilter::All)?;
        let file = fs::File::create(path)?;
        export_csv(&sessions, file)?;
        println!("exported {} sessions to {}", sessions.len(), path.display());
    }
    if cli.stats {
        let stats = ReadingStats::from_records(
            &store.sessions(&SessionFilter::All)?,
            &store.quiz_results()?,
        );
        println!("{stats}");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();

    let config_store = FileConfigStore::new();
    let mut config = config_store.load();
    let store = open_store(&cli, &config)?;

    if !cli.wants_tui() {
        return run_batch(&cli, store);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let source = Source::from_cli(&cli)?;
    let user = cli.user.clone().unwrap_or_else(|| config.user.clone());
    let rate = cli.wpm.unwrap_or_else(|| config.rate());

    let mut app = App::new(Box::new(StoreWorker::spawn(store)), &user, rate)
        .with_generator(make_generator(&config));
    app.open(source);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.shutdown();
    let rate = app.reader.engine().rate();
    if rate != config.rate_wpm {
        config.rate_wpm = rate;
        if let Err(e) = config_store.save(&config) {
            log::warn!("could not save config: {e}");
        }
    }

    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        Duration::from_millis(MAX_WAIT_MS),
    );

    loop {
        app.update(Instant::now());
        terminal.draw(|f| ui::draw(app, f))?;

        match runner.step(app.reader.metronome(), Instant::now()) {
            ReaderEvent::Tick | ReaderEvent::Resize => {}
            ReaderEvent::Key(key) => {
                if app.on_key(key, Instant::now()) == Flow::Quit {
                    break;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use speedread::store::MemoryStore;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn test_app(text: &str) -> (App, MemoryStore) {
        let store = MemoryStore::new();
        let mut app = App::new(Box::new(store.clone()), "tester", 600);
        app.open(Source::Text {
            label: "test".into(),
            text: text.into(),
        });
        (app, store)
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["speedread"]);
        assert_eq!(cli.wpm, None);
        assert!(cli.prompt.is_none());
        assert!(cli.sample.is_none());
        assert!(!cli.stats);
        assert!(cli.wants_tui());
    }

    #[test]
    fn test_cli_wpm_and_prompt() {
        let cli = Cli::parse_from(["speedread", "-w", "400", "-p", "hello there"]);
        assert_eq!(cli.wpm, Some(400));
        assert_eq!(
            Source::from_cli(&cli).unwrap(),
            Source::Text {
                label: "prompt".into(),
                text: "hello there".into()
            }
        );
    }

    #[test]
    fn test_cli_sources_conflict() {
        assert!(Cli::try_parse_from(["speedread", "-p", "a", "-g", "b"]).is_err());
        assert!(Cli::try_parse_from(["speedread", "--sample", "-f", "x.txt"]).is_err());
    }

    #[test]
    fn test_cli_sample_flag() {
        let cli = Cli::parse_from(["speedread", "--sample"]);
        assert_eq!(cli.sample.as_deref(), Some(""));
        assert!(matches!(Source::from_cli(&cli).unwrap(), Source::Text { label, .. } if label.starts_with("sample: ")));

        let cli = Cli::parse_from(["speedread", "--sample", "rivers"]);
        assert_matches::assert_matches!(
            Source::from_cli(&cli).unwrap(),
            Source::Text { label, .. } if label == "sample: rivers"
        );

        let cli = Cli::parse_from(["speedread", "--sample", "nope"]);
        assert!(Source::from_cli(&cli).is_err());
    }

    #[test]
    fn test_cli_batch_modes() {
        let cli = Cli::parse_from(["speedread", "--stats", "--db", "/tmp/x.db"]);
        assert!(!cli.wants_tui());
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        let cli = Cli::parse_from(["speedread", "--export", "out.csv"]);
        assert!(!cli.wants_tui());
    }

    #[test]
    fn test_space_toggles_playback() {
        let (mut app, _) = test_app("one two three");
        let now = Instant::now();
        app.on_key(key(KeyCode::Char(' ')), now);
        assert!(app.reader.engine().is_playing());
        app.on_key(key(KeyCode::Char(' ')), now);
        assert!(!app.reader.engine().is_playing());
    }

    #[test]
    fn test_rate_keys() {
        let (mut app, _) = test_app("one two three");
        let now = Instant::now();
        app.on_key(key(KeyCode::Up), now);
        assert_eq!(app.reader.engine().rate(), 625);
        app.on_key(key(KeyCode::Char('-')), now);
        app.on_key(key(KeyCode::Down), now);
        assert_eq!(app.reader.engine().rate(), 575);
    }

    #[test]
    fn test_update_runs_to_completion_and_refreshes_stats() {
        let (mut app, store) = test_app("alpha beta gamma");
        let t0 = Instant::now();
        app.on_key(key(KeyCode::Char(' ')), t0);
        for i in 1..=3 {
            app.update(t0 + Duration::from_millis(100 * i));
        }
        assert!(store.all_sessions()[0].completed);
        assert_eq!(app.stats.total_sessions, 1);
        assert_eq!(app.stats.total_words_read, 3);
        assert_eq!(app.notice.as_ref().unwrap().title, "Finished");
    }

    #[test]
    fn test_notice_dismissed_by_any_key() {
        let store = MemoryStore::new();
        let mut app = App::new(Box::new(store), "tester", 250);
        let now = Instant::now();
        app.on_key(key(KeyCode::Char(' ')), now);
        assert_eq!(app.notice.as_ref().unwrap().title, "No text to read");
        assert_eq!(app.on_key(key(KeyCode::Char('x')), now), Flow::Continue);
        assert!(app.notice.is_none());
    }

    #[test]
    fn test_quit_keys() {
        let (mut app, _) = test_app("one");
        let now = Instant::now();
        assert_eq!(app.on_key(key(KeyCode::Esc), now), Flow::Quit);
        assert_eq!(app.on_key(key(KeyCode::Char('q')), now), Flow::Quit);
        assert_eq!(
            app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), now),
            Flow::Quit
        );
    }

    #[test]
    fn test_stats_screen_round_trip() {
        let (mut app, _) = test_app("one two");
        let now = Instant::now();
        app.on_key(key(KeyCode::Char('s')), now);
        assert_eq!(app.screen, Screen::Stats);
        assert_eq!(app.history.len(), 1);
        // playback keys do nothing here
        app.on_key(key(KeyCode::Char(' ')), now);
        assert!(!app.reader.engine().is_playing());
        app.on_key(key(KeyCode::Char('s')), now);
        assert_eq!(app.screen, Screen::Reader);
    }

    #[test]
    fn test_comprehension_rating() {
        let (mut app, store) = test_app("one two");
        app.on_key(key(KeyCode::Char('4')), Instant::now());
        assert_eq!(app.notice.as_ref().unwrap().title, "Comprehension saved");
        let results = store.all_quiz_results();
        assert_eq!(results.len(), 1);
        assert_eq!((results[0].score, results[0].max_score), (4, 5));
    }

    #[test]
    fn test_generated_text_is_loaded() {
        let store = MemoryStore::new();
        let mut app = App::new(Box::new(store.clone()), "tester", 250)
            .with_generator(Arc::new(SentenceGenerator::new(2)));
        app.open(Source::Generate("anything".into()));
        assert!(app.loading.is_some());
        for _ in 0..200 {
            app.update(Instant::now());
            if app.loading.is_none() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(app.loading.is_none());
        assert!(app.reader.engine().words().len() >= 2);
        assert_eq!(store.all_sessions().len(), 1);
    }

    #[test]
    fn test_shutdown_closes_session() {
        let (mut app, store) = test_app("one two");
        app.on_key(key(KeyCode::Char(' ')), Instant::now());
        app.shutdown();
        assert!(store.all_sessions()[0].completed);
        assert_eq!(store.all_sessions()[0].words_read, 1);
    }

    #[test]
    fn test_quit_without_reading_records_nothing() {
        let (mut app, store) = test_app("one two");
        app.shutdown();
        assert!(store.all_sessions().is_empty());
    }
}
