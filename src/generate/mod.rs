//! Text generation for the reader.
//!
//! A generator either returns a whole text or streams fragments into a
//! channel. Streams always end with `Done` or `Failed`; the consumer can
//! cancel at any point, or simply drop its receiver.

pub mod openai;
pub mod sentences;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

pub use openai::OpenAiGenerator;
pub use sentences::SentenceGenerator;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read response stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("generation service error: {0}")]
    Api(String),

    #[error("generation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Fragment(String),
    Done,
    Failed(String),
}

/// Shared flag that asks a running generation to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait ContentGenerator: Send + Sync {
    /// Produce the whole text at once
    fn generate(&self, prompt: &str) -> Result<String, GenerateError>;

    /// Send fragments to `sink` in order. Implementations stop early when
    /// `cancel` is set or the sink is gone. Terminal events are sent by
    /// [`spawn_generation`], not here.
    fn stream(
        &self,
        prompt: &str,
        sink: &Sender<GenerationEvent>,
        cancel: &CancelToken,
    ) -> Result<(), GenerateError> {
        let text = self.generate(prompt)?;
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }
        sink.send(GenerationEvent::Fragment(text))
            .map_err(|_| GenerateError::Cancelled)
    }
}

/// Consumer side of a running generation
pub struct GenerationHandle {
    rx: Receiver<GenerationEvent>,
    cancel: CancelToken,
}

/// Run `generator.stream` on a background thread
pub fn spawn_generation(generator: Arc<dyn ContentGenerator>, prompt: String) -> GenerationHandle {
    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let token = cancel.clone();

    std::thread::spawn(move || {
        log::info!("generating content for prompt {prompt:?}");
        let last = match generator.stream(&prompt, &tx, &token) {
            Ok(()) => GenerationEvent::Done,
            Err(GenerateError::Cancelled) => {
                log::info!("generation cancelled");
                return;
            }
            Err(e) => {
                log::error!("error generating content: {e}");
                GenerationEvent::Failed(e.to_string())
            }
        };
        let _ = tx.send(last);
    });

    GenerationHandle { rx, cancel }
}

impl GenerationHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Apply every event that has already arrived, without blocking
    pub fn drain_into(&self, assembler: &mut TextAssembler) -> Assembly {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    let status = assembler.apply(event);
                    if status != Assembly::Loading {
                        return status;
                    }
                }
                Err(TryRecvError::Empty) => return assembler.status(),
                Err(TryRecvError::Disconnected) => return assembler.disconnect(),
            }
        }
    }

    /// Block until the generation finishes and return the assembled text
    pub fn wait(self) -> Result<String, GenerateError> {
        let mut assembler = TextAssembler::new();
        for event in self.rx.iter() {
            if assembler.apply(event) != Assembly::Loading {
                break;
            }
        }
        match assembler.disconnect() {
            Assembly::Complete => Ok(assembler.into_text()),
            Assembly::Failed(msg) => Err(GenerateError::Api(msg)),
            Assembly::Loading | Assembly::Cancelled => Err(GenerateError::Cancelled),
        }
    }
}

impl Drop for GenerationHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    Loading,
    Complete,
    Failed(String),
    Cancelled,
}

/// Appends streamed fragments in arrival order. The text is only final once
/// the stream reports `Done`.
#[derive(Debug, Clone)]
pub struct TextAssembler {
    text: String,
    status: Assembly,
}

impl Default for TextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl TextAssembler {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            status: Assembly::Loading,
        }
    }

    pub fn apply(&mut self, event: GenerationEvent) -> Assembly {
        if self.status != Assembly::Loading {
            return self.status.clone();
        }
        match event {
            GenerationEvent::Fragment(chunk) => self.text.push_str(&chunk),
            GenerationEvent::Done => self.status = Assembly::Complete,
            GenerationEvent::Failed(msg) => self.status = Assembly::Failed(msg),
        }
        self.status.clone()
    }

    /// The producer went away; without a `Done` the text is incomplete
    fn disconnect(&mut self) -> Assembly {
        if self.status == Assembly::Loading {
            self.status = Assembly::Cancelled;
        }
        self.status.clone()
    }

    pub fn status(&self) -> Assembly {
        self.status.clone()
    }

    /// Text received so far (partial while loading)
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
