use cgisf_lib::cgisf;
use rand::Rng;
use std::sync::mpsc::Sender;

use super::{CancelToken, ContentGenerator, GenerateError, GenerationEvent};

/// Offline generator: random grammatical nonsense sentences. The prompt is
/// ignored.
#[derive(Debug, Clone, Copy)]
pub struct SentenceGenerator {
    pub sentences: usize,
}

impl Default for SentenceGenerator {
    fn default() -> Self {
        Self { sentences: 8 }
    }
}

impl SentenceGenerator {
    pub fn new(sentences: usize) -> Self {
        Self {
            sentences: sentences.max(1),
        }
    }

    fn sentence(rng: &mut impl Rng) -> String {
        cgisf(
            rng.gen_range(1..3),
            rng.gen_range(1..3),
            rng.gen_range(1..5),
            rng.gen_bool(0.5),
            rng.gen_range(1..3),
            rng.gen_bool(0.5),
        )
        .trim()
        .to_string()
    }
}

impl ContentGenerator for SentenceGenerator {
    fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
        let rng = &mut rand::thread_rng();
        let sentences: Vec<String> = (0..self.sentences).map(|_| Self::sentence(rng)).collect();
        Ok(sentences.join(" "))
    }

    fn stream(
        &self,
        _prompt: &str,
        sink: &Sender<GenerationEvent>,
        cancel: &CancelToken,
    ) -> Result<(), GenerateError> {
        let rng = &mut rand::thread_rng();
        for i in 0..self.sentences {
            if cancel.is_cancelled() {
                return Err(GenerateError::Cancelled);
            }
            let mut fragment = Self::sentence(rng);
            if i + 1 < self.sentences {
                fragment.push(' ');
            }
            sink.send(GenerationEvent::Fragment(fragment))
                .map_err(|_| GenerateError::Cancelled)?;
        }
        Ok(())
    }
}
