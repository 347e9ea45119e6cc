use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::sync::mpsc::Sender;
use std::time::Duration;

use super::{CancelToken, ContentGenerator, GenerateError, GenerationEvent};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<Content>,
    delta: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    content: Option<String>,
}

/// One line of a server-sent event stream
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine, GenerateError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    let chunk: ChatResponse = serde_json::from_str(data)
        .map_err(|e| GenerateError::Api(format!("bad stream chunk: {e}")))?;
    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .unwrap_or_default();
    Ok(if text.is_empty() {
        SseLine::Skip
    } else {
        SseLine::Delta(text)
    })
}

/// Chat-completions generator for OpenAI-compatible endpoints
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, GenerateError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            // streamed responses can legitimately take a while
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Build from `OPENAI_API_KEY`, with optional overrides
    pub fn from_env(base_url: Option<&str>, model: Option<&str>) -> Result<Self, GenerateError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(GenerateError::MissingApiKey)?;
        Self::new(
            base_url.unwrap_or(DEFAULT_BASE_URL),
            model.unwrap_or(DEFAULT_MODEL),
            api_key,
        )
    }

    fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::blocking::Response, GenerateError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerateError::Api(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

impl ContentGenerator for OpenAiGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let response: ChatResponse = self.send(prompt, false)?.json()?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }

    fn stream(
        &self,
        prompt: &str,
        sink: &Sender<GenerationEvent>,
        cancel: &CancelToken,
    ) -> Result<(), GenerateError> {
        let response = self.send(prompt, true)?;
        forward_sse(BufReader::new(response), sink, cancel)
    }
}

/// Forward streamed deltas to `sink` until `[DONE]`. A stream that ends
/// without it was cut off, so the text so far is not complete.
fn forward_sse<R: BufRead>(
    reader: R,
    sink: &Sender<GenerationEvent>,
    cancel: &CancelToken,
) -> Result<(), GenerateError> {
    for line in reader.lines() {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }
        match parse_sse_line(&line?)? {
            SseLine::Delta(text) => sink
                .send(GenerationEvent::Fragment(text))
                .map_err(|_| GenerateError::Cancelled)?,
            SseLine::Done => return Ok(()),
            SseLine::Skip => {}
        }
    }
    Err(GenerateError::Api("stream ended before [DONE]".into()))
}
