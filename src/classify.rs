use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::IncidentType;

/// Maps a free-text description onto exactly one incident category.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, transcript: &str) -> AppResult<IncidentType>;
}

const PROMPT: &str = "You are an AI assistant that helps classify incident types based on the \
audio transcript provided by a security guard. Determine whether the incident falls under \
'Verbal Abuse', 'Intimidation', 'Micro-aggressions', or 'Other'.\n\n\
Audio Transcript: {transcript}\n\n\
Based on the audio transcript, classify the incident type. Respond ONLY with one of the \
following options: 'Verbal Abuse', 'Intimidation', 'Micro-aggressions', or 'Other'. \
No explanation is required.";

/// Calls an OpenAI-compatible chat completions endpoint.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl HttpClassifier {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, transcript: &str) -> AppResult<IncidentType> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: PROMPT.replace("{transcript}", transcript),
            }],
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: ChatResponse = request.send().await?.error_for_status()?.json().await?;
        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Classification("model returned no answer".to_string()))?;

        debug!(answer = %answer, "classifier replied");
        let incident_type = parse_label(&answer)?;
        info!(incident_type = %incident_type, "incident classified");
        Ok(incident_type)
    }
}

/// Accepts an exact category label wrapped in quotes, whitespace or a trailing period.
pub fn parse_label(answer: &str) -> AppResult<IncidentType> {
    let wrapping = |c: char| c.is_whitespace() || matches!(c, '\'' | '"' | '`');
    let cleaned = answer.trim_matches(wrapping);
    let cleaned = cleaned.strip_suffix('.').unwrap_or(cleaned).trim_matches(wrapping);
    cleaned
        .parse()
        .map_err(|_| AppError::Classification(format!("unexpected category '{}'", answer.trim())))
}
