use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use exam_core::model::{QuestionDraft, QuestionRequest};

use crate::error::QuestionSourceError;
use crate::question_source::QuestionSource;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, Debug)]
pub struct AiSourceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl AiSourceConfig {
    /// Read `EXAM_AI_API_KEY`, `EXAM_AI_BASE_URL` and `EXAM_AI_MODEL`.
    ///
    /// Returns `None` when no API key is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("EXAM_AI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url = env::var("EXAM_AI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let model = env::var("EXAM_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Some(Self {
            base_url,
            api_key,
            model,
        })
    }
}

/// Question source backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct AiQuestionSource {
    client: Client,
    config: Option<AiSourceConfig>,
}

impl AiQuestionSource {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(AiSourceConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<AiSourceConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    async fn complete(
        &self,
        config: &AiSourceConfig,
        prompt: String,
    ) -> Result<String, QuestionSourceError> {
        let url = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.7,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "question generation request rejected");
            return Err(QuestionSourceError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(QuestionSourceError::EmptyResponse)
    }
}

#[async_trait]
impl QuestionSource for AiQuestionSource {
    #[instrument(
        skip(self, request),
        fields(topics = request.topics.len(), requested = request.num_questions)
    )]
    async fn generate(
        &self,
        request: &QuestionRequest,
    ) -> Result<Vec<QuestionDraft>, QuestionSourceError> {
        let config = self.config.as_ref().ok_or(QuestionSourceError::Disabled)?;
        let content = self.complete(config, build_prompt(request)).await?;
        let drafts = parse_questions(&content)?;
        debug!(received = drafts.len(), "question batch decoded");
        Ok(drafts)
    }
}

const SYSTEM_PROMPT: &str = "You write multiple-choice exam questions. \
Reply with a JSON object of the form {\"questions\": [{\"question\": string, \
\"options\": [string, string, string, string], \"correctAnswer\": string, \
\"topic\": string, \"difficulty\": \"easy\" | \"medium\" | \"hard\"}]}. \
Each question has exactly four options and correctAnswer repeats one of them verbatim.";

fn build_prompt(request: &QuestionRequest) -> String {
    let mut prompt = format!(
        "Generate {} questions covering these topics: {}.",
        request.num_questions,
        request.topics.join(", ")
    );
    if let Some(difficulty) = request.difficulty {
        prompt.push_str(&format!(" Difficulty: {difficulty}."));
    }
    prompt.push_str(" Spread the questions evenly across the topics.");
    prompt
}

/// Decode the model reply. Accepts a bare array, `{"questions": [...]}`,
/// and either wrapped in a Markdown code fence.
fn parse_questions(content: &str) -> Result<Vec<QuestionDraft>, QuestionSourceError> {
    let body = strip_code_fence(content.trim());
    if body.starts_with('[') {
        return serde_json::from_str(body)
            .map_err(|err| QuestionSourceError::Malformed(err.to_string()));
    }
    let envelope: QuestionEnvelope = serde_json::from_str(body)
        .map_err(|err| QuestionSourceError::Malformed(err.to_string()))?;
    Ok(envelope.questions)
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Deserialize)]
struct QuestionEnvelope {
    questions: Vec<QuestionDraft>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}
