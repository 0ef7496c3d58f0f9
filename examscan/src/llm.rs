use async_trait::async_trait;
use openai_tools::chat::request::ChatCompletion;
use openai_tools::common::message::{Content, Message};
use openai_tools::common::role::Role;
use thiserror::Error;

use crate::config::Subject;
use crate::converter;
use crate::models::ScanDocument;

/// Default model to use when OPENAI_API_MODEL is not set
const DEFAULT_MODEL: &str = "gpt-5.2";

/// Markers that identify a rate-limit failure in upstream error text.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "rate_limit",
    "too many requests",
    "resource_exhausted",
    "quota_exceeded",
    "quota exceeded",
];

/// Failure kinds at the boundary to the external extraction collaborator.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Transient; retried with backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("extraction call failed: {0}")]
    Upstream(String),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("document conversion failed: {0}")]
    Conversion(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    /// Classifies an upstream error message. This is the only place where
    /// error text is inspected.
    pub fn from_upstream(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if RATE_LIMIT_MARKERS.iter().any(|m| lowered.contains(m)) {
            ExtractionError::RateLimited(message)
        } else {
            ExtractionError::Upstream(message)
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ExtractionError::RateLimited(_))
    }
}

/// Parameters of one extraction pass.
///
/// The extraction collaborator turns these into prompt text; the controller
/// never looks at the prompt itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PassRequest {
    pub pass: u32,
    pub subject: Subject,
    pub grade: String,
    pub prompt: String,
    /// Number the first new question should carry.
    pub start_from: usize,
    pub target: usize,
    /// Question numbers that must not be emitted again.
    pub already_extracted: Vec<u32>,
}

impl PassRequest {
    pub fn is_continuation(&self) -> bool {
        self.pass > 1
    }

    /// Full prompt for this pass: the configured prompt plus subject context
    /// and, after the first pass, the resume instruction.
    pub fn instructions(&self) -> String {
        let mut text = format!(
            "{}\n\nSubject: {}. Grade: {}. Expected questions: {}.",
            self.prompt, self.subject, self.grade, self.target
        );
        if self.is_continuation() {
            let numbers: Vec<String> =
                self.already_extracted.iter().map(|n| format!("Q{}", n)).collect();
            text.push_str(&format!(
                "\n\nThis is continuation pass {}. Questions {} are already extracted. \
                 Resume numbering from Q{} and do not output any of the questions listed above again.",
                self.pass,
                if numbers.is_empty() { "none".to_string() } else { numbers.join(", ") },
                self.start_from
            ));
        }
        text
    }
}

/// External collaborator that reads a document and answers with raw model
/// text, expected to be JSON shaped as `{"questions": [...]}`.
#[async_trait]
pub trait QuestionExtractor: Send + Sync {
    async fn extract(
        &self,
        document: &ScanDocument,
        request: &PassRequest,
    ) -> Result<String, ExtractionError>;
}

/// Check if LLM processing is available (OPENAI_API_KEY is set)
pub fn is_llm_available() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok()
}

/// Get the model ID to use for LLM calls.
/// Returns the value of OPENAI_API_MODEL environment variable, or DEFAULT_MODEL if not set.
pub fn get_model_id() -> String {
    std::env::var("OPENAI_API_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string())
}

/// Extraction collaborator backed by an OpenAI-compatible vision model.
///
/// Each pass renders the document into page images and sends all of them with
/// the pass instructions in a single user message.
#[derive(Debug, Clone)]
pub struct OpenAiExtractor {
    model_id: String,
}

impl OpenAiExtractor {
    pub fn new(model_id: &str) -> Self {
        OpenAiExtractor {
            model_id: model_id.to_string(),
        }
    }

    /// The model is determined by OPENAI_API_MODEL environment variable (default: gpt-5.2).
    pub fn from_env() -> Self {
        OpenAiExtractor::new(&get_model_id())
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl QuestionExtractor for OpenAiExtractor {
    async fn extract(
        &self,
        document: &ScanDocument,
        request: &PassRequest,
    ) -> Result<String, ExtractionError> {
        let pages = converter::render_pages(document)?;

        let mut contents = vec![Content::from_text(&request.instructions())];
        for image_path in pages.paths() {
            contents.push(Content::from_image_file(image_path));
        }
        let message = Message::from_message_array(Role::User, contents);

        tracing::debug!(
            "Sending {} page(s) of {} to {} (pass {})",
            pages.paths().len(),
            document.name,
            self.model_id,
            request.pass
        );

        let mut chat = ChatCompletion::new();
        let response = chat
            .model_id(&self.model_id)
            .messages(vec![message])
            .temperature(0.0)
            .chat()
            .await
            .map_err(|e| ExtractionError::from_upstream(e.to_string()))?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .and_then(|c| c.text.as_ref())
            .map(|t| t.to_string())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyResponse);
        }
        Ok(text)
    }
}
