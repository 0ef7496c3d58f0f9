use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::retry::RetryPolicy;

/// Pass ceiling of the multi-pass controller.
pub const DEFAULT_MAX_PASSES: u32 = 5;

/// Default extraction prompt. The real prompt is product configuration and is
/// normally loaded from a file by the caller.
pub const DEFAULT_PROMPT: &str = r#"Extract every multiple choice question from the attached exam paper pages.
Return JSON only, shaped as {"questions": [...]}. Each question has: id, text, options (exactly four strings
starting with (A), (B), (C), (D)), marks, difficulty (Easy|Moderate|Hard), topic, domain, blooms,
hasVisualElement, visualElementType, visualElementDescription, visualBoundingBox {pageNumber, x, y, width, height}
in percent of the page. Write all mathematics as LaTeX inside $...$ delimiters."#;

/// Exam subject. Parsing is case-insensitive and accepts the common long forms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Subject {
    #[strum(to_string = "Math", serialize = "Mathematics", serialize = "Maths")]
    Math,
    Physics,
    Chemistry,
    Biology,
}

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Math,
        Subject::Physics,
        Subject::Chemistry,
        Subject::Biology,
    ];

    /// Number of questions a full paper of this subject is expected to hold.
    pub fn target_questions(&self) -> usize {
        match self {
            Subject::Math => 60,
            _ => 50,
        }
    }

    /// Topic written into questions whose topic is empty or "General".
    pub fn default_topic(&self) -> &'static str {
        match self {
            Subject::Math => "Mathematics",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Biology => "Biology",
        }
    }

    /// Domain written into questions that arrive without one.
    pub fn default_domain(&self) -> &'static str {
        match self {
            Subject::Math => "Algebra",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Biology => "Biology",
        }
    }
}

/// `ExtractionConfig` holds everything one extraction session needs to know.
///
/// # Fields
///
/// * `subject` - The subject of the scanned paper.
/// * `grade` - Free-form grade label handed to the prompt (e.g. "12").
/// * `max_passes` - Hard ceiling on extraction passes.
/// * `target_questions` - Stop once this many questions are accumulated.
/// * `retry` - Backoff policy for rate-limited calls.
/// * `prompt` - Opaque prompt text forwarded to the extraction collaborator.
/// * `concurrency` - How many documents may be extracted at once.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub subject: Subject,
    pub grade: String,
    pub max_passes: u32,
    pub target_questions: usize,
    pub retry: RetryPolicy,
    pub prompt: String,
    pub concurrency: usize,
}

impl ExtractionConfig {
    /// Creates a configuration with the defaults for `subject`.
    ///
    /// # Arguments
    ///
    /// * `subject` - The subject of the scanned paper.
    ///
    /// # Returns
    ///
    /// A new `ExtractionConfig` with a 5 pass ceiling, the subject's target
    /// question count and the default retry policy.
    pub fn new(subject: Subject) -> ExtractionConfig {
        ExtractionConfig {
            subject,
            grade: "12".to_string(),
            max_passes: DEFAULT_MAX_PASSES,
            target_questions: subject.target_questions(),
            retry: RetryPolicy::default(),
            prompt: DEFAULT_PROMPT.to_string(),
            concurrency: 1,
        }
    }

    /// Creates a configuration for `subject` and applies `EXAMSCAN_*`
    /// environment overrides. Values that fail to parse are ignored.
    pub fn from_env(subject: Subject) -> ExtractionConfig {
        let mut config = ExtractionConfig::new(subject);
        config.max_passes = env_parse("EXAMSCAN_MAX_PASSES", config.max_passes);
        config.target_questions = env_parse("EXAMSCAN_TARGET_QUESTIONS", config.target_questions);
        config.retry.max_attempts = env_parse("EXAMSCAN_RETRY_ATTEMPTS", config.retry.max_attempts);
        let base_ms = env_parse(
            "EXAMSCAN_RETRY_BASE_MS",
            config.retry.base_delay.as_millis() as u64,
        );
        config.retry.base_delay = std::time::Duration::from_millis(base_ms);
        config.concurrency = env_parse("EXAMSCAN_CONCURRENCY", config.concurrency).max(1);
        config
    }

    pub fn with_grade(mut self, grade: &str) -> Self {
        self.grade = grade.to_string();
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.to_string();
        self
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
