//! Multi-pass extraction controller.
//!
//! A single model call rarely returns every question of a long paper, so the
//! controller keeps calling the extraction collaborator, each time asking it
//! to resume after the last question it has, until the subject's target count
//! is reached, a pass adds nothing new, a pass fails, or the pass ceiling is
//! hit. Whatever was accumulated before a failure is always returned.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use strum::Display;

use crate::cleaner;
use crate::config::{ExtractionConfig, Subject};
use crate::converter::DiagramCropper;
use crate::integral::fix_integral_hallucinations;
use crate::latex::normalize;
use crate::llm::{PassRequest, QuestionExtractor};
use crate::models::{ExtractedQuestion, ExtractionBatch, ScanDocument, ValidationReport};
use crate::retry::with_retry;
use crate::salvage::salvage;
use crate::topics;
use crate::validator;


/// Something worth telling a progress display about.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEvent {
    /// A pass is starting.
    Progress {
        current: u32,
        total: u32,
        found: usize,
    },
    /// A rate-limited call is about to be retried.
    Backoff {
        pass: u32,
        attempt: u32,
        delay: Duration,
    },
    PassCompleted {
        pass: u32,
        new_questions: usize,
        total: usize,
    },
    PassFailed {
        pass: u32,
        error: String,
    },
}

/// Receives pipeline events. Implemented for any `Fn(&ExtractionEvent)`.
pub trait ExtractionObserver: Send + Sync {
    fn on_event(&self, event: &ExtractionEvent);
}

impl<F> ExtractionObserver for F
where
    F: Fn(&ExtractionEvent) + Send + Sync,
{
    fn on_event(&self, event: &ExtractionEvent) {
        self(event)
    }
}

/// Shared flag that stops the controller before its next pass.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the pass loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum StopReason {
    TargetReached,
    PassLimit,
    /// A pass returned no new questions.
    Exhausted,
    /// A call failed; earlier passes are kept.
    PassFailed,
    Cancelled,
}

/// Result of one extraction session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub questions: Vec<ExtractedQuestion>,
    pub passes: u32,
    pub stop_reason: StopReason,
    pub report: ValidationReport,
}

/// Per-document line of a multi-document run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub name: String,
    pub passes: u32,
    pub stop_reason: StopReason,
    pub question_count: usize,
}

/// Merged result of several documents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedExtraction {
    pub questions: Vec<ExtractedQuestion>,
    pub documents: Vec<DocumentSummary>,
    pub report: ValidationReport,
}

/// Normalizes the LaTeX of every text field and repairs hallucinated integrals.
pub fn normalize_question(question: &ExtractedQuestion) -> ExtractedQuestion {
    let mut q = question.clone();
    q.text = fix_integral_hallucinations(&normalize(&q.text));
    q.options = q
        .options
        .iter()
        .map(|o| fix_integral_hallucinations(&normalize(o)))
        .collect();
    q.solution = q
        .solution
        .as_deref()
        .map(|s| fix_integral_hallucinations(&normalize(s)));
    q.visual_element_description = q.visual_element_description.as_deref().map(normalize);
    q
}

/// Full per-question processing: normalization, topic mapping and auto-fix.
///
/// An unmapped topic is left as the model wrote it; the auto-fixer only
/// replaces empty or placeholder topics.
pub fn process_question(question: &ExtractedQuestion, subject: Subject) -> ExtractedQuestion {
    let mut q = normalize_question(question);
    if let Some(official) = topics::match_topic(&q.topic, subject) {
        if official != q.topic {
            tracing::debug!("Mapped topic \"{}\" to \"{}\"", q.topic, official);
        }
        q.topic = official.to_string();
    }
    cleaner::auto_fix(&q, subject)
}

/// Turns one raw model response into processed questions.
///
/// An unparsable response yields an empty list.
pub fn process_response(raw: &str, subject: Subject) -> Vec<ExtractedQuestion> {
    let batch = match salvage(raw) {
        Some(value) => ExtractionBatch::from_value(value),
        None => {
            tracing::warn!("Could not salvage JSON from a {} byte response", raw.len());
            ExtractionBatch::default()
        }
    };
    batch
        .questions
        .iter()
        .map(|q| process_question(q, subject))
        .collect()
}

fn text_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Drives the extraction collaborator over several passes for one document.
pub struct MultiPassExtractor<E: QuestionExtractor> {
    extractor: E,
    config: ExtractionConfig,
    observer: Option<Arc<dyn ExtractionObserver>>,
    cropper: Option<Arc<dyn DiagramCropper>>,
    cancel: CancelFlag,
}

impl<E: QuestionExtractor> MultiPassExtractor<E> {
    pub fn new(extractor: E, config: ExtractionConfig) -> Self {
        MultiPassExtractor {
            extractor,
            config,
            observer: None,
            cropper: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl ExtractionObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn with_cropper(mut self, cropper: impl DiagramCropper + 'static) -> Self {
        self.cropper = Some(Arc::new(cropper));
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    fn emit(&self, event: ExtractionEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }

    fn pass_request(&self, pass: u32, accumulated: &[ExtractedQuestion]) -> PassRequest {
        PassRequest {
            pass,
            subject: self.config.subject,
            grade: self.config.grade.clone(),
            prompt: format!(
                "{}\n\n{}",
                self.config.prompt,
                topics::topic_instruction(self.config.subject)
            ),
            start_from: accumulated.len() + 1,
            target: self.config.target_questions,
            already_extracted: accumulated.iter().filter_map(|q| q.number()).collect(),
        }
    }

    /// Runs the pass loop for one document.
    ///
    /// # Arguments
    ///
    /// * `document` - The scan to extract from.
    ///
    /// # Returns
    ///
    /// The accumulated questions, numbered `Q1..Qn`, with the reason the loop
    /// stopped and a validation report. Never fails: a failed pass ends the
    /// loop and keeps what earlier passes produced.
    pub async fn extract(&self, document: &ScanDocument) -> ExtractionOutcome {
        let mut questions: Vec<ExtractedQuestion> = Vec::new();
        let mut seen_numbers: HashSet<u32> = HashSet::new();
        let mut passes = 0;
        let mut stop_reason = StopReason::PassLimit;

        for pass in 1..=self.config.max_passes {
            if self.cancel.is_cancelled() {
                tracing::info!("Extraction of {} cancelled before pass {}", document.name, pass);
                stop_reason = StopReason::Cancelled;
                break;
            }
            passes = pass;
            self.emit(ExtractionEvent::Progress {
                current: pass,
                total: self.config.max_passes,
                found: questions.len(),
            });

            let request = self.pass_request(pass, &questions);
            if request.is_continuation() {
                tracing::info!(
                    "Pass {}: have {} of {} questions, resuming from Q{}",
                    pass,
                    questions.len(),
                    self.config.target_questions,
                    request.start_from
                );
            }

            let response = with_retry(
                &self.config.retry,
                |_| self.extractor.extract(document, &request),
                |attempt, delay| {
                    self.emit(ExtractionEvent::Backoff {
                        pass,
                        attempt,
                        delay,
                    })
                },
            )
            .await;

            let raw = match response {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(
                        "Pass {} on {} failed, keeping {} question(s): {}",
                        pass,
                        document.name,
                        questions.len(),
                        e
                    );
                    self.emit(ExtractionEvent::PassFailed {
                        pass,
                        error: e.to_string(),
                    });
                    stop_reason = StopReason::PassFailed;
                    break;
                }
            };

            let added = self
                .append_new(
                    &mut questions,
                    &mut seen_numbers,
                    process_response(&raw, self.config.subject),
                    document,
                )
                .await;
            tracing::info!(
                "Pass {} added {} question(s), {} in total",
                pass,
                added,
                questions.len()
            );
            self.emit(ExtractionEvent::PassCompleted {
                pass,
                new_questions: added,
                total: questions.len(),
            });

            if added == 0 {
                stop_reason = StopReason::Exhausted;
                break;
            }
            if questions.len() >= self.config.target_questions {
                stop_reason = StopReason::TargetReached;
                break;
            }
        }

        let report = validator::validate_questions(&questions);
        ExtractionOutcome {
            questions,
            passes,
            stop_reason,
            report,
        }
    }

    /// Appends questions not seen before, numbering them after the
    /// accumulated ones. Returns how many were added.
    ///
    /// `seen_numbers` holds the numbers the model gave, never the assigned
    /// `Q{n}` ids.
    async fn append_new(
        &self,
        accumulated: &mut Vec<ExtractedQuestion>,
        seen_numbers: &mut HashSet<u32>,
        candidates: Vec<ExtractedQuestion>,
        document: &ScanDocument,
    ) -> usize {
        let mut texts: HashSet<String> = accumulated.iter().map(|q| text_key(&q.text)).collect();
        let mut added = 0;

        for mut question in candidates {
            let key = text_key(&question.text);
            let seen_number = question.number().is_some_and(|n| seen_numbers.contains(&n));
            if seen_number || (!key.is_empty() && texts.contains(&key)) {
                tracing::debug!("Dropping duplicate question {}", question.id);
                continue;
            }

            if let Some(original) = question.number() {
                seen_numbers.insert(original);
            }
            let number = accumulated.len() + 1;
            question.id = format!("Q{}", number);
            self.attach_diagram(&mut question, document).await;

            texts.insert(key);
            accumulated.push(question);
            added += 1;
        }
        added
    }

    async fn attach_diagram(&self, question: &mut ExtractedQuestion, document: &ScanDocument) {
        let (Some(cropper), Some(bbox)) = (&self.cropper, &question.visual_bounding_box) else {
            return;
        };
        if !question.has_visual_element {
            return;
        }
        let cropped = cropper.crop(document, bbox, &question.id).await;
        match cropped {
            Ok(image) => question.diagram_image = Some(image),
            Err(e) => tracing::warn!("Could not crop diagram for {}: {}", question.id, e),
        }
    }

    /// Extracts several documents with at most `config.concurrency` sessions
    /// in flight and merges the results in input order.
    ///
    /// With more than one document, ids are prefixed `F{i}-` (1-based) and
    /// `source` is set to the document name.
    pub async fn extract_documents(&self, documents: &[ScanDocument]) -> MergedExtraction {
        let outcomes: Vec<ExtractionOutcome> = stream::iter(documents)
            .map(|document| self.extract(document))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let prefix_ids = documents.len() > 1;
        let mut questions = Vec::new();
        let mut summaries = Vec::with_capacity(documents.len());
        for (i, (document, outcome)) in documents.iter().zip(outcomes).enumerate() {
            summaries.push(DocumentSummary {
                name: document.name.clone(),
                passes: outcome.passes,
                stop_reason: outcome.stop_reason,
                question_count: outcome.questions.len(),
            });
            for mut question in outcome.questions {
                if prefix_ids {
                    question.id = format!("F{}-{}", i + 1, question.id);
                }
                question.source = Some(document.name.clone());
                questions.push(question);
            }
        }

        let report = validator::validate_questions(&questions);
        MergedExtraction {
            questions,
            documents: summaries,
            report,
        }
    }
}
