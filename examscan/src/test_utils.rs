//! Scripted extraction collaborators for tests. Nothing here touches the network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{ExtractionError, PassRequest, QuestionExtractor};
use crate::models::ScanDocument;

/// JSON object for one well-formed question numbered `number`.
pub fn question_json(number: usize, text: &str) -> Value {
    json!({
        "id": format!("Q{}", number),
        "text": text,
        "options": ["(A) 1", "(B) 2", "(C) 3", "(D) 4"],
        "marks": 1,
        "difficulty": "Easy",
        "topic": "Matrices",
        "domain": "Algebra"
    })
}

/// `{"questions": [...]}` response text for the inclusive number range.
pub fn batch_response(first: usize, last: usize) -> String {
    let questions: Vec<Value> = (first..=last)
        .map(|n| question_json(n, &format!("Find the value of $x_{{{}}}$ when $x = {}$.", n, n)))
        .collect();
    json!({ "questions": questions }).to_string()
}

/// A small dummy scan.
pub fn sample_document(name: &str) -> ScanDocument {
    ScanDocument::new(name, "application/pdf", b"%PDF-1.4\n%%EOF\n".to_vec())
}

/// Serves questions from a fixed pool, `per_call` at a time, resuming from the
/// number in the pass request. Once the pool is drained it answers with an
/// empty batch.
pub struct PagedExtractor {
    pub per_call: usize,
    pub available: usize,
    calls: AtomicUsize,
    requests: Mutex<Vec<PassRequest>>,
}

impl PagedExtractor {
    pub fn new(per_call: usize, available: usize) -> Self {
        PagedExtractor {
            per_call,
            available,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PassRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionExtractor for PagedExtractor {
    async fn extract(
        &self,
        _document: &ScanDocument,
        request: &PassRequest,
    ) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let first = request.start_from;
        let last = (first + self.per_call - 1).min(self.available);
        if first > last {
            return Ok(r#"{"questions": []}"#.to_string());
        }
        Ok(batch_response(first, last))
    }
}

/// Replays a fixed list of outcomes, one per call. Calls past the end of the
/// script get an empty batch.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<String, ExtractionError>>>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new(script: Vec<Result<String, ExtractionError>>) -> Self {
        ScriptedExtractor {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _document: &ScanDocument,
        _request: &PassRequest,
    ) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"questions": []}"#.to_string()))
    }
}

/// Upstream message the way a rate-limited provider reports it.
pub fn rate_limited() -> ExtractionError {
    ExtractionError::from_upstream("429 Too Many Requests: RESOURCE_EXHAUSTED")
}
