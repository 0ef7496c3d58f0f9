use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Difficulty of a question.
///
/// Parsing is case-insensitive; "Medium" is read as `Moderate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum Difficulty {
    Easy,
    #[strum(to_string = "Moderate", serialize = "Medium")]
    Moderate,
    Hard,
}

/// Percentage-based region of a page holding a diagram.
///
/// # Fields
///
/// * `page_number` - 1-based page number in the scanned document
/// * `x` - Left edge, in percent of the page width
/// * `y` - Top edge, in percent of the page height
/// * `width` - Region width, in percent of the page width
/// * `height` - Region height, in percent of the page height
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualBoundingBox {
    #[serde(default = "first_page")]
    pub page_number: u32,
    #[serde(deserialize_with = "percent")]
    pub x: f64,
    #[serde(deserialize_with = "percent")]
    pub y: f64,
    #[serde(deserialize_with = "percent")]
    pub width: f64,
    #[serde(deserialize_with = "percent")]
    pub height: f64,
}

impl VisualBoundingBox {
    /// True when the whole region lies within the page.
    pub fn is_within_page(&self) -> bool {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        in_range(self.x)
            && in_range(self.y)
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 100.0
            && self.y + self.height <= 100.0
    }
}

/// One parsed exam question.
///
/// Field names follow the camelCase JSON emitted by the extraction model.
/// Deserialization is lenient: numeric ids, string marks, unknown
/// difficulty labels, bad option indexes and broken bounding boxes are
/// accepted so that one odd field does not drop the whole question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedQuestion {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub options: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient_index",
        skip_serializing_if = "Option::is_none"
    )]
    pub correct_option_index: Option<usize>,
    #[serde(default = "one_mark", deserialize_with = "lenient_marks")]
    pub marks: i64,
    #[serde(default, deserialize_with = "lenient_difficulty")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub topic: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blooms: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub solution: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_visual_element: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_element_description: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_bounding_box",
        skip_serializing_if = "Option::is_none"
    )]
    pub visual_bounding_box: Option<VisualBoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Path of the cropped diagram image, filled by a diagram cropper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram_image: Option<String>,
}

impl Default for ExtractedQuestion {
    fn default() -> Self {
        ExtractedQuestion {
            id: String::new(),
            text: String::new(),
            options: Vec::new(),
            correct_option_index: None,
            marks: 1,
            difficulty: None,
            topic: String::new(),
            domain: String::new(),
            blooms: None,
            solution: None,
            has_visual_element: false,
            visual_element_type: None,
            visual_element_description: None,
            visual_bounding_box: None,
            source: None,
            diagram_image: None,
        }
    }
}

impl ExtractedQuestion {
    pub fn new(id: &str, text: &str) -> Self {
        ExtractedQuestion {
            id: id.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// Question number carried in the id ("Q17" -> 17), if any.
    pub fn number(&self) -> Option<u32> {
        let digits: String = self
            .id
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

/// A single problem found by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub question_id: String,
    pub field: String,
    pub error: String,
}

impl ValidationError {
    pub fn new(question_id: &str, field: &str, error: impl Into<String>) -> Self {
        ValidationError {
            question_id: question_id.to_string(),
            field: field.to_string(),
            error: error.into(),
        }
    }
}

/// Outcome of validating a list of questions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub question_count: usize,
}

/// The envelope returned by one extraction call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionBatch {
    #[serde(default)]
    pub questions: Vec<ExtractedQuestion>,
}

impl ExtractionBatch {
    /// Reads a batch from salvaged JSON.
    ///
    /// Accepts `{"questions": [...]}` or a bare array. Entries that are not
    /// question objects are skipped with a warning.
    pub fn from_value(value: Value) -> ExtractionBatch {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("questions") {
                Some(Value::Array(items)) => items,
                _ => {
                    tracing::warn!("Extraction response has no questions array");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let mut questions = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<ExtractedQuestion>(item) {
                Ok(q) => questions.push(q),
                Err(e) => tracing::warn!("Skipping malformed question at index {}: {}", i, e),
            }
        }
        ExtractionBatch { questions }
    }
}

/// An opaque scanned document: raw bytes plus declared MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanDocument {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ScanDocument {
    pub fn new(name: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
        ScanDocument {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
        }
    }

    /// Reads a file and guesses its MIME type from the extension.
    pub fn from_path(path: &std::path::Path) -> std::io::Result<ScanDocument> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let mime_type = match extension.as_str() {
            "pdf" => "application/pdf",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        };
        Ok(ScanDocument::new(&name, mime_type, bytes))
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf"
    }
}

fn first_page() -> u32 {
    1
}

fn one_mark() -> i64 {
    1
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_marks<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(1),
        Value::String(s) => s.trim().parse().unwrap_or(1),
        _ => 1,
    })
}

fn lenient_difficulty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Difficulty>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Negative, fractional or unparsable indexes become `None`.
fn lenient_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().map(|i| i as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    })
}

fn lenient_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn lenient_bounding_box<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<VisualBoundingBox>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(bbox) => Ok(Some(bbox)),
        Err(e) => {
            tracing::warn!("Ignoring malformed visual bounding box: {}", e);
            Ok(None)
        }
    }
}

/// Accepts `12.5` as well as `"12.5%"`.
fn percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("percentage out of range")),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid percentage: {}", s))),
        other => Err(de::Error::custom(format!("invalid percentage: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_question_fields() {
        let q: ExtractedQuestion = serde_json::from_value(json!({
            "id": 7,
            "text": "Find $x$.",
            "options": ["(A) 1", "(B) 2", 3, null],
            "marks": "4",
            "difficulty": "medium",
            "topic": "Matrices",
            "hasVisualElement": true,
            "visualBoundingBox": {"pageNumber": 2, "x": "10%", "y": 20, "width": "80 %", "height": "30%"}
        }))
        .unwrap();

        assert_eq!(q.id, "7");
        assert_eq!(q.options, vec!["(A) 1", "(B) 2", "3", ""]);
        assert_eq!(q.marks, 4);
        assert_eq!(q.difficulty, Some(Difficulty::Moderate));
        let bbox = q.visual_bounding_box.unwrap();
        assert_eq!(bbox.page_number, 2);
        assert_eq!(bbox.x, 10.0);
        assert_eq!(bbox.width, 80.0);
        assert!(bbox.is_within_page());
    }

    #[test]
    fn test_odd_fields_keep_the_question() {
        let batch = ExtractionBatch::from_value(json!({
            "questions": [
                {"id": "Q1", "text": "a", "correctOptionIndex": -1},
                {"id": "Q2", "text": "b", "correctOptionIndex": "2", "hasVisualElement": "true"},
                {"id": "Q3", "text": "c", "hasVisualElement": "false", "solution": {"steps": [1, 2]}},
                {"id": "Q4", "text": "d", "hasVisualElement": true, "visualBoundingBox": {"y": 5, "width": 10, "height": 10}},
                {"id": "Q5", "text": "e", "correctOptionIndex": 1.5, "solution": 42, "visualBoundingBox": "top left"}
            ]
        }));
        let qs = &batch.questions;
        assert_eq!(qs.len(), 5);

        assert_eq!(qs[0].correct_option_index, None);
        assert_eq!(qs[1].correct_option_index, Some(2));
        assert!(qs[1].has_visual_element);
        assert!(!qs[2].has_visual_element);
        assert_eq!(qs[2].solution.as_deref(), Some(r#"{"steps":[1,2]}"#));
        assert!(qs[3].has_visual_element);
        assert_eq!(qs[3].visual_bounding_box, None);
        assert_eq!(qs[4].correct_option_index, None);
        assert_eq!(qs[4].solution.as_deref(), Some("42"));
        assert_eq!(qs[4].visual_bounding_box, None);
    }

    #[test]
    fn test_defaults_and_unknown_difficulty() {
        let q: ExtractedQuestion =
            serde_json::from_value(json!({"id": "Q1", "difficulty": "Impossible"})).unwrap();
        assert_eq!(q.marks, 1);
        assert_eq!(q.difficulty, None);
        assert!(q.options.is_empty());
        assert_eq!(q.number(), Some(1));
    }

    #[test]
    fn test_batch_from_object_and_array() {
        let batch = ExtractionBatch::from_value(json!({
            "questions": [{"id": "Q1", "text": "a"}, "not a question", {"id": "Q2", "text": "b"}]
        }));
        assert_eq!(batch.questions.len(), 2);
        assert_eq!(batch.questions[1].id, "Q2");

        let batch = ExtractionBatch::from_value(json!([{"id": "Q3", "text": "c"}]));
        assert_eq!(batch.questions.len(), 1);

        let batch = ExtractionBatch::from_value(json!({"answer": 42}));
        assert!(batch.questions.is_empty());
    }

    #[test]
    fn test_serialize_camel_case() {
        let mut q = ExtractedQuestion::new("Q1", "text");
        q.correct_option_index = Some(2);
        let value = serde_json::to_value(&q).unwrap();
        assert_eq!(value["correctOptionIndex"], json!(2));
        assert_eq!(value["hasVisualElement"], json!(false));
        assert!(value.get("source").is_none());
    }

    #[test]
    fn test_question_number() {
        assert_eq!(ExtractedQuestion::new("Q17", "").number(), Some(17));
        assert_eq!(ExtractedQuestion::new("F2-Q3", "").number(), Some(2));
        assert_eq!(ExtractedQuestion::new("abc", "").number(), None);
    }
}
