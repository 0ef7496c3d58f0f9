//! Schema checks for extracted questions.
//!
//! Validation never fails: problems are returned as [`ValidationError`]s so
//! a caller can show them to a reviewer.

use crate::cleaner::{self, has_merged_run, OPTION_LABELS};
use crate::config::Subject;
use crate::models::{ExtractedQuestion, ValidationError, ValidationReport};

/// Letter runs this long are reported as merged words.
pub const MERGED_WORD_REPORT_MIN: usize = 15;

/// Checks one question against the schema. Every rule is evaluated.
///
/// # Arguments
///
/// * `question` - The question to check.
/// * `index` - Position in the batch, used as id when the question has none.
///
/// # Returns
///
/// All problems found, empty when the question is valid.
pub fn validate_question(question: &ExtractedQuestion, index: usize) -> Vec<ValidationError> {
    let id = if question.id.trim().is_empty() {
        format!("Q{}", index + 1)
    } else {
        question.id.clone()
    };
    let mut errors = Vec::new();

    if question.text.trim().is_empty() {
        errors.push(ValidationError::new(&id, "text", "Missing or empty text"));
    } else if has_merged_run(&question.text, MERGED_WORD_REPORT_MIN) {
        errors.push(ValidationError::new(
            &id,
            "text",
            "Suspected merged words (no spaces)",
        ));
    }

    match question.options.len() {
        0 => errors.push(ValidationError::new(&id, "options", "No options provided")),
        4 => {
            for (i, (option, label)) in question.options.iter().zip(OPTION_LABELS).enumerate() {
                let field = format!("options[{}]", i);
                if !option.starts_with(label) {
                    errors.push(ValidationError::new(
                        &id,
                        &field,
                        format!("Should start with {}", label),
                    ));
                } else if option[label.len()..].trim().is_empty() {
                    errors.push(ValidationError::new(&id, &field, "Option is empty"));
                }
            }
        }
        n => errors.push(ValidationError::new(
            &id,
            "options",
            format!("Expected 4 options, got {}", n),
        )),
    }

    if let Some(index) = question.correct_option_index {
        if index >= OPTION_LABELS.len() {
            errors.push(ValidationError::new(
                &id,
                "correctOptionIndex",
                format!("Index {} is out of range 0..4", index),
            ));
        }
    }

    if question.marks < 1 {
        errors.push(ValidationError::new(&id, "marks", "Marks must be >= 1"));
    }

    if question.difficulty.is_none() {
        errors.push(ValidationError::new(
            &id,
            "difficulty",
            "Must be Easy|Moderate|Hard",
        ));
    }

    if cleaner::is_placeholder_topic(&question.topic) {
        errors.push(ValidationError::new(
            &id,
            "topic",
            "Topic should be specific, not General or empty",
        ));
    }

    if question.domain.trim().is_empty() {
        errors.push(ValidationError::new(&id, "domain", "Domain is required"));
    }

    if let Some(bbox) = &question.visual_bounding_box {
        if !bbox.is_within_page() {
            errors.push(ValidationError::new(
                &id,
                "visualBoundingBox",
                "Bounding box must lie within 0-100% of the page",
            ));
        }
    }

    errors
}

/// Auto-fixes every question, then validates the fixed batch.
///
/// # Arguments
///
/// * `questions` - The questions to repair and check.
/// * `subject` - Supplies defaults for the auto-fixer.
///
/// # Returns
///
/// The fixed questions and the validation report for them.
pub fn validate_extraction(
    questions: &[ExtractedQuestion],
    subject: Subject,
) -> (Vec<ExtractedQuestion>, ValidationReport) {
    let fixed: Vec<ExtractedQuestion> = questions
        .iter()
        .map(|q| cleaner::auto_fix(q, subject))
        .collect();
    let report = validate_questions(&fixed);
    (fixed, report)
}

/// Validates questions as they are.
pub fn validate_questions(questions: &[ExtractedQuestion]) -> ValidationReport {
    let errors: Vec<ValidationError> = questions
        .iter()
        .enumerate()
        .flat_map(|(i, q)| validate_question(q, i))
        .collect();

    if !errors.is_empty() {
        tracing::info!(
            "Validation found {} problem(s) in {} question(s)",
            errors.len(),
            questions.len()
        );
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        question_count: questions.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, VisualBoundingBox};

    fn valid_question() -> ExtractedQuestion {
        let mut q = ExtractedQuestion::new("Q1", "If $x^2 = 4$, find $x$.");
        q.options = vec![
            "(A) 1".to_string(),
            "(B) 2".to_string(),
            "(C) 3".to_string(),
            "(D) 4".to_string(),
        ];
        q.difficulty = Some(Difficulty::Easy);
        q.topic = "Quadratic Equations".to_string();
        q.domain = "Algebra".to_string();
        q
    }

    fn fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_question() {
        assert!(validate_question(&valid_question(), 0).is_empty());
    }

    #[test]
    fn test_all_rules_are_evaluated() {
        let mut q = ExtractedQuestion::new("", "");
        q.options = vec!["1".to_string(), "2".to_string()];
        q.marks = 0;
        q.topic = "general".to_string();
        q.correct_option_index = Some(4);

        let errors = validate_question(&q, 2);
        assert!(errors.iter().all(|e| e.question_id == "Q3"));
        assert_eq!(
            fields(&errors),
            vec!["text", "options", "correctOptionIndex", "marks", "difficulty", "topic", "domain"]
        );
    }

    #[test]
    fn test_option_prefixes_and_placeholders() {
        let mut q = valid_question();
        q.options[1] = "(C) 2".to_string();
        q.options[3] = "(D)".to_string();
        let errors = validate_question(&q, 0);
        assert_eq!(fields(&errors), vec!["options[1]", "options[3]"]);
        assert_eq!(errors[0].error, "Should start with (B)");
        assert_eq!(errors[1].error, "Option is empty");
    }

    #[test]
    fn test_merged_words_ignore_commands() {
        let mut q = valid_question();
        q.text = r"Evaluate $\displaystylefraction$ here".to_string();
        assert!(validate_question(&q, 0).is_empty());

        q.text = "Thecoordinatesofthepoint".to_string();
        assert_eq!(fields(&validate_question(&q, 0)), vec!["text"]);
    }

    #[test]
    fn test_bounding_box_range() {
        let mut q = valid_question();
        q.visual_bounding_box = Some(VisualBoundingBox {
            page_number: 1,
            x: 50.0,
            y: 10.0,
            width: 60.0,
            height: 20.0,
        });
        assert_eq!(fields(&validate_question(&q, 0)), vec!["visualBoundingBox"]);
    }

    #[test]
    fn test_validate_extraction_fixes_first() {
        let mut q = valid_question();
        q.options = vec!["1".to_string(), "2".to_string()];
        q.topic = String::new();
        let (fixed, report) = validate_extraction(&[q], Subject::Math);

        assert_eq!(report.question_count, 1);
        assert_eq!(fixed[0].topic, "Mathematics");
        assert_eq!(fixed[0].options.len(), 4);
        // the two synthesized placeholders stay flagged
        assert!(!report.valid);
        assert_eq!(fields(&report.errors), vec!["options[2]", "options[3]"]);
    }

    #[test]
    fn test_validate_empty_batch() {
        let (fixed, report) = validate_extraction(&[], Subject::Biology);
        assert!(fixed.is_empty());
        assert!(report.valid);
        assert_eq!(report.question_count, 0);
    }
}
