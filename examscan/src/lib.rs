//! # examscan
//!
//! The `examscan` library turns scanned exam papers into clean, validated
//! multiple choice questions. A vision model does the reading; this crate
//! drives it over several passes and repairs what it returns.
//!
//! ## Quick Start
//!
//! ### Pre-requirements
//! - Poppler: `sudo apt install poppler-utils` (PDF scans only)
//! - `OPENAI_API_KEY` (and optionally `OPENAI_API_MODEL`) in the environment
//!
//! ### Installation
//!
//! ```bash
//! cargo add examscan
//! ```
//!
//! ## Examples
//!
//! Extracting one scan with the OpenAI-backed collaborator:
//!
//! ```rust,no_run
//! # use examscan::config::{ExtractionConfig, Subject};
//! # use examscan::llm::OpenAiExtractor;
//! # use examscan::models::ScanDocument;
//! # use examscan::pipeline::MultiPassExtractor;
//! # async fn try_main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExtractionConfig::from_env(Subject::Math);
//! let controller = MultiPassExtractor::new(OpenAiExtractor::from_env(), config);
//! let document = ScanDocument::from_path(std::path::Path::new("paper.pdf"))?;
//! let outcome = controller.extract(&document).await; // never fails
//! println!("{} questions, stopped: {}", outcome.questions.len(), outcome.stop_reason);
//! # Ok(())
//! # }
//! ```
//!
//! The text repairs are plain functions and can be used on their own:
//!
//! ```rust
//! use examscan::latex::normalize;
//! use examscan::salvage::salvage;
//!
//! assert_eq!(normalize("x ≥ √2"), r"x \geq \sqrt{2}");
//! let value = salvage("```json\n{\"questions\": [{\"id\": \"Q1\"}, {\"id\": \"Q").unwrap();
//! assert_eq!(value["questions"].as_array().unwrap().len(), 1);
//! ```
//!
//! ## Tests
//!
//! ```sh
//! cargo test
//! ```

pub mod cleaner;
pub mod config;
pub mod converter;
pub mod integral;
pub mod latex;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod salvage;
pub mod topics;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_utils;
