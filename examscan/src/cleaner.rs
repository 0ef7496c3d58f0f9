//! Automatic repair of extracted questions.
//!
//! This module provides:
//! - Merged-word repair for text whose word spaces were lost
//! - Reassembly of piecewise functions split across lines
//! - Inverse trig notation (`arctan` -> `\tan^{-1}`)
//! - Option labelling so every question carries `(A)` to `(D)`
//! - Subject defaults for missing topic and domain
//!
//! Every fix is idempotent.

use regex::{Captures, NoExpand, Regex};
use std::sync::LazyLock;

use crate::config::Subject;
use crate::models::ExtractedQuestion;

pub const OPTION_LABELS: [&str; 4] = ["(A)", "(B)", "(C)", "(D)"];

/// A letter run at least this long is treated as merged words.
pub const MERGED_RUN_MIN: usize = 12;

/// Pieces still this long after dictionary splitting get the aggressive
/// two-letter and suffix splits.
const AGGRESSIVE_SPLIT_MIN: usize = 15;

const MAX_MERGE_ROUNDS: usize = 8;

/// Words inserted as separate tokens when found inside a merged run.
const DICTIONARY: &[&str] = &[
    // long
    "coordinates",
    "differential",
    "integration",
    "greatest",
    "integer",
    "bounded",
    "following",
    "solution",
    "equation",
    "function",
    "domain",
    "curve",
    "region",
    "area",
    "point",
    "matrix",
    "vector",
    "determinant",
    "derivative",
    // medium
    "degree",
    "order",
    "equal",
    "between",
    "triangle",
    "vertices",
    "limit",
    "continuous",
    "defined",
    "satisfy",
    "value",
    "range",
    "inverse",
    // short
    "that",
    "this",
    "then",
    "with",
    "from",
    "were",
    "have",
    "will",
    "would",
    "could",
    "should",
    "which",
    "their",
    "there",
    "where",
    "the",
    "and",
    "for",
    "are",
    "was",
    "has",
    "had",
    "been",
    "being",
];

/// Long real words that are never split, and are kept whole when they sit
/// inside a merged run.
const LONG_WORDS: &[&str] = &[
    "differentiability",
    "differentiable",
    "differentiation",
    "trigonometric",
    "perpendicular",
    "probability",
    "independent",
    "continuity",
    "simultaneous",
    "approximately",
    "corresponding",
    "respectively",
    "transformation",
    "displacement",
    "acceleration",
    "concentration",
    "electromagnetic",
    "thermodynamics",
    "instantaneous",
    "photosynthesis",
    "characteristic",
    "electrochemistry",
];

const SHORT_WORDS: &[&str] = &["of", "is", "be", "to", "in", "or", "if", "on", "at", "by", "an"];

const SUFFIXES: &[&str] = &["ed", "ing", "ion", "tion", "ness", "ment"];

/// Dictionary sorted longest first so that "there" wins over "the".
static DICTIONARY_BY_LENGTH: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut words = DICTIONARY.to_vec();
    words.extend_from_slice(LONG_WORDS);
    words.sort_by(|a, b| b.len().cmp(&a.len()));
    words
});

static LETTER_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\?[A-Za-z]+").unwrap());

static INVERSE_TRIG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\\)?\barc(tan|sin|cos)\b").unwrap());

static PIECEWISE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^:]+:[^:]+(<|>|≤|≥|\\le|\\ge)").unwrap());

static FUNCTION_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"f\(x\)\s*=\s*").unwrap());

static OPTION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\([A-Da-d]\)|[A-Da-d][.)])\s*").unwrap());

/// Returns true when `text` holds a letter run of at least `min` letters that
/// is neither a LaTeX command name nor a known long word.
pub fn has_merged_run(text: &str, min: usize) -> bool {
    LETTER_RUN.find_iter(text).any(|m| {
        let run = m.as_str();
        !run.starts_with('\\') && run.len() >= min && !is_long_word(run)
    })
}

fn is_long_word(run: &str) -> bool {
    let lower = run.to_ascii_lowercase();
    let singular = lower.strip_suffix('s').unwrap_or(&lower);
    LONG_WORDS.contains(&lower.as_str()) || LONG_WORDS.contains(&singular)
}

#[derive(Debug, Clone)]
struct Piece {
    text: String,
    locked: bool,
}

impl Piece {
    fn open(text: &str) -> Piece {
        Piece {
            text: text.to_string(),
            locked: false,
        }
    }

    fn locked(text: &str) -> Piece {
        Piece {
            text: text.to_string(),
            locked: true,
        }
    }
}

/// Inserts spaces into merged letter runs.
///
/// Runs of at least [`MERGED_RUN_MIN`] letters are split around dictionary
/// words, then at camelCase boundaries, then around embedded two-letter
/// words and after common suffixes. Repeats until nothing changes. This is
/// best effort: unknown words stay merged.
pub fn fix_merged_words(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_MERGE_ROUNDS {
        if !has_merged_run(&current, MERGED_RUN_MIN) {
            break;
        }
        let next = LETTER_RUN
            .replace_all(&current, |caps: &Captures| {
                let run = &caps[0];
                if run.starts_with('\\') || run.len() < MERGED_RUN_MIN || is_long_word(run) {
                    run.to_string()
                } else {
                    split_merged_run(run)
                }
            })
            .to_string();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn split_merged_run(run: &str) -> String {
    let pieces = split_on_dictionary(vec![Piece::open(run)]);
    let pieces = split_camel_case(pieces);
    let pieces = split_aggressively(pieces, split_short_words);
    let pieces = split_aggressively(pieces, split_suffixes);
    pieces
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A leftover next to a dictionary word must not be a dangling fragment
/// such as the "ly" of "continuously".
fn acceptable_remainder(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    text.is_empty() || text.len() >= 3 || lower == "a" || SHORT_WORDS.contains(&lower.as_str())
}

fn split_on_dictionary(mut pieces: Vec<Piece>) -> Vec<Piece> {
    for word in DICTIONARY_BY_LENGTH.iter() {
        let mut next = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if piece.locked {
                next.push(piece);
            } else {
                split_piece_on(&piece.text, word, &mut next);
            }
        }
        pieces = next;
    }
    pieces
}

fn split_piece_on(text: &str, word: &str, out: &mut Vec<Piece>) {
    let lower = text.to_ascii_lowercase();
    let mut from = 0;
    while let Some(offset) = lower[from..].find(word) {
        let at = from + offset;
        let end = at + word.len();
        if acceptable_remainder(&text[..at]) && acceptable_remainder(&text[end..]) {
            if at > 0 {
                out.push(Piece::open(&text[..at]));
            }
            out.push(Piece::locked(&text[at..end]));
            if end < text.len() {
                split_piece_on(&text[end..], word, out);
            }
            return;
        }
        from = at + 1;
    }
    out.push(Piece::open(text));
}

fn split_camel_case(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut out = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if piece.locked {
            out.push(piece);
            continue;
        }
        let bytes = piece.text.as_bytes();
        let mut start = 0;
        for i in 1..bytes.len() {
            if bytes[i - 1].is_ascii_lowercase() && bytes[i].is_ascii_uppercase() {
                out.push(Piece::open(&piece.text[start..i]));
                start = i;
            }
        }
        out.push(Piece::open(&piece.text[start..]));
    }
    out
}

/// Applies `split` to open pieces that are still suspiciously long.
fn split_aggressively(pieces: Vec<Piece>, split: fn(&str, &mut Vec<Piece>)) -> Vec<Piece> {
    let mut out = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if piece.locked || piece.text.len() < AGGRESSIVE_SPLIT_MIN {
            out.push(piece);
        } else {
            split(&piece.text, &mut out);
        }
    }
    out
}

/// Splits around the first two-letter word embedded between lowercase letters.
fn split_short_words(text: &str, out: &mut Vec<Piece>) {
    let bytes = text.as_bytes();
    for i in 1..bytes.len().saturating_sub(2) {
        let candidate = text[i..i + 2].to_ascii_lowercase();
        if SHORT_WORDS.contains(&candidate.as_str())
            && bytes[i - 1].is_ascii_lowercase()
            && bytes[i + 2].is_ascii_lowercase()
        {
            out.push(Piece::open(&text[..i]));
            out.push(Piece::locked(&text[i..i + 2]));
            let rest = &text[i + 2..];
            if rest.len() >= AGGRESSIVE_SPLIT_MIN {
                split_short_words(rest, out);
            } else {
                out.push(Piece::open(rest));
            }
            return;
        }
    }
    out.push(Piece::open(text));
}

/// Splits after the first suffix that has at least three letters before it
/// and a word (three letters or a capital) after it.
fn split_suffixes(text: &str, out: &mut Vec<Piece>) {
    let lower = text.to_ascii_lowercase();
    for suffix in SUFFIXES {
        let mut from = 3;
        while from < lower.len() {
            let Some(offset) = lower[from..].find(suffix) else {
                break;
            };
            let end = from + offset + suffix.len();
            let rest = &text[end..];
            let starts_word = rest.len() >= 3 || rest.starts_with(|c: char| c.is_ascii_uppercase());
            if starts_word {
                out.push(Piece::open(&text[..end]));
                if rest.len() >= AGGRESSIVE_SPLIT_MIN {
                    split_suffixes(rest, out);
                } else {
                    out.push(Piece::open(rest));
                }
                return;
            }
            from += offset + 1;
        }
    }
    out.push(Piece::open(text));
}

/// Rewrites `arctan`, `arcsin` and `arccos` (with or without a backslash) as
/// `\tan^{-1}`, `\sin^{-1}` and `\cos^{-1}`.
pub fn fix_inverse_trig(text: &str) -> String {
    INVERSE_TRIG
        .replace_all(text, |caps: &Captures| {
            format!(r"\{}^{{-1}}", caps[2].to_ascii_lowercase())
        })
        .to_string()
}

/// Reassembles a piecewise function whose cases were extracted as separate
/// `expression : condition` lines into one `\begin{cases}` block.
pub fn fix_piecewise_function(text: &str) -> String {
    let has_comparison = ['<', '>', '≤', '≥'].iter().any(|c| text.contains(*c))
        || text.contains(r"\le")
        || text.contains(r"\ge");
    if !text.contains(':') || !(text.contains("f(x)") || text.contains("f :")) || !has_comparison {
        return text.to_string();
    }

    let lines: Vec<&str> = text.lines().collect();
    let is_case = |line: &str| {
        let trimmed = line.trim();
        !trimmed.is_empty() && PIECEWISE_LINE.is_match(trimmed) && !trimmed.contains("If")
    };
    let case_lines: Vec<usize> = (0..lines.len()).filter(|&i| is_case(lines[i])).collect();
    if case_lines.len() < 2 {
        return text.to_string();
    }

    let cases: Vec<String> = case_lines
        .iter()
        .map(|&i| {
            let line = lines[i].trim();
            match line.split_once(':') {
                Some((expr, condition)) => {
                    let expr = FUNCTION_HEADER.replace(expr.trim(), "");
                    format!("{}, & {}", expr.trim(), condition.trim())
                }
                None => line.to_string(),
            }
        })
        .collect();
    let block = format!(r"f(x) = \begin{{cases}} {} \end{{cases}}", cases.join(r" \\ "));

    let header = (0..lines.len())
        .find(|i| !case_lines.contains(i) && FUNCTION_HEADER.is_match(lines[*i]));

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if case_lines.contains(&i) {
            if header.is_none() && i == case_lines[0] {
                out.push(block.clone());
            }
        } else if Some(i) == header {
            out.push(FUNCTION_HEADER.replacen(line, 1, NoExpand(&block)).to_string());
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

/// Gives option `index` its positional label, replacing a wrong one.
/// An empty option becomes the bare label.
pub fn label_option(index: usize, option: &str) -> String {
    let label = OPTION_LABELS[index];
    let trimmed = option.trim();
    if trimmed.starts_with(label) {
        return trimmed.to_string();
    }
    let body = OPTION_LABEL.replace(trimmed, "");
    let body = body.trim();
    if body.is_empty() {
        label.to_string()
    } else {
        format!("{} {}", label, body)
    }
}

/// Returns exactly four labelled options. Extra options are dropped and
/// missing ones become bare label placeholders.
pub fn fix_options(options: &[String]) -> Vec<String> {
    if options.len() > OPTION_LABELS.len() {
        tracing::warn!(
            "Dropping {} option(s) beyond (D)",
            options.len() - OPTION_LABELS.len()
        );
    }
    let mut fixed: Vec<String> = options
        .iter()
        .take(OPTION_LABELS.len())
        .enumerate()
        .map(|(i, option)| {
            let option = fix_inverse_trig(&fix_merged_words(option));
            label_option(i, &option)
        })
        .collect();
    while fixed.len() < OPTION_LABELS.len() {
        fixed.push(OPTION_LABELS[fixed.len()].to_string());
    }
    fixed
}

/// True when a topic must be replaced by the subject default.
pub fn is_placeholder_topic(topic: &str) -> bool {
    let topic = topic.trim();
    topic.is_empty() || topic.eq_ignore_ascii_case("general")
}

/// Applies every automatic repair to a question.
///
/// # Arguments
///
/// * `question` - The question to repair.
/// * `subject` - Supplies the default topic and domain.
///
/// # Returns
///
/// The repaired copy. `auto_fix(&auto_fix(q, s), s) == auto_fix(q, s)`.
pub fn auto_fix(question: &ExtractedQuestion, subject: Subject) -> ExtractedQuestion {
    let mut fixed = question.clone();

    let text = fix_piecewise_function(&fixed.text);
    if text != fixed.text {
        tracing::debug!("{}: reassembled piecewise function", fixed.id);
    }
    let text = fix_merged_words(&text);
    fixed.text = fix_inverse_trig(&text);

    fixed.options = fix_options(&fixed.options);

    if is_placeholder_topic(&fixed.topic) {
        fixed.topic = subject.default_topic().to_string();
    }
    if fixed.domain.trim().is_empty() {
        fixed.domain = subject.default_domain().to_string();
    }

    if fixed != *question {
        tracing::debug!("{}: auto-fixed", fixed.id);
    }
    fixed
}
