//! Unicode to LaTeX normalization.
//!
//! [`normalize`] runs an ordered chain of small `&str -> String` repair stages.
//! Each stage is public so it can be tested on its own:
//!
//! 1. [`repair_control_characters`] and [`repair_tab_corruption`] undo the
//!    damage done when LaTeX reaches a JSON decoder unescaped (`\t`, `\f`,
//!    `\b` and `\r` turned into control characters).
//! 2. [`strip_escape_prefixes`] removes spurious `\X\` prefixes (`\f\frac`).
//! 3. [`repair_matrix_rows`] restores `\\` row separators in matrix blocks.
//! 4. [`convert_roots`] turns `√`, `∛` and `∜` into `\sqrt{...}`, nested
//!    radicals included.
//! 5. [`replace_symbols`] maps the remaining Unicode math glyphs to commands.
//!
//! The output contains no glyph from the symbol table and no root glyph.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Upper bound on structured root conversion passes.
const MAX_ROOT_ITERATIONS: usize = 10;

/// Upper bound on full chain rounds in [`normalize`].
const MAX_CHAIN_ROUNDS: usize = 3;

/// Unicode glyph to LaTeX command. Roots are handled by [`convert_roots`].
const SYMBOLS: &[(&str, &str)] = &[
    // Greek, lowercase
    ("α", r"\alpha"),
    ("β", r"\beta"),
    ("γ", r"\gamma"),
    ("δ", r"\delta"),
    ("ε", r"\epsilon"),
    ("ζ", r"\zeta"),
    ("η", r"\eta"),
    ("θ", r"\theta"),
    ("ι", r"\iota"),
    ("κ", r"\kappa"),
    ("λ", r"\lambda"),
    ("μ", r"\mu"),
    ("ν", r"\nu"),
    ("ξ", r"\xi"),
    ("π", r"\pi"),
    ("ρ", r"\rho"),
    ("σ", r"\sigma"),
    ("τ", r"\tau"),
    ("υ", r"\upsilon"),
    ("φ", r"\phi"),
    ("χ", r"\chi"),
    ("ψ", r"\psi"),
    ("ω", r"\omega"),
    // Greek, uppercase
    ("Γ", r"\Gamma"),
    ("Δ", r"\Delta"),
    ("Θ", r"\Theta"),
    ("Λ", r"\Lambda"),
    ("Ξ", r"\Xi"),
    ("Π", r"\Pi"),
    ("Σ", r"\Sigma"),
    ("Φ", r"\Phi"),
    ("Ψ", r"\Psi"),
    ("Ω", r"\Omega"),
    // calculus
    ("∫", r"\int"),
    ("∬", r"\iint"),
    ("∭", r"\iiint"),
    ("∮", r"\oint"),
    ("∑", r"\sum"),
    ("∏", r"\prod"),
    ("∂", r"\partial"),
    ("∇", r"\nabla"),
    // relations
    ("≤", r"\leq"),
    ("≥", r"\geq"),
    ("≠", r"\neq"),
    ("≈", r"\approx"),
    ("≡", r"\equiv"),
    ("∝", r"\propto"),
    ("∞", r"\infty"),
    // sets
    ("∈", r"\in"),
    ("∉", r"\notin"),
    ("⊂", r"\subset"),
    ("⊆", r"\subseteq"),
    ("⊃", r"\supset"),
    ("⊇", r"\supseteq"),
    ("∪", r"\cup"),
    ("∩", r"\cap"),
    ("∅", r"\emptyset"),
    // logic
    ("∀", r"\forall"),
    ("∃", r"\exists"),
    ("¬", r"\neg"),
    ("∧", r"\land"),
    ("∨", r"\lor"),
    ("⇒", r"\Rightarrow"),
    ("⇐", r"\Leftarrow"),
    ("⇔", r"\Leftrightarrow"),
    // geometry
    ("∠", r"\angle"),
    ("°", r"^\circ"),
    ("⊥", r"\perp"),
    ("∥", r"\parallel"),
    ("△", r"\triangle"),
    // arithmetic
    ("±", r"\pm"),
    ("∓", r"\mp"),
    ("×", r"\times"),
    ("÷", r"\div"),
    ("·", r"\cdot"),
    ("∘", r"\circ"),
    ("†", r"\dagger"),
    ("‡", r"\ddagger"),
    // arrows
    ("→", r"\rightarrow"),
    ("←", r"\leftarrow"),
    ("↑", r"\uparrow"),
    ("↓", r"\downarrow"),
    ("↔", r"\leftrightarrow"),
    ("⇀", r"\rightharpoonup"),
    ("⇁", r"\rightharpoondown"),
];

/// Root glyphs and the command each becomes.
const ROOT_GLYPHS: &[(char, &str)] = &[('√', r"\sqrt"), ('∛', r"\sqrt[3]"), ('∜', r"\sqrt[4]")];

const COMBINING_ARROW: char = '\u{20D7}';

/// Remnants left behind when the `\t` of a command became a tab.
///
/// `(remnant, repaired command, braced, tab required)`. Remnants that are also
/// English words are only repaired when a real tab precedes them.
const TAB_REMNANTS: &[(&str, &str, bool, bool)] = &[
    ("ext", r"\text{", true, false),
    ("extbf", r"\textbf{", true, false),
    ("extit", r"\textit{", true, false),
    ("extrm", r"\textrm{", true, false),
    ("exttt", r"\texttt{", true, false),
    ("ilde", r"\tilde{", true, true),
    ("frac", r"\tfrac{", true, true),
    ("imes", r"\times", false, false),
    ("heta", r"\theta", false, false),
    ("cdot", r"\cdot", false, false),
    ("anh", r"\tanh", false, true),
    ("an", r"\tan", false, true),
    ("au", r"\tau", false, true),
    ("o", r"\to", false, true),
    ("riangle", r"\triangle", false, true),
];

static TAB_REMNANT_REGEXES: LazyLock<Vec<(Regex, &'static str, bool)>> = LazyLock::new(|| {
    TAB_REMNANTS
        .iter()
        .map(|(remnant, command, braced, needs_tab)| {
            let pattern = if *braced {
                format!(r"(\s+){}\{{", remnant)
            } else {
                format!(r"(\s+){}([^a-zA-Z]|$)", remnant)
            };
            (Regex::new(&pattern).unwrap(), *command, *needs_tab)
        })
        .collect()
});

static CARRIAGE_RETURN_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r(ight|ho)").unwrap());

static NEWLINE_NABLA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\nabla").unwrap());

static ESCAPE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[fbrlent]\\([A-Za-z])").unwrap());

static MATRIX_BEGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\begin\{(matrix|pmatrix|bmatrix|vmatrix|Bmatrix|Vmatrix|array)\}").unwrap()
});

static VECTOR_ARROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z])\x{20D7}").unwrap());

static SYMBOL_REGEXES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    SYMBOLS
        .iter()
        .map(|(glyph, command)| {
            let pattern = format!("{}([A-Za-z])?", regex::escape(glyph));
            (Regex::new(&pattern).unwrap(), *command)
        })
        .collect()
});

/// Normalizes Unicode math and repairs LaTeX corruption in `text`.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_CHAIN_ROUNDS {
        let next = repair_chain(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn repair_chain(text: &str) -> String {
    let text = repair_control_characters(text);
    let text = repair_tab_corruption(&text);
    let text = strip_escape_prefixes(&text);
    let text = repair_matrix_rows(&text);
    let text = convert_roots(&text);
    replace_symbols(&text)
}

/// Maps control characters produced by unescaped LaTeX back to the escape
/// they came from: form feed to `\f`, backspace to `\b`, a carriage return
/// before `ight`/`ho` to `\r` and a line feed before `abla` to `\n`.
pub fn repair_control_characters(text: &str) -> String {
    if !text.contains(&['\u{0C}', '\u{08}', '\r', '\n'][..]) {
        return text.to_string();
    }
    let text = text.replace('\u{0C}', r"\f").replace('\u{08}', r"\b");
    let text = CARRIAGE_RETURN_COMMAND.replace_all(&text, r"\r${1}");
    NEWLINE_NABLA.replace_all(&text, r"\nabla").to_string()
}

/// Repairs commands whose leading `\t` was read as a tab (`\times` seen as
/// `<tab>imes`). A tab in the whitespace before the remnant is consumed as
/// the lost `\t`; other whitespace is kept.
pub fn repair_tab_corruption(text: &str) -> String {
    let mut current = text.to_string();
    for (regex, command, needs_tab) in TAB_REMNANT_REGEXES.iter() {
        loop {
            let next = regex
                .replace_all(&current, |caps: &Captures| {
                    let whitespace = &caps[1];
                    if *needs_tab && !whitespace.contains('\t') {
                        return caps[0].to_string();
                    }
                    let tail = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                    format!("{}{}{}", drop_last_tab(whitespace), command, tail)
                })
                .to_string();
            if next == current {
                break;
            }
            current = next;
        }
    }
    current
}

fn drop_last_tab(whitespace: &str) -> String {
    match whitespace.rfind('\t') {
        Some(i) => format!("{}{}", &whitespace[..i], &whitespace[i + 1..]),
        None => whitespace.to_string(),
    }
}

/// Removes a spurious `\X\` prefix in front of a real command
/// (`\f\frac` -> `\frac`, `\b\begin` -> `\begin`).
pub fn strip_escape_prefixes(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = ESCAPE_PREFIX.replace_all(&current, r"\${1}").to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Promotes a lone backslash followed by whitespace or `&` to a `\\` row
/// separator inside matrix-like environments.
pub fn repair_matrix_rows(text: &str) -> String {
    if !text.contains(r"\begin{") {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut pos = 0;
    while let Some(caps) = MATRIX_BEGIN.captures_at(text, pos) {
        let Some(begin) = caps.get(0) else { break };
        let end_tag = format!(r"\end{{{}}}", &caps[1]);
        let content_start = begin.end();
        let Some(offset) = text[content_start..].find(&end_tag) else {
            break;
        };
        let content_end = content_start + offset;

        out.push_str(&text[pos..content_start]);
        out.push_str(&double_lone_backslashes(&text[content_start..content_end]));
        out.push_str(&end_tag);
        pos = content_end + end_tag.len();
    }
    out.push_str(&text[pos..]);
    out
}

fn double_lone_backslashes(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i] == '\\' {
            out.push('\\');
            i += 1;
        }
        let lone = i - start == 1;
        if lone && chars.get(i).is_some_and(|c| c.is_whitespace() || *c == '&') {
            out.push('\\');
        }
    }
    out
}

fn root_command(c: char) -> Option<&'static str> {
    ROOT_GLYPHS
        .iter()
        .find(|(glyph, _)| *glyph == c)
        .map(|(_, command)| *command)
}

fn has_root_glyph(text: &str) -> bool {
    text.chars().any(|c| root_command(c).is_some())
}

/// Converts root glyphs into `\sqrt{...}`.
///
/// Structured passes run until nothing changes (at most
/// `MAX_ROOT_ITERATIONS` times); each pass visits glyphs right to left so the
/// innermost radical is converted before the one enclosing it. Glyphs that no
/// structured rule can handle are finally wrapped around the next token, or
/// around nothing.
pub fn convert_roots(text: &str) -> String {
    if !has_root_glyph(text) {
        return text.to_string();
    }

    let mut current = text.to_string();
    let mut iterations = 0;
    while iterations < MAX_ROOT_ITERATIONS && has_root_glyph(&current) {
        let next = root_pass(&current, false);
        iterations += 1;
        if next == current {
            break;
        }
        current = next;
    }

    if has_root_glyph(&current) {
        if iterations >= MAX_ROOT_ITERATIONS {
            tracing::warn!("Root conversion hit the iteration ceiling, wrapping remaining glyphs");
        } else {
            tracing::debug!("Wrapping dangling root glyphs");
        }
        current = root_pass(&current, true);
    }
    current
}

fn root_pass(text: &str, dangling: bool) -> String {
    let positions: Vec<(usize, char)> = text
        .char_indices()
        .filter(|(_, c)| root_command(*c).is_some())
        .collect();

    let mut current = text.to_string();
    for (pos, glyph) in positions.into_iter().rev() {
        let Some(command) = root_command(glyph) else {
            continue;
        };
        let rest_start = pos + glyph.len_utf8();
        let rest = &current[rest_start..];
        let converted = structured_root(rest).or_else(|| dangling.then(|| dangling_root(rest)));
        if let Some((radicand, consumed)) = converted {
            let replacement = format!("{}{{{}}}", command, radicand);
            current.replace_range(pos..rest_start + consumed, &replacement);
        }
    }
    current
}

/// Radicand and consumed byte length for a glyph followed by `rest`.
fn structured_root(rest: &str) -> Option<(String, usize)> {
    let first = rest.chars().next()?;

    if first == '{' {
        let close = matching_close(rest, '{', '}')?;
        let inner = &rest[1..close];
        return (!has_root_glyph(inner)).then(|| (inner.to_string(), close + 1));
    }
    if first.is_ascii_digit() {
        let len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        return Some((rest[..len].to_string(), len));
    }
    if first.is_ascii_alphabetic() {
        return Some((first.to_string(), 1));
    }
    if first == '(' {
        let close = matching_close(rest, '(', ')')?;
        let inner = &rest[1..close];
        return (!has_root_glyph(inner)).then(|| (inner.to_string(), close + 1));
    }
    if let Some(after) = rest.strip_prefix(r"\sqrt") {
        let mut len = r"\sqrt".len();
        let mut tail = after;
        if tail.starts_with('[') {
            let close = tail.find(']')?;
            len += close + 1;
            tail = &tail[close + 1..];
        }
        if tail.starts_with('{') {
            let close = matching_close(tail, '{', '}')?;
            len += close + 1;
            return Some((rest[..len].to_string(), len));
        }
    }
    None
}

/// Wraps the next token: a command name or a single character. Whitespace,
/// brackets or the end of text give an empty radicand.
fn dangling_root(rest: &str) -> (String, usize) {
    let Some(first) = rest.chars().next() else {
        return (String::new(), 0);
    };
    if first.is_whitespace() || "(){}[]".contains(first) || root_command(first).is_some() {
        return (String::new(), 0);
    }
    if first == '\\' {
        let name_len = rest[1..]
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len() - 1);
        if name_len == 0 {
            return (String::new(), 0);
        }
        return (rest[..=name_len].to_string(), name_len + 1);
    }
    (first.to_string(), first.len_utf8())
}

/// Byte index of the bracket closing the one `s` starts with.
fn matching_close(s: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Replaces every glyph of the symbol table, one substitution per symbol.
/// A space separates the command from a following ASCII letter.
pub fn replace_symbols(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    let mut current = if text.contains(COMBINING_ARROW) {
        VECTOR_ARROW
            .replace_all(text, r"\vec{${1}}")
            .replace(COMBINING_ARROW, r"\vec{}")
    } else {
        text.to_string()
    };

    for (regex, command) in SYMBOL_REGEXES.iter() {
        if !regex.is_match(&current) {
            continue;
        }
        current = regex
            .replace_all(&current, |caps: &Captures| match caps.get(1) {
                Some(letter) => format!("{} {}", command, letter.as_str()),
                None => command.to_string(),
            })
            .to_string();
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_symbols() {
        assert_eq!(normalize("θ"), r"\theta");
        assert_eq!(normalize("≤"), r"\leq");
        assert_eq!(normalize("x ≥ 0 and y ≠ 1"), r"x \geq 0 and y \neq 1");
        assert_eq!(normalize("∠ABC = 90°"), r"\angle ABC = 90^\circ");
        assert_eq!(normalize("2πr"), r"2\pi r");
    }

    #[test]
    fn test_nested_radicals() {
        assert_eq!(normalize("√(2+√(2+√2))"), r"\sqrt{2+\sqrt{2+\sqrt{2}}}");
        assert_eq!(normalize("√(1+√(2+√3))"), r"\sqrt{1+\sqrt{2+\sqrt{3}}}");
        assert_eq!(normalize("√(√(√2))"), r"\sqrt{\sqrt{\sqrt{2}}}");
        assert_eq!(normalize("√2+√2+√2"), r"\sqrt{2}+\sqrt{2}+\sqrt{2}");
        assert_eq!(normalize("√(a/b)"), r"\sqrt{a/b}");
        assert_eq!(normalize("√√3"), r"\sqrt{\sqrt{3}}");
    }

    #[test]
    fn test_root_variants() {
        assert_eq!(convert_roots("√{x+1}"), r"\sqrt{x+1}");
        assert_eq!(convert_roots("√x"), r"\sqrt{x}");
        assert_eq!(convert_roots("√((a+b)(a-b))"), r"\sqrt{(a+b)(a-b)}");
        assert_eq!(convert_roots("∛8"), r"\sqrt[3]{8}");
        assert_eq!(convert_roots(r"√\pi"), r"\sqrt{\pi}");
    }

    #[test]
    fn test_dangling_roots() {
        assert_eq!(convert_roots("√"), r"\sqrt{}");
        assert_eq!(convert_roots("√ 2"), r"\sqrt{} 2");
        assert_eq!(convert_roots("√(2+3"), r"\sqrt{}(2+3");
        assert!(!normalize("√(√(").contains('√'));
    }

    #[test]
    fn test_tab_corruption() {
        assert_eq!(repair_tab_corruption("$5 \times 3$"), r"$5 \times 3$");
        assert_eq!(repair_tab_corruption("angle \theta = 30"), r"angle \theta = 30");
        assert_eq!(repair_tab_corruption("$\\,\text{m}$"), r"$\,\text{m}$");
        assert_eq!(repair_tab_corruption("$x \to 0$"), r"$x \to 0$");
        assert_eq!(repair_tab_corruption("$\tan x$"), r"$\tan x$");
        assert_eq!(repair_tab_corruption("  ext{cm}"), r"  \text{cm}");
    }

    #[test]
    fn test_tab_corruption_leaves_english_alone() {
        let prose = "is an apple to eat";
        assert_eq!(repair_tab_corruption(prose), prose);
        assert_eq!(normalize(prose), prose);
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(repair_control_characters("\u{0C}rac{1}{2}"), r"\frac{1}{2}");
        assert_eq!(repair_control_characters("\u{08}egin{matrix}"), r"\begin{matrix}");
        assert_eq!(repair_control_characters("\\left(x\right)"), r"\left(x\right)");
        assert_eq!(repair_control_characters("\rho"), r"\rho");
        assert_eq!(repair_control_characters("line\r\nnext"), "line\r\nnext");
        assert_eq!(repair_control_characters("\nabla f"), r"\nabla f");
    }

    #[test]
    fn test_escape_prefixes() {
        assert_eq!(strip_escape_prefixes(r"\f\frac{1}{2}"), r"\frac{1}{2}");
        assert_eq!(strip_escape_prefixes(r"\b\begin{cases}"), r"\begin{cases}");
        assert_eq!(strip_escape_prefixes(r"\l\left( \r\right)"), r"\left( \right)");
        assert_eq!(strip_escape_prefixes(r"\f\f\frac"), r"\frac");
        assert_eq!(strip_escape_prefixes(r"\le\frac{1}{2}"), r"\le\frac{1}{2}");
        assert_eq!(strip_escape_prefixes(r"a \in\mathbb{R}"), r"a \in\mathbb{R}");
    }

    #[test]
    fn test_matrix_rows() {
        let broken = r"\begin{bmatrix} 1 & 2 \ 3 & 4 \end{bmatrix}";
        assert_eq!(
            repair_matrix_rows(broken),
            r"\begin{bmatrix} 1 & 2 \\ 3 & 4 \end{bmatrix}"
        );

        let fine = r"\begin{pmatrix} \alpha & 2 \\ 3 & \beta \end{pmatrix}";
        assert_eq!(repair_matrix_rows(fine), fine);

        let outside = r"a \ b \begin{vmatrix} a \&b \end{vmatrix}";
        assert_eq!(
            repair_matrix_rows(outside),
            r"a \ b \begin{vmatrix} a \\&b \end{vmatrix}"
        );
    }

    #[test]
    fn test_vector_arrow() {
        assert_eq!(normalize("F\u{20D7} = ma\u{20D7}"), r"\vec{F} = m\vec{a}");
    }

    #[test]
    fn test_no_table_glyph_survives() {
        let all: String = SYMBOLS.iter().map(|(glyph, _)| *glyph).collect();
        let out = normalize(&format!("{}√∛∜", all));
        for (glyph, _) in SYMBOLS {
            assert!(!out.contains(glyph), "{} survived", glyph);
        }
        assert!(!has_root_glyph(&out));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "θ",
            "√(2+√(2+√2))",
            "$5 \times 3$ and \u{0C}rac{a}{b}",
            r"\f\frac{1}{2} + \b\begin{matrix} 1 \ 2 \end{matrix}",
            "√ √(x",
            "x\\l≤ y",
            "∫₀¹ x² dx = ∞ · π",
            "plain English text with an example",
            "F\u{20D7}\u{20D7}",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }
}
