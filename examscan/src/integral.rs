//! Repair of hallucinated integral numerators.
//!
//! A model reading `∫ dx / ((x+2)(x²+1)) = a log|x²+1| + b tan⁻¹x + c` sometimes
//! writes the problem as `\int \frac{x^2+b}{(x+2)(x^2+1)} dx = ...`, leaking a
//! constant of the answer into the numerator. The detector looks for single
//! letter constants of the right-hand side that appear in the numerator but
//! not in the denominator and rewrites the numerator as `1`, keeping the
//! trailing `dx`.
//!
//! This is a narrow heuristic. It only understands a single `\frac{}{}` with
//! brace-free numerator and denominator followed by `dx`, and it can misfire
//! on integrands that legitimately share a constant with the result.

use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static INTEGRAL_EQUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<head>\\int(?:_\{[^}]*\}|_[^\s\\^{$]+)?(?:\^\{[^}]*\}|\^[^\s\\{$]+)?\s*\\frac\{)(?P<num>[^{}]+)\}\{(?P<den>[^{}]+)\}(?P<dx>\s*dx\b)(?P<tail>\s*=\s*(?P<result>[^$]+))",
    )
    .unwrap()
});

static SINGLE_LETTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-z]\b").unwrap());

fn single_letters(text: &str) -> BTreeSet<&str> {
    SINGLE_LETTER.find_iter(text).map(|m| m.as_str()).collect()
}

/// Rewrites integral equations whose numerator carries a constant leaked from
/// the result.
///
/// Only engages when `text` contains both `\int` and `=`, and only on
/// fractions followed by a `dx` token. The numerator of a suspicious fraction
/// becomes `1`.
pub fn fix_integral_hallucinations(text: &str) -> String {
    if !text.contains(r"\int") || !text.contains('=') {
        return text.to_string();
    }

    INTEGRAL_EQUATION
        .replace_all(text, |caps: &Captures| {
            let numerator = &caps["num"];
            let denominator = &caps["den"];
            let result_letters = single_letters(&caps["result"]);
            let numerator_letters = single_letters(numerator);
            let denominator_letters = single_letters(denominator);

            let suspicious: Vec<&str> = result_letters
                .iter()
                .filter(|v| numerator_letters.contains(*v) && !denominator_letters.contains(*v))
                .copied()
                .collect();

            if suspicious.is_empty() {
                return caps[0].to_string();
            }

            tracing::warn!(
                "Suspicious integral numerator \"{}\": {} appear in the result but not in the denominator",
                numerator,
                suspicious.join(", ")
            );
            format!(
                "{}1}}{{{}}}{}{}",
                &caps["head"], denominator, &caps["dx"], &caps["tail"]
            )
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixes_leaked_constant() {
        let text = r"$\int \frac{x^2+b}{(x+2)(x^2+1)} dx = a \log|1+x^2| + b \tan^{-1}x + C$";
        assert_eq!(
            fix_integral_hallucinations(text),
            r"$\int \frac{1}{(x+2)(x^2+1)} dx = a \log|1+x^2| + b \tan^{-1}x + C$"
        );
    }

    #[test]
    fn test_fixes_with_limits() {
        let text = r"\int_0^1 \frac{k+x}{x+1} dx = k \log 2";
        assert_eq!(
            fix_integral_hallucinations(text),
            r"\int_0^1 \frac{1}{x+1} dx = k \log 2"
        );
    }

    #[test]
    fn test_leaves_integrals_without_dx() {
        let text = r"\int_0^1 \frac{k+x}{x+1} = k \log 2";
        assert_eq!(fix_integral_hallucinations(text), text);
    }

    #[test]
    fn test_leaves_legitimate_integrals() {
        let text = r"$\int \frac{x}{x^2+1} dx = \frac{1}{2} \log(x^2+1) + c$";
        assert_eq!(fix_integral_hallucinations(text), text);

        let shared = r"$\int \frac{a}{x+a} dx = a \log|x+a| + c$";
        assert_eq!(fix_integral_hallucinations(shared), shared);
    }

    #[test]
    fn test_requires_equation_form() {
        let text = r"Evaluate $\int \frac{x+b}{x} dx$";
        assert_eq!(fix_integral_hallucinations(text), text);
        assert_eq!(fix_integral_hallucinations("a = b"), "a = b");
    }

    #[test]
    fn test_fix_is_idempotent() {
        let text = r"$\int \frac{x^2+b}{(x+2)(x^2+1)} dx = a \log|1+x^2| + b \tan^{-1}x + c$";
        let once = fix_integral_hallucinations(text);
        assert_eq!(fix_integral_hallucinations(&once), once);
    }
}
