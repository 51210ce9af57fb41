//! Final-answer extraction and layered answer matching.
//!
//! Matching tiers, first success wins:
//! 1. exact equality after normalization
//! 2. containment in either direction
//! 3. the first numeric token on each side is the same string
//!
//! The tiers accept some false positives (a short reference contained in a
//! long candidate matches). Their order is fixed: changing it changes the
//! accuracy of problem sets that were already measured.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+\.?\d*").expect("NUMBER_TOKEN regex should compile"));

/// Characters removed during normalization, on top of whitespace.
const STRIPPED_CHARS: &[char] = &['$', '{', '}', '\\'];

/// A marker that introduces the final answer in solver output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerMarker {
    /// Text immediately preceding the answer.
    pub open: String,
    /// Text closing the answer. Without one (or if it is missing from the
    /// output) the answer runs to the end of the line.
    #[serde(default)]
    pub close: Option<String>,
}

impl AnswerMarker {
    pub fn bracketed(open: &str, close: &str) -> Self {
        Self {
            open: open.to_string(),
            close: Some(close.to_string()),
        }
    }

    pub fn line(open: &str) -> Self {
        Self {
            open: open.to_string(),
            close: None,
        }
    }

    /// The text this marker selects in `raw`, if the marker is present.
    fn select<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let (_, rest) = raw.split_once(self.open.as_str())?;
        if let Some((inner, _)) = self
            .close
            .as_deref()
            .and_then(|close| rest.split_once(close))
        {
            return Some(inner);
        }
        Some(rest.trim_start().lines().next().unwrap_or(""))
    }
}

/// The markers recognised out of the box, in priority order.
pub fn default_markers() -> Vec<AnswerMarker> {
    vec![
        AnswerMarker::bracketed("【答案：", "】"),
        AnswerMarker::line("答案："),
        AnswerMarker::line("Final Answer:"),
    ]
}

/// Which tier decided a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Containment,
    Numeric,
}

/// Result of comparing a solver output against a reference answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// The candidate answer (marker text, or the whole output), lower-cased
    /// and trimmed.
    pub extracted: String,
    /// The tier that matched, `None` if nothing did.
    pub tier: Option<MatchTier>,
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        self.tier.is_some()
    }
}

/// Extracts a final answer from solver output and compares it to a reference.
#[derive(Debug, Clone)]
pub struct AnswerMatcher {
    markers: Vec<AnswerMarker>,
}

impl Default for AnswerMatcher {
    fn default() -> Self {
        Self::new(default_markers())
    }
}

impl AnswerMatcher {
    pub fn new(markers: Vec<AnswerMarker>) -> Self {
        Self { markers }
    }

    /// Candidate answer text: the first marker's selection, else the whole
    /// output. Lower-cased and trimmed, not yet normalized.
    pub fn extract(&self, raw_output: &str) -> String {
        self.markers
            .iter()
            .find_map(|marker| marker.select(raw_output))
            .unwrap_or(raw_output)
            .trim()
            .to_lowercase()
    }

    /// Compare with full detail.
    pub fn evaluate(&self, raw_output: &str, reference_answer: &str) -> Comparison {
        let extracted = self.extract(raw_output);
        let reference = reference_answer.trim().to_lowercase();
        let tier = match_tier(&extracted, &reference);
        Comparison { extracted, tier }
    }

    /// `true` if the output's final answer matches the reference.
    pub fn compare(&self, raw_output: &str, reference_answer: &str) -> bool {
        self.evaluate(raw_output, reference_answer).is_match()
    }
}

/// Compare using the default markers.
pub fn compare(raw_output: &str, reference_answer: &str) -> bool {
    AnswerMatcher::default().compare(raw_output, reference_answer)
}

/// Lower-case and drop whitespace and markup characters.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED_CHARS.contains(c))
        .collect()
}

/// First signed integer or decimal token in `text`.
pub fn first_number(text: &str) -> Option<&str> {
    NUMBER_TOKEN.find(text).map(|m| m.as_str())
}

fn match_tier(candidate: &str, reference: &str) -> Option<MatchTier> {
    let cand = normalize(candidate);
    let refr = normalize(reference);

    if cand == refr {
        return Some(MatchTier::Exact);
    }

    // An empty side is contained in everything, so it matches.
    if cand.contains(&refr) || refr.contains(&cand) {
        return Some(MatchTier::Containment);
    }

    match (first_number(candidate), first_number(reference)) {
        (Some(a), Some(b)) if a == b => Some(MatchTier::Numeric),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_answer_in_prose() {
        assert!(compare("The answer is x = 5.", "5"));
        assert!(!compare("x = 4", "5"));
    }

    #[test]
    fn identical_strings_match() {
        for x in [
            "4",
            "x = 4",
            "\\frac{1}{2}",
            "Paris",
            "  -3.5  ",
            "答案：",
            "【答案：",
            "Final Answer:",
        ] {
            assert!(compare(x, x), "{x:?} should match itself");
        }
    }

    #[test]
    fn containment_is_symmetric() {
        let pairs = [("x=4", "4"), ("4", "x=4"), ("abc", "xyz"), ("7", "17")];
        for (a, b) in pairs {
            assert_eq!(compare(a, b), compare(b, a), "asymmetric for {a:?}/{b:?}");
        }
    }

    #[test]
    fn bracketed_marker_selects_answer() {
        let matcher = AnswerMatcher::default();
        let raw = "Subtract 5 then divide by 2.\n【答案：x = 4】\nDone, 13 checks out.";
        assert_eq!(matcher.extract(raw), "x = 4");
        let cmp = matcher.evaluate(raw, "4");
        assert_eq!(cmp.tier, Some(MatchTier::Containment));
    }

    #[test]
    fn bare_marker_runs_to_end_of_line() {
        let matcher = AnswerMatcher::default();
        let raw = "work...\n答案： 12\n验证：3 * 4 = 12";
        assert_eq!(matcher.extract(raw), "12");
    }

    #[test]
    fn unclosed_bracket_falls_back_to_line() {
        let matcher = AnswerMatcher::default();
        assert_eq!(matcher.extract("【答案：7\nmore text"), "7");
    }

    #[test]
    fn english_marker() {
        let matcher = AnswerMatcher::default();
        assert_eq!(
            matcher.extract("Reasoning here.\nFinal Answer: $\\sqrt{2}$\n"),
            "$\\sqrt{2}$"
        );
        assert!(matcher.compare("Final Answer: $\\sqrt{2}$", "\\sqrt{2}"));
    }

    #[test]
    fn marker_text_beats_the_rest_of_the_output() {
        // Without the marker "3" would be contained in the working.
        let raw = "Try x = 3: 2*3+5 = 11, wrong.\n【答案：x = 5】";
        assert!(!compare(raw, "3"));
        assert!(compare(raw, "5"));
    }

    #[test]
    fn normalization_strips_markup() {
        assert_eq!(normalize(" $X = {4}$ "), "x=4");
        assert_eq!(normalize("\\frac{1}{2}"), "frac12");
    }

    #[test]
    fn exact_tier_wins_first() {
        let matcher = AnswerMatcher::default();
        assert_eq!(matcher.evaluate("$4$", "4").tier, Some(MatchTier::Exact));
    }

    #[test]
    fn numeric_tier_compares_first_tokens_only() {
        let matcher = AnswerMatcher::default();
        let cmp = matcher.evaluate("roots -2 and 3", "x = -2");
        assert_eq!(cmp.tier, Some(MatchTier::Numeric));
        assert!(!matcher.compare("roots 3 and -2", "-2, 3 (two roots)"));
    }

    #[test]
    fn empty_side_matches_by_containment() {
        let matcher = AnswerMatcher::default();
        assert_eq!(
            matcher.evaluate("【答案：】", "4").tier,
            Some(MatchTier::Containment)
        );
        assert!(compare("4", "   "));
    }

    #[test]
    fn first_number_token() {
        assert_eq!(first_number("x = -3.25 or 7"), Some("-3.25"));
        assert_eq!(first_number("no digits"), None);
    }
}
