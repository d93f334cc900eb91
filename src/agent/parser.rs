//! Probability extraction from free-form expert responses
//!
//! Two passes:
//! 1. A JSON answer (code-fenced or raw) with `win_probability` and `side`.
//! 2. A labelled token scan: the text is split into segments, each segment
//!    is searched for a probability label, the number attached to the label,
//!    and the side name bound to the number or the label.
//!
//! A number is only accepted once it is bound to exactly one side. Numbers
//! stated for the other side are inverted. Anything else fails closed.

use crate::domain::{EventContext, Side};
use serde_json::Value;
use thiserror::Error;

/// Labels that introduce a win probability, longest first
const PROBABILITY_LABELS: &[&str] = &[
    "chance of winning",
    "win probability",
    "win chance",
    "probability",
    "likelihood",
    "chance",
];

const CONFIDENCE_LABEL: &str = "confidence";

const JSON_PROBABILITY_KEYS: &[&str] = &["win_probability", "probability", "win_prob", "prob"];
const JSON_SIDE_KEYS: &[&str] = &["side", "team", "winner"];
const JSON_CONFIDENCE_KEYS: &[&str] = &["confidence"];
const JSON_REASONING_KEYS: &[&str] = &["reasoning", "rationale", "summary"];

/// Words too generic to identify a side on their own
const GENERIC_WORDS: &[&str] = &["the", "team", "club", "city", "united", "fc", "sc", "side"];

/// Why a response yielded no usable probability
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseFailure {
    #[error("no labelled probability found")]
    NoProbability,

    #[error("probability not bound to a single side")]
    AmbiguousSide,

    #[error("probability {0} outside [0, 1]")]
    OutOfRange(f64),
}

/// Probability extracted from one response, bound to the requested side
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    /// Probability for the requested side
    pub probability: f64,
    /// Side the expert actually stated the number for
    pub stated_side: Side,
    /// Value as stated (before inversion)
    pub stated_probability: f64,
    pub confidence: Option<f64>,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy)]
struct NumberToken {
    start: usize,
    end: usize,
    value: f64,
}

#[derive(Debug, Clone, Copy)]
struct Mention {
    side: Side,
    start: usize,
    end: usize,
}

enum Candidate {
    Bound(Side, f64),
    Unbound,
}

enum Sides {
    One(Side),
    Conflict,
}

/// Parser bound to one event and the side the caller wants a probability for
pub struct ResponseParser {
    target: Side,
    aliases: Vec<(Side, String)>,
}

impl ResponseParser {
    pub fn new(event: &EventContext, target: Side) -> Self {
        Self {
            target,
            aliases: side_aliases(event),
        }
    }

    /// Extract the target side's probability. Never panics, never raises.
    pub fn parse(&self, text: &str) -> Result<ParsedResponse, ParseFailure> {
        if let Some(parsed) = self.parse_json(text) {
            return Ok(parsed);
        }
        self.parse_text(text)
    }

    /// Structured answer: only accepted when it names a resolvable side
    fn parse_json(&self, text: &str) -> Option<ParsedResponse> {
        let json_str = extract_json(text);
        let value: Value = serde_json::from_str(json_str).ok()?;
        let obj = value.as_object()?;

        let stated = JSON_PROBABILITY_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(json_probability)?;
        let side = JSON_SIDE_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(|v| v.as_str())
            .and_then(|name| self.resolve_side_name(name))?;

        if !(0.0..=1.0).contains(&stated) {
            return None;
        }

        let confidence = JSON_CONFIDENCE_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(json_probability)
            .filter(|c| (0.0..=1.0).contains(c));
        let rationale = JSON_REASONING_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| text.trim().to_string());

        Some(self.bind(side, stated, confidence, rationale))
    }

    fn parse_text(&self, text: &str) -> Result<ParsedResponse, ParseFailure> {
        let lowered = text.to_lowercase();
        let segments = split_segments(&lowered);

        let mut saw_unbound = false;
        let mut out_of_range = None;
        let mut confidence = None;
        let mut confidence_candidates = Vec::new();

        for segment in &segments {
            let Some((label_start, label_end)) = find_label(segment, PROBABILITY_LABELS) else {
                if let Some((start, end)) = find_label(segment, &[CONFIDENCE_LABEL]) {
                    let tokens = scan_numbers(segment);
                    if let Some(token) = attached_number(&tokens, start, end) {
                        if confidence.is_none() && (0.0..=1.0).contains(&token.value) {
                            confidence = Some(token.value);
                        }
                        confidence_candidates.push(self.candidate(segment, (start, end), token));
                    }
                }
                continue;
            };

            let tokens = scan_numbers(segment);
            let Some(token) = attached_number(&tokens, label_start, label_end) else {
                continue;
            };

            match self.candidate(segment, (label_start, label_end), token) {
                Candidate::Bound(side, value) if (0.0..=1.0).contains(&value) => {
                    return Ok(self.bind(side, value, confidence, text.trim().to_string()));
                }
                Candidate::Bound(_, value) => {
                    out_of_range.get_or_insert(value);
                }
                Candidate::Unbound => saw_unbound = true,
            }
        }

        // A side-bound "confidence" figure stands in for a missing probability
        if out_of_range.is_none() && !saw_unbound {
            for candidate in confidence_candidates {
                if let Candidate::Bound(side, value) = candidate {
                    if (0.0..=1.0).contains(&value) {
                        return Ok(self.bind(side, value, None, text.trim().to_string()));
                    }
                }
            }
        }

        if let Some(value) = out_of_range {
            Err(ParseFailure::OutOfRange(value))
        } else if saw_unbound {
            Err(ParseFailure::AmbiguousSide)
        } else {
            Err(ParseFailure::NoProbability)
        }
    }

    /// Bind a number to a side. In order: a side named right before the
    /// number ("win probability: Lakers 60%"), a side attached to the label
    /// ("Lakers win probability", "win probability for the Lakers"), then
    /// the only side the segment names at all. Two competing sides at any
    /// step leave the number unbound.
    fn candidate(&self, segment: &str, label: (usize, usize), token: NumberToken) -> Candidate {
        let (label_start, label_end) = label;
        let mentions = self.mentions(segment);

        let at_number = mentions
            .iter()
            .filter(|m| m.end <= token.start && joins_number(&segment[m.end..token.start]));
        let at_label = mentions.iter().filter(|m| {
            (m.end <= label_start && joins_label_before(&segment[m.end..label_start]))
                || (m.start >= label_end && joins_label_after(&segment[label_end..m.start]))
        });

        for tier in [sides_of(at_number), sides_of(at_label), sides_of(mentions.iter())] {
            match tier {
                Some(Sides::One(side)) => return Candidate::Bound(side, token.value),
                Some(Sides::Conflict) => return Candidate::Unbound,
                None => {}
            }
        }
        Candidate::Unbound
    }

    /// Side mentions in a lowercased segment, with mentions nested inside a
    /// longer mention of the other side removed
    fn mentions(&self, segment: &str) -> Vec<Mention> {
        let mut found: Vec<Mention> = Vec::new();
        for (side, alias) in &self.aliases {
            for start in find_word_all(segment, alias) {
                found.push(Mention {
                    side: *side,
                    start,
                    end: start + alias.len(),
                });
            }
        }

        let all = found.clone();
        found.retain(|m| {
            !all.iter().any(|o| {
                o.side != m.side
                    && o.start <= m.start
                    && o.end >= m.end
                    && (o.end - o.start) > (m.end - m.start)
            })
        });
        found
    }

    fn resolve_side_name(&self, name: &str) -> Option<Side> {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "a" | "side a" | "home" => return Some(Side::A),
            "b" | "side b" | "away" => return Some(Side::B),
            _ => {}
        }

        let matches: Vec<Side> = self
            .aliases
            .iter()
            .filter(|(_, alias)| *alias == name || !find_word_all(&name, alias).is_empty())
            .map(|(side, _)| *side)
            .collect();

        match matches.first() {
            Some(first) if matches.iter().all(|s| s == first) => Some(*first),
            _ => None,
        }
    }

    fn bind(&self, stated_side: Side, stated: f64, confidence: Option<f64>, rationale: String) -> ParsedResponse {
        let probability = if stated_side == self.target {
            stated
        } else {
            1.0 - stated
        };

        ParsedResponse {
            probability,
            stated_side,
            stated_probability: stated,
            confidence,
            rationale,
        }
    }
}

/// Full names plus distinctive last words ("Los Angeles Lakers" -> "lakers")
fn side_aliases(event: &EventContext) -> Vec<(Side, String)> {
    let full_a = event.name(Side::A).to_lowercase();
    let full_b = event.name(Side::B).to_lowercase();

    let short = |full: &str| -> Option<String> {
        let last = full.split_whitespace().last()?.to_string();
        let usable = last != full
            && last.chars().count() >= 3
            && !GENERIC_WORDS.contains(&last.as_str());
        usable.then_some(last)
    };

    let mut aliases = vec![(Side::A, full_a.clone()), (Side::B, full_b.clone())];
    let (short_a, short_b) = (short(&full_a), short(&full_b));
    if short_a != short_b {
        if let Some(alias) = short_a {
            aliases.push((Side::A, alias));
        }
        if let Some(alias) = short_b {
            aliases.push((Side::B, alias));
        }
    }
    aliases
}

fn sides_of<'a>(mentions: impl Iterator<Item = &'a Mention>) -> Option<Sides> {
    let mut found = None;
    for mention in mentions {
        match found {
            None => found = Some(mention.side),
            Some(side) if side != mention.side => return Some(Sides::Conflict),
            Some(_) => {}
        }
    }
    found.map(Sides::One)
}

/// "lakers 60%", "lakers: 60%", "lakers (60%"
fn joins_number(gap: &str) -> bool {
    gap.chars()
        .all(|c| c.is_whitespace() || matches!(c, ':' | '=' | '(' | '-'))
}

/// "lakers win probability", "lakers' win probability", "lakers's chance"
fn joins_label_before(gap: &str) -> bool {
    let gap = gap
        .strip_prefix("'s")
        .or_else(|| gap.strip_prefix("\u{2019}s"))
        .or_else(|| gap.strip_prefix('\''))
        .or_else(|| gap.strip_prefix('\u{2019}'))
        .unwrap_or(gap);
    gap.chars().all(char::is_whitespace)
}

/// "probability for the lakers", "chance of the lakers"
fn joins_label_after(gap: &str) -> bool {
    matches!(
        gap.split_whitespace().collect::<Vec<_>>().as_slice(),
        ["for"] | ["for", "the"] | ["of"] | ["of", "the"]
    )
}

fn json_probability(value: &Value) -> Option<f64> {
    if let Some(v) = value.as_f64() {
        return Some(v);
    }
    let s = value.as_str()?;
    scan_numbers(&s.to_lowercase()).first().map(|t| t.value)
}

/// Extract JSON from a response that may contain markdown code blocks
pub fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            let content = text[start + 3..start + 3 + end].trim();
            // Skip language identifier if present
            if !content.starts_with('{') {
                if let Some(newline) = content.find('\n') {
                    return content[newline + 1..].trim();
                }
            }
            return content;
        }
    }

    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return &text[start..=end];
            }
        }
    }

    text.trim()
}

/// Split on line breaks, semicolons and sentence ends. A '.' only ends a
/// sentence when followed by whitespace or end of text, so "0.63" survives.
fn split_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' | ';' | '!' | '?' => true,
            '.' => chars.peek().map_or(true, |(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            let segment = text[start..i].trim();
            if !segment.is_empty() {
                segments.push(segment);
            }
            start = i + c.len_utf8();
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        segments.push(tail);
    }
    segments
}

fn is_word_boundary(haystack: &str, start: usize, end: usize) -> bool {
    let before = haystack[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric());
    let after = haystack[end..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric());
    before && after
}

fn find_word_all(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(needle)
        .filter(|(i, _)| is_word_boundary(haystack, *i, i + needle.len()))
        .map(|(i, _)| i)
        .collect()
}

/// Earliest label occurrence in the segment as (start, end)
fn find_label(segment: &str, labels: &[&str]) -> Option<(usize, usize)> {
    labels
        .iter()
        .filter_map(|label| {
            find_word_all(segment, label)
                .first()
                .map(|start| (*start, start + label.len()))
        })
        .min_by_key(|(start, end)| (*start, std::cmp::Reverse(*end)))
}

/// First number after the label, else the closest one before it
fn attached_number(tokens: &[NumberToken], label_start: usize, label_end: usize) -> Option<NumberToken> {
    tokens
        .iter()
        .find(|t| t.start >= label_end)
        .or_else(|| tokens.iter().rev().find(|t| t.end <= label_start))
        .copied()
}

/// Numeric tokens with percentages normalized ("63%" and "63 percent" ->
/// 0.63). Digits glued to letters ("76ers", "3rd") or embedded in dates and
/// identifiers are not tokens.
fn scan_numbers(s: &str) -> Vec<NumberToken> {
    let bytes = s.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let signed = (b == b'-' || b == b'+') && bytes.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if !(b.is_ascii_digit() || signed) {
            i += 1;
            continue;
        }

        let start = i;
        let mut j = if signed { i + 1 } else { i };
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j + 1 < bytes.len() && bytes[j] == b'.' && bytes[j + 1].is_ascii_digit() {
            j += 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
        }
        let number_end = j;

        let attached_before = s[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '/' | ','));
        let mut after = s[number_end..].chars();
        let attached_after = match (after.next(), after.next()) {
            (Some(c), _) if c.is_alphabetic() || c == '/' => true,
            (Some('-' | ':' | ','), Some(d)) => d.is_ascii_digit(),
            _ => false,
        };

        i = number_end;
        if attached_before || attached_after {
            continue;
        }

        let mut end = number_end;
        let rest = &s[number_end..];
        let trimmed = rest.trim_start_matches(' ');
        let skipped = rest.len() - trimmed.len();
        let percent = if trimmed.starts_with('%') {
            end = number_end + skipped + 1;
            true
        } else if trimmed.starts_with("percent") {
            end = number_end + skipped + "percent".len();
            true
        } else {
            false
        };

        let Ok(raw) = s[start..number_end].trim_start_matches('+').parse::<f64>() else {
            continue;
        };
        let value = if percent { raw / 100.0 } else { raw };

        tokens.push(NumberToken { start, end, value });
        i = end;
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Odds;

    fn event(a: &str, b: &str) -> EventContext {
        EventContext::new(a, b, Odds::American(-150), Odds::American(130)).unwrap()
    }

    fn parse(a: &str, b: &str, target: Side, text: &str) -> Result<ParsedResponse, ParseFailure> {
        ResponseParser::new(&event(a, b), target).parse(text)
    }

    #[test]
    fn test_opposite_side_is_inverted() {
        let parsed = parse("Team A", "Team B", Side::A, "Team B win probability: 35%").unwrap();
        assert!((parsed.probability - 0.65).abs() < 1e-9);
        assert_eq!(parsed.stated_side, Side::B);
        assert!((parsed.stated_probability - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_both_sides_without_binding_fail_closed() {
        for text in [
            "Lakers over Celtics with 60% probability",
            "Lakers beat Celtics, win probability 60%",
        ] {
            assert_eq!(
                parse("Lakers", "Celtics", Side::A, text),
                Err(ParseFailure::AmbiguousSide),
                "{text}"
            );
        }
    }

    #[test]
    fn test_side_next_to_number_binds() {
        let text = "Lakers vs Celtics win probability: Lakers 60%";
        let parsed = parse("Lakers", "Celtics", Side::A, text).unwrap();
        assert_eq!(parsed.stated_side, Side::A);
        assert!((parsed.probability - 0.60).abs() < 1e-9);

        let text = "Win probability: Celtics 40%, Lakers 60%";
        let parsed = parse("Lakers", "Celtics", Side::A, text).unwrap();
        assert_eq!(parsed.stated_side, Side::B);
        assert!((parsed.probability - 0.60).abs() < 1e-9);
    }

    #[test]
    fn test_side_attached_to_label_binds() {
        let parsed = parse("Lakers", "Celtics", Side::A, "Lakers' win probability is 58%").unwrap();
        assert_eq!(parsed.stated_side, Side::A);
        assert!((parsed.probability - 0.58).abs() < 1e-9);

        let text = "Facing the Lakers tonight, the win probability for the Celtics is 45%";
        let parsed = parse("Lakers", "Celtics", Side::A, text).unwrap();
        assert_eq!(parsed.stated_side, Side::B);
        assert!((parsed.probability - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_same_side_kept() {
        let parsed = parse("Team A", "Team B", Side::A, "Team A win probability: 63%").unwrap();
        assert!((parsed.probability - 0.63).abs() < 1e-9);
    }

    #[test]
    fn test_decimal_probability() {
        let parsed = parse(
            "Los Angeles Lakers",
            "Boston Celtics",
            Side::B,
            "After weighing injuries, the Celtics probability of winning is 0.58.",
        )
        .unwrap();
        assert!((parsed.probability - 0.58).abs() < 1e-9);
    }

    #[test]
    fn test_short_name_alias() {
        let parsed = parse(
            "Los Angeles Lakers",
            "Boston Celtics",
            Side::A,
            "Lakers win probability: 41 percent",
        )
        .unwrap();
        assert!((parsed.probability - 0.41).abs() < 1e-9);
    }

    #[test]
    fn test_unbound_probability_fails_closed() {
        let result = parse("Team A", "Team B", Side::A, "Win probability: 63%");
        assert_eq!(result, Err(ParseFailure::AmbiguousSide));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let result = parse("Team A", "Team B", Side::A, "Team A win probability: 63");
        assert_eq!(result, Err(ParseFailure::OutOfRange(63.0)));

        let result = parse("Team A", "Team B", Side::A, "Team A win probability: 140%");
        assert!(matches!(result, Err(ParseFailure::OutOfRange(_))));
    }

    #[test]
    fn test_no_probability() {
        let result = parse("Team A", "Team B", Side::A, "I cannot predict sports outcomes.");
        assert_eq!(result, Err(ParseFailure::NoProbability));
        assert_eq!(parse("Team A", "Team B", Side::A, ""), Err(ParseFailure::NoProbability));
    }

    #[test]
    fn test_first_bound_token_wins() {
        let text = "Analysis of the matchup.\nWin probability: 70%\nCeltics win probability: 45%\nLakers win probability: 55%";
        let parsed = parse("Lakers", "Celtics", Side::A, text).unwrap();
        assert!((parsed.probability - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_team_digits_not_numbers() {
        let parsed = parse(
            "Philadelphia 76ers",
            "Dallas Mavericks",
            Side::A,
            "76ers win probability: 48%",
        )
        .unwrap();
        assert!((parsed.probability - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_json_answer() {
        let text = r#"Here is my estimate:

```json
{"side": "Boston Celtics", "win_probability": 0.42, "confidence": 0.7, "reasoning": "Road team, back-to-back."}
```"#;
        let parsed = parse("Los Angeles Lakers", "Boston Celtics", Side::A, text).unwrap();
        assert!((parsed.probability - 0.58).abs() < 1e-9);
        assert_eq!(parsed.confidence, Some(0.7));
        assert_eq!(parsed.rationale, "Road team, back-to-back.");
    }

    #[test]
    fn test_json_percent_string() {
        let text = r#"{"side": "A", "win_probability": "61%"}"#;
        let parsed = parse("Lakers", "Celtics", Side::A, text).unwrap();
        assert!((parsed.probability - 0.61).abs() < 1e-9);
    }

    #[test]
    fn test_json_without_side_falls_back_to_text() {
        let text = r#"{"win_probability": 0.61}"#;
        assert_eq!(parse("Lakers", "Celtics", Side::A, text), Err(ParseFailure::AmbiguousSide));
    }

    #[test]
    fn test_confidence_signal() {
        let text = "Lakers win probability: 60%\nConfidence: 80%";
        // Confidence after the probability line is not seen before the return
        let parsed = parse("Lakers", "Celtics", Side::A, text).unwrap();
        assert_eq!(parsed.confidence, None);

        let text = "Confidence: 80%\nLakers win probability: 60%";
        let parsed = parse("Lakers", "Celtics", Side::A, text).unwrap();
        assert_eq!(parsed.confidence, Some(0.8));
    }

    #[test]
    fn test_side_bound_confidence_as_fallback() {
        let parsed = parse("Lakers", "Celtics", Side::A, "Celtics to win, confidence 70%").unwrap();
        assert!((parsed.probability - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_shared_last_word_not_an_alias() {
        let result = parse(
            "Manchester United",
            "Newcastle United",
            Side::A,
            "United win probability: 55%",
        );
        assert_eq!(result, Err(ParseFailure::AmbiguousSide));
    }

    #[test]
    fn test_scan_numbers() {
        let tokens = scan_numbers("63% and 0.4, 2024-25 season, 3rd seed, 12 percent");
        let values: Vec<f64> = tokens.iter().map(|t| t.value).collect();
        assert_eq!(values, vec![0.63, 0.4, 0.12]);
    }

    #[test]
    fn test_split_segments_keeps_decimals() {
        let segments = split_segments("prob 0.63. next line\nthird; fourth");
        assert_eq!(segments, vec!["prob 0.63", "next line", "third", "fourth"]);
    }

    #[test]
    fn test_extract_json_from_code_block() {
        let text = "Answer:\n```json\n{\"side\": \"A\"}\n```\nDone.";
        assert_eq!(extract_json(text), "{\"side\": \"A\"}");
        let raw = r#"{"side": "A"}"#;
        assert_eq!(extract_json(raw), raw);
    }
}
