//! Parameter extraction by prompting a language model for a JSON object.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{ExtractError, Extractor, FOLLOWUP_CUES};
use crate::dates::{DateExpr, DateRange, DateResolver};
use crate::llm::TextGenerator;
use crate::params::{Intent, QueryParameters};
use crate::store::models::{Ticketed, TimeOfDay};

static FENCED_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap());

/// Extractor backed by any [`TextGenerator`].
pub struct LlmExtractor<G> {
    generator: G,
    resolver: DateResolver,
}

impl<G: TextGenerator> LlmExtractor<G> {
    pub fn new(generator: G, resolver: DateResolver) -> Self {
        Self { generator, resolver }
    }

    fn prompt(&self, utterance: &str) -> String {
        format!(
            r#"You extract search filters from questions about a Carnatic music season concert schedule.
Today is {today}.

Reply with a single JSON object and nothing else, using exactly these keys:
  "date": a single day as "YYYY-MM-DD" or "Mon D" (e.g. "Dec 15"), or null
  "date_range": {{"start": "YYYY-MM-DD", "end": "YYYY-MM-DD"}} for spans such as "next week" or "Dec 15-20", or null
  "artist": performer name as written, or null
  "venue": hall or sabha name, or null
  "location": neighbourhood or area (e.g. "Mylapore"), or null
  "time_of_day": one of "morning", "afternoon", "evening", "night", or null
  "ticketed": "free", "ticketed", or null when admission is not mentioned
  "intent": one of "search", "route_planning", "info", "help"
  "is_followup": true when the question narrows earlier results (words like {cues}), else false

Question: {utterance}"#,
            today = self.resolver.today.format("%Y-%m-%d (%A)"),
            cues = FOLLOWUP_CUES
                .iter()
                .map(|c| format!("\"{c}\""))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    fn convert(&self, raw: RawExtraction) -> QueryParameters {
        QueryParameters {
            date: text(&raw.date),
            date_range: self.date_range(&raw.date_range),
            artist: text(&raw.artist),
            venue: text(&raw.venue),
            location: text(&raw.location),
            time_of_day: text(&raw.time_of_day).and_then(|t| t.parse::<TimeOfDay>().ok()),
            ticketed: ticketed(&raw.ticketed),
            intent: text(&raw.intent)
                .and_then(|i| i.parse::<Intent>().ok())
                .unwrap_or_default(),
            is_followup: flag(&raw.is_followup),
        }
        .normalized()
    }

    /// `{"start": .., "end": ..}` or a range phrase such as "Dec 15-20".
    fn date_range(&self, value: &Value) -> Option<DateRange> {
        let range = match value {
            Value::Object(map) => {
                let start = self.exact(map.get("start")?)?;
                let end = self.exact(map.get("end")?)?;
                DateRange::new(start, end)
            }
            Value::String(s) => match self.resolver.resolve(s)? {
                DateExpr::Range(range) => range,
                _ => return None,
            },
            _ => return None,
        };
        (range.start <= range.end).then_some(range)
    }

    fn exact(&self, value: &Value) -> Option<chrono::NaiveDate> {
        let s = value.as_str()?;
        match self.resolver.resolve(s)? {
            DateExpr::Exact(date) => Some(date),
            DateExpr::MonthDay { month, day } => {
                chrono::NaiveDate::from_ymd_opt(self.resolver.infer_year(month, day), month, day)
            }
            DateExpr::Range(_) => None,
        }
    }
}

impl<G: TextGenerator> Extractor for LlmExtractor<G> {
    fn extract(&self, utterance: &str) -> Result<QueryParameters, ExtractError> {
        let reply = self.generator.generate(&self.prompt(utterance))?;
        log::debug!("Extraction reply: {reply}");
        let raw = parse_reply(&reply)?;
        Ok(self.convert(raw))
    }
}

/// Loosely typed reply; models are inconsistent about nulls, booleans and
/// quoting, so every field is read leniently.
#[derive(Deserialize, Default, Debug)]
#[serde(default)]
struct RawExtraction {
    date: Value,
    date_range: Value,
    artist: Value,
    venue: Value,
    location: Value,
    time_of_day: Value,
    ticketed: Value,
    intent: Value,
    is_followup: Value,
}

/// Fenced ```json block, then the first balanced `{...}`, then the whole reply.
fn parse_reply(reply: &str) -> Result<RawExtraction, ExtractError> {
    let fenced = FENCED_JSON_RE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());
    let candidates = [fenced, first_object(reply), Some(reply.trim())];

    for candidate in candidates.into_iter().flatten() {
        if !candidate.starts_with('{') {
            continue;
        }
        if let Ok(raw) = serde_json::from_str::<RawExtraction>(candidate) {
            return Ok(raw);
        }
    }
    let preview: String = reply.chars().take(80).collect();
    Err(ExtractError::Unparsable(preview))
}

/// First brace-balanced object in `text`, ignoring braces inside strings.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Non-blank string that is not a spelled-out null.
fn text(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    match s.to_lowercase().as_str() {
        "" | "null" | "none" | "n/a" => None,
        _ => Some(s.to_string()),
    }
}

fn ticketed(value: &Value) -> Option<Ticketed> {
    match value {
        Value::Bool(true) => Some(Ticketed::Ticketed),
        Value::Bool(false) => Some(Ticketed::Free),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(Ticketed::Ticketed),
            "false" => Some(Ticketed::Free),
            other => other.parse().ok(),
        },
        _ => None,
    }
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerateError;
    use chrono::NaiveDate;

    struct FakeGenerator(&'static str);

    impl TextGenerator for FakeGenerator {
        fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Ok(self.0.to_string())
        }
    }

    struct DownGenerator;

    impl TextGenerator for DownGenerator {
        fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Err(GenerateError::EmptyResponse)
        }
    }

    fn make_extractor(reply: &'static str) -> LlmExtractor<FakeGenerator> {
        let today = NaiveDate::from_ymd_opt(2025, 12, 10).unwrap();
        LlmExtractor::new(FakeGenerator(reply), DateResolver::new(today))
    }

    #[test]
    fn test_plain_json() {
        let p = make_extractor(
            r#"{"date": "Dec 15", "artist": "Sanjay Subrahmanyan", "venue": null,
                "time_of_day": "evening", "ticketed": null, "intent": "search", "is_followup": false}"#,
        )
        .extract("Sanjay on Dec 15 evening")
        .unwrap();
        assert_eq!(p.date.as_deref(), Some("Dec 15"));
        assert_eq!(p.artist.as_deref(), Some("Sanjay Subrahmanyan"));
        assert_eq!(p.venue, None);
        assert_eq!(p.time_of_day, Some(TimeOfDay::Evening));
        assert_eq!(p.ticketed, None);
        assert_eq!(p.intent, Intent::Search);
        assert!(!p.is_followup);
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let p = make_extractor(
            "Sure! Here you go:\n```json\n{\"ticketed\": \"free\", \"is_followup\": true}\n```\nHope that helps.",
        )
        .extract("only the free ones")
        .unwrap();
        assert_eq!(p.ticketed, Some(Ticketed::Free));
        assert!(p.is_followup);
    }

    #[test]
    fn test_object_embedded_in_text() {
        let p = make_extractor(
            r#"The filters are {"venue": "Vani {Mahal}", "intent": "route_planning"} as requested."#,
        )
        .extract("route")
        .unwrap();
        assert_eq!(p.venue.as_deref(), Some("Vani {Mahal}"));
        assert_eq!(p.intent, Intent::RoutePlanning);
    }

    #[test]
    fn test_lenient_values() {
        let p = make_extractor(
            r#"{"artist": "None", "ticketed": true, "is_followup": "yes", "intent": "shopping",
                "date_range": {"start": "2025-12-15", "end": "2025-12-21"}}"#,
        )
        .extract("x")
        .unwrap();
        assert_eq!(p.artist, None);
        assert_eq!(p.ticketed, Some(Ticketed::Ticketed));
        assert!(p.is_followup);
        // unknown intent falls back to search
        assert_eq!(p.intent, Intent::Search);
        let range = p.date_range.unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2025, 12, 15).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2025, 12, 21).unwrap());
    }

    #[test]
    fn test_date_range_phrase() {
        let p = make_extractor(r#"{"date_range": "Dec 15-20"}"#).extract("x").unwrap();
        assert_eq!(
            p.date_range,
            Some(DateRange::new(
                NaiveDate::from_ymd_opt(2025, 12, 15).unwrap(),
                NaiveDate::from_ymd_opt(2025, 12, 20).unwrap()
            ))
        );
    }

    #[test]
    fn test_unparsable_reply() {
        let err = make_extractor("I could not understand that.").extract("x").unwrap_err();
        assert!(matches!(err, ExtractError::Unparsable(_)));
    }

    #[test]
    fn test_generation_failure() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 10).unwrap();
        let extractor = LlmExtractor::new(DownGenerator, DateResolver::new(today));
        assert!(matches!(extractor.extract("x"), Err(ExtractError::Generation(_))));
    }

    #[test]
    fn test_first_object_ignores_string_braces() {
        assert_eq!(first_object(r#"a {"k": "}"} b"#), Some(r#"{"k": "}"}"#));
        assert_eq!(first_object("no braces"), None);
        assert_eq!(first_object("{ unclosed"), None);
    }

    #[test]
    fn test_prompt_mentions_today_and_keys() {
        let prompt = make_extractor("{}").prompt("free concerts");
        assert!(prompt.contains("2025-12-10"));
        assert!(prompt.contains("\"is_followup\""));
        assert!(prompt.contains("Question: free concerts"));
    }
}
