pub mod fallback;
pub mod llm;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::llm::GenerateError;
use crate::params::QueryParameters;

pub use fallback::PatternExtractor;
pub use llm::LlmExtractor;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerateError),
    #[error("Could not parse extraction response: {0}")]
    Unparsable(String),
}

/// Turns an utterance into structured query parameters.
pub trait Extractor {
    fn extract(&self, utterance: &str) -> Result<QueryParameters, ExtractError>;
}

/// Primary extractor (usually a language model) backed by the deterministic
/// pattern extractor. Any primary failure falls through to the patterns
/// without a retry.
pub struct TieredExtractor {
    primary: Option<Box<dyn Extractor>>,
    fallback: PatternExtractor,
}

impl TieredExtractor {
    pub fn new(primary: Option<Box<dyn Extractor>>, fallback: PatternExtractor) -> Self {
        Self { primary, fallback }
    }

    /// Pattern extraction only.
    pub fn offline(fallback: PatternExtractor) -> Self {
        Self::new(None, fallback)
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Extract, never failing: the pattern path always produces parameters.
    pub fn extract_or_fallback(&self, utterance: &str) -> QueryParameters {
        if let Some(primary) = &self.primary {
            match primary.extract(utterance) {
                Ok(params) => return params.normalized(),
                Err(e) => log::warn!("Primary extraction failed, using patterns: {e}"),
            }
        }
        self.fallback.extract_params(utterance)
    }
}

impl Extractor for TieredExtractor {
    fn extract(&self, utterance: &str) -> Result<QueryParameters, ExtractError> {
        Ok(self.extract_or_fallback(utterance))
    }
}

/// Words that mark an utterance as narrowing the previous results.
pub const FOLLOWUP_CUES: &[&str] = &[
    "filter", "only", "just", "those", "these", "the ones", "them", "show me", "which",
];

static FOLLOWUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:filter|only|just|those|these|the ones|them|show me|which)\b").unwrap()
});

pub fn has_followup_cue(utterance: &str) -> bool {
    FOLLOWUP_RE.is_match(utterance)
}

/// What a follow-up utterance is narrowing by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowupKind {
    Ticketed,
    Time,
    Venue,
    Date,
    Unknown,
}

static FOLLOWUP_TICKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:free|ticketed|paid|tickets?)\b").unwrap());
static FOLLOWUP_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:morning|afternoon|evening|night|am|pm)\b").unwrap()
});
static FOLLOWUP_VENUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:at|venue|hall|sabha|academy)\b").unwrap());
static FOLLOWUP_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:today|tomorrow|weekend|date|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
    )
    .unwrap()
});

/// Classify a follow-up; admission keywords are checked first.
pub fn detect_followup_kind(utterance: &str) -> FollowupKind {
    if FOLLOWUP_TICKETED_RE.is_match(utterance) {
        FollowupKind::Ticketed
    } else if FOLLOWUP_TIME_RE.is_match(utterance) {
        FollowupKind::Time
    } else if FOLLOWUP_VENUE_RE.is_match(utterance) {
        FollowupKind::Venue
    } else if FOLLOWUP_DATE_RE.is_match(utterance) {
        FollowupKind::Date
    } else {
        FollowupKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::DateResolver;
    use crate::gazetteer::Gazetteer;
    use crate::params::Intent;
    use chrono::NaiveDate;

    struct FailingExtractor;

    impl Extractor for FailingExtractor {
        fn extract(&self, _utterance: &str) -> Result<QueryParameters, ExtractError> {
            Err(ExtractError::Generation(GenerateError::EmptyResponse))
        }
    }

    struct CannedExtractor(QueryParameters);

    impl Extractor for CannedExtractor {
        fn extract(&self, _utterance: &str) -> Result<QueryParameters, ExtractError> {
            Ok(self.0.clone())
        }
    }

    fn patterns() -> PatternExtractor {
        let today = NaiveDate::from_ymd_opt(2025, 12, 10).unwrap();
        PatternExtractor::new(DateResolver::new(today), Gazetteer::default())
    }

    #[test]
    fn test_primary_failure_falls_back() {
        let tiered = TieredExtractor::new(Some(Box::new(FailingExtractor)), patterns());
        let params = tiered.extract("evening concerts in Mylapore").unwrap();
        assert_eq!(params.location.as_deref(), Some("Mylapore"));
        assert_eq!(params.intent, Intent::Search);
    }

    #[test]
    fn test_primary_result_used_and_normalized() {
        let canned = QueryParameters {
            artist: Some(" T.M. Krishna ".into()),
            venue: Some(String::new()),
            ..Default::default()
        };
        let tiered = TieredExtractor::new(Some(Box::new(CannedExtractor(canned))), patterns());
        let params = tiered.extract("anything").unwrap();
        assert_eq!(params.artist.as_deref(), Some("T.M. Krishna"));
        assert_eq!(params.venue, None);
    }

    #[test]
    fn test_followup_cues() {
        assert!(has_followup_cue("only the free ones"));
        assert!(has_followup_cue("Show me those in the evening"));
        assert!(!has_followup_cue("concerts on Dec 15"));
        // whole words only
        assert!(!has_followup_cue("the national anthem"));
    }

    #[test]
    fn test_followup_kind() {
        assert_eq!(detect_followup_kind("only the free ones"), FollowupKind::Ticketed);
        assert_eq!(detect_followup_kind("just the evening ones"), FollowupKind::Time);
        assert_eq!(detect_followup_kind("those at the academy"), FollowupKind::Venue);
        assert_eq!(detect_followup_kind("which are on friday"), FollowupKind::Date);
        assert_eq!(detect_followup_kind("only those"), FollowupKind::Unknown);
        // admission wins over time
        assert_eq!(detect_followup_kind("free evening ones"), FollowupKind::Ticketed);
    }
}
