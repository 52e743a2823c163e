//! Deterministic extraction from keyword sets, regex cues and the gazetteer.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::{ExtractError, Extractor, has_followup_cue};
use crate::dates::{self, DateExpr, DateRange, DateResolver, month_from_name, weekday_from_name};
use crate::gazetteer::Gazetteer;
use crate::params::{Intent, QueryParameters};
use crate::store::models::{Ticketed, TimeOfDay};

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

static MONTH_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?P<month>{MONTHS})\.?\s+(?P<day>\d{{1,2}})(?:st|nd|rd|th)?\b")).unwrap()
});

static DAY_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?P<day>\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?(?P<month>{MONTHS})\b")).unwrap()
});

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());

static NUMERIC_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b").unwrap());

/// A run of capitalised words, allowing initials ("T.M."), hyphenated
/// duos and "&"/"and" joins.
const NAME: &str = r"[A-Z][A-Za-z.'\-]*(?:\s+(?:&\s+|and\s+)?[A-Z][A-Za-z.'\-]*)*";

/// Artist cues in priority order.
static ARTIST_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"(?i:\bby)\s+(?P<name>{NAME})"),
        format!(r"(?P<name>{NAME})\s+(?i:singing|performing|performs|sings)\b"),
        format!(r"(?P<name>{NAME})(?:'s)?\s+(?i:concerts?|kutcheris?|recitals?)\b"),
        format!(r"(?i:\b(?:when|where)\s+(?:is|are|does|do)\s+)(?P<name>{NAME})"),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static VENUE_AT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bat\s+(?:the\s+)?(?P<venue>[a-z][a-z.'&\s]*?)(?:\s+(?:on|in|for|by|with|this|next|during|around|from|concerts?|today|tomorrow|tonight)\b|\s*[,?!;]|\s*$)",
    )
    .unwrap()
});

static VENUE_IN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:\bin)\s+(?:the\s+)?(?P<venue>[A-Z][A-Za-z.'&]*(?:\s+[A-Z][A-Za-z.'&]*)*)").unwrap()
});

static VENUE_CONCERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<venue>[A-Z][A-Za-z.'&]*(?:\s+[A-Z][A-Za-z.'&]*)*)\s+(?i:concerts?)\b").unwrap()
});

/// Words that make a phrase a place rather than a person.
const VENUE_KEYWORDS: &[&str] = &[
    "hall", "sabha", "academy", "auditorium", "mahal", "bhavan", "arts", "centre", "center",
    "kalakshetra", "mandapam", "samaj", "convention",
];

/// Never an artist or venue on their own, and trimmed from the edges of a
/// captured name.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "at", "on", "in", "by", "of", "for", "to", "and", "or", "when", "where",
    "what", "who", "which", "is", "are", "does", "do", "show", "find", "list", "get", "any", "all",
    "me", "i", "can", "please", "tell", "about", "only", "just", "those", "these", "them", "filter",
    "free", "ticketed", "paid", "morning", "afternoon", "evening", "night", "today", "tomorrow",
    "yesterday", "tonight", "next", "this", "weekend", "week", "concert", "concerts", "singing",
    "performing", "carnatic", "classical", "music", "vocal", "plan", "route", "help", "info",
];

/// Words at which a captured artist span is cut.
const NAME_BREAKS: &[&str] = &[
    "at", "on", "in", "by", "the", "concert", "concerts", "singing", "performing", "this", "next",
];

static FREE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:free|no tickets?|no charge|complimentary)\b").unwrap()
});

static TICKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:ticketed|paid|tickets?)\b").unwrap());

static TIME_OF_DAY_RES: LazyLock<Vec<(TimeOfDay, Regex)>> = LazyLock::new(|| {
    TimeOfDay::ALL
        .iter()
        .map(|&t| (t, Regex::new(&format!(r"(?i)\b{}s?\b", t.as_str())).unwrap()))
        .collect()
});

static ROUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:route|plan(?:ning)?|directions|travel)\b").unwrap()
});
static HELP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:help|what can|how can)\b").unwrap());
static INFO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:info|information|tell me about)\b").unwrap());

/// Keyword, regex and gazetteer extraction. Needs no network and always
/// produces parameters.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    resolver: DateResolver,
    gazetteer: Gazetteer,
}

impl PatternExtractor {
    pub fn new(resolver: DateResolver, gazetteer: Gazetteer) -> Self {
        Self { resolver, gazetteer }
    }

    pub fn extract_params(&self, utterance: &str) -> QueryParameters {
        let (date, date_range) = self.extract_date(utterance);
        QueryParameters {
            date,
            date_range,
            artist: self.extract_artist(utterance),
            venue: self.extract_venue(utterance),
            location: self.gazetteer.find_location(utterance).map(str::to_string),
            time_of_day: extract_time_of_day(utterance),
            ticketed: extract_ticketed(utterance),
            intent: extract_intent(utterance),
            is_followup: has_followup_cue(utterance),
        }
    }

    /// Ranges first, then relative expressions, then absolute dates.
    /// Week-level expressions become a range; single days a date string.
    pub fn extract_date(&self, utterance: &str) -> (Option<String>, Option<DateRange>) {
        if let Some(range) = self.resolver.parse_range(utterance) {
            return (None, Some(range));
        }
        match self.resolver.parse_relative(utterance) {
            Some(DateExpr::Range(range)) => return (None, Some(range)),
            Some(DateExpr::Exact(date)) => return (Some(iso(date)), None),
            Some(DateExpr::MonthDay { .. }) | None => {}
        }
        (absolute_date(utterance), None)
    }

    pub fn extract_artist(&self, utterance: &str) -> Option<String> {
        for re in ARTIST_RES.iter() {
            for caps in re.captures_iter(utterance) {
                if let Some(name) = clean_name(&caps["name"]) {
                    if self.is_plausible_artist(&name) {
                        return Some(name);
                    }
                }
            }
        }
        None
    }

    fn is_plausible_artist(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        name.chars().count() >= 3
            && !STOPWORDS.contains(&lower.as_str())
            && !is_calendar_word(&lower)
            && !has_venue_keyword(&lower)
            && !self.gazetteer.is_location(&lower)
            && self.gazetteer.find_venue(&lower).is_none()
    }

    /// "at X", "in X", "X concert" (only when X reads as a venue), then the
    /// gazetteer. Known venues are reported by their canonical name.
    pub fn extract_venue(&self, utterance: &str) -> Option<String> {
        let candidates = VENUE_AT_RE
            .captures_iter(utterance)
            .chain(VENUE_IN_RE.captures_iter(utterance))
            .map(|caps| caps["venue"].to_string())
            .chain(
                VENUE_CONCERT_RE
                    .captures_iter(utterance)
                    .map(|caps| caps["venue"].to_string())
                    .filter(|v| has_venue_keyword(&v.to_lowercase())),
            );

        for candidate in candidates {
            let venue = candidate
                .trim()
                .trim_end_matches(['.', ',', '\''])
                .trim()
                .to_string();
            if self.is_plausible_venue(&venue) {
                let canonical = self.gazetteer.find_venue(&venue).map(str::to_string);
                return Some(canonical.unwrap_or(venue));
            }
        }

        self.gazetteer.find_venue(utterance).map(str::to_string)
    }

    fn is_plausible_venue(&self, venue: &str) -> bool {
        let lower = venue.to_lowercase();
        venue.chars().count() >= 3
            && !STOPWORDS.contains(&lower.as_str())
            && !is_calendar_word(&lower)
            && !self.gazetteer.is_location(&lower)
    }
}

impl Extractor for PatternExtractor {
    fn extract(&self, utterance: &str) -> Result<QueryParameters, ExtractError> {
        Ok(self.extract_params(utterance))
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Month-name + day, day + month-name, ISO, then numeric; first valid wins.
/// Month/day forms come back year-less ("Dec 15").
fn absolute_date(utterance: &str) -> Option<String> {
    let month_day = |month: &str, day: &str| -> Option<String> {
        let month = month_from_name(month)?;
        let day: u32 = day.parse().ok()?;
        // leap year so Feb 29 is accepted
        NaiveDate::from_ymd_opt(2000, month, day)?;
        Some(format!("{} {}", MONTH_ABBR[month as usize - 1], day))
    };

    for caps in MONTH_DAY_RE.captures_iter(utterance) {
        if let Some(date) = month_day(&caps["month"], &caps["day"]) {
            return Some(date);
        }
    }
    for caps in DAY_MONTH_RE.captures_iter(utterance) {
        if let Some(date) = month_day(&caps["month"], &caps["day"]) {
            return Some(date);
        }
    }
    for caps in ISO_DATE_RE.captures_iter(utterance) {
        let parts = (caps[1].parse(), caps[2].parse(), caps[3].parse());
        if let (Ok(y), Ok(m), Ok(d)) = parts {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                return Some(iso(date));
            }
        }
    }
    for m in NUMERIC_DATE_RE.find_iter(utterance) {
        if let Some(DateExpr::Exact(date)) = dates::parse_absolute(m.as_str()) {
            return Some(iso(date));
        }
    }
    None
}

/// Trim cue words and stopwords from a captured name span and cut it at the
/// first break word.
fn clean_name(span: &str) -> Option<String> {
    let words: Vec<&str> = span.split_whitespace().collect();
    let is_stop = |w: &str| STOPWORDS.contains(&w.to_lowercase().as_str());

    let start = words.iter().position(|w| !is_stop(w))?;
    let mut kept: Vec<&str> = Vec::new();
    for w in &words[start..] {
        if !kept.is_empty() && NAME_BREAKS.contains(&w.to_lowercase().as_str()) {
            break;
        }
        kept.push(w);
    }
    while kept.last().is_some_and(|w| is_stop(w) || *w == "&") {
        kept.pop();
    }
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(" ").trim_end_matches([',', '.']).to_string())
    }
}

fn has_venue_keyword(lower: &str) -> bool {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| VENUE_KEYWORDS.contains(&w))
}

fn is_calendar_word(lower: &str) -> bool {
    month_from_name(lower).is_some() || weekday_from_name(lower).is_some()
}

fn extract_ticketed(utterance: &str) -> Option<Ticketed> {
    if FREE_RE.is_match(utterance) {
        Some(Ticketed::Free)
    } else if TICKETED_RE.is_match(utterance) {
        Some(Ticketed::Ticketed)
    } else {
        None
    }
}

/// Only one bucket is set: the first in morning, afternoon, evening, night
/// order that appears.
fn extract_time_of_day(utterance: &str) -> Option<TimeOfDay> {
    TIME_OF_DAY_RES
        .iter()
        .find(|(_, re)| re.is_match(utterance))
        .map(|(t, _)| *t)
}

fn extract_intent(utterance: &str) -> Intent {
    if ROUTE_RE.is_match(utterance) {
        Intent::RoutePlanning
    } else if HELP_RE.is_match(utterance) {
        Intent::Help
    } else if INFO_RE.is_match(utterance) {
        Intent::Info
    } else {
        Intent::Search
    }
}
