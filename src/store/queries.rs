use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use super::models::{ConcertRecord, StoreSummary, Ticketed, TimeOfDay};
use super::{ConcertStore, RecordId};
use crate::dates::{DateExpr, DateRange};
use crate::params::QueryParameters;

/// Spelling variants folded to one canonical form before artist matching.
const SPELLING_VARIANTS: &[(&str, &str)] = &[("gayathri", "gayatri")];

static VARIANT_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    SPELLING_VARIANTS
        .iter()
        .map(|(variant, canonical)| {
            (Regex::new(&format!(r"\b{}\b", regex::escape(variant))).unwrap(), *canonical)
        })
        .collect()
});

/// Words that mark an utterance as being about a place rather than a person.
pub const LOCATION_KEYWORDS: &[&str] = &[
    "at", "on", "in", "the", "and", "or", "venue", "hall", "sabha", "academy",
];

/// Filler words ignored by free-text search.
const TEXT_STOPWORDS: &[&str] = &[
    "the", "and", "for", "any", "are", "all", "show", "find", "list", "what", "when", "where",
    "who", "there", "concert", "concerts", "performance", "performances", "events", "please",
    "with", "from", "about",
];

/// Normalise an artist string for comparison: `-` and `&` become spaces,
/// whitespace collapses, lower case, spelling variants folded.
pub fn normalize_artist(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '-' || c == '&' { ' ' } else { c })
        .collect();
    let mut out = spaced.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    for (re, canonical) in VARIANT_RES.iter() {
        out = re.replace_all(&out, *canonical).into_owned();
    }
    out
}

/// True when `text` contains one of [`LOCATION_KEYWORDS`] as a whole word.
pub fn has_location_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| LOCATION_KEYWORDS.contains(&w))
}

fn word_re(word: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(word))).ok()
}

impl ConcertStore {
    /// Every record id, sorted.
    pub fn all_ids(&self) -> Vec<RecordId> {
        self.sorted((0..self.records.len()).collect())
    }

    /// Order ids by (date, timestamp); missing values sort last.
    pub fn sorted(&self, mut ids: Vec<RecordId>) -> Vec<RecordId> {
        ids.sort_by_key(|&id| {
            let r = &self.records[id];
            (r.date.is_none(), r.date, r.time_parsed.is_none(), r.time_parsed, id)
        });
        ids
    }

    fn select(&self, pred: impl Fn(&ConcertRecord) -> bool) -> Vec<RecordId> {
        let ids = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| pred(r))
            .map(|(id, _)| id)
            .collect();
        self.sorted(ids)
    }

    /// Resolve a date expression and match it. `None` when the expression
    /// cannot be parsed.
    pub fn by_date(&self, text: &str) -> Option<Vec<RecordId>> {
        let expr = self.resolver.resolve(text)?;
        Some(self.by_date_expr(expr))
    }

    /// Exact dates fall back to month/day matching when nothing matches the
    /// exact day. Year-less dates always match by month/day.
    pub fn by_date_expr(&self, expr: DateExpr) -> Vec<RecordId> {
        match expr {
            DateExpr::Exact(date) => {
                let exact = self.select(|r| r.date == Some(date));
                if exact.is_empty() {
                    self.by_month_day(date.month(), date.day())
                } else {
                    exact
                }
            }
            DateExpr::MonthDay { month, day } => self.by_month_day(month, day),
            DateExpr::Range(range) => self.by_date_range(range),
        }
    }

    fn by_month_day(&self, month: u32, day: u32) -> Vec<RecordId> {
        self.select(|r| r.month() == Some(month) && r.day() == Some(day))
    }

    /// Inclusive interval match.
    pub fn by_date_range(&self, range: DateRange) -> Vec<RecordId> {
        self.select(|r| r.date.is_some_and(|d| range.contains(d)))
    }

    /// Tiered artist match; the first tier with any result wins.
    ///
    /// 1. Normalised phrase containment in either direction.
    /// 2. All significant query words (longer than two characters) as whole
    ///    words, when there are at least two of them.
    /// 3. Case-insensitive containment of the raw query.
    pub fn by_artist(&self, name: &str) -> Vec<RecordId> {
        let query = normalize_artist(name);
        if query.is_empty() {
            return Vec::new();
        }

        let exact = self.select(|r| {
            let artist = normalize_artist(&r.artists);
            !artist.is_empty() && (artist.contains(&query) || query.contains(&artist))
        });
        if !exact.is_empty() {
            return exact;
        }

        let words: Vec<Regex> = query
            .split(' ')
            .filter(|w| w.chars().count() > 2)
            .filter_map(word_re)
            .collect();
        if words.len() >= 2 {
            let all_words = self.select(|r| {
                let artist = normalize_artist(&r.artists);
                words.iter().all(|re| re.is_match(&artist))
            });
            if !all_words.is_empty() {
                return all_words;
            }
        }

        let raw = name.trim().to_lowercase();
        self.select(|r| r.artists.to_lowercase().contains(&raw))
    }

    /// Case-insensitive substring match on the venue. A known venue matches
    /// any of its gazetteer spellings as a whole phrase.
    pub fn by_venue(&self, name: &str) -> Vec<RecordId> {
        self.by_place(name, self.gazetteer.venue_spellings(name))
    }

    /// Areas are matched against the venue text; there is no separate
    /// geography column. "t nagar", "t.nagar" and "T. Nagar" all find the
    /// same rows, and none of them matches "Besant Nagar".
    pub fn by_location(&self, area: &str) -> Vec<RecordId> {
        self.by_place(area, self.gazetteer.location_spellings(area))
    }

    fn by_place(&self, name: &str, spellings: Option<&[String]>) -> Vec<RecordId> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        match spellings {
            Some(spellings) => self.select(|r| {
                let venue = r.venue.to_lowercase();
                spellings.iter().any(|s| contains_phrase(&venue, s))
            }),
            None => self.select(|r| r.venue.to_lowercase().contains(&needle)),
        }
    }

    /// Records whose hour falls in the bucket. Unknown hours never match.
    pub fn by_time_of_day(&self, bucket: TimeOfDay) -> Vec<RecordId> {
        let hours = self.hours();
        let ids = hours
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_some_and(|h| bucket.contains_hour(h)))
            .map(|(id, _)| id)
            .collect();
        self.sorted(ids)
    }

    /// Keep ids whose admission status is known and equals `status`.
    pub fn filter_ticketed(&self, ids: &[RecordId], status: Ticketed) -> Vec<RecordId> {
        ids.iter()
            .copied()
            .filter(|&id| self.records.get(id).is_some_and(|r| r.ticketed == Some(status)))
            .collect()
    }

    /// Conjunction of every filter in `params` over the whole table.
    pub fn combine(&self, params: &QueryParameters) -> Vec<RecordId> {
        self.refine(&self.all_ids(), params)
    }

    /// Intersect `ids` with each filter in `params`, in turn. Stops as soon as
    /// the running set is empty. Admission status is applied last.
    ///
    /// A date expression that cannot be parsed is skipped rather than
    /// emptying the result.
    pub fn refine(&self, ids: &[RecordId], params: &QueryParameters) -> Vec<RecordId> {
        let mut current: Vec<RecordId> = ids.to_vec();

        let mut dimensions: Vec<Vec<RecordId>> = Vec::new();
        if let Some(date) = &params.date {
            match self.by_date(date) {
                Some(ids) => dimensions.push(ids),
                None => log::warn!("Ignoring unparsable date filter {date:?}"),
            }
        }
        if let Some(range) = params.date_range {
            dimensions.push(self.by_date_range(range));
        }
        if let Some(artist) = &params.artist {
            dimensions.push(self.by_artist(artist));
        }
        if let Some(venue) = &params.venue {
            dimensions.push(self.by_venue(venue));
        }
        if let Some(location) = &params.location {
            dimensions.push(self.by_location(location));
        }
        if let Some(bucket) = params.time_of_day {
            dimensions.push(self.by_time_of_day(bucket));
        }

        for matches in dimensions {
            if current.is_empty() {
                break;
            }
            if matches.is_empty() {
                return Vec::new();
            }
            let keep: HashSet<RecordId> = matches.into_iter().collect();
            current.retain(|id| keep.contains(id));
        }

        if let Some(status) = params.ticketed {
            current = self.filter_ticketed(&current, status);
        }
        self.sorted(current)
    }

    /// Free-text search over artists and venues, never the details column.
    ///
    /// Several significant words with no place keyword are read as a name:
    /// every word must appear as a whole word in the artist field. Otherwise,
    /// or when that finds nothing, any word contained in artist or venue
    /// matches.
    pub fn search_text(&self, text: &str) -> Vec<RecordId> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | '?' | '!' | ';'))
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().count() > 2 && !TEXT_STOPWORDS.contains(w))
            .collect();
        if words.is_empty() {
            return Vec::new();
        }

        if words.len() > 1 && !has_location_keyword(text) {
            let res: Vec<Regex> = words.iter().filter_map(|w| word_re(w)).collect();
            let named = self.select(|r| {
                let artist = r.artists.to_lowercase();
                res.iter().all(|re| re.is_match(&artist))
            });
            if !named.is_empty() {
                return named;
            }
        }

        self.select(|r| {
            let artist = r.artists.to_lowercase();
            let venue = r.venue.to_lowercase();
            words.iter().any(|w| artist.contains(w) || venue.contains(w))
        })
    }

    /// Sorted unique venue names.
    pub fn all_venues(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.venue.clone())
            .filter(|v| !v.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted unique artist names, splitting ensemble fields on `;`, `,`,
    /// `&` and the word "and".
    pub fn all_artists(&self) -> Vec<String> {
        static SPLIT_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?i)\s*(?:;|,|&|\band\b)\s*").unwrap());
        self.records
            .iter()
            .flat_map(|r| SPLIT_RE.split(&r.artists).map(str::trim).collect::<Vec<_>>())
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// First and last dated concert.
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.records.iter().filter_map(|r| r.date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }

    pub fn summary(&self) -> StoreSummary {
        let venues = self.all_venues();
        let mut sources: BTreeMap<String, usize> = BTreeMap::new();
        for r in &self.records {
            if let Some(s) = &r.source {
                *sources.entry(s.clone()).or_default() += 1;
            }
        }
        let mut sources: Vec<(String, usize)> = sources.into_iter().collect();
        sources.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let span = self.date_span();
        StoreSummary {
            total: self.records.len(),
            first_date: span.map(|s| s.0),
            last_date: span.map(|s| s.1),
            venue_count: venues.len(),
            sample_venues: venues.into_iter().take(20).collect(),
            sources,
            free: self.records.iter().filter(|r| r.ticketed == Some(Ticketed::Free)).count(),
            ticketed: self
                .records
                .iter()
                .filter(|r| r.ticketed == Some(Ticketed::Ticketed))
                .count(),
            undated: self.records.iter().filter(|r| r.date.is_none()).count(),
        }
    }
}

/// `phrase` occurs in `haystack` with no letter or digit on either side.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    !phrase.is_empty()
        && haystack.match_indices(phrase).any(|(start, _)| {
            let before = haystack[..start].chars().next_back();
            let after = haystack[start + phrase.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
}
