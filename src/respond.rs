use std::collections::BTreeMap;

use crate::llm::{GenerateError, TextGenerator};
use crate::params::QueryParameters;
use crate::session::Turn;
use crate::store::models::{ConcertRecord, StoreSummary, Ticketed};

/// Rows included verbatim in a digest.
pub const DIGEST_SAMPLE_ROWS: usize = 10;
/// Turns of history given to the model for help/info answers.
pub const INFO_HISTORY_TURNS: usize = 5;
const DISTRIBUTION_TOP: usize = 5;

/// Compact description of a result set, small enough for a prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultDigest {
    pub count: usize,
    pub sample: Vec<String>,
    /// Most frequent dates, most common first.
    pub dates: Vec<(String, usize)>,
    pub venues: Vec<(String, usize)>,
    pub free: usize,
    pub ticketed: usize,
    pub unknown_admission: usize,
}

impl ResultDigest {
    /// Records are expected in display order; the first ten become samples.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ConcertRecord>) -> Self {
        let mut digest = Self::default();
        let mut dates: BTreeMap<String, usize> = BTreeMap::new();
        let mut venues: BTreeMap<String, usize> = BTreeMap::new();

        for r in records {
            digest.count += 1;
            if digest.sample.len() < DIGEST_SAMPLE_ROWS {
                digest.sample.push(format!(
                    "{} {} | {} | {}",
                    r.date_label(),
                    r.time,
                    r.artists,
                    r.venue
                ));
            }
            *dates.entry(r.date_label()).or_default() += 1;
            *venues.entry(r.venue.clone()).or_default() += 1;
            match r.ticketed {
                Some(Ticketed::Free) => digest.free += 1,
                Some(Ticketed::Ticketed) => digest.ticketed += 1,
                None => digest.unknown_admission += 1,
            }
        }
        digest.dates = top(dates);
        digest.venues = top(venues);
        digest
    }

    /// Plain-text rendering used inside prompts.
    pub fn to_prompt_text(&self) -> String {
        let mut out = format!("Total concerts: {}\n", self.count);
        if !self.sample.is_empty() {
            out.push_str("Sample:\n");
            for line in &self.sample {
                out.push_str(&format!("- {line}\n"));
            }
        }
        if !self.dates.is_empty() {
            out.push_str(&format!("Busiest dates: {}\n", join_counts(&self.dates)));
        }
        if !self.venues.is_empty() {
            out.push_str(&format!("Top venues: {}\n", join_counts(&self.venues)));
        }
        out.push_str(&format!(
            "Admission: {} free, {} ticketed, {} unknown\n",
            self.free, self.ticketed, self.unknown_admission
        ));
        out
    }
}

fn top(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut v: Vec<(String, usize)> = counts.into_iter().collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v.truncate(DISTRIBUTION_TOP);
    v
}

fn join_counts(counts: &[(String, usize)]) -> String {
    counts
        .iter()
        .map(|(k, n)| format!("{k} ({n})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turns results and dataset statistics into prose.
pub trait Responder {
    fn summarize(&self, utterance: &str, digest: &ResultDigest) -> Result<String, GenerateError>;

    fn answer_info(
        &self,
        utterance: &str,
        summary: &StoreSummary,
        history: &[Turn],
    ) -> Result<String, GenerateError>;
}

/// Fixed sentences. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateResponder;

impl Responder for TemplateResponder {
    fn summarize(&self, _utterance: &str, digest: &ResultDigest) -> Result<String, GenerateError> {
        Ok(count_sentence(digest.count))
    }

    fn answer_info(
        &self,
        _utterance: &str,
        summary: &StoreSummary,
        _history: &[Turn],
    ) -> Result<String, GenerateError> {
        Ok(info_sentence(summary))
    }
}

pub fn count_sentence(count: usize) -> String {
    format!("I found {count} concert(s) matching your query.")
}

pub fn info_sentence(summary: &StoreSummary) -> String {
    let span = match (summary.first_date, summary.last_date) {
        (Some(first), Some(last)) => {
            format!(" from {} to {}", first.format("%d %b %Y"), last.format("%d %b %Y"))
        }
        _ => String::new(),
    };
    format!(
        "I can help you search for concerts. The database contains {} concerts{span}. \
         Try asking about specific artists, dates, or venues.",
        summary.total
    )
}

/// Zero-result message naming the filters that were applied.
pub fn no_results_sentence(params: &QueryParameters) -> String {
    let filters = params.describe_filters();
    if filters.is_empty() {
        "I couldn't find any concerts matching your query. \
         Try an artist name, a venue, or a date."
            .to_string()
    } else {
        format!(
            "I couldn't find any concerts matching {}. \
             Try removing one of these filters or widening the dates.",
            filters.join(", ")
        )
    }
}

pub fn route_sentence(count: usize) -> String {
    format!(
        "I found {count} concert(s). I can help you plan a route between these venues. \
         Please select the concerts you'd like to attend."
    )
}

/// Prose from a language model.
pub struct LlmResponder<G> {
    generator: G,
}

impl<G: TextGenerator> LlmResponder<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }
}

impl<G: TextGenerator> Responder for LlmResponder<G> {
    fn summarize(&self, utterance: &str, digest: &ResultDigest) -> Result<String, GenerateError> {
        let prompt = format!(
            "You are a friendly guide to a Carnatic music season in Chennai.\n\
             The user asked: \"{utterance}\"\n\n\
             Search results:\n{}\n\
             Write two or three sentences summarising these results for the user. \
             Mention the number of concerts and any notable dates or venues. \
             Do not invent concerts that are not listed.",
            digest.to_prompt_text()
        );
        self.generator.generate(&prompt).map(|s| s.trim().to_string())
    }

    fn answer_info(
        &self,
        utterance: &str,
        summary: &StoreSummary,
        history: &[Turn],
    ) -> Result<String, GenerateError> {
        let skip = history.len().saturating_sub(INFO_HISTORY_TURNS);
        let conversation: String = history[skip..]
            .iter()
            .map(|t| format!("{}: {}\n", t.role.label(), t.text))
            .collect();
        let span = match (summary.first_date, summary.last_date) {
            (Some(first), Some(last)) => format!("{first} to {last}"),
            _ => "unknown".to_string(),
        };
        let prompt = format!(
            "You are a helpful assistant for a concert schedule search tool.\n\
             The schedule has {} concerts at {} venues, dated {span}.\n\
             Some venues: {}.\n\
             Users can ask for concerts by artist, venue, area, date, time of day \
             and free or ticketed admission, narrow earlier results, and plan routes.\n\n\
             Recent conversation:\n{conversation}\n\
             User: {utterance}\n\
             Answer briefly.",
            summary.total,
            summary.venue_count,
            summary.sample_venues.join(", "),
        );
        self.generator.generate(&prompt).map(|s| s.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use crate::store::models::TimeOfDay;
    use chrono::NaiveDate;
    use std::cell::RefCell;

    fn make_records() -> Vec<ConcertRecord> {
        let dec = |d| NaiveDate::from_ymd_opt(2025, 12, d);
        vec![
            ConcertRecord::new(dec(15), "18:45", "Sanjay Subrahmanyan", "Music Academy")
                .with_ticketed(Some(Ticketed::Ticketed)),
            ConcertRecord::new(dec(15), "10:00", "Ranjani-Gayatri", "Vani Mahal")
                .with_ticketed(Some(Ticketed::Free)),
            ConcertRecord::new(dec(16), "16:00", "T.M. Krishna", "Music Academy"),
        ]
    }

    /// Records every prompt and answers with a fixed string.
    struct EchoGenerator {
        prompts: RefCell<Vec<String>>,
    }

    impl TextGenerator for EchoGenerator {
        fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok("  A lovely evening.  ".into())
        }
    }

    #[test]
    fn test_digest_counts() {
        let records = make_records();
        let digest = ResultDigest::from_records(&records);
        assert_eq!(digest.count, 3);
        assert_eq!(digest.sample.len(), 3);
        assert_eq!(digest.venues[0], ("Music Academy".to_string(), 2));
        assert_eq!(digest.dates[0].1, 2);
        assert_eq!((digest.free, digest.ticketed, digest.unknown_admission), (1, 1, 1));
    }

    #[test]
    fn test_digest_sample_capped() {
        let record = make_records().remove(0);
        let many = vec![record; 25];
        let digest = ResultDigest::from_records(&many);
        assert_eq!(digest.count, 25);
        assert_eq!(digest.sample.len(), DIGEST_SAMPLE_ROWS);
        assert!(digest.to_prompt_text().contains("Total concerts: 25"));
    }

    #[test]
    fn test_template_sentences() {
        let digest = ResultDigest::from_records(&make_records());
        assert_eq!(
            TemplateResponder.summarize("x", &digest).unwrap(),
            "I found 3 concert(s) matching your query."
        );

        let summary = StoreSummary {
            total: 42,
            first_date: NaiveDate::from_ymd_opt(2025, 12, 1),
            last_date: NaiveDate::from_ymd_opt(2026, 1, 5),
            ..Default::default()
        };
        let info = TemplateResponder.answer_info("help", &summary, &[]).unwrap();
        assert!(info.contains("42 concerts from 01 Dec 2025 to 05 Jan 2026"));
    }

    #[test]
    fn test_no_results_names_filters() {
        let params = QueryParameters {
            artist: Some("Nobody".into()),
            time_of_day: Some(TimeOfDay::Morning),
            ..Default::default()
        };
        let text = no_results_sentence(&params);
        assert!(text.contains("artist Nobody, time of day morning"));
        assert!(text.contains("removing"));
        assert!(no_results_sentence(&QueryParameters::default()).contains("couldn't find"));
    }

    #[test]
    fn test_llm_responder_prompts() {
        let generator = EchoGenerator {
            prompts: RefCell::new(Vec::new()),
        };
        let responder = LlmResponder::new(&generator);

        let digest = ResultDigest::from_records(&make_records());
        let text = responder.summarize("concerts on Dec 15", &digest).unwrap();
        assert_eq!(text, "A lovely evening.");

        let history: Vec<Turn> = (0..8)
            .map(|i| Turn {
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                text: format!("turn {i}"),
            })
            .collect();
        responder
            .answer_info("what can you do", &StoreSummary::default(), &history)
            .unwrap();

        let prompts = generator.prompts.borrow();
        assert!(prompts[0].contains("concerts on Dec 15"));
        assert!(prompts[0].contains("Sanjay Subrahmanyan"));
        // only the last five turns are included
        assert!(!prompts[1].contains("turn 2"));
        assert!(prompts[1].contains("turn 3"));
        assert!(prompts[1].contains("turn 7"));
    }
}
