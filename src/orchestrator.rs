use std::sync::LazyLock;

use regex::Regex;

use crate::gazetteer::Gazetteer;
use crate::intent::{
    FollowupKind, PatternExtractor, TieredExtractor, detect_followup_kind, has_followup_cue,
};
use crate::params::{Intent, QueryParameters};
use crate::respond::{
    self, INFO_HISTORY_TURNS, Responder, ResultDigest, TemplateResponder,
};
use crate::session::{ConversationState, Role};
use crate::store::models::{ConcertRecord, Ticketed};
use crate::store::queries::has_location_keyword;
use crate::store::{ConcertStore, RecordId};

static IMPLICIT_FREE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfree\b").unwrap());
static IMPLICIT_TICKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:ticketed|paid)\b").unwrap());

/// Everything the conversational surface shows for one turn.
#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub intent: Intent,
    pub text: String,
    /// Filters in effect for this result.
    pub parameters: QueryParameters,
    /// True when the turn narrowed the previous results.
    pub followup: bool,
    pub ids: Vec<RecordId>,
    pub rows: Vec<ConcertRecord>,
    pub digest: Option<ResultDigest>,
}

impl TurnResponse {
    /// True when this turn's rows supersede the previous results, including
    /// an empty result that cleared them. Help and info turns keep them.
    pub fn replaces_results(&self) -> bool {
        !matches!(self.intent, Intent::Help | Intent::Info)
    }
}

/// Runs one conversational turn: extract, search or answer, summarise.
pub struct QueryOrchestrator {
    store: ConcertStore,
    extractor: TieredExtractor,
    responder: Box<dyn Responder>,
}

impl QueryOrchestrator {
    pub fn new(store: ConcertStore, extractor: TieredExtractor, responder: Box<dyn Responder>) -> Self {
        Self {
            store,
            extractor,
            responder,
        }
    }

    /// Pattern extraction and template answers only.
    pub fn offline(store: ConcertStore, gazetteer: Gazetteer) -> Self {
        let store = store.with_gazetteer(gazetteer.clone());
        let patterns = PatternExtractor::new(*store.resolver(), gazetteer);
        Self::new(store, TieredExtractor::offline(patterns), Box::new(TemplateResponder))
    }

    pub fn store(&self) -> &ConcertStore {
        &self.store
    }

    /// True when a turn may wait on a language model.
    pub fn uses_language_model(&self) -> bool {
        self.extractor.has_primary()
    }

    /// Handle one utterance against the session. Always produces a response;
    /// collaborator failures degrade to the deterministic paths.
    pub fn handle_turn(&self, utterance: &str, state: &mut ConversationState) -> TurnResponse {
        let utterance = utterance.trim();
        let history = state.recent_turns(INFO_HISTORY_TURNS);
        state.push_turn(Role::User, utterance);

        let params = self.extractor.extract_or_fallback(utterance);
        log::info!(
            "Intent {} with filters [{}]",
            params.intent.as_str(),
            params.describe_filters().join(", ")
        );

        let response = match params.intent {
            Intent::Help | Intent::Info => {
                let summary = self.store.summary();
                let text = self
                    .responder
                    .answer_info(utterance, &summary, &history)
                    .unwrap_or_else(|e| {
                        log::warn!("Info answer generation failed, using template: {e}");
                        respond::info_sentence(&summary)
                    });
                TurnResponse {
                    intent: params.intent,
                    text,
                    parameters: params,
                    followup: false,
                    ids: Vec::new(),
                    rows: Vec::new(),
                    digest: None,
                }
            }
            Intent::RoutePlanning => {
                let mut response = self.search_turn(utterance, params, state);
                if !response.ids.is_empty() {
                    response.text = respond::route_sentence(response.ids.len());
                }
                response
            }
            Intent::Search | Intent::Unknown => self.search_turn(utterance, params, state),
        };

        state.push_turn(Role::Assistant, &response.text);
        response
    }

    fn search_turn(
        &self,
        utterance: &str,
        params: QueryParameters,
        state: &mut ConversationState,
    ) -> TurnResponse {
        let followup =
            params.is_followup || (state.has_results() && has_followup_cue(utterance));

        let (ids, effective) = if followup && state.has_results() {
            let mut narrowing = params.clone();
            if narrowing.ticketed.is_none() {
                narrowing.ticketed = implicit_ticketed(utterance);
            }
            let ids = self.store.refine(state.previous(), &narrowing);
            let effective = match state.previous_params() {
                Some(previous) => merge_params(previous, &narrowing),
                None => narrowing,
            };
            (ids, effective)
        } else {
            (self.fresh_search(utterance, &params), params)
        };
        log::debug!("{} result(s), followup={followup}", ids.len());

        state.store_results(ids.clone(), effective.clone());

        let rows = self.store.rows(&ids);
        let (text, digest) = if ids.is_empty() {
            (respond::no_results_sentence(&effective), None)
        } else {
            let digest = ResultDigest::from_records(&rows);
            let text = self.responder.summarize(utterance, &digest).unwrap_or_else(|e| {
                log::warn!("Summary generation failed, using template: {e}");
                respond::count_sentence(digest.count)
            });
            (text, Some(digest))
        };

        TurnResponse {
            intent: effective.intent,
            text,
            parameters: effective,
            followup: followup && state.has_results(),
            ids,
            rows,
            digest,
        }
    }

    /// Bare artist names go straight to the tiered artist match; otherwise
    /// structured filters, otherwise free-text search.
    fn fresh_search(&self, utterance: &str, params: &QueryParameters) -> Vec<RecordId> {
        if params.artist.is_none() && looks_like_artist_name(utterance) {
            let by_name = self.store.by_artist(utterance);
            if !by_name.is_empty() {
                let extra = QueryParameters {
                    time_of_day: params.time_of_day,
                    ticketed: params.ticketed,
                    ..Default::default()
                };
                return self.store.refine(&by_name, &extra);
            }
        }
        if params.has_filters() {
            self.store.combine(params)
        } else {
            self.store.search_text(utterance)
        }
    }
}

/// Two or more words, no place keyword, and either a hyphen or a
/// capitalised word.
pub fn looks_like_artist_name(utterance: &str) -> bool {
    let words: Vec<&str> = utterance
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-'))
        .filter(|w| w.chars().filter(|c| c.is_alphabetic()).count() >= 2)
        .collect();
    words.len() >= 2
        && !has_location_keyword(utterance)
        && (utterance.contains('-')
            || words
                .iter()
                .any(|w| w.chars().next().is_some_and(char::is_uppercase)))
}

/// Admission status implied by a follow-up such as "only the free ones".
fn implicit_ticketed(utterance: &str) -> Option<Ticketed> {
    if detect_followup_kind(utterance) != FollowupKind::Ticketed {
        return None;
    }
    if IMPLICIT_FREE_RE.is_match(utterance) {
        Some(Ticketed::Free)
    } else if IMPLICIT_TICKETED_RE.is_match(utterance) {
        Some(Ticketed::Ticketed)
    } else {
        None
    }
}

/// Earlier filters overlaid with the ones a follow-up added.
fn merge_params(previous: &QueryParameters, new: &QueryParameters) -> QueryParameters {
    QueryParameters {
        date: new.date.clone().or_else(|| previous.date.clone()),
        date_range: new.date_range.or(previous.date_range),
        artist: new.artist.clone().or_else(|| previous.artist.clone()),
        venue: new.venue.clone().or_else(|| previous.venue.clone()),
        location: new.location.clone().or_else(|| previous.location.clone()),
        time_of_day: new.time_of_day.or(previous.time_of_day),
        ticketed: new.ticketed.or(previous.ticketed),
        intent: new.intent,
        is_followup: true,
    }
}
