use std::collections::VecDeque;

use crate::params::QueryParameters;
use crate::store::RecordId;

/// Turns remembered for language-model context.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Per-session conversation context, passed into every turn.
///
/// Holds the last non-empty result set and the filters that produced it, so
/// a follow-up can narrow those results instead of searching again.
#[derive(Debug, Default)]
pub struct ConversationState {
    previous: Vec<RecordId>,
    previous_params: Option<QueryParameters>,
    history: VecDeque<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> &[RecordId] {
        &self.previous
    }

    pub fn previous_params(&self) -> Option<&QueryParameters> {
        self.previous_params.as_ref()
    }

    pub fn has_results(&self) -> bool {
        !self.previous.is_empty()
    }

    /// Remember a result set. An empty set clears the stored results instead,
    /// so later follow-ups do not narrow nothing.
    pub fn store_results(&mut self, ids: Vec<RecordId>, params: QueryParameters) {
        if ids.is_empty() {
            self.clear_results();
        } else {
            self.previous = ids;
            self.previous_params = Some(params);
        }
    }

    pub fn clear_results(&mut self) {
        self.previous.clear();
        self.previous_params = None;
    }

    pub fn push_turn(&mut self, role: Role, text: &str) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(Turn {
            role,
            text: text.to_string(),
        });
    }

    /// The most recent `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> Vec<Turn> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Reset everything: results, filters, history.
    pub fn clear(&mut self) {
        self.clear_results();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_clear_results() {
        let mut state = ConversationState::new();
        state.store_results(vec![3, 1], QueryParameters::default());
        assert!(state.has_results());
        assert_eq!(state.previous(), &[3, 1]);
        assert!(state.previous_params().is_some());

        state.store_results(Vec::new(), QueryParameters::default());
        assert!(!state.has_results());
        assert!(state.previous_params().is_none());
    }

    #[test]
    fn test_history_bounded() {
        let mut state = ConversationState::new();
        for i in 0..(HISTORY_LIMIT + 3) {
            state.push_turn(Role::User, &format!("turn {i}"));
        }
        let all = state.recent_turns(100);
        assert_eq!(all.len(), HISTORY_LIMIT);
        assert_eq!(all[0].text, "turn 3");

        let last = state.recent_turns(2);
        assert_eq!(last.len(), 2);
        assert_eq!(last[1].text, format!("turn {}", HISTORY_LIMIT + 2));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut state = ConversationState::new();
        state.store_results(vec![0], QueryParameters::default());
        state.push_turn(Role::Assistant, "hi");
        state.clear();
        assert!(!state.has_results());
        assert!(state.recent_turns(5).is_empty());
    }
}
