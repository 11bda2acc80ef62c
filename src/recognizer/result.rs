//! Recognition results.

use crate::engine::RuleParse;
use crate::error::{RecognizerError, RecognizerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ResultId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    Unfinalized,
    Accepted,
    Rejected,
}

/// What the upstream recognizer heard for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hypothesis {
    Words(Vec<String>),
    Reject,
}

impl Hypothesis {
    /// Split `text` on whitespace. An empty text is a rejection.
    pub fn text(text: &str) -> Self {
        let words = crate::api::tokenize(text);
        if words.is_empty() { Hypothesis::Reject } else { Hypothesis::Words(words) }
    }
}

/// One utterance and what became of it.
///
/// The state only moves forward: `Unfinalized` to `Accepted` or `Rejected`,
/// once. Listeners receive a copy taken at each transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    id: ResultId,
    tokens: Vec<String>,
    state: ResultState,
    grammar: Option<String>,
    rule_name: Option<String>,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
}

impl RecognitionResult {
    pub(crate) fn new(id: ResultId, tokens: Vec<String>) -> Self {
        Self {
            id,
            tokens,
            state: ResultState::Unfinalized,
            grammar: None,
            rule_name: None,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ResultId {
        self.id
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }

    pub fn state(&self) -> ResultState {
        self.state
    }

    /// Grammar that produced the result, once finalized against one.
    pub fn grammar(&self) -> Option<&str> {
        self.grammar.as_deref()
    }

    pub fn rule_name(&self) -> Option<&str> {
        self.rule_name.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Attach the owning grammar (and the matching rule, if any).
    pub(crate) fn set_grammar(&mut self, grammar: &str, parse: Option<&RuleParse>) {
        self.grammar = Some(grammar.to_string());
        if let Some(parse) = parse {
            self.rule_name = Some(parse.rule_name.clone());
            self.tags = parse.tags.clone();
        }
    }

    /// Move to a final state. Returns the previous state.
    pub(crate) fn finalize(&mut self, accepted: bool) -> RecognizerResult<ResultState> {
        if self.state != ResultState::Unfinalized {
            return Err(RecognizerError::ResultState { id: self.id });
        }
        let old = self.state;
        self.state = if accepted { ResultState::Accepted } else { ResultState::Rejected };
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleName;
    use crate::engine::ParseNode;

    #[test]
    fn finalize_is_one_way() {
        let mut result = RecognitionResult::new(7, vec!["yes".into()]);
        assert_eq!(result.finalize(false).unwrap(), ResultState::Unfinalized);
        assert_eq!(result.state(), ResultState::Rejected);
        assert!(matches!(result.finalize(true), Err(RecognizerError::ResultState { id: 7 })));
        assert_eq!(result.state(), ResultState::Rejected);
    }

    #[test]
    fn grammar_finalization_copies_the_parse() {
        let parse = RuleParse {
            grammar: "g".into(),
            rule_name: "cmd".into(),
            tree: ParseNode::Rule { name: RuleName::qualified("g", "cmd"), child: Box::new(ParseNode::Empty) },
            tags: vec!["neg".into()],
        };
        let mut result = RecognitionResult::new(1, vec!["no".into()]);
        result.set_grammar("g", Some(&parse));
        assert_eq!(result.grammar(), Some("g"));
        assert_eq!(result.rule_name(), Some("cmd"));
        assert_eq!(result.tags(), ["neg".to_string()]);
    }

    #[test]
    fn blank_hypothesis_is_a_rejection() {
        assert_eq!(Hypothesis::text("  "), Hypothesis::Reject);
        assert_eq!(Hypothesis::text("go  home"), Hypothesis::Words(vec!["go".into(), "home".into()]));
    }
}
