use serde::{Deserialize, Serialize};
use std::fmt;

#[macro_use]
mod macros;
mod api;
mod config;
mod engine;
mod error;
mod grammar;
mod recognizer;
mod snapshot;
mod source;
mod store;

pub use api::{
    MatchDetails, Options, ParseResult, ParseResultVerbose, RuleAttempt, parse, parse_verbose_with, parse_with, tokenize,
};
pub use config::{Delivery, RecognizerConfig};
pub use engine::{
    CrossReferenceIndex, GrammarResolver, GrammarSet, MatchMetrics, ParseNode, ParseTree, RuleMatcher, RuleMetrics,
    RuleParse, link_grammar, resolve_reference, simplify, simplify_with,
};
pub use error::{GrammarError, GrammarResult, RecognizerError, RecognizerResult};
pub use grammar::{ActivationMode, Grammar, GrammarRule, copy_grammar};
pub use recognizer::{
    EngineEvent, EngineEventKind, EngineState, Event, GrammarEvent, GrammarEventKind, Hypothesis, Listener, ListenerId,
    NoHooks, RecognitionResult, Recognizer, RecognizerHooks, ResultEvent, ResultEventKind, ResultId, ResultState,
    Scope, SourceId, Transition, TransitionRule,
};
pub use snapshot::{read_grammar, read_result, write_grammar, write_result};
pub use source::{DirectoryLocator, JsonSourceParser, ParsedGrammar, SourceLoader, SourceLocator, SourceParser};
pub use store::GrammarStore;

// --- Rule model -------------------------------------------------------------

/// Repetition operator attached to a [`Rule::Count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    /// `[x]`
    Optional,
    /// `x*`
    ZeroOrMore,
    /// `x+`
    OnceOrMore,
}

/// A node of a grammar's rule tree.
///
/// Rule trees are produced by an external grammar-source parser (or built by hand
/// with the constructors below / the macros in `macros.rs`). Once built they are
/// only ever replaced wholesale; the simplifier and matcher treat them as values.
///
/// ```text
/// <cmd> = please* (open | close {shut}) [the] <object>;
///
/// Sequence
///  ├─ Count(ZeroOrMore) ─ Token "please"
///  ├─ Alternatives
///  │   ├─ Token "open"
///  │   └─ Tag "shut" ─ Token "close"
///  ├─ Count(Optional) ─ Token "the"
///  └─ Name <object>
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Alternatives {
        children: Vec<Rule>,
        #[serde(default)]
        weights: Option<Vec<f32>>,
    },
    Sequence(Vec<Rule>),
    /// A literal; may hold several whitespace-separated words.
    Token(String),
    Tag {
        child: Box<Rule>,
        label: String,
    },
    Count {
        child: Box<Rule>,
        multiplicity: Multiplicity,
    },
    Name(RuleName),
}

impl Rule {
    pub fn token(text: impl Into<String>) -> Self {
        Rule::Token(text.into())
    }

    pub fn sequence(children: Vec<Rule>) -> Self {
        Rule::Sequence(children)
    }

    pub fn alternatives(children: Vec<Rule>) -> Self {
        Rule::Alternatives { children, weights: None }
    }

    pub fn weighted(children: Vec<Rule>, weights: Vec<f32>) -> Self {
        Rule::Alternatives { children, weights: Some(weights) }
    }

    pub fn tag(child: Rule, label: impl Into<String>) -> Self {
        Rule::Tag { child: Box::new(child), label: label.into() }
    }

    pub fn count(child: Rule, multiplicity: Multiplicity) -> Self {
        Rule::Count { child: Box::new(child), multiplicity }
    }

    pub fn optional(child: Rule) -> Self {
        Self::count(child, Multiplicity::Optional)
    }

    /// Reference to another rule. Accepts `rule`, `<rule>`, `<gram.rule>` and
    /// `<pkg.gram.rule>`; a malformed name still becomes a (never resolving)
    /// reference so that rule construction stays infallible.
    pub fn name(reference: &str) -> Self {
        Rule::Name(RuleName::parse(reference).unwrap_or_else(|_| RuleName::local(reference)))
    }

    /// `<NULL>`: matches the empty string.
    pub fn null() -> Self {
        Rule::Name(RuleName::null())
    }

    /// `<VOID>`: never matches.
    pub fn void() -> Self {
        Rule::Name(RuleName::void())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Rule::Name(n) if n.is_null())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Rule::Name(n) if n.is_void())
    }

    /// Visit every `Name` reference in the tree (depth-first, left to right).
    pub fn for_each_reference<'a>(&'a self, f: &mut dyn FnMut(&'a RuleName)) {
        match self {
            Rule::Alternatives { children, .. } | Rule::Sequence(children) => {
                for child in children {
                    child.for_each_reference(f);
                }
            }
            Rule::Tag { child, .. } | Rule::Count { child, .. } => child.for_each_reference(f),
            Rule::Name(name) => f(name),
            Rule::Token(_) => {}
        }
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        match self {
            Rule::Alternatives { children, .. } | Rule::Sequence(children) => {
                1 + children.iter().map(Rule::size).sum::<usize>()
            }
            Rule::Tag { child, .. } | Rule::Count { child, .. } => 1 + child.size(),
            Rule::Name(_) | Rule::Token(_) => 1,
        }
    }
}

impl fmt::Display for Rule {
    /// JSGF-like rendering, e.g. `(yes | no {neg}) [please]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Alternatives { children, weights } => {
                write!(f, "(")?;
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " | ")?;
                    }
                    if let Some(w) = weights.as_ref().and_then(|w| w.get(idx)) {
                        write!(f, "/{}/ ", w)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Rule::Sequence(children) => {
                write!(f, "(")?;
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Rule::Token(text) if text.contains(char::is_whitespace) => write!(f, "\"{}\"", text),
            Rule::Token(text) => write!(f, "{}", text),
            Rule::Tag { child, label } => write!(f, "{} {{{}}}", child, label),
            Rule::Count { child, multiplicity: Multiplicity::Optional } => write!(f, "[{}]", child),
            Rule::Count { child, multiplicity: Multiplicity::ZeroOrMore } => write!(f, "{}*", child),
            Rule::Count { child, multiplicity: Multiplicity::OnceOrMore } => write!(f, "{}+", child),
            Rule::Name(name) => write!(f, "{}", name),
        }
    }
}

// --- Rule names -------------------------------------------------------------

/// A (possibly qualified) rule reference: `<rule>`, `<gram.rule>`,
/// `<com.acme.gram.rule>`. In imports the rule part may be `*`.
///
/// `grammar` holds the *full* grammar name including any package prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleName {
    pub grammar: Option<String>,
    pub rule: String,
}

pub const NULL_RULE: &str = "NULL";
pub const VOID_RULE: &str = "VOID";

impl RuleName {
    pub fn local(rule: impl Into<String>) -> Self {
        RuleName { grammar: None, rule: rule.into() }
    }

    pub fn qualified(grammar: impl Into<String>, rule: impl Into<String>) -> Self {
        RuleName { grammar: Some(grammar.into()), rule: rule.into() }
    }

    pub fn null() -> Self {
        Self::local(NULL_RULE)
    }

    pub fn void() -> Self {
        Self::local(VOID_RULE)
    }

    /// Parse `rule`, `<rule>`, `<gram.rule>`, `<pkg.gram.rule>` or `<pkg.gram.*>`.
    pub fn parse(text: &str) -> Result<Self, GrammarError> {
        let stripped = strip_brackets(text.trim());
        if !regex!(r"^[^\s<>.;=|(){}\[\]*+/]+(\.[^\s<>.;=|(){}\[\]*+/]+)*(\.\*)?$").is_match(stripped) {
            return Err(GrammarError::malformed(text));
        }
        Ok(match stripped.rsplit_once('.') {
            Some((grammar, rule)) => Self::qualified(grammar, rule),
            None => Self::local(stripped),
        })
    }

    pub fn is_null(&self) -> bool {
        self.rule == NULL_RULE
    }

    pub fn is_void(&self) -> bool {
        self.rule == VOID_RULE
    }

    pub fn is_sentinel(&self) -> bool {
        self.is_null() || self.is_void()
    }

    /// True for `<gram.*>` import forms.
    pub fn is_wildcard(&self) -> bool {
        self.rule == "*"
    }

    pub fn full_grammar_name(&self) -> Option<&str> {
        self.grammar.as_deref()
    }

    /// Last segment of the grammar name (`gram` for `com.acme.gram`).
    pub fn simple_grammar_name(&self) -> Option<&str> {
        self.grammar.as_deref().map(|g| g.rsplit('.').next().unwrap_or(g))
    }

    /// Package prefix of the grammar name (`com.acme` for `com.acme.gram`).
    pub fn package_name(&self) -> Option<&str> {
        self.grammar.as_deref().and_then(|g| g.rsplit_once('.')).map(|(pkg, _)| pkg)
    }

    /// `gram.rule` form used as a key by the cross-reference index.
    pub fn to_qualified_string(&self) -> String {
        match &self.grammar {
            Some(g) => format!("{}.{}", g, self.rule),
            None => self.rule.clone(),
        }
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.to_qualified_string())
    }
}

impl TryFrom<String> for RuleName {
    type Error = GrammarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RuleName::parse(&value)
    }
}

impl From<RuleName> for String {
    fn from(value: RuleName) -> Self {
        value.to_string()
    }
}

/// Strip one level of `<...>` around a rule name.
pub(crate) fn strip_brackets(name: &str) -> &str {
    name.strip_prefix('<').and_then(|n| n.strip_suffix('>')).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_name_forms() {
        let simple = RuleName::parse("<cmd>").unwrap();
        assert_eq!(simple, RuleName::local("cmd"));
        assert_eq!(simple.simple_grammar_name(), None);

        let full = RuleName::parse("<com.acme.commands.open>").unwrap();
        assert_eq!(full.full_grammar_name(), Some("com.acme.commands"));
        assert_eq!(full.simple_grammar_name(), Some("commands"));
        assert_eq!(full.package_name(), Some("com.acme"));
        assert_eq!(full.rule, "open");

        let import = RuleName::parse("<colors.*>").unwrap();
        assert!(import.is_wildcard());
        assert_eq!(import.full_grammar_name(), Some("colors"));

        assert!(RuleName::parse("<a b>").is_err());
        assert!(RuleName::parse("<>").is_err());
        assert!(RuleName::parse("NULL").unwrap().is_null());
    }

    #[test]
    fn display_is_jsgf_like() {
        let rule = Rule::sequence(vec![
            Rule::count(Rule::token("please"), Multiplicity::ZeroOrMore),
            Rule::alternatives(vec![Rule::token("open"), Rule::tag(Rule::token("close"), "shut")]),
            Rule::optional(Rule::token("new york")),
            Rule::name("<object>"),
        ]);
        assert_eq!(rule.to_string(), "(please* (open | close {shut}) [\"new york\"] <object>)");
        assert_eq!(rule.size(), 10);
    }

    #[test]
    fn references_are_visited_in_order() {
        let rule = Rule::alternatives(vec![Rule::name("a"), Rule::tag(Rule::name("<g.b>"), "t"), Rule::null()]);
        let mut seen = Vec::new();
        rule.for_each_reference(&mut |n| seen.push(n.to_qualified_string()));
        assert_eq!(seen, vec!["a", "g.b", "NULL"]);
    }
}
