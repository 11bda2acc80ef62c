//! Convenience surface: match a text against a set of grammars without
//! setting up a [`Recognizer`](crate::Recognizer).

use crate::engine::{RuleMatcher, RuleParse};
use crate::error::GrammarResult;
use crate::grammar::Grammar;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Split an utterance into words. Case is kept; the matcher folds it.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Options that narrow what is matched.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Only match this grammar.
    pub grammar: Option<String>,
    /// Only match this rule (in every grammar that defines it); otherwise every
    /// enabled public rule.
    pub rule: Option<String>,
}

/// Result from [`parse`] and [`parse_with`].
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub text: String,
    /// Every full parse, grammar by grammar in the order given.
    pub parses: Vec<RuleParse>,
    pub elapsed: Duration,
}

/// Counters for one start rule of one grammar.
#[derive(Debug, Clone)]
pub struct RuleAttempt {
    pub grammar: String,
    pub rule: String,
    pub duration: Duration,
    pub calls: usize,
    pub max_depth: usize,
    pub candidates: usize,
    pub full: usize,
}

/// Additional details returned by [`parse_verbose_with`].
#[derive(Debug, Clone)]
pub struct MatchDetails {
    pub total: Duration,
    pub attempts: Vec<RuleAttempt>,
    /// Recursive match calls over all attempts.
    pub calls: usize,
}

#[derive(Debug, Clone)]
pub struct ParseResultVerbose {
    pub text: String,
    pub parses: Vec<RuleParse>,
    pub elapsed: Duration,
    pub details: MatchDetails,
}

/// Match `text` against every enabled public rule of `grammars`. References
/// between the grammars are resolved among themselves.
///
/// # Example
/// ```
/// use rulegram::{Grammar, Rule, parse};
/// use std::sync::Arc;
///
/// let mut g = Grammar::new("yesno");
/// g.set_rule("cmd", Rule::alternatives(vec![Rule::token("yes"), Rule::token("no")]), true);
/// let out = parse("Yes", &[Arc::new(g)]).unwrap();
/// assert_eq!(out.parses[0].rule_name, "cmd");
/// ```
pub fn parse(text: &str, grammars: &[Arc<Grammar>]) -> GrammarResult<ParseResult> {
    parse_with(text, grammars, &Options::default())
}

pub fn parse_with(text: &str, grammars: &[Arc<Grammar>], options: &Options) -> GrammarResult<ParseResult> {
    let start = Instant::now();
    let tokens = tokenize(text);
    let matcher = RuleMatcher::new(&grammars);
    let mut parses = Vec::new();
    for grammar in targets(grammars, options) {
        parses.extend(matcher.mparse(&tokens, grammar, options.rule.as_deref())?);
    }
    Ok(ParseResult { text: text.to_string(), parses, elapsed: start.elapsed() })
}

/// Like [`parse_with`], plus per-rule counters and timings.
pub fn parse_verbose_with(text: &str, grammars: &[Arc<Grammar>], options: &Options) -> GrammarResult<ParseResultVerbose> {
    let start = Instant::now();
    let tokens = tokenize(text);
    let matcher = RuleMatcher::new(&grammars);
    let mut parses = Vec::new();
    let mut attempts = Vec::new();

    for grammar in targets(grammars, options) {
        let (found, metrics) = matcher.mparse_with_metrics(&tokens, grammar, options.rule.as_deref())?;
        parses.extend(found);
        attempts.extend(metrics.rules.into_iter().map(|m| RuleAttempt {
            grammar: grammar.name().to_string(),
            rule: m.rule,
            duration: m.duration,
            calls: m.calls,
            max_depth: m.max_depth,
            candidates: m.candidates,
            full: m.full,
        }));
    }

    let total = start.elapsed();
    let calls = attempts.iter().map(|a| a.calls).sum();
    Ok(ParseResultVerbose {
        text: text.to_string(),
        parses,
        elapsed: total,
        details: MatchDetails { total, attempts, calls },
    })
}

fn targets<'g>(grammars: &'g [Arc<Grammar>], options: &'g Options) -> impl Iterator<Item = &'g Grammar> {
    grammars
        .iter()
        .map(|g| g.as_ref())
        .filter(|g| options.grammar.as_deref().is_none_or(|name| g.name() == name))
        .filter(|g| options.rule.as_deref().is_none_or(|rule| g.rule(rule).is_some()))
}
