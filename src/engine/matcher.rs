//! Backtracking rule matcher.
//!
//! Given a token sequence and a rule, enumerate every way the rule can consume a
//! prefix of the tokens starting at some position. The core is one recursive
//! function, `match_rule(grammar, rule, pos) -> [(ParseNode, end)]`, with one
//! arm per rule kind:
//!
//! ```text
//! Name         <VOID> -> []   <NULL> -> [(Empty, pos)]
//!              otherwise resolve and recurse, wrap in a Rule node
//! Token        case-insensitive literal, word by word;
//!              `%` = exactly one word, `*` = one word or none
//! Alternatives concatenation of every child's results
//! Sequence     first element, then the rest from each end position
//! Tag          child results wrapped in a Tag node
//! Count        [x] / x* add (Empty, pos); x* / x+ add 2, 3, ... copies
//!              until a repetition count yields nothing
//! ```
//!
//! Results are not deduplicated: alternatives that match the same words give
//! the same tree twice. Callers keep only results that end at `tokens.len()`.
//!
//! ## Reentrancy
//!
//! [`RuleMatcher`] holds nothing but a reference to the grammar resolver; every
//! call builds its own `MatchRun` with the lowered tokens, the active reference
//! stack and counters, so concurrent calls share no mutable state.
//!
//! ## Cycles
//!
//! Entering a rule at a position where the same rule is already being matched
//! can never terminate (left recursion, possibly across grammars). The run keeps
//! the stack of active `(rule, position)` frames and fails with
//! [`GrammarError::Cycle`] when a frame would repeat.
//!
//! ## Debugging
//!
//! `RUST_LOG=rulegram=trace` prints one line per followed reference and per
//! start rule.

use super::dedup::warn_once;
use super::metrics::{MatchMetrics, RuleMetrics};
use super::parse_tree::{ParseNode, ParseTree, RuleParse};
use super::resolve::{GrammarResolver, resolve_reference};
use crate::error::{GrammarError, GrammarResult};
use crate::grammar::Grammar;
use crate::{Multiplicity, Rule, RuleName};
use std::time::Instant;

type Matches = Vec<(ParseNode, usize)>;

/// Matches token sequences against rules of grammars known to a resolver.
#[derive(Clone, Copy)]
pub struct RuleMatcher<'a> {
    resolver: &'a dyn GrammarResolver,
}

/// State of one matching call.
struct MatchRun<'a> {
    tokens: &'a [String],
    lowered: Vec<String>,
    resolver: &'a dyn GrammarResolver,
    /// Active `(qualified rule, position)` frames.
    stack: Vec<(String, usize)>,
    calls: usize,
    max_depth: usize,
}

impl<'a> RuleMatcher<'a> {
    pub fn new(resolver: &'a dyn GrammarResolver) -> Self {
        Self { resolver }
    }

    /// Every parse of `rule` (a rule of `grammar`) that consumes all of `tokens`.
    pub fn match_all<'g>(&'g self, tokens: &'g [String], grammar: &'g Grammar, rule: &'g Rule) -> GrammarResult<Vec<ParseTree>>
    where
        'a: 'g,
    {
        let mut run = MatchRun::new(tokens, self.resolver);
        let matches = run.match_rule(grammar, rule, 0)?;
        Ok(matches
            .into_iter()
            .filter(|(_, end)| *end == tokens.len())
            .map(|(node, end)| ParseTree { node, end })
            .collect())
    }

    /// Full parses of `tokens` by `rule_name`, or, without a name, by every
    /// enabled public rule of `grammar`.
    pub fn mparse(&self, tokens: &[String], grammar: &Grammar, rule_name: Option<&str>) -> GrammarResult<Vec<RuleParse>> {
        self.mparse_with_metrics(tokens, grammar, rule_name).map(|(parses, _)| parses)
    }

    pub fn mparse_with_metrics(
        &self,
        tokens: &[String],
        grammar: &Grammar,
        rule_name: Option<&str>,
    ) -> GrammarResult<(Vec<RuleParse>, MatchMetrics)> {
        let start = Instant::now();
        let mut metrics = MatchMetrics::default();
        let mut parses = Vec::new();

        let names: Vec<&str> = match rule_name {
            Some(name) => vec![name],
            None => grammar.rules().filter(|(_, r)| r.public && r.enabled).map(|(name, _)| name).collect(),
        };

        for name in names {
            let Some(rule) = grammar.rule(name) else {
                warn_once(format!("unknown rule <{}> requested in grammar {}", name, grammar.name()));
                continue;
            };
            let rule_start = Instant::now();
            let mut run = MatchRun::new(tokens, self.resolver);
            run.stack.push((qualified(grammar.name(), name), 0));
            let matches = run.match_rule(grammar, rule, 0)?;
            let candidates = matches.len();

            let before = parses.len();
            for (node, end) in matches {
                if end != tokens.len() {
                    continue;
                }
                let tags = node.tags().into_iter().map(str::to_string).collect();
                parses.push(RuleParse { grammar: grammar.name().to_string(), rule_name: name.to_string(), tree: node, tags });
            }
            log::trace!(
                "[match:start] <{}.{}> candidates={} full={}",
                grammar.name(),
                name,
                candidates,
                parses.len() - before
            );
            metrics.rules.push(RuleMetrics {
                rule: name.to_string(),
                duration: rule_start.elapsed(),
                calls: run.calls,
                max_depth: run.max_depth,
                candidates,
                full: parses.len() - before,
            });
        }

        metrics.total = start.elapsed();
        Ok((parses, metrics))
    }

    /// First full parse by a public rule (see [`mparse`](Self::mparse)).
    pub fn parse(&self, tokens: &[String], grammar: &Grammar, rule_name: Option<&str>) -> GrammarResult<Option<RuleParse>> {
        let parses = self.mparse(tokens, grammar, rule_name)?;
        Ok(parses.into_iter().find(|p| grammar.is_rule_public(&p.rule_name).unwrap_or(false)))
    }
}

fn qualified(grammar: &str, rule: &str) -> String {
    format!("{}.{}", grammar, rule)
}

impl<'a> MatchRun<'a> {
    fn new(tokens: &'a [String], resolver: &'a dyn GrammarResolver) -> Self {
        Self {
            tokens,
            lowered: tokens.iter().map(|t| t.to_lowercase()).collect(),
            resolver,
            stack: Vec::new(),
            calls: 0,
            max_depth: 0,
        }
    }

    fn match_rule(&mut self, grammar: &'a Grammar, rule: &'a Rule, pos: usize) -> GrammarResult<Matches> {
        self.calls += 1;
        match rule {
            Rule::Name(name) => self.match_name(grammar, name, pos),
            Rule::Token(text) => Ok(self.match_token(text, pos)),
            Rule::Alternatives { children, .. } => {
                let mut out = Vec::new();
                for child in children {
                    out.extend(self.match_rule(grammar, child, pos)?);
                }
                Ok(out)
            }
            Rule::Sequence(children) => {
                let items: Vec<&'a Rule> = children.iter().collect();
                self.match_sequence(grammar, &items, pos)
            }
            Rule::Tag { child, label } => Ok(self
                .match_rule(grammar, child, pos)?
                .into_iter()
                .map(|(node, end)| match node {
                    ParseNode::Empty => (node, end),
                    node => (ParseNode::Tag { label: label.clone(), child: Box::new(node) }, end),
                })
                .collect()),
            Rule::Count { child, multiplicity } => self.match_count(grammar, child, *multiplicity, pos),
        }
    }

    fn match_name(&mut self, grammar: &'a Grammar, name: &RuleName, pos: usize) -> GrammarResult<Matches> {
        if name.is_void() {
            return Ok(Vec::new());
        }
        if name.is_null() {
            return Ok(vec![(ParseNode::Empty, pos)]);
        }
        let Some((target, rule)) = self.lookup(grammar, name) else {
            warn_once(format!("unknown rule name {} referenced from grammar {}", name, grammar.name()));
            return Ok(Vec::new());
        };

        let frame = (qualified(target.name(), &name.rule), pos);
        if self.stack.contains(&frame) {
            let mut path: Vec<String> = self.stack.iter().map(|(rule, at)| format!("<{}>@{}", rule, at)).collect();
            path.push(format!("<{}>@{}", frame.0, frame.1));
            return Err(GrammarError::Cycle { path });
        }
        log::trace!("[match:rule] <{}> at {}", frame.0, pos);
        self.stack.push(frame);
        self.max_depth = self.max_depth.max(self.stack.len());
        let inner = self.match_rule(target, rule, pos);
        self.stack.pop();
        let inner = inner?;

        let resolved = RuleName::qualified(target.name(), name.rule.as_str());
        Ok(inner
            .into_iter()
            .map(|(node, end)| match node {
                ParseNode::Empty => (node, end),
                node => (ParseNode::Rule { name: resolved.clone(), child: Box::new(node) }, end),
            })
            .collect())
    }

    /// Local rule first, then the named grammar, then imports.
    fn lookup(&self, grammar: &'a Grammar, name: &RuleName) -> Option<(&'a Grammar, &'a Rule)> {
        let target = match name.full_grammar_name() {
            None => grammar,
            Some(full) if full == grammar.name() => grammar,
            Some(full) => match self.resolver.grammar(full) {
                Some(g) => g,
                None => return self.lookup_imported(grammar, name),
            },
        };
        match target.rule(&name.rule) {
            Some(rule) => Some((target, rule)),
            None => self.lookup_imported(grammar, name),
        }
    }

    fn lookup_imported(&self, grammar: &'a Grammar, name: &RuleName) -> Option<(&'a Grammar, &'a Rule)> {
        let resolved = match resolve_reference(grammar, name, self.resolver) {
            Ok(resolved) => resolved?,
            Err(err) => {
                warn_once(err.to_string());
                return None;
            }
        };
        let full = resolved.full_grammar_name()?;
        let target = if full == grammar.name() { grammar } else { self.resolver.grammar(full)? };
        target.rule(&resolved.rule).map(|rule| (target, rule))
    }

    fn match_token(&self, text: &str, pos: usize) -> Matches {
        // (position, input words consumed so far) for every live branch.
        let mut branches: Vec<(usize, Vec<String>)> = vec![(pos, Vec::new())];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let mut next = Vec::new();
            for (at, consumed) in branches {
                let hit = at < self.tokens.len() && (word == "%" || word == "*" || word == self.lowered[at]);
                if hit {
                    let mut longer = consumed.clone();
                    longer.push(self.tokens[at].clone());
                    next.push((at + 1, longer));
                }
                if word == "*" {
                    next.push((at, consumed));
                }
            }
            if next.is_empty() {
                return Vec::new();
            }
            branches = next;
        }
        branches
            .into_iter()
            .map(|(end, words)| (ParseNode::Token { text: text.to_string(), words }, end))
            .collect()
    }

    fn match_sequence(&mut self, grammar: &'a Grammar, items: &[&'a Rule], pos: usize) -> GrammarResult<Matches> {
        let Some((first, rest)) = items.split_first() else {
            return Ok(vec![(ParseNode::Empty, pos)]);
        };
        let heads = self.match_rule(grammar, first, pos)?;
        let mut out = Vec::new();
        for (head, head_end) in heads {
            if rest.is_empty() {
                match head {
                    ParseNode::Empty => out.push((head, head_end)),
                    head => out.push((ParseNode::Sequence(vec![head]), head_end)),
                }
                continue;
            }
            for (tail, end) in self.match_sequence(grammar, rest, head_end)? {
                let joined = match (&head, tail) {
                    (_, ParseNode::Empty) => head.clone(),
                    (ParseNode::Empty, tail) => tail,
                    (_, ParseNode::Sequence(mut items)) => {
                        items.insert(0, head.clone());
                        ParseNode::Sequence(items)
                    }
                    (_, tail) => ParseNode::Sequence(vec![head.clone(), tail]),
                };
                out.push((joined, end));
            }
        }
        Ok(out)
    }

    fn match_count(
        &mut self,
        grammar: &'a Grammar,
        child: &'a Rule,
        multiplicity: Multiplicity,
        pos: usize,
    ) -> GrammarResult<Matches> {
        let mut out = self.match_rule(grammar, child, pos)?;
        if out.is_empty() {
            return Ok(match multiplicity {
                Multiplicity::OnceOrMore => Vec::new(),
                _ => vec![(ParseNode::Empty, pos)],
            });
        }
        if multiplicity != Multiplicity::OnceOrMore {
            out.push((ParseNode::Empty, pos));
        }
        if multiplicity == Multiplicity::Optional {
            return Ok(out);
        }
        for copies in 2..=self.tokens.len().saturating_sub(pos) {
            let items = vec![child; copies];
            let more = self.match_sequence(grammar, &items, pos)?;
            if more.is_empty() {
                break;
            }
            out.extend(more);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tokenize;
    use std::sync::Arc;

    fn grammar(name: &str, rules: Vec<(&str, Rule)>) -> Grammar {
        let mut g = Grammar::new(name);
        for (rule_name, rule) in rules {
            g.set_rule(rule_name, rule, true);
        }
        g
    }

    fn full_parses(g: &Grammar, input: &str) -> Vec<RuleParse> {
        RuleMatcher::new(g).mparse(&tokenize(input), g, None).unwrap()
    }

    #[test]
    fn yes_no_examples() {
        let g = grammar("answers", vec![("cmd", alt![tok!("yes"), tok!("no")])]);
        let parses = full_parses(&g, "yes");
        assert_eq!(parses.len(), 1);
        assert_eq!(parses[0].rule_name, "cmd");
        assert!(parses[0].tags.is_empty());
        assert!(full_parses(&g, "maybe").is_empty());
    }

    #[test]
    fn percent_wildcard_needs_exactly_one_word() {
        let g = grammar("greet", vec![("x", seq![tok!("hello"), tok!("%")])]);
        let cases: Vec<(&str, usize)> = vec![("hello world", 1), ("hello", 0), ("hello big world", 0)];
        for (input, expected) in cases {
            assert_eq!(full_parses(&g, input).len(), expected, "input {input:?}");
        }
    }

    #[test]
    fn star_wildcard_may_skip_a_word() {
        let g = grammar("skip", vec![("x", seq![tok!("open"), tok!("*"), tok!("door")])]);
        assert_eq!(full_parses(&g, "open door").len(), 1);
        assert_eq!(full_parses(&g, "open the door").len(), 1);
        assert!(full_parses(&g, "open the big door").is_empty());
    }

    #[test]
    fn repetition_examples() {
        let g = grammar("polite", vec![("x", seq![star!(tok!("please")), tok!("go")])]);
        let cases: Vec<(&str, bool)> =
            vec![("go", true), ("please go", true), ("please please go", true), ("please", false), ("go go", false)];
        for (input, matches) in cases {
            assert_eq!(!full_parses(&g, input).is_empty(), matches, "input {input:?}");
        }

        let g = grammar("polite", vec![("x", seq![plus!(tok!("please")), tok!("go")])]);
        assert!(full_parses(&g, "go").is_empty());
        assert_eq!(full_parses(&g, "please please go").len(), 1);
    }

    #[test]
    fn matching_is_case_insensitive_and_multi_word_tokens_span_words() {
        let g = grammar("cities", vec![("city", alt![tok!("New York"), tok!("Boston")])]);
        let parses = full_parses(&g, "new YORK");
        assert_eq!(parses.len(), 1);
        // Words are reported as spoken.
        assert_eq!(parses[0].tree.tokens(), vec!["new", "YORK"]);
        assert!(full_parses(&g, "new").is_empty());
    }

    #[test]
    fn tokens_reproduce_the_input() {
        let g = grammar(
            "mix",
            vec![
                ("a", seq![opt!(tok!("please")), alt![tok!("turn on"), tok!("%")], star!(name!("thing")), tok!("*")]),
                ("thing", alt![tok!("the"), tok!("lights"), tok!("lamp")]),
            ],
        );
        for input in ["please turn on the lights", "turn on lamp now", "flip the lamp", "turn on"] {
            let tokens = tokenize(input);
            let parses = RuleMatcher::new(&g).mparse(&tokens, &g, Some("a")).unwrap();
            assert!(!parses.is_empty(), "no parse for {input:?}");
            for parse in parses {
                assert_eq!(parse.tree.tokens(), tokens.iter().map(String::as_str).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn tags_are_collected_along_the_accepting_path() {
        let g = grammar(
            "lights",
            vec![
                ("cmd", seq![alt![tag!(tok!("turn on"), "ON"), tag!(tok!("turn off"), "OFF")], tag!(name!("room"), "ROOM")]),
                ("room", alt![tag!(tok!("kitchen"), "K"), tag!(tok!("hall"), "H")]),
            ],
        );
        let parses = RuleMatcher::new(&g).mparse(&tokenize("turn off hall"), &g, Some("cmd")).unwrap();
        assert_eq!(parses.len(), 1);
        assert_eq!(parses[0].tags, vec!["OFF", "H", "ROOM"]);
    }

    #[test]
    fn null_and_void_sentinels() {
        let g = grammar(
            "s",
            vec![
                ("a", seq![tok!("go"), Rule::null()]),
                ("b", alt![tok!("go"), Rule::void()]),
                ("c", seq![tok!("go"), Rule::void()]),
            ],
        );
        let m = RuleMatcher::new(&g);
        let tokens = tokenize("go");
        assert_eq!(m.mparse(&tokens, &g, Some("a")).unwrap().len(), 1);
        assert_eq!(m.mparse(&tokens, &g, Some("b")).unwrap().len(), 1);
        assert!(m.mparse(&tokens, &g, Some("c")).unwrap().is_empty());
    }

    #[test]
    fn ambiguous_alternatives_are_not_deduplicated() {
        let g = grammar("dup", vec![("x", alt![tok!("go"), tok!("go")])]);
        assert_eq!(full_parses(&g, "go").len(), 2);
    }

    #[test]
    fn unknown_references_only_disable_their_branch() {
        let g = grammar("partial", vec![("x", alt![name!("missing"), name!("<nowhere.rule>"), tok!("ok")])]);
        assert_eq!(full_parses(&g, "ok").len(), 1);
    }

    #[test]
    fn references_follow_imports_and_qualified_names() {
        let mut colors = Grammar::new("com.acme.colors");
        colors.set_rule("color", alt![tok!("red"), tok!("blue")], true);
        let mut paint = Grammar::new("paint");
        paint.add_import(RuleName::parse("<com.acme.colors.*>").unwrap());
        paint.set_rule("cmd", seq![tok!("paint"), name!("<color>")], true);
        paint.set_rule("qualified", seq![tok!("use"), name!("<com.acme.colors.color>")], true);
        let all = vec![Arc::new(colors), Arc::new(paint.clone())];

        let m = RuleMatcher::new(&all);
        let parses = m.mparse(&tokenize("paint red"), &paint, Some("cmd")).unwrap();
        assert_eq!(parses.len(), 1);
        match &parses[0].tree {
            ParseNode::Sequence(items) => {
                assert!(matches!(&items[1], ParseNode::Rule { name, .. } if name.to_string() == "<com.acme.colors.color>"));
            }
            other => panic!("unexpected tree {other}"),
        }
        assert_eq!(m.mparse(&tokenize("use blue"), &paint, None).unwrap().len(), 1);
    }

    #[test]
    fn left_recursion_is_a_cycle_error() {
        let g = grammar("loop", vec![("a", alt![seq![name!("a"), tok!("x")], tok!("y")])]);
        let err = RuleMatcher::new(&g).mparse(&tokenize("y x"), &g, Some("a")).unwrap_err();
        assert!(matches!(err, GrammarError::Cycle { ref path } if path.len() == 2));

        // Right recursion advances and terminates.
        let g = grammar("list", vec![("a", alt![seq![tok!("x"), name!("a")], tok!("x")])]);
        assert_eq!(full_parses(&g, "x x x").len(), 1);
    }

    #[test]
    fn mparse_skips_disabled_and_private_rules() {
        let mut g = grammar("flags", vec![("on", tok!("go")), ("off", tok!("go"))]);
        g.set_rule("hidden", tok!("go"), false);
        g.set_rule_enabled("off", false).unwrap();
        let names: Vec<String> = full_parses(&g, "go").into_iter().map(|p| p.rule_name).collect();
        assert_eq!(names, vec!["on"]);

        let first = RuleMatcher::new(&g).parse(&tokenize("go"), &g, None).unwrap().unwrap();
        assert_eq!(first.rule_name, "on");
        // Naming a rule bypasses the enabled filter.
        assert_eq!(RuleMatcher::new(&g).mparse(&tokenize("go"), &g, Some("off")).unwrap().len(), 1);
    }

    #[test]
    fn metrics_count_candidates() {
        let g = grammar("m", vec![("x", seq![star!(tok!("a")), tok!("b")])]);
        let (parses, metrics) = RuleMatcher::new(&g).mparse_with_metrics(&tokenize("a a b"), &g, None).unwrap();
        assert_eq!(parses.len(), 1);
        assert_eq!(metrics.full_parses(), 1);
        assert!(metrics.calls() > 0);
        assert_eq!(metrics.rules[0].rule, "x");
    }
}
