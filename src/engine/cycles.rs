//! Left-recursion check, run while linking.
//!
//! The matcher fails with [`GrammarError::Cycle`] when it enters a rule at a
//! position where that rule is already active. That happens exactly when a rule
//! can reach itself through references that may be entered before any word is
//! consumed: its left edge.
//!
//! ```text
//! left edge of   Name          the referenced rule
//!                Alternatives  every child
//!                Sequence      children up to and including the first one
//!                              that cannot match the empty string
//!                Tag / Count   the child
//!                Token         nothing
//! ```
//!
//! Walking the left edges from every public, enabled rule finds such a loop
//! before the grammar is ever matched. Unresolved references end a walk; linking
//! reports them separately.

use super::resolve::{GrammarResolver, lookup, resolve_reference};
use crate::error::{GrammarError, GrammarResult};
use crate::grammar::Grammar;
use crate::{Multiplicity, Rule, RuleName};
use std::collections::{HashMap, HashSet};

/// Fail with [`GrammarError::Cycle`] when a public, enabled rule of `grammar`
/// leads into a left-recursive loop (possibly through other grammars).
pub(super) fn check_left_recursion(grammar: &Grammar, resolver: &dyn GrammarResolver) -> GrammarResult<()> {
    let mut walk = LeftWalk {
        home: grammar,
        resolver,
        nullable: HashMap::new(),
        in_progress: HashSet::new(),
        done: HashSet::new(),
        path: Vec::new(),
    };
    for (rule_name, entry) in grammar.rules() {
        if entry.public && entry.enabled {
            walk.visit(grammar, rule_name)?;
        }
    }
    Ok(())
}

struct LeftWalk<'a> {
    home: &'a Grammar,
    resolver: &'a dyn GrammarResolver,
    /// Rules known to match the empty string (or not).
    nullable: HashMap<String, bool>,
    /// Rules whose emptiness is still being worked out.
    in_progress: HashSet<String>,
    done: HashSet<String>,
    /// Rules whose left edge is being walked, outermost first.
    path: Vec<String>,
}

impl<'a> LeftWalk<'a> {
    fn visit(&mut self, grammar: &'a Grammar, rule_name: &str) -> GrammarResult<()> {
        let key = format!("{}.{}", grammar.name(), rule_name);
        if self.done.contains(&key) {
            return Ok(());
        }
        if let Some(start) = self.path.iter().position(|k| *k == key) {
            let mut path: Vec<String> = self.path[start..].iter().map(|k| format!("<{}>", k)).collect();
            path.push(format!("<{}>", key));
            log::debug!("[link:cycle] {}", path.join(" -> "));
            return Err(GrammarError::Cycle { path });
        }
        let Some(body) = grammar.rule(rule_name) else {
            return Ok(());
        };

        self.path.push(key.clone());
        let mut edge = Vec::new();
        self.left_edge(grammar, body, &mut edge)?;
        for (target, name) in edge {
            self.visit(target, &name)?;
        }
        self.path.pop();
        self.done.insert(key);
        Ok(())
    }

    /// The grammar and rule a reference inside `from` points at.
    fn target(&self, from: &'a Grammar, name: &RuleName) -> GrammarResult<Option<(&'a Grammar, String)>> {
        let Some(resolved) = resolve_reference(from, name, self.resolver)? else {
            return Ok(None);
        };
        let found = resolved
            .full_grammar_name()
            .and_then(|full| lookup(self.home, self.resolver, full))
            .filter(|g| g.rule(&resolved.rule).is_some());
        Ok(found.map(|g| (g, resolved.rule)))
    }

    fn left_edge(&mut self, grammar: &'a Grammar, rule: &Rule, out: &mut Vec<(&'a Grammar, String)>) -> GrammarResult<()> {
        match rule {
            Rule::Token(_) => {}
            Rule::Name(name) if name.is_sentinel() => {}
            Rule::Name(name) => out.extend(self.target(grammar, name)?),
            Rule::Alternatives { children, .. } => {
                for child in children {
                    self.left_edge(grammar, child, out)?;
                }
            }
            Rule::Sequence(children) => {
                for child in children {
                    self.left_edge(grammar, child, out)?;
                    if !self.nullable(grammar, child)? {
                        break;
                    }
                }
            }
            Rule::Tag { child, .. } | Rule::Count { child, .. } => self.left_edge(grammar, child, out)?,
        }
        Ok(())
    }

    /// Whether `rule` can match without consuming a word.
    fn nullable(&mut self, grammar: &'a Grammar, rule: &Rule) -> GrammarResult<bool> {
        Ok(match rule {
            // `*` may skip its word.
            Rule::Token(text) => text.split_whitespace().all(|w| w == "*"),
            Rule::Name(name) if name.is_null() => true,
            Rule::Name(name) if name.is_void() => false,
            Rule::Name(name) => match self.target(grammar, name)? {
                Some((target, rule_name)) => self.rule_nullable(target, &rule_name)?,
                None => false,
            },
            Rule::Alternatives { children, .. } => {
                for child in children {
                    if self.nullable(grammar, child)? {
                        return Ok(true);
                    }
                }
                false
            }
            Rule::Sequence(children) => {
                for child in children {
                    if !self.nullable(grammar, child)? {
                        return Ok(false);
                    }
                }
                true
            }
            Rule::Tag { child, .. } => self.nullable(grammar, child)?,
            Rule::Count { child, multiplicity } => {
                *multiplicity != Multiplicity::OnceOrMore || self.nullable(grammar, child)?
            }
        })
    }

    fn rule_nullable(&mut self, grammar: &'a Grammar, rule_name: &str) -> GrammarResult<bool> {
        let key = format!("{}.{}", grammar.name(), rule_name);
        if let Some(known) = self.nullable.get(&key) {
            return Ok(*known);
        }
        // A rule met again while its own body is examined adds nothing new.
        if !self.in_progress.insert(key.clone()) {
            return Ok(false);
        }
        let value = match grammar.rule(rule_name) {
            Some(body) => self.nullable(grammar, body)?,
            None => false,
        };
        self.in_progress.remove(&key);
        // A `false` reached while another rule is still open may still turn `true`.
        if value || self.in_progress.is_empty() {
            self.nullable.insert(key, value);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn grammar(name: &str, rules: Vec<(&str, Rule, bool)>) -> Grammar {
        let mut g = Grammar::new(name);
        for (rule_name, rule, public) in rules {
            g.set_rule(rule_name, rule, public);
        }
        g
    }

    fn cycle_path(g: &Grammar, others: &[Arc<Grammar>]) -> Option<Vec<String>> {
        match check_left_recursion(g, &others) {
            Ok(()) => None,
            Err(GrammarError::Cycle { path }) => Some(path),
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn direct_left_recursion() {
        let g = grammar("loop", vec![("cmd", alt![seq![name!("cmd"), tok!("x")], tok!("y")], true)]);
        assert_eq!(cycle_path(&g, &[]).unwrap(), vec!["<loop.cmd>", "<loop.cmd>"]);
    }

    #[test]
    fn recursion_behind_an_empty_prefix() {
        let g = grammar(
            "loop",
            vec![
                ("cmd", seq![opt!(tok!("please")), name!("again"), tok!("x")], true),
                ("again", alt![seq![star!(tok!("um")), name!("cmd")], tok!("y")], false),
            ],
        );
        assert_eq!(cycle_path(&g, &[]).unwrap(), vec!["<loop.cmd>", "<loop.again>", "<loop.cmd>"]);

        let g = grammar(
            "loop",
            vec![("cmd", seq![name!("empty"), name!("cmd")], true), ("empty", alt![tok!("*"), Rule::null()], false)],
        );
        assert!(cycle_path(&g, &[]).is_some());
    }

    #[test]
    fn right_recursion_and_consumed_prefixes_are_fine() {
        let g = grammar(
            "list",
            vec![
                ("items", alt![seq![tok!("x"), name!("items")], tok!("x")], true),
                ("guarded", seq![plus!(tok!("go")), name!("guarded")], true),
                ("blocked", seq![Rule::void(), name!("blocked")], true),
            ],
        );
        assert!(cycle_path(&g, &[]).is_none());
    }

    #[test]
    fn only_rules_reachable_from_public_enabled_rules_count() {
        let mut g = grammar(
            "quiet",
            vec![("hidden", seq![name!("hidden"), tok!("x")], false), ("cmd", seq![name!("off"), tok!("x")], true)],
        );
        g.set_rule("off", seq![name!("off"), tok!("x")], true);
        g.set_rule_enabled("off", false).unwrap();
        // `cmd` reaches the disabled rule, which loops on itself.
        assert!(cycle_path(&g, &[]).is_some());

        g.delete_rule("cmd").unwrap();
        assert!(cycle_path(&g, &[]).is_none());
    }

    #[test]
    fn loops_across_grammars() {
        let mut other = Grammar::new("other");
        other.add_import(RuleName::parse("<home.*>").unwrap());
        other.set_rule("back", seq![name!("start"), tok!("x")], true);
        let mut home = Grammar::new("home");
        home.add_import(RuleName::parse("<other.*>").unwrap());
        home.set_rule("start", alt![name!("back"), tok!("y")], true);
        let all = vec![Arc::new(other), Arc::new(home.clone())];
        assert_eq!(cycle_path(&home, &all).unwrap(), vec!["<home.start>", "<other.back>", "<home.start>"]);
    }
}
