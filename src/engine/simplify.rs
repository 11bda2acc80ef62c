//! NULL/VOID elimination.
//!
//! `<NULL>` matches the empty string and `<VOID>` matches nothing. Both are
//! handy when grammars are derived mechanically, but many downstream engines
//! support neither, so [`simplify`] rewrites a grammar set until no sentinel is
//! left anywhere except as the whole body of a rule, then drops those rules.
//!
//! ## Rewrite rules (bottom-up)
//!
//! ```text
//! Sequence      any VOID child        -> VOID
//!               drop NULL children; nothing left -> NULL
//! Alternatives  drop VOID children;   nothing left -> VOID
//!               NULL among survivors  -> [rest]   (only NULLs -> NULL)
//! Count         VOID child            -> x+ : VOID, [x] / x* : NULL
//!               NULL child            -> NULL
//! Tag           sentinel child        -> that sentinel
//! Name          <NULL> / <VOID> are sentinels already;
//!               a reference whose target body is a bare sentinel -> that sentinel
//! ```
//!
//! Passes over the whole set repeat until one pass rewrites nothing. Every
//! rewrite either shrinks a tree or replaces a reference by a sentinel, so the
//! loop terminates.
//!
//! ## Sharing
//!
//! Grammars travel as `Arc<Grammar>`. A grammar is cloned (`Arc::make_mut`) only
//! when one of its rules actually changes; untouched grammars come back as the
//! very same allocation.

use super::resolve::{GrammarResolver, GrammarSet, lookup, resolve_reference};
use crate::error::{GrammarError, GrammarResult};
use crate::grammar::Grammar;
use crate::{Multiplicity, Rule};
use std::sync::Arc;

/// Eliminate sentinels from `grammars`. Rules whose simplified body is `<VOID>`
/// (with `eliminate_void`) or `<NULL>` (with `eliminate_null`) are removed, and
/// grammars left without rules are dropped. Any unresolvable reference aborts the
/// whole call.
///
/// Grammar names in references must match exactly; see [`simplify_with`].
pub fn simplify(grammars: &[Arc<Grammar>], eliminate_null: bool, eliminate_void: bool) -> GrammarResult<Vec<Arc<Grammar>>> {
    simplify_with(grammars, true, eliminate_null, eliminate_void)
}

/// Like [`simplify`], resolving grammar names in references case-insensitively
/// unless `case_sensitive` is set.
pub fn simplify_with(
    grammars: &[Arc<Grammar>],
    case_sensitive: bool,
    eliminate_null: bool,
    eliminate_void: bool,
) -> GrammarResult<Vec<Arc<Grammar>>> {
    let mut current: Vec<Arc<Grammar>> = grammars.to_vec();
    let mut pass = 0;

    loop {
        pass += 1;
        let mut rewrites = 0;
        for idx in 0..current.len() {
            let names: Vec<String> = current[idx].rule_names().into_iter().map(str::to_string).collect();
            for name in names {
                let rewritten = {
                    let grammar = &current[idx];
                    let set = GrammarSet::new(&current, case_sensitive);
                    match grammar.rule(&name) {
                        Some(rule) => rewrite(rule, grammar, &set)?,
                        None => None,
                    }
                };
                if let Some(rule) = rewritten {
                    log::trace!("[simplify:rewrite] <{}.{}> -> {}", current[idx].name(), name, rule);
                    Arc::make_mut(&mut current[idx]).replace_rule_body(&name, rule);
                    rewrites += 1;
                }
            }
        }
        log::trace!("[simplify:pass] pass={} rewrites={}", pass, rewrites);
        if rewrites == 0 {
            break;
        }
    }

    for grammar in current.iter_mut() {
        let doomed: Vec<String> = grammar
            .rules()
            .filter(|(_, entry)| (eliminate_void && entry.rule.is_void()) || (eliminate_null && entry.rule.is_null()))
            .map(|(name, _)| name.to_string())
            .collect();
        if doomed.is_empty() {
            continue;
        }
        let grammar = Arc::make_mut(grammar);
        for name in doomed {
            log::debug!("[simplify:prune] <{}.{}>", grammar.name(), name);
            grammar.prune_rule(&name);
        }
    }
    current.retain(|g| !g.is_empty());
    Ok(current)
}

/// Rewrite `rule` one step; `None` means nothing changed.
fn rewrite(rule: &Rule, grammar: &Grammar, all: &dyn GrammarResolver) -> GrammarResult<Option<Rule>> {
    match rule {
        Rule::Token(_) => Ok(None),
        Rule::Name(name) if name.is_sentinel() => Ok(None),
        Rule::Name(name) => {
            let Some(target) = resolve_reference(grammar, name, all)? else {
                return Err(GrammarError::unresolved(grammar.name(), name));
            };
            let body = target.full_grammar_name().and_then(|g| lookup(grammar, all, g)).and_then(|g| g.rule(&target.rule));
            Ok(match body {
                Some(body) if body.is_null() => Some(Rule::null()),
                Some(body) if body.is_void() => Some(Rule::void()),
                _ => None,
            })
        }
        Rule::Tag { child, label } => {
            let new_child = rewrite(child, grammar, all)?;
            let effective = new_child.as_ref().unwrap_or(&**child);
            if effective.is_null() || effective.is_void() {
                return Ok(Some(effective.clone()));
            }
            Ok(new_child.map(|c| Rule::tag(c, label.clone())))
        }
        Rule::Count { child, multiplicity } => {
            let new_child = rewrite(child, grammar, all)?;
            let effective = new_child.as_ref().unwrap_or(&**child);
            if effective.is_void() {
                return Ok(Some(match multiplicity {
                    Multiplicity::OnceOrMore => Rule::void(),
                    _ => Rule::null(),
                }));
            }
            if effective.is_null() {
                return Ok(Some(Rule::null()));
            }
            Ok(new_child.map(|c| Rule::count(c, *multiplicity)))
        }
        Rule::Sequence(children) => {
            let (children, changed) = rewrite_children(children, grammar, all)?;
            if children.iter().any(Rule::is_void) {
                return Ok(Some(Rule::void()));
            }
            let before = children.len();
            let kept: Vec<Rule> = children.into_iter().filter(|c| !c.is_null()).collect();
            if kept.is_empty() {
                return Ok(Some(Rule::null()));
            }
            Ok((changed || kept.len() != before).then(|| Rule::sequence(kept)))
        }
        Rule::Alternatives { children, weights } => {
            let (children, changed) = rewrite_children(children, grammar, all)?;
            let weights = weights.as_ref().filter(|w| w.len() == children.len());

            let mut survivors = Vec::new();
            let mut kept_weights = Vec::new();
            let mut saw_null = false;
            for (idx, child) in children.into_iter().enumerate() {
                if child.is_void() {
                    continue;
                }
                if child.is_null() {
                    saw_null = true;
                    continue;
                }
                if let Some(w) = weights {
                    kept_weights.push(w[idx]);
                }
                survivors.push(child);
            }

            if survivors.is_empty() {
                return Ok(Some(if saw_null { Rule::null() } else { Rule::void() }));
            }
            let dropped = survivors.len() != rule_children_len(rule);
            if !changed && !dropped {
                return Ok(None);
            }
            let rebuilt = match weights {
                Some(_) => Rule::weighted(survivors, kept_weights),
                None => Rule::alternatives(survivors),
            };
            Ok(Some(if saw_null { Rule::optional(unwrap_single(rebuilt)) } else { rebuilt }))
        }
    }
}

fn rewrite_children(children: &[Rule], grammar: &Grammar, all: &dyn GrammarResolver) -> GrammarResult<(Vec<Rule>, bool)> {
    let mut changed = false;
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match rewrite(child, grammar, all)? {
            Some(new) => {
                changed = true;
                out.push(new);
            }
            None => out.push(child.clone()),
        }
    }
    Ok((out, changed))
}

fn rule_children_len(rule: &Rule) -> usize {
    match rule {
        Rule::Alternatives { children, .. } | Rule::Sequence(children) => children.len(),
        _ => 0,
    }
}

/// `(x)` with a single, unweighted alternative is just `x`.
fn unwrap_single(rule: Rule) -> Rule {
    match rule {
        Rule::Alternatives { mut children, weights: None } if children.len() == 1 => children.remove(0),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleName;
    use crate::engine::RuleMatcher;

    fn grammar(name: &str, rules: Vec<(&str, Rule)>) -> Arc<Grammar> {
        let mut g = Grammar::new(name);
        for (rule_name, rule) in rules {
            g.set_rule(rule_name, rule, true);
        }
        Arc::new(g)
    }

    fn body<'a>(set: &'a [Arc<Grammar>], grammar: &str, rule: &str) -> Option<&'a Rule> {
        set.iter().find(|g| g.name() == grammar).and_then(|g| g.rule(rule))
    }

    #[test]
    fn sequence_rules() {
        let g = grammar(
            "s",
            vec![
                ("drop_null", seq![tok!("a"), Rule::null(), tok!("b")]),
                ("has_void", seq![tok!("a"), Rule::void()]),
                ("all_null", seq![Rule::null(), Rule::null()]),
                ("keep", tok!("k")),
            ],
        );
        let out = simplify(&[g], false, false).unwrap();
        assert_eq!(body(&out, "s", "drop_null"), Some(&seq![tok!("a"), tok!("b")]));
        assert_eq!(body(&out, "s", "has_void"), Some(&Rule::void()));
        assert_eq!(body(&out, "s", "all_null"), Some(&Rule::null()));
    }

    #[test]
    fn alternatives_rules() {
        let g = grammar(
            "a",
            vec![
                ("drop_void", alt![tok!("x"), Rule::void(), tok!("y")]),
                ("with_null", alt![tok!("x"), Rule::null()]),
                ("with_null_many", alt![tok!("x"), Rule::null(), tok!("y")]),
                ("all_void", alt![Rule::void(), Rule::void()]),
                ("void_or_null", alt![Rule::void(), Rule::null()]),
                ("weighted", Rule::weighted(vec![tok!("x"), Rule::void(), tok!("z")], vec![1.0, 2.0, 3.0])),
            ],
        );
        let out = simplify(&[g], false, false).unwrap();
        assert_eq!(body(&out, "a", "drop_void"), Some(&alt![tok!("x"), tok!("y")]));
        assert_eq!(body(&out, "a", "with_null"), Some(&opt!(tok!("x"))));
        assert_eq!(body(&out, "a", "with_null_many"), Some(&opt!(alt![tok!("x"), tok!("y")])));
        assert_eq!(body(&out, "a", "all_void"), Some(&Rule::void()));
        assert_eq!(body(&out, "a", "void_or_null"), Some(&Rule::null()));
        assert_eq!(
            body(&out, "a", "weighted"),
            Some(&Rule::weighted(vec![tok!("x"), tok!("z")], vec![1.0, 3.0]))
        );
    }

    #[test]
    fn count_and_tag_rules() {
        let g = grammar(
            "c",
            vec![
                ("opt_void", opt!(Rule::void())),
                ("star_void", star!(Rule::void())),
                ("plus_void", plus!(Rule::void())),
                ("plus_null", plus!(Rule::null())),
                ("tag_void", tag!(Rule::void(), "t")),
                ("tag_null", tag!(Rule::null(), "t")),
                ("tag_nested", tag!(seq![tok!("x"), Rule::null()], "t")),
            ],
        );
        let out = simplify(&[g], false, false).unwrap();
        assert_eq!(body(&out, "c", "opt_void"), Some(&Rule::null()));
        assert_eq!(body(&out, "c", "star_void"), Some(&Rule::null()));
        assert_eq!(body(&out, "c", "plus_void"), Some(&Rule::void()));
        assert_eq!(body(&out, "c", "plus_null"), Some(&Rule::null()));
        assert_eq!(body(&out, "c", "tag_void"), Some(&Rule::void()));
        assert_eq!(body(&out, "c", "tag_null"), Some(&Rule::null()));
        assert_eq!(body(&out, "c", "tag_nested"), Some(&tag!(seq![tok!("x")], "t")));
    }

    #[test]
    fn references_to_sentinel_rules_collapse_and_propagate() {
        let g = grammar(
            "r",
            vec![
                ("nothing", Rule::void()),
                ("empty", Rule::null()),
                ("via_void", seq![tok!("a"), name!("nothing")]),
                ("via_empty", seq![tok!("a"), name!("empty")]),
                ("chain", alt![name!("via_void"), tok!("b")]),
            ],
        );
        let out = simplify(&[g], true, true).unwrap();
        assert_eq!(body(&out, "r", "via_empty"), Some(&seq![tok!("a")]));
        // via_void became VOID, was pruned, and chain lost that branch first.
        assert_eq!(body(&out, "r", "chain"), Some(&alt![tok!("b")]));
        assert!(body(&out, "r", "nothing").is_none());
        assert!(body(&out, "r", "empty").is_none());
        assert!(body(&out, "r", "via_void").is_none());
    }

    #[test]
    fn pruning_follows_the_flags_and_drops_empty_grammars() {
        let sentinels = grammar("sentinels", vec![("n", Rule::null()), ("v", Rule::void())]);
        let keep_null = simplify(&[sentinels.clone()], false, true).unwrap();
        assert_eq!(keep_null.len(), 1);
        assert!(body(&keep_null, "sentinels", "n").is_some());
        assert!(body(&keep_null, "sentinels", "v").is_none());

        assert!(simplify(&[sentinels], true, true).unwrap().is_empty());
    }

    #[test]
    fn unchanged_grammars_are_shared() {
        let clean = grammar("clean", vec![("x", seq![tok!("a"), opt!(tok!("b"))])]);
        let dirty = grammar("dirty", vec![("y", seq![tok!("a"), Rule::null()])]);
        let out = simplify(&[clean.clone(), dirty.clone()], true, true).unwrap();
        assert!(Arc::ptr_eq(&out[0], &clean));
        assert!(!Arc::ptr_eq(&out[1], &dirty));
        // The input is never modified.
        assert_eq!(dirty.rule("y"), Some(&seq![tok!("a"), Rule::null()]));
    }

    #[test]
    fn unresolved_reference_aborts() {
        let g = grammar("broken", vec![("x", seq![tok!("a"), name!("missing")])]);
        assert!(matches!(simplify(&[g], true, true), Err(GrammarError::Unresolved { .. })));
    }

    #[test]
    fn cross_grammar_references_collapse() {
        let base = grammar("base", vec![("gone", Rule::void()), ("word", tok!("w"))]);
        let mut user = Grammar::new("user");
        user.add_import(RuleName::parse("<base.*>").unwrap());
        user.set_rule("x", alt![name!("gone"), name!("<base.word>")], true);
        let out = simplify(&[base, Arc::new(user)], true, true).unwrap();
        assert_eq!(body(&out, "user", "x"), Some(&alt![name!("<base.word>")]));
    }

    #[test]
    fn grammar_names_fold_when_case_insensitive() {
        let base = grammar("base", vec![("gone", Rule::void()), ("word", tok!("w"))]);
        let user = grammar("user", vec![("x", alt![name!("<Base.gone>"), name!("<BASE.word>")])]);
        let set = vec![base, user];

        assert!(matches!(simplify(&set, true, true), Err(GrammarError::Unresolved { .. })));
        let out = simplify_with(&set, false, true, true).unwrap();
        assert_eq!(body(&out, "user", "x"), Some(&alt![name!("<BASE.word>")]));
    }

    fn sample_set() -> Vec<Arc<Grammar>> {
        vec![
            grammar(
                "one",
                vec![
                    ("a", seq![star!(alt![tok!("please"), Rule::null()]), tag!(name!("b"), "B"), opt!(Rule::void())]),
                    ("b", alt![tok!("go"), tok!("stop"), Rule::null(), seq![Rule::void(), tok!("x")]]),
                    ("c", plus!(tag!(alt![Rule::void(), name!("d")], "C"))),
                    ("d", seq![Rule::null(), Rule::null()]),
                    ("e", seq![tok!("run"), name!("c"), opt!(name!("b"))]),
                ],
            ),
            grammar("two", vec![("f", alt![name!("<one.a>"), name!("<one.d>"), tok!("hi")])]),
        ]
    }

    #[test]
    fn simplification_is_idempotent() {
        for (null, void) in [(true, true), (true, false), (false, true), (false, false)] {
            let once = simplify(&sample_set(), null, void).unwrap();
            let twice = simplify(&once, null, void).unwrap();
            assert_eq!(once.len(), twice.len());
            for (a, b) in once.iter().zip(&twice) {
                assert_eq!(a.as_ref(), b.as_ref());
                assert!(Arc::ptr_eq(a, b), "second pass rewrote {}", a.name());
            }
        }
    }

    #[test]
    fn simplification_adds_no_sentences() {
        let original = sample_set();
        let simplified = simplify(&original, true, true).unwrap();
        let samples = [
            "go", "please go", "please please stop", "run", "run go", "run stop", "hi", "", "x", "please", "stop go",
        ];
        for sample in samples {
            let tokens: Vec<String> = sample.split_whitespace().map(str::to_string).collect();
            for grammar in &simplified {
                let before = original.iter().find(|g| g.name() == grammar.name()).unwrap();
                for (rule_name, _) in grammar.rules() {
                    let after = RuleMatcher::new(&simplified).mparse(&tokens, grammar, Some(rule_name)).unwrap();
                    if after.is_empty() {
                        continue;
                    }
                    let was = RuleMatcher::new(&original).mparse(&tokens, before, Some(rule_name)).unwrap();
                    assert!(!was.is_empty(), "{sample:?} newly accepted by <{}.{}>", grammar.name(), rule_name);
                }
            }
        }
    }
}
