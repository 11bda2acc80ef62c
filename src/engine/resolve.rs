//! Rule-name resolution and linking.
//!
//! A `Name` inside a grammar can point at a local rule, at a fully-qualified rule
//! of another grammar, or at a rule pulled in through an import. Resolution tries,
//! in order:
//!
//! ```text
//! <NULL> / <VOID>            -> the sentinel itself
//! <rule>   (local rule)      -> <this.rule>
//! <gram.rule> (gram known)   -> <gram.rule>
//! every import + <this.*>    -> collect matches
//!     0 matches  -> unresolved (Ok(None))
//!     1 match    -> that rule
//!     >1 matches -> GrammarError::Ambiguous
//! ```
//!
//! An import naming an unknown grammar or an undefined rule is skipped with a
//! (deduplicated) warning; an import without a grammar part is malformed.
//!
//! Linking runs resolution over every reference of a grammar and decides which
//! failures are fatal: an undefined import always is, an unresolved reference
//! only inside a public, enabled rule. A left-recursive loop reachable from a
//! public, enabled rule is fatal too (see `cycles.rs`).

use super::cycles::check_left_recursion;
use super::dedup::warn_once;
use crate::error::{GrammarError, GrammarResult};
use crate::grammar::Grammar;
use crate::RuleName;
use std::sync::Arc;

/// Lookup of grammars by (full) name.
pub trait GrammarResolver {
    fn grammar(&self, name: &str) -> Option<&Grammar>;
}

impl GrammarResolver for &[Arc<Grammar>] {
    fn grammar(&self, name: &str) -> Option<&Grammar> {
        self.iter().find(|g| g.name() == name).map(|g| g.as_ref())
    }
}

impl GrammarResolver for Vec<Arc<Grammar>> {
    fn grammar(&self, name: &str) -> Option<&Grammar> {
        self.iter().find(|g| g.name() == name).map(|g| g.as_ref())
    }
}

/// A grammar slice looked up under a name policy: exact, or case-folded the way
/// a case-insensitive [`GrammarStore`](crate::GrammarStore) folds its keys.
#[derive(Clone, Copy)]
pub struct GrammarSet<'a> {
    grammars: &'a [Arc<Grammar>],
    case_sensitive: bool,
}

impl<'a> GrammarSet<'a> {
    pub fn new(grammars: &'a [Arc<Grammar>], case_sensitive: bool) -> Self {
        Self { grammars, case_sensitive }
    }
}

impl GrammarResolver for GrammarSet<'_> {
    fn grammar(&self, name: &str) -> Option<&Grammar> {
        if self.case_sensitive {
            return self.grammars.iter().find(|g| g.name() == name).map(|g| g.as_ref());
        }
        let folded = name.to_lowercase();
        self.grammars.iter().find(|g| g.name().to_lowercase() == folded).map(|g| g.as_ref())
    }
}

/// A lone grammar resolves only itself.
impl GrammarResolver for Grammar {
    fn grammar(&self, name: &str) -> Option<&Grammar> {
        (self.name() == name).then_some(self)
    }
}

/// Prefer `grammar` itself over whatever the resolver holds under the same name:
/// the resolver may hold an older committed copy.
pub(super) fn lookup<'a>(grammar: &'a Grammar, resolver: &'a dyn GrammarResolver, name: &str) -> Option<&'a Grammar> {
    if grammar.name() == name { Some(grammar) } else { resolver.grammar(name) }
}

/// Resolve `reference` as seen from `grammar`.
pub fn resolve_reference(
    grammar: &Grammar,
    reference: &RuleName,
    resolver: &dyn GrammarResolver,
) -> GrammarResult<Option<RuleName>> {
    if reference.is_null() {
        return Ok(Some(RuleName::null()));
    }
    if reference.is_void() {
        return Ok(Some(RuleName::void()));
    }
    let simple = reference.rule.as_str();
    let full = reference.full_grammar_name();

    if full.is_none() && grammar.rule(simple).is_some() {
        return Ok(Some(RuleName::qualified(grammar.name(), simple)));
    }

    if let Some(target) = full.and_then(|f| lookup(grammar, resolver, f)).filter(|t| t.rule(simple).is_some()) {
        return Ok(Some(RuleName::qualified(target.name(), simple)));
    }

    let implicit = RuleName::qualified(grammar.name(), "*");
    let mut matches: Vec<RuleName> = Vec::new();

    for import in grammar.imports().iter().chain(std::iter::once(&implicit)) {
        let Some(import_grammar) = import.full_grammar_name() else {
            return Err(GrammarError::malformed(import.to_string()));
        };
        let Some(imported) = lookup(grammar, resolver, import_grammar) else {
            warn_once(format!("import of unknown grammar {} in {}", import, grammar.name()));
            continue;
        };
        if !import.is_wildcard() && imported.rule(&import.rule).is_none() {
            warn_once(format!("import of undefined rule {} in {}", import, grammar.name()));
            continue;
        }

        // A qualified reference only matches imports of that grammar, by full
        // or simple grammar name.
        if full.is_some_and(|f| import_grammar != f && import.simple_grammar_name() != Some(f)) {
            continue;
        }

        let found = if import.is_wildcard() { imported.rule(simple).is_some() } else { import.rule == simple };
        if found {
            let candidate = RuleName::qualified(import_grammar, simple);
            if !matches.contains(&candidate) {
                matches.push(candidate);
            }
        }
    }

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(GrammarError::Ambiguous {
            grammar: grammar.name().to_string(),
            reference: reference.to_string(),
            candidates: matches.iter().map(ToString::to_string).collect(),
        }),
    }
}

/// Check that every import names a known grammar, that every reference inside
/// a public, enabled rule resolves and that no such rule is left-recursive.
pub fn link_grammar(grammar: &Grammar, resolver: &dyn GrammarResolver) -> GrammarResult<()> {
    for import in grammar.imports() {
        let Some(name) = import.full_grammar_name() else {
            return Err(GrammarError::malformed(import.to_string()));
        };
        if lookup(grammar, resolver, name).is_none() {
            return Err(GrammarError::UndefinedImport {
                grammar: grammar.name().to_string(),
                import: import.to_string(),
            });
        }
    }

    for (rule_name, entry) in grammar.rules() {
        let mut references = Vec::new();
        entry.rule.for_each_reference(&mut |r| references.push(r));
        for reference in references {
            if resolve_reference(grammar, reference, resolver)?.is_some() {
                continue;
            }
            if entry.public && entry.enabled {
                return Err(GrammarError::unresolved(grammar.name(), reference));
            }
            warn_once(format!("unresolvable rule reference {} in <{}.{}>", reference, grammar.name(), rule_name));
        }
    }
    check_left_recursion(grammar, resolver)?;
    log::debug!("[link] grammar {} linked", grammar.name());
    Ok(())
}
