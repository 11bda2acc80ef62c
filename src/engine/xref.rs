//! Reverse cross-reference index.
//!
//! Maps every referenced rule (`gram.rule`) to the set of rules (`gram.rule`)
//! whose bodies refer to it. The index is derived from the grammars and can be
//! rebuilt at any time; matching and activation never consult it.

use super::dedup::warn_once;
use super::resolve::{GrammarResolver, resolve_reference};
use crate::grammar::Grammar;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossReferenceIndex {
    referenced_by: BTreeMap<String, BTreeSet<String>>,
}

impl CrossReferenceIndex {
    /// One pass over every rule of every grammar. References are resolved from
    /// the declaring grammar; sentinels are skipped and references that do not
    /// resolve are reported and left out.
    pub fn build<'g>(grammars: impl IntoIterator<Item = &'g Grammar>, resolver: &dyn GrammarResolver) -> Self {
        let mut index = Self::default();
        for grammar in grammars {
            for (rule_name, entry) in grammar.rules() {
                let referrer = format!("{}.{}", grammar.name(), rule_name);
                entry.rule.for_each_reference(&mut |reference| {
                    if reference.is_sentinel() {
                        return;
                    }
                    match resolve_reference(grammar, reference, resolver) {
                        Ok(Some(target)) => {
                            index.referenced_by.entry(target.to_qualified_string()).or_default().insert(referrer.clone());
                        }
                        Ok(None) => {
                            warn_once(format!("unresolvable rule reference {} in <{}>", reference, referrer));
                        }
                        Err(err) => {
                            warn_once(err.to_string());
                        }
                    }
                });
            }
        }
        index
    }

    /// Rules referring to `target` (`gram.rule`).
    pub fn referencing(&self, target: &str) -> Option<&BTreeSet<String>> {
        self.referenced_by.get(target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.referenced_by.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.referenced_by.len()
    }

    pub fn is_empty(&self) -> bool {
        self.referenced_by.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Rule, RuleName};
    use std::sync::Arc;

    #[test]
    fn index_inverts_references_across_grammars() {
        let mut colors = Grammar::new("colors");
        colors.set_rule("color", alt![tok!("red"), name!("dark")], true);
        colors.set_rule("dark", tok!("black"), false);

        let mut paint = Grammar::new("paint");
        paint.add_import(RuleName::parse("<colors.color>").unwrap());
        paint.set_rule("cmd", seq![tok!("paint"), name!("color"), opt!(name!("missing")), Rule::null()], true);
        paint.set_rule("again", star!(name!("<colors.color>")), true);

        let all = vec![Arc::new(colors), Arc::new(paint)];
        let index = CrossReferenceIndex::build(all.iter().map(|g| g.as_ref()), &all);

        let users: Vec<&str> = index.referencing("colors.color").unwrap().iter().map(String::as_str).collect();
        assert_eq!(users, vec!["paint.again", "paint.cmd"]);
        assert_eq!(index.referencing("colors.dark").unwrap().len(), 1);
        assert!(index.referencing("paint.missing").is_none());
        assert!(index.referencing("NULL").is_none());
        assert_eq!(index.len(), 2);
    }
}
