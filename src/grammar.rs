//! Named rule grammars.
//!
//! A [`Grammar`] owns its rule trees plus the per-rule `public` / `enabled`
//! flags, its import list and its activation mode.
//!
//! ## Change tracking
//!
//! Every edit bumps the grammar's `generation`; a rule whose body changed records
//! the generation it was changed at (`modified_at`). Commit hands the hooks every
//! rule with `modified_at > committed_generation` and then moves
//! `committed_generation` forward, so the set of changed rules is always derived
//! from the counters and never from flags written at scattered call sites.
//! Deleted rules leave a tombstone with the generation of their deletion until the
//! next commit.

use crate::error::{GrammarError, GrammarResult};
use crate::source::ParsedGrammar;
use crate::{Rule, RuleName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// When a grammar takes part in recognition (together with its `enabled` flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Active whenever enabled, focus or not.
    Global,
    /// Active while the recognizer holds focus; suppresses non-modal grammars.
    RecognizerModal,
    /// Active while the recognizer holds focus and no modal grammar is active.
    #[default]
    Local,
}

/// A rule body plus its flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarRule {
    pub rule: Rule,
    pub public: bool,
    pub enabled: bool,
    /// Generation at which `rule` was last replaced.
    pub modified_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grammar {
    name: String,
    rules: BTreeMap<String, GrammarRule>,
    imports: Vec<RuleName>,
    activation_mode: ActivationMode,
    enabled: bool,
    active: bool,
    generation: u64,
    committed_generation: u64,
    #[serde(default)]
    tombstones: BTreeMap<String, u64>,
}

impl Grammar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: BTreeMap::new(),
            imports: Vec::new(),
            activation_mode: ActivationMode::default(),
            enabled: true,
            active: false,
            generation: 0,
            committed_generation: 0,
            tombstones: BTreeMap::new(),
        }
    }

    /// Build a grammar from the output of a grammar-source parser. Every rule is
    /// new, so the whole grammar counts as changed until it is committed.
    pub fn from_parsed(parsed: ParsedGrammar) -> Self {
        let mut grammar = Grammar::new(parsed.name);
        for import in parsed.imports {
            grammar.add_import(import);
        }
        for (name, rule, public) in parsed.rules {
            grammar.set_rule(name, rule, public);
        }
        grammar
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Define or replace a rule. A new public rule follows the grammar's enabled
    /// flag; private rules are never enabled for recognition.
    pub fn set_rule(&mut self, name: impl Into<String>, rule: Rule, public: bool) {
        let name = name.into();
        let generation = self.bump();
        let enabled = match self.rules.get(&name) {
            Some(existing) if existing.public == public => existing.enabled,
            _ => public && self.enabled,
        };
        self.tombstones.remove(&name);
        self.rules.insert(name, GrammarRule { rule, public, enabled, modified_at: generation });
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name).map(|r| &r.rule)
    }

    pub fn grammar_rule(&self, name: &str) -> Option<&GrammarRule> {
        self.rules.get(name)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, &GrammarRule)> {
        self.rules.iter().map(|(name, r)| (name.as_str(), r))
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn delete_rule(&mut self, name: &str) -> GrammarResult<Rule> {
        let removed = self.rules.remove(name).ok_or_else(|| GrammarError::unknown_rule(&self.name, name))?;
        let generation = self.bump();
        self.tombstones.insert(name.to_string(), generation);
        Ok(removed.rule)
    }

    pub fn is_rule_public(&self, name: &str) -> GrammarResult<bool> {
        self.lookup(name).map(|r| r.public)
    }

    pub fn is_rule_enabled(&self, name: &str) -> GrammarResult<bool> {
        self.lookup(name).map(|r| r.enabled)
    }

    pub fn set_rule_enabled(&mut self, name: &str, enabled: bool) -> GrammarResult<()> {
        let grammar = self.name.clone();
        let entry = self.rules.get_mut(name).ok_or_else(|| GrammarError::unknown_rule(grammar, name))?;
        if entry.enabled != enabled {
            entry.enabled = enabled;
            self.bump();
        }
        Ok(())
    }

    /// Enable or disable several rules; nothing changes if any name is unknown.
    pub fn set_rules_enabled(&mut self, names: &[&str], enabled: bool) -> GrammarResult<()> {
        if let Some(missing) = names.iter().find(|n| !self.rules.contains_key(**n)) {
            return Err(GrammarError::unknown_rule(&self.name, *missing));
        }
        for name in names {
            self.set_rule_enabled(name, enabled)?;
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the grammar and, with it, every public rule.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        for rule in self.rules.values_mut().filter(|r| r.public) {
            rule.enabled = enabled;
        }
        self.bump();
    }

    /// Fully-qualified names (`gram.rule`) of the enabled public rules.
    pub fn enabled_rule_names(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|(_, r)| r.public && r.enabled)
            .map(|(name, _)| format!("{}.{}", self.name, name))
            .collect()
    }

    pub fn add_import(&mut self, import: RuleName) {
        if !self.imports.contains(&import) {
            self.imports.push(import);
            self.bump();
        }
    }

    pub fn remove_import(&mut self, import: &RuleName) -> bool {
        let before = self.imports.len();
        self.imports.retain(|i| i != import);
        let removed = self.imports.len() != before;
        if removed {
            self.bump();
        }
        removed
    }

    pub fn imports(&self) -> &[RuleName] {
        &self.imports
    }

    pub fn activation_mode(&self) -> ActivationMode {
        self.activation_mode
    }

    pub fn set_activation_mode(&mut self, mode: ActivationMode) {
        if self.activation_mode != mode {
            self.activation_mode = mode;
            self.bump();
        }
    }

    /// Activation as computed by the last commit or focus change.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Any edit since the last commit.
    pub fn changed(&self) -> bool {
        self.generation > self.committed_generation
    }

    /// Rules whose body changed since the last commit; deleted rules map to `None`.
    pub fn changed_rules(&self) -> Vec<(&str, Option<&GrammarRule>)> {
        let mut out: Vec<(&str, Option<&GrammarRule>)> = self
            .rules
            .iter()
            .filter(|(_, r)| r.modified_at > self.committed_generation)
            .map(|(name, r)| (name.as_str(), Some(r)))
            .collect();
        out.extend(
            self.tombstones
                .iter()
                .filter(|(_, at)| **at > self.committed_generation)
                .map(|(name, _)| (name.as_str(), None)),
        );
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    pub(crate) fn mark_committed(&mut self) {
        self.committed_generation = self.generation;
        self.tombstones.clear();
    }

    /// Returns true when the flag flipped.
    pub(crate) fn set_active(&mut self, active: bool) -> bool {
        let flipped = self.active != active;
        self.active = active;
        flipped
    }

    /// Swap a rule body without counting it as an edit (simplifier output).
    pub(crate) fn replace_rule_body(&mut self, name: &str, rule: Rule) {
        if let Some(entry) = self.rules.get_mut(name) {
            entry.rule = rule;
        }
    }

    /// Drop a rule without leaving a tombstone (simplifier pruning).
    pub(crate) fn prune_rule(&mut self, name: &str) {
        self.rules.remove(name);
    }

    fn lookup(&self, name: &str) -> GrammarResult<&GrammarRule> {
        self.rules.get(name).ok_or_else(|| GrammarError::unknown_rule(&self.name, name))
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

/// Copy imports, rules and their public/enabled flags from `src` into `dst`.
pub fn copy_grammar(src: &Grammar, dst: &mut Grammar) -> GrammarResult<()> {
    for import in src.imports() {
        dst.add_import(import.clone());
    }
    for (name, entry) in src.rules() {
        dst.set_rule(name, entry.rule.clone(), entry.public);
        if entry.public && dst.rules.get(name).is_some_and(|r| r.enabled != entry.enabled) {
            dst.set_rule_enabled(name, entry.enabled)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Grammar {
        let mut g = Grammar::new("commands");
        g.set_rule("cmd", alt![tok!("yes"), tok!("no")], true);
        g.set_rule("filler", tok!("um"), false);
        g
    }

    #[test]
    fn new_rules_follow_visibility() {
        let g = sample();
        assert!(g.is_rule_public("cmd").unwrap());
        assert!(g.is_rule_enabled("cmd").unwrap());
        assert!(!g.is_rule_enabled("filler").unwrap());
        assert!(matches!(g.is_rule_public("missing"), Err(GrammarError::UnknownRule { .. })));
    }

    #[test]
    fn generations_track_changes_since_commit() {
        let mut g = sample();
        assert!(g.changed());
        assert_eq!(g.changed_rules().len(), 2);

        g.mark_committed();
        assert!(!g.changed());
        assert!(g.changed_rules().is_empty());

        g.set_rule("cmd", tok!("ok"), true);
        g.delete_rule("filler").unwrap();
        let changed: Vec<(&str, bool)> = g.changed_rules().into_iter().map(|(n, r)| (n, r.is_some())).collect();
        assert_eq!(changed, vec![("cmd", true), ("filler", false)]);

        // Flag-only edits mark the grammar but no rule body.
        g.mark_committed();
        g.set_rule_enabled("cmd", false).unwrap();
        assert!(g.changed());
        assert!(g.changed_rules().is_empty());
    }

    #[test]
    fn grammar_enable_cascades_to_public_rules() {
        let mut g = sample();
        g.set_enabled(false);
        assert!(!g.is_rule_enabled("cmd").unwrap());
        assert!(g.enabled_rule_names().is_empty());
        g.set_enabled(true);
        assert_eq!(g.enabled_rule_names(), vec!["commands.cmd".to_string()]);
        assert!(!g.is_rule_enabled("filler").unwrap());
    }

    #[test]
    fn set_rules_enabled_is_all_or_nothing() {
        let mut g = sample();
        assert!(g.set_rules_enabled(&["cmd", "nope"], false).is_err());
        assert!(g.is_rule_enabled("cmd").unwrap());
    }

    #[test]
    fn copy_grammar_keeps_flags() {
        let mut src = sample();
        src.add_import(RuleName::qualified("colors", "*"));
        src.set_rule_enabled("cmd", false).unwrap();

        let mut dst = Grammar::new("copy");
        copy_grammar(&src, &mut dst).unwrap();
        assert_eq!(dst.imports(), src.imports());
        assert_eq!(dst.rule("cmd"), src.rule("cmd"));
        assert!(!dst.is_rule_enabled("cmd").unwrap());
        assert!(!dst.is_rule_public("filler").unwrap());
    }

    #[test]
    fn simplifier_edits_are_not_user_edits() {
        let mut g = sample();
        g.mark_committed();
        g.replace_rule_body("cmd", tok!("yes"));
        g.prune_rule("filler");
        assert!(!g.changed());
        assert_eq!(g.rule("cmd"), Some(&tok!("yes")));
        assert!(g.rule("filler").is_none());
    }
}
