//! Grammar store.
//!
//! Owns the grammars of one recognizer, keyed by name. Whether names are case
//! sensitive is decided once, at construction, and applied to every lookup.
//! Grammars are held as `Arc<Grammar>` so the simplifier and snapshots can share
//! them; editing goes through [`GrammarStore::retrieve_mut`], which clones a
//! grammar only while someone else still holds it.

use crate::engine::{CrossReferenceIndex, GrammarResolver};
use crate::error::GrammarResult;
use crate::grammar::Grammar;
use crate::source::SourceLoader;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GrammarStore {
    case_sensitive: bool,
    grammars: BTreeMap<String, Arc<Grammar>>,
}

impl GrammarStore {
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive, grammars: BTreeMap::new() }
    }

    fn key(&self, name: &str) -> String {
        if self.case_sensitive { name.to_string() } else { name.to_lowercase() }
    }

    /// Insert or replace the grammar stored under `name`.
    pub fn store(&mut self, name: &str, grammar: impl Into<Arc<Grammar>>) {
        let key = self.key(name);
        self.grammars.insert(key, grammar.into());
    }

    pub fn retrieve(&self, name: &str) -> Option<&Arc<Grammar>> {
        self.grammars.get(&self.key(name))
    }

    pub fn retrieve_mut(&mut self, name: &str) -> Option<&mut Grammar> {
        let key = self.key(name);
        self.grammars.get_mut(&key).map(Arc::make_mut)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.grammars.contains_key(&self.key(name))
    }

    pub fn delete(&mut self, name: &str) -> Option<Arc<Grammar>> {
        let key = self.key(name);
        self.grammars.remove(&key)
    }

    pub fn list_all(&self) -> Vec<Arc<Grammar>> {
        self.grammars.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.grammars.values().map(|g| g.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    pub fn clear(&mut self) {
        self.grammars.clear();
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Arc<Grammar>> {
        self.grammars.values_mut()
    }

    /// Load the grammars imported by `name` that the store does not hold yet
    /// (or all of them, with `reload`), following their own imports when
    /// `recurse` is set. Every grammar loaded is also appended to `collected`.
    ///
    /// A grammar is visited at most once per call, so import cycles terminate.
    pub fn load_imports(
        &mut self,
        name: &str,
        loader: &SourceLoader,
        recurse: bool,
        reload: bool,
        mut collected: Option<&mut Vec<Arc<Grammar>>>,
    ) -> GrammarResult<()> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(self.key(name));
        let mut pending: Vec<String> = vec![name.to_string()];

        while let Some(current) = pending.pop() {
            let Some(grammar) = self.retrieve(&current).cloned() else {
                continue;
            };
            for import in grammar.imports() {
                let Some(imported) = import.full_grammar_name() else {
                    continue;
                };
                if !visited.insert(self.key(imported)) {
                    continue;
                }
                if self.contains(imported) && !reload {
                    if recurse {
                        pending.push(imported.to_string());
                    }
                    continue;
                }
                let loaded = Arc::new(loader.load(imported)?);
                log::debug!("[store] loaded import {} of {}", imported, current);
                self.store(imported, loaded.clone());
                if let Some(out) = collected.as_mut() {
                    out.push(loaded);
                }
                if recurse {
                    pending.push(imported.to_string());
                }
            }
        }
        Ok(())
    }

    /// Rebuild the reverse cross-reference index over every stored grammar.
    pub fn build_cross_reference_index(&self) -> CrossReferenceIndex {
        CrossReferenceIndex::build(self.grammars.values().map(|g| g.as_ref()), self)
    }
}

impl GrammarResolver for GrammarStore {
    fn grammar(&self, name: &str) -> Option<&Grammar> {
        self.retrieve(name).map(|g| g.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleName;
    use crate::source::JsonSourceParser;
    use std::fs;
    use std::path::Path;

    fn write_source(dir: &Path, grammar: &Grammar) {
        fs::write(dir.join(format!("{}.json", grammar.name())), JsonSourceParser::to_json(grammar).unwrap()).unwrap();
    }

    fn with_import(name: &str, import: Option<&str>) -> Grammar {
        let mut g = Grammar::new(name);
        if let Some(import) = import {
            g.add_import(RuleName::parse(&format!("<{import}.*>")).unwrap());
        }
        g.set_rule("r", tok!(name), true);
        g
    }

    #[test]
    fn case_policy_applies_to_every_operation() {
        let mut insensitive = GrammarStore::new(false);
        insensitive.store("Commands", Grammar::new("Commands"));
        assert!(insensitive.retrieve("COMMANDS").is_some());
        assert_eq!(insensitive.names(), vec!["Commands"]);
        assert!(insensitive.delete("commands").is_some());
        assert!(insensitive.is_empty());

        let mut sensitive = GrammarStore::new(true);
        sensitive.store("Commands", Grammar::new("Commands"));
        assert!(sensitive.retrieve("commands").is_none());
        assert!(sensitive.delete("commands").is_none());
        assert_eq!(sensitive.list_all().len(), 1);
    }

    #[test]
    fn retrieve_mut_leaves_shared_copies_alone() {
        let mut store = GrammarStore::new(true);
        store.store("g", Grammar::new("g"));
        let snapshot = store.list_all();
        store.retrieve_mut("g").unwrap().set_rule("x", tok!("x"), true);
        assert!(snapshot[0].rule("x").is_none());
        assert!(store.retrieve("g").unwrap().rule("x").is_some());
    }

    #[test]
    fn load_imports_pulls_missing_grammars_recursively() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path(), &with_import("b", Some("c")));
        write_source(dir.path(), &with_import("c", Some("a")));
        let loader = SourceLoader::json_directory(dir.path());

        let mut store = GrammarStore::new(true);
        store.store("a", with_import("a", Some("b")));

        let mut shallow = store.clone();
        shallow.load_imports("a", &loader, false, false, None).unwrap();
        assert_eq!(shallow.names(), vec!["a", "b"]);

        // The a -> b -> c -> a cycle ends at the already visited root.
        let mut collected = Vec::new();
        store.load_imports("a", &loader, true, false, Some(&mut collected)).unwrap();
        assert_eq!(store.names(), vec!["a", "b", "c"]);
        let loaded: Vec<&str> = collected.iter().map(|g| g.name()).collect();
        assert_eq!(loaded, vec!["b", "c"]);
    }

    #[test]
    fn load_imports_keeps_present_grammars_unless_reloading() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path(), &with_import("b", None));
        let loader = SourceLoader::json_directory(dir.path());

        let mut store = GrammarStore::new(true);
        store.store("a", with_import("a", Some("b")));
        let mut local_b = with_import("b", None);
        local_b.set_rule("local", tok!("only here"), true);
        store.store("b", local_b);

        store.load_imports("a", &loader, true, false, None).unwrap();
        assert!(store.retrieve("b").unwrap().rule("local").is_some());

        store.load_imports("a", &loader, true, true, None).unwrap();
        assert!(store.retrieve("b").unwrap().rule("local").is_none());
    }

    #[test]
    fn missing_import_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SourceLoader::json_directory(dir.path());
        let mut store = GrammarStore::new(true);
        store.store("a", with_import("a", Some("nowhere")));
        assert!(store.load_imports("a", &loader, true, false, None).is_err());
    }

    #[test]
    fn cross_reference_index_covers_the_store() {
        let mut store = GrammarStore::new(true);
        store.store("b", with_import("b", None));
        let mut a = with_import("a", Some("b"));
        a.set_rule("uses", seq![name!("r"), name!("<b.r>")], true);
        store.store("a", a);

        let index = store.build_cross_reference_index();
        let users: Vec<&str> = index.referencing("a.r").unwrap().iter().map(String::as_str).collect();
        assert_eq!(users, vec!["a.uses"]);
        assert!(index.referencing("b.r").unwrap().contains("a.uses"));
    }
}
