//! Grammar sources.
//!
//! Turning a grammar *source* into rule trees is not this crate's job; it only
//! consumes what a [`SourceParser`] produces. [`SourceLocator`] maps a grammar name
//! to where its source lives. Both meet in [`SourceLoader`], which the store uses
//! to pull in imported grammars.
//!
//! [`JsonSourceParser`] reads the serde representation of rule trees:
//!
//! ```json
//! {
//!   "name": "commands",
//!   "imports": ["<colors.*>"],
//!   "rules": [
//!     {"name": "cmd", "public": true,
//!      "rule": {"sequence": [{"token": "paint"}, {"name": "<color>"}]}}
//!   ]
//! }
//! ```

use crate::error::{GrammarError, GrammarResult};
use crate::grammar::Grammar;
use crate::{Rule, RuleName};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// What a grammar-source parser hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGrammar {
    pub name: String,
    pub imports: Vec<RuleName>,
    /// `(rule name, body, public)` in declaration order.
    pub rules: Vec<(String, Rule, bool)>,
}

pub trait SourceParser: Send + Sync {
    /// `source_name` is only used in error messages.
    fn parse_source(&self, source_name: &str, reader: &mut dyn Read) -> GrammarResult<ParsedGrammar>;
}

pub trait SourceLocator: Send + Sync {
    fn locate(&self, grammar_name: &str) -> Option<PathBuf>;
}

/// `com.acme.commands` -> `<root>/com/acme/commands.<extension>`.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
    extension: String,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self { root: root.into(), extension: extension.into() }
    }

    pub fn path_for(&self, grammar_name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in grammar_name.split('.') {
            path.push(segment);
        }
        path.set_extension(&self.extension);
        path
    }
}

impl SourceLocator for DirectoryLocator {
    fn locate(&self, grammar_name: &str) -> Option<PathBuf> {
        let path = self.path_for(grammar_name);
        path.is_file().then_some(path)
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct JsonGrammar {
    name: String,
    #[serde(default)]
    imports: Vec<RuleName>,
    #[serde(default)]
    rules: Vec<JsonRule>,
}

#[derive(Debug, Deserialize, Serialize)]
struct JsonRule {
    name: String,
    #[serde(default)]
    public: bool,
    rule: Rule,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSourceParser;

impl SourceParser for JsonSourceParser {
    fn parse_source(&self, source_name: &str, reader: &mut dyn Read) -> GrammarResult<ParsedGrammar> {
        let doc: JsonGrammar =
            serde_json::from_reader(reader).map_err(|err| GrammarError::source(source_name, err))?;
        Ok(ParsedGrammar {
            name: doc.name,
            imports: doc.imports,
            rules: doc.rules.into_iter().map(|r| (r.name, r.rule, r.public)).collect(),
        })
    }
}

impl JsonSourceParser {
    /// Render a grammar in the format [`JsonSourceParser`] reads.
    pub fn to_json(grammar: &Grammar) -> GrammarResult<String> {
        let doc = JsonGrammar {
            name: grammar.name().to_string(),
            imports: grammar.imports().to_vec(),
            rules: grammar
                .rules()
                .map(|(name, entry)| JsonRule { name: name.to_string(), public: entry.public, rule: entry.rule.clone() })
                .collect(),
        };
        serde_json::to_string_pretty(&doc).map_err(|err| GrammarError::source(grammar.name(), err))
    }
}

/// Locator + parser pair.
pub struct SourceLoader {
    locator: Box<dyn SourceLocator>,
    parser: Box<dyn SourceParser>,
}

impl SourceLoader {
    pub fn new(locator: impl SourceLocator + 'static, parser: impl SourceParser + 'static) -> Self {
        Self { locator: Box::new(locator), parser: Box::new(parser) }
    }

    /// JSON sources under `root`, one `.json` file per grammar.
    pub fn json_directory(root: impl Into<PathBuf>) -> Self {
        Self::new(DirectoryLocator::new(root, "json"), JsonSourceParser)
    }

    /// Locate and parse the source of `grammar_name`.
    pub fn load(&self, grammar_name: &str) -> GrammarResult<Grammar> {
        let path = self
            .locator
            .locate(grammar_name)
            .ok_or_else(|| GrammarError::source(grammar_name, "no source found"))?;
        let grammar = self.load_path(&path)?;
        if grammar.name() != grammar_name {
            return Err(GrammarError::source(
                path.display().to_string(),
                format!("declares grammar '{}', expected '{}'", grammar.name(), grammar_name),
            ));
        }
        Ok(grammar)
    }

    pub fn load_path(&self, path: &Path) -> GrammarResult<Grammar> {
        let mut reader = BufReader::new(File::open(path)?);
        let parsed = self.parser.parse_source(&path.display().to_string(), &mut reader)?;
        log::debug!("[source] loaded grammar {} from {}", parsed.name, path.display());
        Ok(Grammar::from_parsed(parsed))
    }

    pub fn parse_reader(&self, source_name: &str, reader: &mut dyn Read) -> GrammarResult<Grammar> {
        self.parser.parse_source(source_name, reader).map(Grammar::from_parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMANDS: &str = r#"{
        "name": "commands",
        "imports": ["<colors.*>"],
        "rules": [
            {"name": "cmd", "public": true,
             "rule": {"sequence": [{"token": "paint"}, {"name": "<color>"}]}},
            {"name": "polite", "rule": {"count": {"child": {"token": "please"}, "multiplicity": "zero_or_more"}}}
        ]
    }"#;

    #[test]
    fn json_source_parses_rules_and_imports() {
        let parsed = JsonSourceParser.parse_source("commands.json", &mut COMMANDS.as_bytes()).unwrap();
        assert_eq!(parsed.name, "commands");
        assert_eq!(parsed.imports, vec![RuleName::qualified("colors", "*")]);
        assert_eq!(parsed.rules[0], ("cmd".to_string(), seq![tok!("paint"), name!("color")], true));
        assert_eq!(parsed.rules[1], ("polite".to_string(), star!(tok!("please")), false));
    }

    #[test]
    fn json_source_reports_bad_documents() {
        let err = JsonSourceParser.parse_source("broken.json", &mut "{\"name\":".as_bytes()).unwrap_err();
        assert!(matches!(err, GrammarError::Source { ref source_name, .. } if source_name == "broken.json"));
    }

    #[test]
    fn to_json_is_readable_back() {
        let loader = SourceLoader::json_directory(".");
        let grammar = loader.parse_reader("commands.json", &mut COMMANDS.as_bytes()).unwrap();
        let text = JsonSourceParser::to_json(&grammar).unwrap();
        let again = loader.parse_reader("again", &mut text.as_bytes()).unwrap();
        assert_eq!(again.rule("cmd"), grammar.rule("cmd"));
        assert_eq!(again.imports(), grammar.imports());
    }

    #[test]
    fn directory_locator_maps_packages_to_folders() {
        let dir = tempfile::tempdir().unwrap();
        let locator = DirectoryLocator::new(dir.path(), "json");
        let expected = dir.path().join("com").join("acme").join("colors.json");
        assert_eq!(locator.path_for("com.acme.colors"), expected);
        assert!(locator.locate("com.acme.colors").is_none());

        std::fs::create_dir_all(expected.parent().unwrap()).unwrap();
        std::fs::write(&expected, r#"{"name": "com.acme.colors"}"#).unwrap();
        assert_eq!(locator.locate("com.acme.colors"), Some(expected));

        let loader = SourceLoader::json_directory(dir.path());
        assert_eq!(loader.load("com.acme.colors").unwrap().name(), "com.acme.colors");
    }
}
