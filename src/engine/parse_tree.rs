//! Parse trees produced by the matcher.

use crate::RuleName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured result of matching tokens against a rule. Mirrors the matched part
/// of the rule tree: a sequence node per matched sequence, a tag node per matched
/// tag, a rule node per followed reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseNode {
    /// Matched nothing (`<NULL>`, a skipped optional, an unused repetition).
    Empty,
    /// A grammar token and the input words it consumed. `words` is empty for the
    /// zero-word branch of a `*` wildcard.
    Token { text: String, words: Vec<String> },
    Sequence(Vec<ParseNode>),
    Tag { label: String, child: Box<ParseNode> },
    /// A followed reference, fully qualified.
    Rule { name: RuleName, child: Box<ParseNode> },
}

impl ParseNode {
    pub fn is_empty(&self) -> bool {
        matches!(self, ParseNode::Empty)
    }

    /// Input words consumed, in order.
    pub fn tokens(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_tokens(&mut out);
        out
    }

    fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ParseNode::Empty => {}
            ParseNode::Token { words, .. } => out.extend(words.iter().map(String::as_str)),
            ParseNode::Sequence(items) => items.iter().for_each(|item| item.collect_tokens(out)),
            ParseNode::Tag { child, .. } | ParseNode::Rule { child, .. } => child.collect_tokens(out),
        }
    }

    /// Tag labels on the path, inner tags before the tags enclosing them.
    pub fn tags(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_tags(&mut out);
        out
    }

    fn collect_tags<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ParseNode::Empty | ParseNode::Token { .. } => {}
            ParseNode::Sequence(items) => items.iter().for_each(|item| item.collect_tags(out)),
            ParseNode::Tag { label, child } => {
                child.collect_tags(out);
                out.push(label);
            }
            ParseNode::Rule { child, .. } => child.collect_tags(out),
        }
    }
}

impl fmt::Display for ParseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseNode::Empty => write!(f, "<NULL>"),
            ParseNode::Token { words, .. } if words.is_empty() => write!(f, "()"),
            ParseNode::Token { words, .. } => write!(f, "{}", words.join(" ")),
            ParseNode::Sequence(items) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            ParseNode::Tag { label, child } => write!(f, "{} {{{}}}", child, label),
            ParseNode::Rule { name, child } => write!(f, "{}[{}]", name, child),
        }
    }
}

/// A parse tree together with the position it ends at.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseTree {
    pub node: ParseNode,
    pub end: usize,
}

impl ParseTree {
    pub fn tags(&self) -> Vec<&str> {
        self.node.tags()
    }
}

/// A full parse of an utterance by one rule of one grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleParse {
    pub grammar: String,
    /// Simple name of the matched rule.
    pub rule_name: String,
    pub tree: ParseNode,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(w: &str) -> ParseNode {
        ParseNode::Token { text: w.to_string(), words: vec![w.to_string()] }
    }

    #[test]
    fn tokens_and_tags_follow_tree_order() {
        let tree = ParseNode::Sequence(vec![
            ParseNode::Tag {
                label: "outer".into(),
                child: Box::new(ParseNode::Sequence(vec![
                    ParseNode::Tag { label: "inner".into(), child: Box::new(word("turn")) },
                    word("on"),
                ])),
            },
            ParseNode::Rule { name: RuleName::qualified("g", "thing"), child: Box::new(word("lights")) },
            ParseNode::Token { text: "*".into(), words: vec![] },
        ]);
        assert_eq!(tree.tokens(), vec!["turn", "on", "lights"]);
        assert_eq!(tree.tags(), vec!["inner", "outer"]);
        assert_eq!(tree.to_string(), "((turn {inner} on) {outer} <g.thing>[lights] ())");
    }
}
