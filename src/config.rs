//! Recognizer configuration.

use serde::{Deserialize, Serialize};

/// How posted events reach listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Listeners run on a posting thread: the poster itself, or one that is
    /// already delivering earlier events.
    #[default]
    Inline,
    /// Events go through a FIFO channel to a dedicated delivery thread.
    Queued,
}

/// Engine-wide switches. Every field has a default, so a partial JSON document
/// (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// When false, grammar names are folded to lowercase for store lookups.
    pub case_sensitive_grammar_names: bool,
    /// The downstream engine understands `<NULL>`; when false, commit eliminates it first.
    pub supports_null: bool,
    /// The downstream engine understands `<VOID>`; when false, commit eliminates it first.
    pub supports_void: bool,
    /// Hand every rule of a changed grammar to the hooks, not just the modified ones.
    pub reload_all: bool,
    pub delivery: Delivery,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            case_sensitive_grammar_names: true,
            supports_null: true,
            supports_void: true,
            reload_all: false,
            delivery: Delivery::Inline,
        }
    }
}

impl RecognizerConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// True when commit must simplify grammars before handing them to the hooks.
    pub(crate) fn needs_simplification(&self) -> bool {
        !self.supports_null || !self.supports_void
    }
}
