//! Grammar engine.
//!
//! Everything that works on rule trees lives under `src/engine/`; this module
//! only wires the parts together and keeps the public paths flat
//! (`crate::engine::RuleMatcher`, `crate::engine::simplify`, ...).
//!
//! ## How the parts work together
//!
//! ```text
//! grammar sources ──> Grammar (rule trees, flags, imports)
//!                          │
//!        ┌─────────────────┼──────────────────────────┐
//!        v                 v                          v
//!  resolve.rs          simplify.rs                xref.rs
//!  resolve_reference   NULL/VOID elimination      reverse reference
//!  link_grammar        to a fixpoint, pruning     index (derived)
//!        │                 │
//!        └──────┬──────────┘
//!               v
//!         matcher.rs  ── tokens ──> [(ParseNode, end)] ──> RuleParse
//!         (parse_tree.rs, metrics.rs)
//! ```
//!
//! The recognizer calls `link_grammar` and `simplify` while committing and the
//! matcher while interpreting an utterance. Nothing here holds shared mutable
//! state apart from the diagnostics memory in `dedup.rs`.
//!
//! ## Responsibilities by module
//!
//! - `resolve.rs`: import-aware resolution of rule names and linking.
//! - `cycles.rs`: left-recursion check run by linking.
//! - `simplify.rs`: sentinel elimination with copy-on-write grammars.
//! - `matcher.rs`: backtracking matcher over token sequences.
//! - `parse_tree.rs`: parse nodes, trees and full rule parses.
//! - `xref.rs`: reverse cross-reference index.
//! - `dedup.rs`: warn-once diagnostics.
//! - `metrics.rs`: counters and timings for verbose matching.
//!
//! ## Debugging
//!
//! All tracing goes through `log`; run with `RUST_LOG=rulegram=trace` to see
//! simplifier passes and matcher steps.

#[path = "engine/cycles.rs"]
mod cycles;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/parse_tree.rs"]
mod parse_tree;
#[path = "engine/resolve.rs"]
mod resolve;
#[path = "engine/simplify.rs"]
mod simplify;
#[path = "engine/xref.rs"]
mod xref;

pub(crate) use dedup::warn_once;
pub use matcher::RuleMatcher;
pub use metrics::{MatchMetrics, RuleMetrics};
pub use parse_tree::{ParseNode, ParseTree, RuleParse};
pub use resolve::{GrammarResolver, GrammarSet, link_grammar, resolve_reference};
pub use simplify::{simplify, simplify_with};
pub use xref::CrossReferenceIndex;
