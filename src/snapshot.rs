//! Vendor snapshots: opaque binary images of grammars and results.
//!
//! The encoding is bincode over the serde representation. The only promise is
//! that reading back what was written yields an equal value.

use crate::error::RecognizerResult;
use crate::grammar::Grammar;
use crate::recognizer::RecognitionResult;
use std::io::{Read, Write};

pub fn write_grammar(writer: &mut dyn Write, grammar: &Grammar) -> RecognizerResult<()> {
    bincode::serialize_into(writer, grammar)?;
    Ok(())
}

pub fn read_grammar(reader: &mut dyn Read) -> RecognizerResult<Grammar> {
    Ok(bincode::deserialize_from(reader)?)
}

pub fn write_result(writer: &mut dyn Write, result: &RecognitionResult) -> RecognizerResult<()> {
    bincode::serialize_into(writer, result)?;
    Ok(())
}

pub fn read_result(reader: &mut dyn Read) -> RecognizerResult<RecognitionResult> {
    Ok(bincode::deserialize_from(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActivationMode, Rule, RuleName};

    #[test]
    fn grammar_snapshot_keeps_flags_and_pending_changes() {
        let mut grammar = Grammar::new("com.acme.commands");
        grammar.add_import(RuleName::parse("<colors.*>").unwrap());
        grammar.set_rule("cmd", seq![star!(tok!("please")), alt![tok!("open"), tag!(tok!("close"), "shut")]], true);
        grammar.set_rule("helper", Rule::weighted(vec![tok!("a"), Rule::null()], vec![0.5, 2.0]), false);
        grammar.set_activation_mode(ActivationMode::Global);
        grammar.delete_rule("helper").unwrap();

        let mut bytes = Vec::new();
        write_grammar(&mut bytes, &grammar).unwrap();
        let back = read_grammar(&mut bytes.as_slice()).unwrap();
        assert_eq!(back, grammar);
        assert_eq!(back.changed_rules().len(), 2);
    }

    #[test]
    fn garbage_is_a_snapshot_error() {
        let bytes = [0xffu8; 3];
        assert!(read_grammar(&mut bytes.as_slice()).is_err());
    }
}
