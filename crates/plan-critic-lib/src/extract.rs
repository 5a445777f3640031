//! Feature/label extraction shared by training and the live gate.
//!
//! The trainer and the gate must build the classifier input with the exact
//! same function; a divergence silently degrades accuracy without any error.
//! Everything here is pure and allocation-only, so it is safe to call from
//! any number of threads.

use serde_json::Value;

use crate::model::{ClarifyingStep, ConversationRecord, Label};

/// Separator between top-level feature segments.
pub const SEGMENT_SEPARATOR: &str = " | ";
/// Separator between flattened clarifying-history entries.
pub const HISTORY_SEPARATOR: &str = " || ";

/// Build the FeatureText for a record.
///
/// Segment order is fixed: instruction, function sequence, clarifying
/// history, information. Fields that are empty after trimming are omitted;
/// raw (non-object) history entries are kept exactly as logged.
pub fn feature_text(record: &ConversationRecord) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(4);

    let instruction = record.instruction.trim();
    if !instruction.is_empty() {
        parts.push(format!("Instruction: {instruction}"));
    }

    let function_sequence = record.function_sequence.trim();
    if !function_sequence.is_empty() {
        parts.push(format!("FunctionSequence: {function_sequence}"));
    }

    let history = flatten_history(&record.clarifying_history);
    if !history.is_empty() {
        parts.push(format!("ClarifyingHistory: {history}"));
    }

    let information = record.information.trim();
    if !information.is_empty() {
        parts.push(format!("Information: {information}"));
    }

    parts.join(SEGMENT_SEPARATOR)
}

/// Flatten the clarifying history into `Q: .. A: ..` segments joined by ` || `.
pub fn flatten_history(history: &[ClarifyingStep]) -> String {
    let segments: Vec<String> = history
        .iter()
        .filter_map(|step| match step {
            ClarifyingStep::Exchange { question, answer } => {
                let mut pair: Vec<String> = Vec::with_capacity(2);
                let (q, a) = (question.trim(), answer.trim());
                if !q.is_empty() {
                    pair.push(format!("Q: {q}"));
                }
                if !a.is_empty() {
                    pair.push(format!("A: {a}"));
                }
                (!pair.is_empty()).then(|| pair.join(" "))
            }
            ClarifyingStep::Raw(raw) => (!raw.is_empty()).then(|| raw.clone()),
        })
        .collect();
    segments.join(HISTORY_SEPARATOR)
}

/// Binary training label for a record.
///
/// Only `sufficient` maps to 1. Missing and unknown labels are deliberately
/// the negative class rather than dropped rows; do not turn this into an
/// error. Callers of the training path are responsible for passing vetted,
/// labeled records.
pub fn label_of(record: &ConversationRecord) -> usize {
    match record.label {
        Label::Sufficient => 1,
        Label::Insufficient | Label::Unknown => 0,
    }
}

/// Map one record to `(feature_text, label)`.
pub fn extract(record: &ConversationRecord) -> (String, usize) {
    (feature_text(record), label_of(record))
}

/// Extract straight from a raw JSON log row; malformed rows become empty fields.
pub fn extract_value(value: &Value) -> (String, usize) {
    extract(&ConversationRecord::from_value(value))
}

/// Extract a batch into parallel text and label vectors.
pub fn extract_batch(records: &[ConversationRecord]) -> (Vec<String>, Vec<usize>) {
    records.iter().map(extract).unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn full_record() -> ConversationRecord {
        ConversationRecord {
            instruction: "  Tidy the table ".into(),
            function_sequence: "<Plan>move_to(kitchen)</Plan>".into(),
            information: "room=kitchen".into(),
            clarifying_history: vec![
                ClarifyingStep::exchange("Which room?", "Kitchen"),
                ClarifyingStep::exchange("", "   "),
                ClarifyingStep::exchange("Anything else?", ""),
            ],
            label: Label::Sufficient,
        }
    }

    #[test]
    fn test_feature_text_layout() {
        let text = feature_text(&full_record());
        assert_eq!(
            text,
            "Instruction: Tidy the table | FunctionSequence: <Plan>move_to(kitchen)</Plan> | \
             ClarifyingHistory: Q: Which room? A: Kitchen || Q: Anything else? | Information: room=kitchen"
        );
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let r = ConversationRecord {
            instruction: "Bring water".into(),
            information: "   ".into(),
            ..Default::default()
        };
        assert_eq!(feature_text(&r), "Instruction: Bring water");
        assert_eq!(feature_text(&ConversationRecord::default()), "");
    }

    #[test]
    fn test_raw_history_entries_are_verbatim() {
        let r = ConversationRecord {
            clarifying_history: vec![
                ClarifyingStep::Raw(" legacy note ".into()),
                ClarifyingStep::exchange("Where?", "Hall"),
            ],
            ..Default::default()
        };
        assert_eq!(
            feature_text(&r),
            "ClarifyingHistory:  legacy note  || Q: Where? A: Hall"
        );
        let r = ConversationRecord {
            clarifying_history: vec![ClarifyingStep::Raw(String::new())],
            ..Default::default()
        };
        assert_eq!(feature_text(&r), "");
    }

    #[test]
    fn test_extract_value_degrades_gracefully() {
        assert_eq!(extract_value(&json!(null)), (String::new(), 0));
        let (text, label) = extract_value(&json!({"instruction": "Open the door", "label": 1}));
        assert_eq!(text, "Instruction: Open the door");
        assert_eq!(label, 0);
    }

    #[test]
    fn test_extract_batch_is_parallel_lists() {
        let mut neg = full_record();
        neg.label = Label::Insufficient;
        let (texts, labels) = extract_batch(&[full_record(), neg]);
        assert_eq!(texts.len(), 2);
        assert_eq!(labels, vec![1, 0]);
        assert_eq!(texts[0], texts[1]);
    }

    fn arb_label() -> impl Strategy<Value = Label> {
        prop_oneof![
            Just(Label::Sufficient),
            Just(Label::Insufficient),
            Just(Label::Unknown)
        ]
    }

    fn arb_record() -> impl Strategy<Value = ConversationRecord> {
        (
            "[ a-zA-Z]{0,12}",
            "[ a-z()<>/]{0,12}",
            "[ a-z=]{0,12}",
            proptest::collection::vec(("[ a-z?]{0,8}", "[ a-z]{0,8}"), 0..4),
            arb_label(),
        )
            .prop_map(|(instruction, function_sequence, information, steps, label)| {
                ConversationRecord {
                    instruction,
                    function_sequence,
                    information,
                    clarifying_history: steps
                        .into_iter()
                        .map(|(q, a)| ClarifyingStep::exchange(q, a))
                        .collect(),
                    label,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_extraction_is_deterministic(r in arb_record()) {
            prop_assert_eq!(extract(&r), extract(&r.clone()));
        }

        #[test]
        fn prop_label_polarity(r in arb_record()) {
            let (_, label) = extract(&r);
            prop_assert_eq!(label == 1, r.label == Label::Sufficient);
        }

        #[test]
        fn prop_field_order(
            instruction in "[a-z]{1,10}",
            function_sequence in "[a-z]{1,10}",
            information in "[a-z]{1,10}",
        ) {
            let r = ConversationRecord {
                instruction,
                function_sequence,
                information,
                ..Default::default()
            };
            let text = feature_text(&r);
            let i = text.find("Instruction: ").unwrap();
            let f = text.find("FunctionSequence: ").unwrap();
            let n = text.find("Information: ").unwrap();
            prop_assert!(i < f && f < n);
        }
    }
}
