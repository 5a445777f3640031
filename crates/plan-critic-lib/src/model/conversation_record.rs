// Typed view of one logged planner dialogue snapshot.
// Raw log rows are loose JSON objects; they are converted here once, at the
// serialization boundary, and everything downstream works on the typed record.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ground-truth label attached to a training record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Sufficient,
    Insufficient,
    #[default]
    Unknown,
}

impl Label {
    /// Parse a raw label string. Only the exact string `"sufficient"` is positive.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "sufficient" => Label::Sufficient,
            "insufficient" => Label::Insufficient,
            _ => Label::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Sufficient => "sufficient",
            Label::Insufficient => "insufficient",
            Label::Unknown => "unknown",
        }
    }
}

/// One entry of the clarifying history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClarifyingStep {
    /// A robot question and the user's answer; either side may be empty.
    Exchange { question: String, answer: String },
    /// A history entry that was logged as something other than a question/answer object.
    Raw(String),
}

impl ClarifyingStep {
    pub fn exchange(question: impl Into<String>, answer: impl Into<String>) -> Self {
        ClarifyingStep::Exchange {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Snapshot of a finished or in-progress dialogue.
///
/// `instruction` is fixed at conversation start, `function_sequence` and
/// `information` are overwritten every turn, and `clarifying_history` is
/// append-only in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub function_sequence: String,
    #[serde(default)]
    pub information: String,
    #[serde(default)]
    pub clarifying_history: Vec<ClarifyingStep>,
    #[serde(default)]
    pub label: Label,
}

const QUESTION_KEYS: [&str; 3] = ["clarifying_question", "question", "llm_question"];
const ANSWER_KEYS: [&str; 3] = ["chat_input", "user_answer", "answer"];

impl ConversationRecord {
    /// Convert an arbitrary JSON value into a record without ever failing.
    ///
    /// Non-object values yield an empty record and missing or non-string
    /// fields become empty strings, so one malformed row cannot abort a
    /// training run or a live decision.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return ConversationRecord::default();
        };
        let text = |key: &str| obj.get(key).and_then(Value::as_str).unwrap_or("").to_string();

        let clarifying_history = match obj.get("clarifying_history") {
            Some(Value::Array(steps)) => steps.iter().filter_map(step_from_value).collect(),
            _ => Vec::new(),
        };

        ConversationRecord {
            instruction: text("instruction"),
            function_sequence: text("function_sequence"),
            information: text("information"),
            clarifying_history,
            label: obj
                .get("label")
                .and_then(Value::as_str)
                .map(Label::parse)
                .unwrap_or_default(),
        }
    }

    /// Whether the latest turn already carried a plan.
    pub fn has_plan(&self) -> bool {
        !self.function_sequence.trim().is_empty()
    }
}

// First non-empty string among the candidate keys, mirroring how older logs
// named the same field differently.
fn first_text(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string()
}

// Non-object entries are kept when truthy: null, false, zero, "" and [] are
// dropped, `true` renders as `True`, strings are kept untrimmed.
fn step_from_value(value: &Value) -> Option<ClarifyingStep> {
    match value {
        Value::Object(obj) => Some(ClarifyingStep::Exchange {
            question: first_text(obj, &QUESTION_KEYS),
            answer: first_text(obj, &ANSWER_KEYS),
        }),
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(ClarifyingStep::Raw("True".to_string())),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(a) if a.is_empty() => None,
        Value::String(s) => Some(ClarifyingStep::Raw(s.clone())),
        other => Some(ClarifyingStep::Raw(other.to_string())),
    }
}
