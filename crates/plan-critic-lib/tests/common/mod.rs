#![allow(dead_code)]

use plan_critic::{ClarifyingStep, ConversationRecord, Label};

const OBJECTS: [&str; 5] = ["table", "desk", "shelf", "counter", "sofa"];
const ROOMS: [&str; 5] = ["kitchen", "hall", "bedroom", "office", "garage"];

/// The insufficient shape: a bare instruction, nothing gathered yet.
pub fn insufficient(i: usize) -> ConversationRecord {
    let obj = OBJECTS[i % OBJECTS.len()];
    let mut record = ConversationRecord {
        instruction: format!("Tidy the {obj}"),
        label: Label::Insufficient,
        ..Default::default()
    };
    if i % 4 == 1 {
        record.instruction = format!("Please tidy the {obj} now");
    }
    record
}

/// The sufficient shape: a plan, an answered question and gathered information.
pub fn sufficient(i: usize) -> ConversationRecord {
    if i % 2 == 0 {
        return live_record();
    }
    let obj = OBJECTS[i % OBJECTS.len()];
    let room = ROOMS[(i / 2) % ROOMS.len()];
    ConversationRecord {
        instruction: format!("Tidy the {obj}"),
        function_sequence: format!("<Plan>move_to({room}) tidy({obj})</Plan>"),
        clarifying_history: vec![ClarifyingStep::exchange("Which room?", room)],
        information: format!("room={room}"),
        label: Label::Sufficient,
    }
}

/// A finished dialogue exactly as the planner logs it.
pub fn live_record() -> ConversationRecord {
    ConversationRecord {
        instruction: "Tidy the table".into(),
        function_sequence: "<Plan>...</Plan>".into(),
        clarifying_history: vec![ClarifyingStep::exchange("Which room?", "Kitchen")],
        information: "room=kitchen".into(),
        label: Label::Sufficient,
    }
}

pub fn pool(n_sufficient: usize, n_insufficient: usize) -> Vec<ConversationRecord> {
    (0..n_sufficient)
        .map(sufficient)
        .chain((0..n_insufficient).map(insufficient))
        .collect()
}
