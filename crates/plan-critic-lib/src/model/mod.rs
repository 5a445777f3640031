pub mod conversation_record;

pub use conversation_record::{ClarifyingStep, ConversationRecord, Label};
