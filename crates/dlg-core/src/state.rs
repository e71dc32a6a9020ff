use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::value::Value;

pub const SAVED_STATE_SCHEMA: &str = "dlg.save.v1";

/// The serialized snapshot of an in-flight conversation.
///
/// Node and gosub references are stable textual ids assigned at compile
/// time, never arena indices: indices shift when an edited script is
/// re-compiled, ids do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
    pub schema_version: String,
    pub current_text_node_id: String,
    pub variables: BTreeMap<String, Value>,
    pub choices_taken: BTreeSet<String>,
    pub gosub_return_stack: Vec<String>,
    /// RNG word so `[random]` branches replay deterministically after restore.
    pub random_state: u32,
}

impl SavedState {
    pub fn new(current_text_node_id: impl Into<String>) -> Self {
        Self {
            schema_version: SAVED_STATE_SCHEMA.to_string(),
            current_text_node_id: current_text_node_id.into(),
            variables: BTreeMap::new(),
            choices_taken: BTreeSet::new(),
            gosub_return_stack: Vec::new(),
            random_state: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_state_round_trips_through_json() {
        let mut state = SavedState::new("@000a@");
        state.variables.insert("Gold".to_string(), Value::Int(12));
        state.choices_taken.insert("@0003@".to_string());
        state.gosub_return_stack.push("@GS0001@".to_string());
        let json = serde_json::to_string(&state).expect("serialize");
        let back: SavedState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(state, back);
    }
}
