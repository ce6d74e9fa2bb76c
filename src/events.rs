use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]

pub enum StateEvent {
    Selection { term: Option<String>, style: String },
    Loading { cycle_id: String, term: Option<String>, style: String },
    Ready { cycle_id: String, prompt: String, model: String },
    Failed { cycle_id: String, error: String, code: String },
}
