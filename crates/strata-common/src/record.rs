//! Tagged component records.
//!
//! Every swappable collaborator (provider or store) persists as a
//! `{ subclass_name, params }` pair. Re-hydration dispatches on the tag;
//! unknown tags are rejected at load time rather than silently defaulted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub subclass_name: String,
    #[serde(default)]
    pub params: Value,
}

impl ComponentRecord {
    pub fn new(subclass_name: &str, params: Value) -> Self {
        Self { subclass_name: subclass_name.to_string(), params }
    }
}
