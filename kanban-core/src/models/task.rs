use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Document, FieldWrites, Fields, StoreResult};

/// A card on the board. Its position is its index in a column's `taskIds`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: String,
    pub content: String,
}

impl Task {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    /// Decode a task document. The id is taken from the document id.
    pub fn from_document(document: &Document) -> StoreResult<Self> {
        let mut task: Task = document.decode()?;
        task.id = document.id().to_string();
        Ok(task)
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), Value::from(self.id.clone()));
        fields.insert("content".to_string(), Value::from(self.content.clone()));
        fields
    }

    pub fn content_writes(content: &str) -> FieldWrites {
        FieldWrites::new().set("content", content)
    }
}
