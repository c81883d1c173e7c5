use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Document, FieldWrites, Fields, StoreResult};

/// A column of the board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Column {
    pub id: String,
    pub title: String,
    /// Task ids, top to bottom.
    pub task_ids: Vec<String>,
}

impl Column {
    /// Wire name of [`Column::task_ids`].
    pub const TASK_IDS: &'static str = "taskIds";

    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            task_ids: Vec::new(),
        }
    }

    /// Decode a column document. The id is taken from the document id.
    pub fn from_document(document: &Document) -> StoreResult<Self> {
        let mut column: Column = document.decode()?;
        column.id = document.id().to_string();
        Ok(column)
    }

    /// Document data for a new column.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), Value::from(self.id.clone()));
        fields.insert("title".to_string(), Value::from(self.title.clone()));
        fields.insert(Self::TASK_IDS.to_string(), Value::from(self.task_ids.clone()));
        fields
    }

    /// Merge write replacing the whole task list.
    pub fn task_ids_writes(task_ids: &[String]) -> FieldWrites {
        FieldWrites::new().set(Self::TASK_IDS, task_ids.to_vec())
    }

    pub fn title_writes(title: &str) -> FieldWrites {
        FieldWrites::new().set("title", title)
    }
}
