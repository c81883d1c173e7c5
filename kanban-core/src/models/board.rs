use serde::{Deserialize, Serialize};

use crate::store::{Document, FieldWrites, StoreResult};

/// One board per user, keyed by uid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Board {
    /// Column ids, left to right.
    pub column_order: Vec<String>,
}

impl Board {
    /// Wire name of [`Board::column_order`].
    pub const COLUMN_ORDER: &'static str = "columnOrder";

    pub fn from_document(document: &Document) -> StoreResult<Self> {
        document.decode()
    }

    /// Merge write that creates the empty board.
    pub fn default_writes() -> FieldWrites {
        FieldWrites::new().set(Self::COLUMN_ORDER, serde_json::Value::Array(Vec::new()))
    }

    /// Merge write replacing the whole column order.
    pub fn order_writes(column_order: &[String]) -> FieldWrites {
        FieldWrites::new().set(Self::COLUMN_ORDER, column_order.to_vec())
    }
}
