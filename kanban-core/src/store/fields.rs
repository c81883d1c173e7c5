//! Field-level writes applied to document data.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Document data: a JSON object.
pub type Fields = Map<String, Value>;

/// A write to a single top-level field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Replace the field with this value.
    Value(Value),
    /// Append each value not already present (set-union).
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value.
    ArrayRemove(Vec<Value>),
    /// Remove the field.
    Delete,
}

/// Set of field writes for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldWrites(BTreeMap<String, FieldValue>);

impl FieldWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field to a value.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), FieldValue::Value(value.into()));
        self
    }

    /// Union a value into an array field.
    pub fn array_union(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0
            .insert(field.into(), FieldValue::ArrayUnion(vec![value.into()]));
        self
    }

    /// Remove a value from an array field.
    pub fn array_remove(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0
            .insert(field.into(), FieldValue::ArrayRemove(vec![value.into()]));
        self
    }

    /// Delete a field.
    pub fn delete(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), FieldValue::Delete);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Apply the writes on top of existing data (merge semantics).
    pub fn merge_into(&self, data: &mut Fields) {
        for (field, write) in &self.0 {
            match write {
                FieldValue::Value(value) => {
                    data.insert(field.clone(), value.clone());
                }
                FieldValue::ArrayUnion(values) => {
                    let array = array_field(data, field);
                    for value in values {
                        if !array.contains(value) {
                            array.push(value.clone());
                        }
                    }
                }
                FieldValue::ArrayRemove(values) => {
                    let array = array_field(data, field);
                    array.retain(|existing| !values.contains(existing));
                }
                FieldValue::Delete => {
                    data.remove(field);
                }
            }
        }
    }

    /// Build fresh data from the writes alone (replace semantics).
    pub fn to_fields(&self) -> Fields {
        let mut data = Fields::new();
        self.merge_into(&mut data);
        data
    }
}

impl From<Fields> for FieldWrites {
    fn from(fields: Fields) -> Self {
        Self(
            fields
                .into_iter()
                .map(|(field, value)| (field, FieldValue::Value(value)))
                .collect(),
        )
    }
}

/// Array stored at `field`, replacing a missing or non-array value with `[]`.
fn array_field<'a>(data: &'a mut Fields, field: &str) -> &'a mut Vec<Value> {
    let entry = data
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    match entry {
        Value::Array(array) => array,
        _ => unreachable!("field was just set to an array"),
    }
}
