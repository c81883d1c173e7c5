//! Atomic write batches.

use crate::path::DocumentRef;

use super::fields::{FieldWrites, Fields};
use super::WriteMode;

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        doc: DocumentRef,
        writes: FieldWrites,
        mode: WriteMode,
    },
    Create {
        doc: DocumentRef,
        data: Fields,
    },
    Update {
        doc: DocumentRef,
        writes: FieldWrites,
    },
    Delete {
        doc: DocumentRef,
    },
}

impl WriteOp {
    /// Document targeted by this write.
    pub fn doc(&self) -> &DocumentRef {
        match self {
            WriteOp::Set { doc, .. }
            | WriteOp::Create { doc, .. }
            | WriteOp::Update { doc, .. }
            | WriteOp::Delete { doc } => doc,
        }
    }
}

/// Writes committed together: all are applied or none is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, doc: DocumentRef, writes: FieldWrites, mode: WriteMode) -> &mut Self {
        self.ops.push(WriteOp::Set { doc, writes, mode });
        self
    }

    pub fn create(&mut self, doc: DocumentRef, data: Fields) -> &mut Self {
        self.ops.push(WriteOp::Create { doc, data });
        self
    }

    pub fn update(&mut self, doc: DocumentRef, writes: FieldWrites) -> &mut Self {
        self.ops.push(WriteOp::Update { doc, writes });
        self
    }

    pub fn delete(&mut self, doc: DocumentRef) -> &mut Self {
        self.ops.push(WriteOp::Delete { doc });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

impl From<WriteOp> for WriteBatch {
    fn from(op: WriteOp) -> Self {
        Self { ops: vec![op] }
    }
}
