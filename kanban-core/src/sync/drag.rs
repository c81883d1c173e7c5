//! Drag-and-drop results as reported by the board UI.

/// What was dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragKind {
    Column,
    Task,
}

/// A position in a droppable list: the board's column strip or a column's
/// task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragLocation {
    /// Column id for task lists; ignored for column drags.
    pub droppable_id: String,
    pub index: usize,
}

impl DragLocation {
    pub fn new(droppable_id: impl Into<String>, index: usize) -> Self {
        Self {
            droppable_id: droppable_id.into(),
            index,
        }
    }
}

/// End of a drag gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragResult {
    pub kind: DragKind,
    pub draggable_id: String,
    pub source: DragLocation,
    /// `None` when dropped outside any list.
    pub destination: Option<DragLocation>,
}

impl DragResult {
    /// True when the drop changes nothing.
    pub fn is_noop(&self) -> bool {
        match &self.destination {
            None => true,
            Some(destination) => *destination == self.source,
        }
    }
}

/// Move `id` to `index` (clamped) within `list`, appending it if absent.
/// Other entries keep their relative order.
pub(crate) fn place(list: &mut Vec<String>, id: &str, index: usize) {
    list.retain(|existing| existing != id);
    let index = index.min(list.len());
    list.insert(index, id.to_string());
}
