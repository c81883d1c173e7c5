//! View state container.
//!
//! Holds the last-known board tree. Each collection snapshot replaces its
//! own part of the tree and observers are told about every change. Nothing
//! here talks to the store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::models::{Column, Profile, Task};
use crate::subscription::{lock, Listeners, Subscription};

/// Everything the board UI renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub tasks: BTreeMap<String, Task>,
    pub columns: BTreeMap<String, Column>,
    pub column_order: Vec<String>,
    pub user: Profile,
}

/// A column with its tasks in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn<'a> {
    pub column: &'a Column,
    pub tasks: Vec<&'a Task>,
}

/// An id referenced by the board that has no document in the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OrphanReference {
    /// `columnOrder` names a column that does not exist.
    Column { column_id: String },
    /// A column's `taskIds` names a task that does not exist.
    Task { column_id: String, task_id: String },
}

impl std::fmt::Display for OrphanReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrphanReference::Column { column_id } => {
                write!(f, "column '{}' is in the column order but missing", column_id)
            }
            OrphanReference::Task { column_id, task_id } => {
                write!(f, "task '{}' in column '{}' is missing", task_id, column_id)
            }
        }
    }
}

impl BoardView {
    /// Columns in `columnOrder` with their tasks in `taskIds` order.
    /// References to missing documents are skipped.
    pub fn resolve(&self) -> Vec<ResolvedColumn<'_>> {
        self.column_order
            .iter()
            .filter_map(|id| self.columns.get(id))
            .map(|column| ResolvedColumn {
                column,
                tasks: column
                    .task_ids
                    .iter()
                    .filter_map(|id| self.tasks.get(id))
                    .collect(),
            })
            .collect()
    }

    /// References that `resolve` skips.
    pub fn orphans(&self) -> Vec<OrphanReference> {
        let mut orphans = Vec::new();
        for column_id in &self.column_order {
            match self.columns.get(column_id) {
                None => orphans.push(OrphanReference::Column {
                    column_id: column_id.clone(),
                }),
                Some(column) => {
                    for task_id in &column.task_ids {
                        if !self.tasks.contains_key(task_id) {
                            orphans.push(OrphanReference::Task {
                                column_id: column_id.clone(),
                                task_id: task_id.clone(),
                            });
                        }
                    }
                }
            }
        }
        orphans
    }

    /// Column whose `taskIds` contains `task_id`.
    pub fn column_of(&self, task_id: &str) -> Option<&Column> {
        self.columns
            .values()
            .find(|column| column.task_ids.iter().any(|id| id == task_id))
    }
}

/// Shared, observable [`BoardView`]. Clones share the same tree.
#[derive(Clone, Default)]
pub struct ViewState {
    view: Arc<Mutex<BoardView>>,
    observers: Listeners<BoardView>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current tree.
    pub fn snapshot(&self) -> BoardView {
        lock(&self.view).clone()
    }

    /// Observe the tree. The handler receives the full tree after every
    /// applied snapshot.
    pub fn subscribe(&self, handler: impl FnMut(&BoardView) + Send + 'static) -> Subscription {
        self.observers.add(handler)
    }

    pub fn apply_profile(&self, profile: Profile) {
        self.update(|view| view.user = profile);
    }

    pub fn apply_board(&self, column_order: Vec<String>) {
        self.update(|view| view.column_order = column_order);
    }

    pub fn apply_columns(&self, columns: BTreeMap<String, Column>) {
        self.update(|view| view.columns = columns);
    }

    pub fn apply_tasks(&self, tasks: BTreeMap<String, Task>) {
        self.update(|view| view.tasks = tasks);
    }

    /// Clear the tree, e.g. after sign-out.
    pub fn reset(&self) {
        self.update(|view| *view = BoardView::default());
    }

    fn update(&self, change: impl FnOnce(&mut BoardView)) {
        let view = {
            let mut view = lock(&self.view);
            change(&mut view);
            view.clone()
        };
        self.observers.emit(view);
    }
}

impl std::fmt::Debug for ViewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewState")
            .field("view", &self.snapshot())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_view() -> BoardView {
        let mut view = BoardView::default();
        let mut todo = Column::new("column-1", "Todo");
        todo.task_ids = vec!["task-2".to_string(), "task-9".to_string(), "task-1".to_string()];
        view.columns.insert(todo.id.clone(), todo);
        view.columns.insert("column-2".to_string(), Column::new("column-2", "Done"));
        view.tasks.insert("task-1".to_string(), Task::new("task-1", "one"));
        view.tasks.insert("task-2".to_string(), Task::new("task-2", "two"));
        view.column_order = vec![
            "column-2".to_string(),
            "column-7".to_string(),
            "column-1".to_string(),
        ];
        view
    }

    #[test]
    fn test_resolve_follows_order_and_skips_missing() {
        let view = sample_view();
        let resolved = view.resolve();

        let titles: Vec<&str> = resolved.iter().map(|c| c.column.title.as_str()).collect();
        assert_eq!(titles, vec!["Done", "Todo"]);
        let contents: Vec<&str> = resolved[1].tasks.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "one"]);
    }

    #[test]
    fn test_orphans() {
        let view = sample_view();
        assert_eq!(
            view.orphans(),
            vec![
                OrphanReference::Column {
                    column_id: "column-7".to_string()
                },
                OrphanReference::Task {
                    column_id: "column-1".to_string(),
                    task_id: "task-9".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_column_of() {
        let view = sample_view();
        assert_eq!(view.column_of("task-1").map(|c| c.id.as_str()), Some("column-1"));
        assert_eq!(view.column_of("task-5"), None);
    }

    #[test]
    fn test_apply_replaces_only_its_part() {
        let state = ViewState::new();
        state.apply_board(vec!["column-1".to_string()]);
        state.apply_tasks(BTreeMap::from([("task-1".to_string(), Task::new("task-1", "a"))]));
        state.apply_tasks(BTreeMap::new());

        let view = state.snapshot();
        assert_eq!(view.column_order, vec!["column-1".to_string()]);
        assert!(view.tasks.is_empty());
    }

    #[test]
    fn test_observers_receive_full_tree() {
        let state = ViewState::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _subscription = state.subscribe(move |view| {
            log.lock().unwrap().push(view.column_order.len());
        });

        state.apply_board(vec!["column-1".to_string(), "column-2".to_string()]);
        state.reset();

        assert_eq!(*seen.lock().unwrap(), vec![2, 0]);
    }
}
