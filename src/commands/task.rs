use clap::{Args, Subcommand};
use kanban_core::{DragKind, DragLocation, DragResult};

use crate::session::LocalSession;

#[derive(Args)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub command: TaskSubcommand,
}

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Add a task to the end of a column
    Add {
        /// Column ID (e.g. column-1)
        column: String,
    },

    /// Change a task's content
    Edit {
        /// Task ID (e.g. task-1)
        id: String,

        /// New content
        content: String,
    },

    /// Move a task within its column or to another column
    Move {
        /// Task ID
        id: String,

        /// Destination column ID
        #[arg(long)]
        to: String,

        /// Zero-based position in the destination (defaults to the end)
        #[arg(long)]
        index: Option<usize>,
    },

    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
}

impl TaskCommand {
    pub fn run(&self, session: &LocalSession) -> Result<(), Box<dyn std::error::Error>> {
        let sync = session.sync();
        match &self.command {
            TaskSubcommand::Add { column } => {
                let id = sync.add_task(column)?;
                println!("Added task {} to column {}", id, column);
            }
            TaskSubcommand::Edit { id, content } => {
                sync.edit_task_content(id, content)?;
                println!("Updated task {}", id);
            }
            TaskSubcommand::Move { id, to, index } => {
                let view = sync.view().snapshot();
                let source = view
                    .column_of(id)
                    .ok_or_else(|| format!("Task not found: {}", id))?;
                let current = source
                    .task_ids
                    .iter()
                    .position(|t| t == id)
                    .unwrap_or_default();
                sync.on_drag_end(&DragResult {
                    kind: DragKind::Task,
                    draggable_id: id.clone(),
                    source: DragLocation::new(source.id.clone(), current),
                    destination: Some(DragLocation::new(to.clone(), index.unwrap_or(usize::MAX))),
                })?;
                println!("Moved task {} to column {}", id, to);
            }
            TaskSubcommand::Delete { id } => {
                let column_id = sync
                    .view()
                    .snapshot()
                    .column_of(id)
                    .map(|c| c.id.clone())
                    .ok_or_else(|| format!("Task not found: {}", id))?;
                sync.delete_task(&column_id, id)?;
                println!("Deleted task {}", id);
            }
        }
        Ok(())
    }
}
