use clap::{Args, Subcommand};
use kanban_core::{DragKind, DragLocation, DragResult};

use crate::session::LocalSession;

#[derive(Args)]
pub struct ColumnCommand {
    #[command(subcommand)]
    pub command: ColumnSubcommand,
}

#[derive(Subcommand)]
pub enum ColumnSubcommand {
    /// Add a column at the end of the board
    Add {
        /// Column title
        title: String,
    },

    /// Rename a column
    Rename {
        /// Column ID (e.g. column-1)
        id: String,

        /// New title
        title: String,
    },

    /// Delete a column and every task in it
    Delete {
        /// Column ID
        id: String,
    },

    /// Move a column to a new position
    Move {
        /// Column ID
        id: String,

        /// Zero-based position; larger values move the column to the end
        index: usize,
    },
}

impl ColumnCommand {
    pub fn run(&self, session: &LocalSession) -> Result<(), Box<dyn std::error::Error>> {
        let sync = session.sync();
        match &self.command {
            ColumnSubcommand::Add { title } => {
                let id = sync.add_column(title)?;
                println!("Added column '{}' ({})", title, id);
            }
            ColumnSubcommand::Rename { id, title } => {
                sync.edit_column_title(id, title)?;
                println!("Renamed column {} to '{}'", id, title);
            }
            ColumnSubcommand::Delete { id } => {
                sync.delete_column(id)?;
                println!("Deleted column {}", id);
            }
            ColumnSubcommand::Move { id, index } => {
                let order = sync.view().snapshot().column_order;
                let current = order
                    .iter()
                    .position(|c| c == id)
                    .ok_or_else(|| format!("Column not found: {}", id))?;
                sync.on_drag_end(&DragResult {
                    kind: DragKind::Column,
                    draggable_id: id.clone(),
                    source: DragLocation::new("board", current),
                    destination: Some(DragLocation::new("board", *index)),
                })?;
                println!("Moved column {} to position {}", id, index);
            }
        }
        Ok(())
    }
}
