use clap::{Args, Subcommand};
use kanban_core::BoardView;

use super::OutputFormat;
use crate::session::LocalSession;

#[derive(Args)]
pub struct BoardCommand {
    #[command(subcommand)]
    pub command: BoardSubcommand,
}

#[derive(Subcommand)]
pub enum BoardSubcommand {
    /// Show the board with its columns and tasks
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl BoardCommand {
    pub fn run(&self, session: &LocalSession) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            BoardSubcommand::Show { format } => {
                let view = session.sync().view().snapshot();
                for orphan in view.orphans() {
                    tracing::warn!("Skipping dangling reference: {}", orphan);
                }
                match format {
                    OutputFormat::Json => {
                        let output = serde_json::json!({
                            "user": view.user,
                            "columns": view.resolve(),
                            "orphans": view.orphans(),
                        });
                        println!("{}", serde_json::to_string_pretty(&output)?);
                    }
                    OutputFormat::Text => print!("{}", render_board(&view)),
                }
                Ok(())
            }
        }
    }
}

fn render_board(view: &BoardView) -> String {
    let mut out = String::new();
    let name = format!("{} {}", view.user.first_name, view.user.last_name);
    out.push_str(&format!("Board of {}\n", name.trim()));
    out.push_str(&"=".repeat(40));
    out.push('\n');

    let columns = view.resolve();
    if columns.is_empty() {
        out.push_str("\nNo columns yet. Add one with `kanban column add <title>`.\n");
        return out;
    }

    for resolved in columns {
        out.push_str(&format!(
            "\n{} [{}] ({} tasks)\n",
            resolved.column.title,
            resolved.column.id,
            resolved.tasks.len()
        ));
        for task in resolved.tasks {
            out.push_str(&format!("  - {}: {}\n", task.id, task.content));
        }
    }
    out
}
