use clap::{Args, Subcommand};
use kanban_core::{ProfileUpdate, Theme};

use super::OutputFormat;
use crate::session::LocalSession;

#[derive(Args)]
pub struct ProfileCommand {
    #[command(subcommand)]
    pub command: ProfileSubcommand,
}

#[derive(Subcommand)]
pub enum ProfileSubcommand {
    /// Show the signed-in user's profile
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update profile fields
    Set {
        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        /// Colour theme (light, dark)
        #[arg(long)]
        theme: Option<String>,
    },
}

impl ProfileCommand {
    pub fn run(&self, session: &LocalSession) -> Result<(), Box<dyn std::error::Error>> {
        let sync = session.sync();
        match &self.command {
            ProfileSubcommand::Show { format } => {
                let profile = sync.view().snapshot().user;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
                    OutputFormat::Text => println!("{}", profile),
                }
            }
            ProfileSubcommand::Set {
                first_name,
                last_name,
                theme,
            } => {
                let theme = theme
                    .as_deref()
                    .map(|t| t.parse::<Theme>())
                    .transpose()
                    .map_err(|e: String| e)?;
                let update = ProfileUpdate {
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                    theme,
                };
                if update.is_empty() {
                    return Err("Nothing to update. Pass --first-name, --last-name or --theme.".into());
                }
                sync.set_profile(&update)?;
                println!("{}", sync.view().snapshot().user);
            }
        }
        Ok(())
    }
}
