use clap::{Args, Subcommand};
use std::path::Path;

use super::OutputFormat;
use crate::config::Config;

const DEFAULT_CONFIG: &str = "\
# Kanban configuration

# Directory holding the board documents (relative paths resolve against this file)
# data_dir: ~/.local/share/kanban

# Identity used by the CLI
# user:
#   uid: local
#   display_name: Your Name

# How new task and column ids are claimed: reserved or optimistic
# id_allocation: reserved

# Content of newly added tasks
# task_content: Click to edit
";

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Write a commented default config file
    Init,
}

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        config_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!("Config file: {} (not found)", config_path.display());
                        }
                        println!();

                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                        println!();

                        println!("user.uid: {}", config.user.uid.value);
                        println!("  source: {}", config.user.uid.source);
                        println!();

                        println!("user.display_name: {}", config.user.display_name.value);
                        println!("  source: {}", config.user.display_name.source);
                        println!();

                        println!("id_allocation: {}", config.id_allocation.value);
                        println!("  source: {}", config.id_allocation.source);
                        println!();

                        println!("task_content: {}", config.task_content.value);
                        println!("  source: {}", config.task_content.source);
                    }
                }
                Ok(())
            }
            ConfigSubcommand::Init => {
                if write_default_config(config_path)? {
                    println!("Wrote {}", config_path.display());
                } else {
                    println!("Config file already exists: {}", config_path.display());
                }
                Ok(())
            }
        }
    }
}

/// Write the default config unless a file is already there.
fn write_default_config(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    Ok(true)
}
