use clap::ValueEnum;

mod board;
mod column;
mod config_cmd;
mod profile;
mod task;

pub use board::BoardCommand;
pub use column::ColumnCommand;
pub use config_cmd::ConfigCommand;
pub use profile::ProfileCommand;
pub use task::TaskCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
