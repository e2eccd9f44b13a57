pub mod commands;
pub mod config;
pub mod logging;

pub use commands::{execute, AddArgs, Command, Output};
pub use config::CliConfig;
pub use logging::init_logging;
