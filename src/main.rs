mod cli;
mod column_drop;
mod config;
mod database;
mod error;
mod logging;
mod presets;
mod report;
mod row_move;
mod schema;
mod schema_diff;

use clap::Parser;
use cli::Cli;
use config::Config;
use log::{debug, error};

fn main() {
    let cli = Cli::parse();
    let config = Config::load_config(&cli.config);

    // Keep the handle alive until exit so file output is flushed
    let logger = match logging::init(&config.logging) {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("{}", err);
            None
        }
    };

    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());
    debug!("Configuration: {:?}", config);

    if let Err(err) = cli.handle_command_line(&config) {
        error!("{:?}", err);
        eprintln!("Error during migration: {}", err);
        drop(logger);
        std::process::exit(1);
    }
}
