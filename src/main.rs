mod archive;
mod backup;
mod backups;
mod cli;
mod config;
mod database;
mod dedup;
mod environment;
mod error;
mod events;
mod files;
mod hash;
mod interpreter;
mod jobs;
mod manifest;
mod restore;
mod runup_yaml;
mod schema;
mod utils;
mod version;

use clap::Parser;
use cli::Cli;
use config::{Config, CONFIG};
use directories::ProjectDirs;
use flexi_logger::Logger;
use log::{debug, error};

fn main() {
    let cli = Cli::parse();

    let config = match ProjectDirs::from("", "", "runup") {
        Some(project_dirs) => Config::load_config(&project_dirs),
        None => {
            eprintln!("Could not determine the configuration directory. Using defaults.");
            Config::default()
        }
    };

    let level = if cli.verbose {
        "debug".to_owned()
    } else {
        config.logging.runup.clone()
    };
    let _ = CONFIG.set(config);

    // RUST_LOG, when set, wins over the configured level
    let _logger = match Logger::try_with_env_or_str(&level).and_then(|logger| logger.start()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to start logger: {}", e);
            None
        }
    };

    debug!("RunUp {}", version::RUNUP_VERSION);
    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = cli.handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
