use clap::Parser;
use log::error;
use std::process;
use syncable_iac_scan::{cli::Cli, config, run_command, runtime::output::EXIT_FAILURE};

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    cli.init_logging();

    // Load configuration
    let config = match config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            eprintln!("Error: {}", e);
            process::exit(EXIT_FAILURE);
        }
    };

    match run_command(cli.command, config) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            process::exit(EXIT_FAILURE);
        }
    }
}
