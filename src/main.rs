//! ice-serprog - serprog programmer simulator for the pico-ice
//!
//! Runs the device-side serprog engine on the host, talking TCP instead of
//! USB CDC and driving an emulated SPI NOR flash at the pin level. Useful
//! for exercising flashrom (or any other serprog client) without a board:
//!
//! ```text
//! ice-serprog serve --listen 127.0.0.1:5555 --dump flash.bin
//! flashrom -p serprog:ip=127.0.0.1:5555 -w image.bin
//! ```

mod cli;
mod error;
mod sim;
mod tcp;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Serve(args) => sim::serve(&args)?,
    }

    Ok(())
}
