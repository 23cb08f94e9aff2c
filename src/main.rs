//! lazy-html - Compile HTML templates on demand, as the browser asks for them.

mod cli;
mod compiler;
mod config;
mod core;
mod embed;
mod logger;
mod mapper;
mod middleware;
mod plugin;
mod templates;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::LazyHtmlConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = LazyHtmlConfig::load(&cli)?;

    match &cli.command {
        Commands::Build { watch, .. } => cli::build::build(&config, *watch),
        Commands::Serve { .. } => cli::serve::serve(&config),
    }
}
