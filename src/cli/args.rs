//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Lazy HTML template compiler and dev server
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path, searched upward from the current directory
    #[arg(short = 'C', long, global = true, default_value = "lazy-html.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile every template
    #[command(visible_alias = "b")]
    Build {
        /// Rebuild when templates change
        #[arg(short, long)]
        watch: bool,

        /// Enable verbose output for debugging
        #[arg(short = 'V', long)]
        verbose: bool,
    },

    /// Start the dev server, compiling templates as they are requested
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable verbose output for debugging
        #[arg(short = 'V', long)]
        verbose: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build() {
        let cli = Cli::parse_from(["lazy-html", "build", "--watch", "-V"]);
        assert!(matches!(
            cli.command,
            Commands::Build {
                watch: true,
                verbose: true
            }
        ));
        assert_eq!(cli.config, PathBuf::from("lazy-html.toml"));
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from([
            "lazy-html",
            "--color",
            "never",
            "serve",
            "-i",
            "0.0.0.0",
            "-p",
            "8080",
            "-C",
            "site.toml",
        ]);
        let Commands::Serve {
            interface, port, ..
        } = cli.command
        else {
            panic!("expected serve");
        };
        assert_eq!(interface, Some("0.0.0.0".parse().unwrap()));
        assert_eq!(port, Some(8080));
        assert_eq!(cli.color, ColorChoice::Never);
        assert_eq!(cli.config, PathBuf::from("site.toml"));
    }
}
