mod cli;
mod commands;
mod config;
mod file_utils;

use anyhow::{bail, Result};
use clap::Parser;
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rebinder={level},rebinder_cli={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let roots = config.root_table();
    let pause = cli.pause || config.pause_on_error;

    let failures = match cli.command {
        Some(Commands::Unpack { paths, recursive }) => {
            commands::unpack::handle(&paths, recursive, &roots)
        }
        Some(Commands::Repack { dirs }) => commands::repack::handle(&dirs, &roots),
        Some(Commands::Dcx { paths }) => commands::dcx::handle(&paths),
        Some(Commands::Roots) => {
            commands::roots::handle(&roots);
            0
        }
        None if cli.paths.is_empty() => {
            eprintln!("Nothing to do. Pass files to unpack or directories to repack (see --help).");
            0
        }
        None => commands::auto::handle(&cli.paths, &roots),
    };

    if failures > 0 {
        if pause {
            commands::pause();
        }
        bail!("{failures} path(s) failed");
    }
    Ok(())
}
