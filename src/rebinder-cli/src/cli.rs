//! CLI argument definitions for rebinder

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rebinder", version)]
#[command(about = "Unpack binder archives into a manifest plus loose files, and repack them")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Files to unpack or directories to repack, detected automatically
    pub paths: Vec<PathBuf>,

    /// Wait for Enter before exiting if anything failed
    #[arg(long, global = true)]
    pub pause: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "REBINDER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Unpack archives next to themselves
    #[command(visible_alias = "u")]
    Unpack {
        /// Archive files (DCX-wrapped or bare)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Unpack every archive found under directory arguments
        #[arg(short, long)]
        recursive: bool,
    },

    /// Rebuild archives from unpacked directories
    #[command(visible_alias = "r")]
    Repack {
        /// Directories holding a rebinder manifest
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },

    /// Decompress DCX files or recompress them from their sidecar
    Dcx {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the legacy root table in matching order
    Roots,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_paths() {
        let cli = Cli::try_parse_from(["rebinder", "a.bnd", "b-bnd", "--pause"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.paths, vec![PathBuf::from("a.bnd"), PathBuf::from("b-bnd")]);
        assert!(cli.pause);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["rebinder", "-vv", "unpack", "-r", "mods"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Unpack { paths, recursive }) => {
                assert_eq!(paths, vec![PathBuf::from("mods")]);
                assert!(recursive);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            Cli::try_parse_from(["rebinder", "roots"]).unwrap().command,
            Some(Commands::Roots)
        ));
        assert!(Cli::try_parse_from(["rebinder", "repack"]).is_err());
    }
}
