//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const AFTER_HELP: &str = "\
Examples:
  $ inwatch watch /srv/upload --for \"create and delete\" --of files
  $ inwatch watch /var/log --for CU --dest '#ops'
  $ inwatch list --dest '#ops'
  $ inwatch run

See 'inwatch events' for the event letters.";

#[derive(Parser, Debug)]
#[command(
    name = "inwatch",
    version,
    about = "Subscribe destinations to filesystem changes",
    styles = clap_cargo_style(),
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Path to a settings file (defaults to the nearest .inwatch/settings.toml)
    #[arg(short, long, global = true, env = "INWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .inwatch/settings.toml with defaults
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Listen for events and print notifications until interrupted
    Run,

    /// Subscribe a destination to a path, creating the watch if needed
    Watch {
        path: PathBuf,

        /// Events to watch, e.g. "create and update" or "CU"
        #[arg(long = "for", default_value = "")]
        events: String,

        /// Entry type: files, dirs, or 1-3
        #[arg(long = "of", default_value = "")]
        entry_type: String,

        /// Who receives the notifications
        #[arg(short, long, default_value = "stdout")]
        dest: String,
    },

    /// Register a watch without subscribing anyone
    AddWatch {
        path: PathBuf,

        /// Events to watch, e.g. "create and update" or "CU"
        #[arg(long = "for", default_value = "")]
        events: String,

        /// Entry type: files, dirs, or 1-3
        #[arg(long = "of", default_value = "")]
        entry_type: String,
    },

    /// Unsubscribe a destination from a path
    #[command(visible_alias = "rmwatch")]
    Unwatch {
        path: PathBuf,

        #[arg(short, long, default_value = "stdout")]
        dest: String,
    },

    /// Remove a watch and all of its subscriptions
    #[command(visible_aliases = ["rm", "delete"])]
    Remove { path: PathBuf },

    /// List watches, marking those the destination is subscribed to
    #[command(visible_alias = "show")]
    List {
        #[arg(short, long)]
        dest: Option<String>,
    },

    /// Show who is subscribed to a path
    WhoWatches { path: PathBuf },

    /// List the events that can be watched
    Events,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_flags() {
        let cli = Cli::parse_from([
            "inwatch", "watch", "/tmp", "--for", "create and update", "--of", "dirs", "-d", "#ops",
        ]);
        match cli.command {
            Commands::Watch {
                path,
                events,
                entry_type,
                dest,
            } => {
                assert_eq!(path, PathBuf::from("/tmp"));
                assert_eq!(events, "create and update");
                assert_eq!(entry_type, "dirs");
                assert_eq!(dest, "#ops");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_remove_aliases() {
        for alias in ["remove", "rm", "delete"] {
            let cli = Cli::parse_from(["inwatch", alias, "/tmp"]);
            assert!(matches!(cli.command, Commands::Remove { .. }));
        }
    }
}
