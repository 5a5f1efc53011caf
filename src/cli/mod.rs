//! Command-line interface for the watch manager.
//!
//! Provides argument parsing, command dispatch and exit codes.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

use crate::config::Settings;
use crate::watch::WatchError;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    /// Internal or system failure
    GeneralError = 1,
    /// The request itself was wrong (bad path, unknown watch)
    UserError = 2,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

/// Whether the error chain carries a [`WatchError`] the user can fix.
pub fn is_user_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<WatchError>())
        .is_some_and(WatchError::is_user_correctable)
}

pub fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    if is_user_error(error) {
        ExitCode::UserError
    } else {
        ExitCode::GeneralError
    }
}

/// Load settings from `--config` or the nearest workspace.
pub fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    settings.map_err(|e| anyhow::anyhow!("configuration error: {e}"))
}

/// Run the parsed command to completion.
pub async fn dispatch(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    use commands::{init, run, watches};

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(&settings),
        Commands::Run => run::run(&settings).await,
        Commands::Watch {
            path,
            events,
            entry_type,
            dest,
        } => watches::run_watch(&settings, &path, &events, &entry_type, &dest),
        Commands::AddWatch {
            path,
            events,
            entry_type,
        } => watches::run_add_watch(&settings, &path, &events, &entry_type),
        Commands::Unwatch { path, dest } => watches::run_unwatch(&settings, &path, &dest),
        Commands::Remove { path } => watches::run_remove(&settings, &path),
        Commands::List { dest } => watches::run_list(&settings, dest.as_deref()),
        Commands::WhoWatches { path } => watches::run_who_watches(&settings, &path),
        Commands::Events => {
            watches::run_events();
            Ok(())
        }
    }
}
