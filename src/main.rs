use clap::Parser;

use inwatch::cli::{self, Cli, ExitCode};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let settings = match cli::load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::GeneralError.into();
        }
    };

    inwatch::logging::init_with_config(&settings.logging);

    match cli::dispatch(cli, settings).await {
        Ok(()) => ExitCode::Success.into(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            cli::exit_code_for(&e).into()
        }
    }
}
