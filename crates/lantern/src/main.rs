//! Lantern CLI - local dev-process supervisor

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    output::set_json_mode(cli.json);

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lantern={0},lantern_supervisor={0},lantern_db={0}", log_level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let result = match cli.command {
        Commands::Run(args) => run::execute(args).await,
        Commands::Start { names } => start::execute(names).await,
        Commands::Restart(args) => restart::execute(args).await,
        Commands::Kill { name } => kill::execute(name).await,
        Commands::KillAll => kill_all::execute().await,
        Commands::List => list::execute().await,
        Commands::ListAll => list::execute_all().await,
        Commands::Logs(args) => logs::execute(args).await,
        Commands::Watch(args) => watch::execute(args).await,
        Commands::WaitForLog(args) => wait_for_log::execute(args).await,
        Commands::ClearLogs { name } => clear_logs::execute(name).await,
        Commands::EraseDatabase => erase_database::execute().await,
        Commands::Cleanup { vacuum } => cleanup::execute(vacuum).await,
        Commands::AddService(args) => add_service::execute(args).await,
        Commands::AssignPort { port } => assign_port::execute(port).await,
    };

    if let Err(e) = result {
        output::print_error_json(&e.to_string());
        let config_error = e
            .downcast_ref::<lantern_core::Error>()
            .is_some_and(|e| e.is_config_error());
        if config_error && !output::is_json_mode() {
            eprintln!();
            eprintln!("Define services in {} next to your project, e.g.:", lantern_core::SETUP_FILE);
            eprintln!("  lantern add-service web \"npm run dev\" --default");
        }
        std::process::exit(1);
    }

    Ok(())
}
