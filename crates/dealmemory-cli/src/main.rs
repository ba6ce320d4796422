//! dealmemory CLI entry point.
//!
//! Binary name: `dealmem`
//!
//! Parses CLI arguments, opens the memory store for the selected user, then
//! dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,dealmemory=debug",
        _ => "trace",
    };
    dealmemory_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "dealmem", &mut std::io::stdout());
        return Ok(());
    }

    // Quick scans never touch storage
    if let Commands::Quick {
        user_text,
        assistant_text,
    } = &cli.command
    {
        return cli::extract::quick(user_text, assistant_text, cli.json);
    }

    let state = AppState::init(cli.user.clone()).await?;
    let json = cli.json;

    let result = match cli.command {
        Commands::Show => cli::memory::show(&state, json).await,
        Commands::Inject { base, deal_context } => {
            cli::memory::inject(&state, base.as_deref(), deal_context.as_deref(), json).await
        }
        Commands::Prompt { transcript } => cli::extract::prompt(&state, &transcript, json).await,
        Commands::Apply { input } => cli::extract::apply(&state, &input, json).await,
        Commands::Flag { action } => cli::flag::handle_flag_command(action, &state, json).await,
        Commands::Deal {
            company,
            outcome,
            reasons,
        } => cli::deal::record_deal(&state, &company, outcome, reasons, json).await,
        Commands::Context { text } => cli::deal::add_context(&state, &text, json).await,
        Commands::Session { action } => {
            cli::session::handle_session_command(action, &state, json).await
        }
        Commands::Reset { force, full } => cli::memory::reset(&state, force, full, json).await,
        Commands::Completions { .. } | Commands::Quick { .. } => Ok(()),
    };

    dealmemory_observe::tracing_setup::shutdown_tracing();
    result
}
