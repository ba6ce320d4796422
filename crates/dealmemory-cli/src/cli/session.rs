//! Session counter commands.

use anyhow::Result;
use console::style;

use crate::cli::SessionCommand;
use crate::state::AppState;

/// Handle a session subcommand.
pub async fn handle_session_command(
    cmd: SessionCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let (count, verb) = match cmd {
        SessionCommand::Show => (state.store.session_count().await, "Current"),
        SessionCommand::Next => (state.store.increment_session().await?, "Started"),
        SessionCommand::Reset => {
            state.store.reset_session_count().await?;
            (1, "Reset to")
        }
    };

    if json {
        let result = serde_json::json!({
            "userId": state.store.user_id(),
            "session": count,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "  {} session {}",
            verb,
            style(count).cyan().bold(),
        );
    }

    Ok(())
}
