//! CLI command definitions for the `dealmem` binary.
//!
//! Uses clap derive macros for argument parsing. Every command acts on the
//! memory document of a single user, chosen by config or `--user`.

pub mod deal;
pub mod extract;
pub mod flag;
pub mod memory;
pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use dealmemory_types::memory::Outcome;

/// Inspect and edit what the deal assistant remembers about an investor.
#[derive(Parser)]
#[command(name = "dealmem", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Operate on this user's memory instead of the configured one.
    #[arg(long, global = true, env = "DEALMEMORY_USER")]
    pub user: Option<String>,

    /// Also export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "DEALMEMORY_OTEL", hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize what is stored.
    Show,

    /// Print the memory block that would be added to the system prompt.
    Inject {
        /// Base prompt to prepend; without it only the memory block is printed.
        #[arg(long)]
        base: Option<String>,

        /// Deal currently under discussion, appended after the memory block.
        #[arg(long)]
        deal_context: Option<String>,
    },

    /// Print the extraction prompt for a saved conversation.
    Prompt {
        /// JSON file holding `[{"role": ..., "content": ...}]`.
        transcript: PathBuf,
    },

    /// Apply an extraction response to memory.
    Apply {
        /// File holding the model's JSON answer, or `-` for stdin.
        input: String,
    },

    /// Show the tentative signals spotted in one exchange. Nothing is stored.
    Quick {
        /// What the user said.
        user_text: String,

        /// What the assistant replied.
        assistant_text: String,
    },

    /// Manage red flags.
    Flag {
        #[command(subcommand)]
        action: FlagCommand,
    },

    /// Record a decision on a company.
    Deal {
        /// Company name (case-sensitive).
        company: String,

        /// pass, invest or watching.
        outcome: Outcome,

        /// Reason for the decision (repeatable).
        #[arg(long = "reason")]
        reasons: Vec<String>,
    },

    /// Remember a free-form fact about the investor.
    Context {
        /// The fact to remember.
        text: String,
    },

    /// Inspect or change the session counter.
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },

    /// Forget everything stored for the user.
    Reset {
        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,

        /// Also reset the session counter.
        #[arg(long)]
        full: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum FlagCommand {
    /// List red flags with their confidence.
    #[command(alias = "ls")]
    List,

    /// Delete a red flag by id.
    Remove {
        /// Red flag id (see `dealmem flag list`).
        id: String,
    },

    /// Edit a red flag by id.
    Update {
        /// Red flag id (see `dealmem flag list`).
        id: String,

        #[arg(long)]
        description: Option<String>,

        /// Number or free text such as "18mo".
        #[arg(long)]
        threshold: Option<String>,

        /// New confidence in [0, 1].
        #[arg(long)]
        confidence: Option<f64>,

        /// Mark the flag as stated by the user (`--explicit false` to undo).
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        explicit: Option<bool>,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Print the current session number.
    Show,
    /// Advance to the next session.
    Next,
    /// Start counting from 1 again.
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deal_with_reasons() {
        let cli = Cli::try_parse_from([
            "dealmem", "deal", "TechCo", "pass", "--reason", "burn rate", "--reason", "runway",
        ])
        .unwrap();
        match cli.command {
            Commands::Deal {
                company,
                outcome,
                reasons,
            } => {
                assert_eq!(company, "TechCo");
                assert_eq!(outcome, Outcome::Pass);
                assert_eq!(reasons, vec!["burn rate", "runway"]);
            }
            _ => panic!("expected deal command"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_outcome() {
        assert!(Cli::try_parse_from(["dealmem", "deal", "TechCo", "maybe"]).is_err());
    }

    #[test]
    fn test_parse_flag_update_bare_explicit() {
        let cli = Cli::try_parse_from([
            "dealmem", "flag", "update", "rf_1", "--explicit", "--confidence", "0.8",
        ])
        .unwrap();
        match cli.command {
            Commands::Flag {
                action:
                    FlagCommand::Update {
                        id,
                        explicit,
                        confidence,
                        description,
                        threshold,
                    },
            } => {
                assert_eq!(id, "rf_1");
                assert_eq!(explicit, Some(true));
                assert_eq!(confidence, Some(0.8));
                assert!(description.is_none());
                assert!(threshold.is_none());
            }
            _ => panic!("expected flag update"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["dealmem", "show", "--json", "--user", "partner_7", "-vv"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.user.as_deref(), Some("partner_7"));
        assert_eq!(cli.verbose, 2);
    }
}
