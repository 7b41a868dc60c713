//! # Olympiad CLI Module
//!
//! This module implements the CLI interface for Olympiad.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `event add` / `event status` - Register events and move them through their lifecycle
//! - `stage add` - Add a stage to an event
//! - `participant add` - Register a player or team
//! - `enroll` - Enroll a participant in an event
//! - `generate` - Rebuild a stage from the event roster
//! - `show` - Render a stage (standings or bracket)
//! - `score` - Record a participant's score in a match
//! - `seeding` - Print the standard bracket order for a size
//! - `compact` - Reclaim free space in a redb database

mod commands;
mod render;

use crate::config::{FileConfig, Settings};
use clap::{CommandFactory, Parser, Subcommand};
use olympiad_core::StageError;
use std::path::PathBuf;

pub use commands::*;
pub use render::{render_bracket, render_groups, render_summary};

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Olympiad - stage manager for multi-event competitions
///
/// Builds round-robin groups and seeded knockout brackets from event rosters.
#[derive(Parser, Debug)]
#[command(name = "olympiad")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the stage database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (ACID database) or "file" (snapshot file)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Path to a TOML config file (default: ./olympiad.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Manage events
    Event {
        #[command(subcommand)]
        action: EventAction,
    },

    /// Manage stages
    Stage {
        #[command(subcommand)]
        action: StageAction,
    },

    /// Manage participants
    Participant {
        #[command(subcommand)]
        action: ParticipantAction,
    },

    /// Enroll a participant in an event
    Enroll {
        /// Event ID
        event: u64,
        /// Participant ID
        participant: u64,
    },

    /// Rebuild a stage from its event roster (destroys previous structure and scores)
    Generate {
        /// Stage ID
        stage: u64,

        /// Requested group count (round-robin stages only)
        #[arg(short, long)]
        groups: Option<usize>,
    },

    /// Render a stage
    Show {
        /// Stage ID
        stage: u64,
    },

    /// Record a participant's score in a match
    Score {
        /// Match ID
        match_id: u64,
        /// Participant ID
        participant: u64,
        /// Score value
        #[arg(allow_negative_numbers = true)]
        score: i64,
    },

    /// Print the standard seeding order for a bracket size
    Seeding {
        /// Bracket size (rounded up to a power of two)
        size: usize,
    },

    /// Compact the database file (redb backend)
    Compact,
}

#[derive(Subcommand, Debug)]
pub enum EventAction {
    /// Register a new event (starts in registration)
    Add {
        /// Event name
        name: String,
    },
    /// Change an event's status: registration, running, finished
    Status {
        /// Event ID
        event: u64,
        /// New status
        status: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum StageAction {
    /// Add a stage to an event
    Add {
        /// Event ID
        event: u64,
        /// Stage kind: groups or single_elimination
        kind: String,
        /// Position among the event's stages
        #[arg(short, long, default_value = "1")]
        order: u32,
    },
}

#[derive(Subcommand, Debug)]
pub enum ParticipantAction {
    /// Register a player (or a team with --team)
    Add {
        /// Display name
        name: String,
        /// Register a team instead of a player
        #[arg(short, long)]
        team: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, file: &FileConfig) -> Result<(), StageError> {
    let settings = Settings::resolve(cli.database, cli.backend.as_deref(), cli.json_mode, file)?;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&settings, force),
        Some(Commands::Event { action }) => match action {
            EventAction::Add { name } => cmd_event_add(&settings, &name),
            EventAction::Status { event, status } => cmd_event_status(&settings, event, &status),
        },
        Some(Commands::Stage { action }) => match action {
            StageAction::Add { event, kind, order } => {
                cmd_stage_add(&settings, event, &kind, order)
            }
        },
        Some(Commands::Participant { action }) => match action {
            ParticipantAction::Add { name, team } => cmd_participant_add(&settings, &name, team),
        },
        Some(Commands::Enroll { event, participant }) => {
            cmd_enroll(&settings, event, participant)
        }
        Some(Commands::Generate { stage, groups }) => cmd_generate(&settings, stage, groups),
        Some(Commands::Show { stage }) => cmd_show(&settings, stage),
        Some(Commands::Score {
            match_id,
            participant,
            score,
        }) => cmd_score(&settings, match_id, participant, score),
        Some(Commands::Seeding { size }) => cmd_seeding(&settings, size),
        Some(Commands::Compact) => cmd_compact(&settings),
        None => Cli::command()
            .print_help()
            .map_err(|e| StageError::Storage(e.to_string())),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generate_with_groups() {
        let cli = Cli::try_parse_from(["olympiad", "-D", "x.redb", "generate", "3", "--groups", "4"])
            .expect("parse");
        assert_eq!(cli.database, Some(PathBuf::from("x.redb")));
        assert!(matches!(
            cli.command,
            Some(Commands::Generate {
                stage: 3,
                groups: Some(4)
            })
        ));
    }

    #[test]
    fn parses_compact_with_backend() {
        let cli = Cli::try_parse_from(["olympiad", "-B", "redb", "compact"]).expect("parse");
        assert_eq!(cli.backend.as_deref(), Some("redb"));
        assert!(matches!(cli.command, Some(Commands::Compact)));
    }

    #[test]
    fn parses_negative_score() {
        let cli = Cli::try_parse_from(["olympiad", "score", "1", "2", "-3"]).expect("parse");
        assert!(matches!(
            cli.command,
            Some(Commands::Score {
                match_id: 1,
                participant: 2,
                score: -3
            })
        ));
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from(["olympiad", "--json-mode", "participant", "add", "Reds", "--team"])
            .expect("parse");
        assert!(cli.json_mode);
        match cli.command {
            Some(Commands::Participant {
                action: ParticipantAction::Add { name, team },
            }) => {
                assert_eq!(name, "Reds");
                assert!(team);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
