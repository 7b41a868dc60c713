//! # Core Type Definitions
//!
//! This module contains all core types for the Olympiad stage engine:
//! - Row identifiers (`EventId`, `StageId`, `GroupId`, `MatchId`, `ParticipantId`)
//! - Catalog records (`Event`, `Stage`, `Participant`)
//! - Derived stage records (`GroupRecord`, `GroupParticipant`, `MatchRecord`, `BracketLink`)
//! - Error types (`StageError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Identifier of an event (one discipline of an olympiad).
    EventId
);
row_id!(
    /// Identifier of a stage (one phase of an event).
    StageId
);
row_id!(
    /// Identifier of a group. Ids are allocated in creation order, which drives labels.
    GroupId
);
row_id!(
    /// Identifier of a match.
    MatchId
);
row_id!(
    /// Identifier of an enrolled participant (a player or a team).
    ParticipantId
);

// =============================================================================
// CATALOG RECORDS (owned by the registration layer)
// =============================================================================

/// Lifecycle of an event. Stage structure may only be rebuilt during registration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum EventStatus {
    #[default]
    Registration,
    Running,
    Finished,
}

impl EventStatus {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Registration => "registration",
            EventStatus::Running => "running",
            EventStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registration" => Ok(EventStatus::Registration),
            "running" => Ok(EventStatus::Running),
            "finished" => Ok(EventStatus::Finished),
            other => Err(StageError::InvalidArgument(format!(
                "unknown event status '{}'",
                other
            ))),
        }
    }
}

/// An event whose enrolled participants are spread over one or more stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub status: EventStatus,
}

/// The competition format of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Round-robin groups.
    Groups,
    /// One seeded knockout bracket.
    SingleElimination,
}

impl StageKind {
    /// Stable name used in storage and on the command line.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Groups => "groups",
            StageKind::SingleElimination => "single_elimination",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "groups" => Ok(StageKind::Groups),
            "single_elimination" => Ok(StageKind::SingleElimination),
            other => Err(StageError::InvalidArgument(format!(
                "unknown stage kind '{}'",
                other
            ))),
        }
    }
}

/// One phase of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub event: EventId,
    pub kind: StageKind,
    /// Position among the event's stages.
    pub order: u32,
}

/// Whether a participant stands for a single player or a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Player,
    Team,
}

/// A participant with its resolved display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub kind: ParticipantKind,
    pub name: String,
}

// =============================================================================
// DERIVED STAGE RECORDS (owned by the generators)
// =============================================================================

/// A bucket of participants inside a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub stage: StageId,
}

/// Membership of a participant in a group.
///
/// `seed` is 0-based inside round-robin groups and 1-based inside a bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParticipant {
    pub group: GroupId,
    pub participant: ParticipantId,
    pub seed: u32,
}

/// A match with its assigned participants (at most two, in assignment order)
/// and whatever scores have been recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub group: GroupId,
    pub participants: Vec<ParticipantId>,
    pub scores: BTreeMap<ParticipantId, i64>,
}

impl MatchRecord {
    /// Score line `"s1 - s2"` in assignment order, if both sides have a score.
    #[must_use]
    pub fn score_line(&self) -> Option<String> {
        match self.participants.as_slice() {
            [a, b] => {
                let sa = self.scores.get(a)?;
                let sb = self.scores.get(b)?;
                Some(format!("{} - {}", sa, sb))
            }
            _ => None,
        }
    }
}

/// Parent pointer of a bracket match. `next == None` marks the final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketLink {
    pub match_id: MatchId,
    pub next: Option<MatchId>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the stage engine.
///
/// - No silent failures
/// - Use `Result<T, StageError>` for fallible operations
/// - The engine should never panic; all errors must be recoverable
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage does not exist.
    #[error("Stage not found: {0}")]
    StageNotFound(StageId),

    /// The stage exists but has a different format than the operation expects.
    #[error("Stage {stage} is '{actual}', expected '{expected}'")]
    WrongStageKind {
        stage: StageId,
        expected: StageKind,
        actual: StageKind,
    },

    /// The event does not exist.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// The owning event has left registration; its stages can no longer be rebuilt.
    #[error("Stage {stage} is locked: event {event} is {status}")]
    StageLocked {
        stage: StageId,
        event: EventId,
        status: EventStatus,
    },

    /// The participant does not exist.
    #[error("Participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    /// The match does not exist.
    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    /// A match already holds two participants.
    #[error("Match {0} already has two participants")]
    MatchFull(MatchId),

    /// The roster is larger than a single generation run accepts.
    #[error("Too many participants: {count} (maximum {max})")]
    TooManyParticipants { count: usize, max: usize },

    /// Persisted bracket rows violate the single-rooted-tree invariant.
    #[error("Corrupt bracket in stage {stage}: {reason}")]
    CorruptBracket { stage: StageId, reason: String },

    /// A caller-supplied value could not be interpreted.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No stage database exists at the configured location.
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// The backing store failed (I/O, constraint, transaction).
    #[error("Storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StageError {
    /// Whether the error means "the thing asked for does not exist".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StageError::StageNotFound(_)
                | StageError::WrongStageKind { .. }
                | StageError::EventNotFound(_)
                | StageError::ParticipantNotFound(_)
                | StageError::MatchNotFound(_)
                | StageError::DatabaseNotFound(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
