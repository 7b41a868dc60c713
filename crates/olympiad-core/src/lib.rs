//! # olympiad-core
//!
//! The stage engine for Olympiad - THE LOGIC.
//!
//! Turns the ordered roster of an event into competition structure and reads
//! that structure back as renderable views:
//! - round-robin groups with one match per pair of group members
//! - seeded single-elimination brackets with byes, linked by parent pointers
//!
//! ## Architectural Constraints
//!
//! - Pure synchronous Rust: NO async, NO network, NO logging
//! - Deterministic: ordered maps only, integer arithmetic only
//! - Regeneration is destructive and runs as ONE store transaction
//! - Presentation never writes

// =============================================================================
// MODULES
// =============================================================================

pub mod formats;
pub mod generator;
pub mod presenter;
pub mod primitives;
pub mod seeding;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    BracketLink, Event, EventId, EventStatus, GroupId, GroupParticipant, GroupRecord, MatchId,
    MatchRecord, Participant, ParticipantId, ParticipantKind, Stage, StageError, StageId,
    StageKind,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use generator::{BracketPlan, GenerationSummary, StageGenerator, plan_bracket, plan_groups};
pub use presenter::{
    BracketStageView, GroupView, GroupsStageView, MatchView, RoundView, ScoreTable,
    StagePresenter, StageView,
};
pub use seeding::standard_seeding;
pub use store::{RosterProvider, StageReader, StageStore, StageWriter};

// =============================================================================
// RE-EXPORTS: Storage and Formats
// =============================================================================

pub use formats::{PersistenceHeader, store_from_bytes, store_to_bytes};
pub use storage::{BackendSnapshot, MemoryStore, RedbStore, StageTables, StorageBackend};
