//! # Storage Backends
//!
//! Two implementations of the stage store contract:
//! - `MemoryStore`: ordered-map arena (fast, volatile unless explicitly saved)
//! - `RedbStore`: disk-backed redb database (ACID, persistent)
//!
//! `StorageBackend` picks one at runtime.

mod memory;
mod redb_store;

pub use memory::{MemoryStore, StageTables};
pub use redb_store::{RedbSnapshot, RedbStore};

use crate::store::{RosterProvider, StageReader, StageStore, StageWriter};
use crate::{
    BracketLink, Event, EventId, GroupId, GroupParticipant, GroupRecord, MatchId, MatchRecord,
    Participant, ParticipantId, Stage, StageError, StageId,
};
use std::path::Path;

/// Storage backend chosen at runtime.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory tables (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed tables using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    /// Open or create a redb database at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, StageError> {
        Ok(Self::Persistent(RedbStore::open(path)?))
    }

    /// Returns true if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    /// The in-memory store, if that is the active backend.
    #[must_use]
    pub fn as_memory(&self) -> Option<&MemoryStore> {
        match self {
            Self::InMemory(store) => Some(store),
            Self::Persistent(_) => None,
        }
    }
}

/// Snapshot of whichever backend is active.
#[derive(Debug)]
pub enum BackendSnapshot<'a> {
    InMemory(&'a StageTables),
    Persistent(RedbSnapshot),
}

macro_rules! delegate {
    ($self:ident, $snap:ident => $call:expr) => {
        match $self {
            BackendSnapshot::InMemory($snap) => $call,
            BackendSnapshot::Persistent($snap) => $call,
        }
    };
}

impl StageReader for BackendSnapshot<'_> {
    fn event(&self, id: EventId) -> Result<Option<Event>, StageError> {
        delegate!(self, s => s.event(id))
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>, StageError> {
        delegate!(self, s => s.stage(id))
    }

    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StageError> {
        delegate!(self, s => s.participant(id))
    }

    fn groups_for_stage(&self, stage: StageId) -> Result<Vec<GroupRecord>, StageError> {
        delegate!(self, s => s.groups_for_stage(stage))
    }

    fn group_participants(&self, group: GroupId) -> Result<Vec<GroupParticipant>, StageError> {
        delegate!(self, s => s.group_participants(group))
    }

    fn matches_for_group(&self, group: GroupId) -> Result<Vec<MatchRecord>, StageError> {
        delegate!(self, s => s.matches_for_group(group))
    }

    fn bracket_link(&self, match_id: MatchId) -> Result<Option<BracketLink>, StageError> {
        delegate!(self, s => s.bracket_link(match_id))
    }
}

impl RosterProvider for BackendSnapshot<'_> {
    fn enrolled_participants(&self, event: EventId) -> Result<Vec<ParticipantId>, StageError> {
        delegate!(self, s => s.enrolled_participants(event))
    }
}

impl StageStore for StorageBackend {
    type Snapshot<'a> = BackendSnapshot<'a>;

    fn snapshot(&self) -> Result<Self::Snapshot<'_>, StageError> {
        match self {
            Self::InMemory(store) => Ok(BackendSnapshot::InMemory(store.snapshot()?)),
            Self::Persistent(store) => Ok(BackendSnapshot::Persistent(store.snapshot()?)),
        }
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T, StageError>
    where
        F: FnOnce(&mut dyn StageWriter) -> Result<T, StageError>,
    {
        match self {
            Self::InMemory(store) => store.transaction(f),
            Self::Persistent(store) => store.transaction(f),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{ParticipantKind, StageKind};
    use tempfile::tempdir;

    fn exercise(backend: &mut StorageBackend) -> (EventId, StageId) {
        backend
            .transaction(|w| {
                let event = w.insert_event("Chess")?;
                let stage = w.insert_stage(event, StageKind::SingleElimination, 1)?;
                let p = w.insert_participant(ParticipantKind::Team, "Rooks")?;
                w.enroll(event, p)?;
                Ok((event, stage))
            })
            .expect("tx")
    }

    #[test]
    fn both_backends_answer_the_same_reads() {
        let temp = tempdir().expect("temp dir");
        let mut memory = StorageBackend::default();
        let mut redb = StorageBackend::with_redb(temp.path().join("s.redb")).expect("open");
        assert!(!memory.is_persistent());
        assert!(redb.is_persistent());

        let a = exercise(&mut memory);
        let b = exercise(&mut redb);
        assert_eq!(a, b);

        let snap_a = memory.snapshot().expect("snap");
        let snap_b = redb.snapshot().expect("snap");
        assert_eq!(
            snap_a.stage(a.1).expect("stage"),
            snap_b.stage(b.1).expect("stage")
        );
        assert_eq!(
            snap_a.enrolled_participants(a.0).expect("roster"),
            snap_b.enrolled_participants(b.0).expect("roster")
        );
    }

    #[test]
    fn as_memory_only_for_in_memory() {
        let temp = tempdir().expect("temp dir");
        assert!(StorageBackend::default().as_memory().is_some());
        let redb = StorageBackend::with_redb(temp.path().join("s.redb")).expect("open");
        assert!(redb.as_memory().is_none());
    }
}
