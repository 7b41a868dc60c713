//! # redb-backed Stage Storage
//!
//! A disk-backed stage store using the redb embedded database, providing:
//! - ACID transactions (one redb write transaction per regeneration)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (readers see a fixed snapshot while a regeneration runs)
//!
//! Catalog rows (events, stages, participants) are postcard-encoded; the
//! association rows are plain integer tables keyed by `(owner, ordinal)` so
//! that range scans return them already ordered.

use crate::store::{RosterProvider, StageReader, StageStore, StageWriter};
use crate::{
    BracketLink, Event, EventId, EventStatus, GroupId, GroupParticipant, GroupRecord, MatchId,
    MatchRecord, Participant, ParticipantId, ParticipantKind, Stage, StageError, StageId,
    StageKind, primitives::MAX_MATCH_PARTICIPANTS,
};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

/// Id counters: counter name -> next id
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// EventId -> serialized Event
const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");

/// StageId -> serialized Stage
const STAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("stages");

/// ParticipantId -> serialized Participant
const PARTICIPANTS: TableDefinition<u64, &[u8]> = TableDefinition::new("participants");

/// (EventId, enrollment sequence) -> ParticipantId
const ENROLLMENTS: TableDefinition<(u64, u64), u64> = TableDefinition::new("enrollments");

/// GroupId -> owning StageId
const GROUPS: TableDefinition<u64, u64> = TableDefinition::new("groups");

/// (StageId, GroupId) index for cascading teardown and ordered listing
const STAGE_GROUPS: TableDefinition<(u64, u64), ()> = TableDefinition::new("stage_groups");

/// (GroupId, seed) -> ParticipantId
const GROUP_PARTICIPANTS: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("group_participants");

/// MatchId -> owning GroupId
const MATCHES: TableDefinition<u64, u64> = TableDefinition::new("matches");

/// (GroupId, MatchId) index
const GROUP_MATCHES: TableDefinition<(u64, u64), ()> = TableDefinition::new("group_matches");

/// (MatchId, slot) -> ParticipantId
const MATCH_PARTICIPANTS: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("match_participants");

/// (MatchId, ParticipantId) -> score
const SCORES: TableDefinition<(u64, u64), i64> = TableDefinition::new("match_participant_scores");

/// MatchId -> next MatchId (None for the final)
const BRACKET_LINKS: TableDefinition<u64, Option<u64>> = TableDefinition::new("bracket_links");

// =============================================================================
// HELPERS
// =============================================================================

fn io_err(e: impl std::fmt::Display) -> StageError {
    StageError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StageError> {
    postcard::to_allocvec(value).map_err(|e| StageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StageError> {
    postcard::from_bytes(bytes).map_err(|e| StageError::Serialization(e.to_string()))
}

fn read_record<T, Tbl>(table: &Tbl, id: u64) -> Result<Option<T>, StageError>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id).map_err(io_err)? {
        Some(data) => decode(data.value()).map(Some),
        None => Ok(None),
    }
}

/// Second key component of every row whose first component is `prefix`.
fn prefix_keys<V, Tbl>(table: &Tbl, prefix: u64) -> Result<Vec<u64>, StageError>
where
    V: redb::Value + 'static,
    Tbl: ReadableTable<(u64, u64), V>,
{
    let mut keys = Vec::new();
    for entry in table
        .range((prefix, 0u64)..=(prefix, u64::MAX))
        .map_err(io_err)?
    {
        let (key, _) = entry.map_err(io_err)?;
        keys.push(key.value().1);
    }
    Ok(keys)
}

/// `(ordinal, id)` pairs of every row whose first key component is `prefix`.
fn prefix_entries<Tbl>(table: &Tbl, prefix: u64) -> Result<Vec<(u64, u64)>, StageError>
where
    Tbl: ReadableTable<(u64, u64), u64>,
{
    let mut entries = Vec::new();
    for entry in table
        .range((prefix, 0u64)..=(prefix, u64::MAX))
        .map_err(io_err)?
    {
        let (key, value) = entry.map_err(io_err)?;
        entries.push((key.value().1, value.value()));
    }
    Ok(entries)
}

// =============================================================================
// STORE
// =============================================================================

/// A disk-backed stage store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a stage database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StageError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables so read transactions never see a missing table.
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(META).map_err(io_err)?;
            let _ = write_txn.open_table(EVENTS).map_err(io_err)?;
            let _ = write_txn.open_table(STAGES).map_err(io_err)?;
            let _ = write_txn.open_table(PARTICIPANTS).map_err(io_err)?;
            let _ = write_txn.open_table(ENROLLMENTS).map_err(io_err)?;
            let _ = write_txn.open_table(GROUPS).map_err(io_err)?;
            let _ = write_txn.open_table(STAGE_GROUPS).map_err(io_err)?;
            let _ = write_txn.open_table(GROUP_PARTICIPANTS).map_err(io_err)?;
            let _ = write_txn.open_table(MATCHES).map_err(io_err)?;
            let _ = write_txn.open_table(GROUP_MATCHES).map_err(io_err)?;
            let _ = write_txn.open_table(MATCH_PARTICIPANTS).map_err(io_err)?;
            let _ = write_txn.open_table(SCORES).map_err(io_err)?;
            let _ = write_txn.open_table(BRACKET_LINKS).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), StageError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }
}

impl StageStore for RedbStore {
    type Snapshot<'a> = RedbSnapshot;

    fn snapshot(&self) -> Result<Self::Snapshot<'_>, StageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        Ok(RedbSnapshot { txn })
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T, StageError>
    where
        F: FnOnce(&mut dyn StageWriter) -> Result<T, StageError>,
    {
        let txn = self.db.begin_write().map_err(io_err)?;
        let result = {
            let mut writer = RedbWriter { txn: &txn };
            f(&mut writer)
        };
        match result {
            Ok(value) => {
                txn.commit().map_err(io_err)?;
                Ok(value)
            }
            Err(e) => {
                txn.abort().map_err(io_err)?;
                Err(e)
            }
        }
    }
}

// =============================================================================
// READ SIDE
// =============================================================================

/// A point-in-time view over a [`RedbStore`].
pub struct RedbSnapshot {
    txn: ReadTransaction,
}

impl std::fmt::Debug for RedbSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbSnapshot").finish_non_exhaustive()
    }
}

impl StageReader for RedbSnapshot {
    fn event(&self, id: EventId) -> Result<Option<Event>, StageError> {
        let table = self.txn.open_table(EVENTS).map_err(io_err)?;
        read_record(&table, id.0)
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>, StageError> {
        let table = self.txn.open_table(STAGES).map_err(io_err)?;
        read_record(&table, id.0)
    }

    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StageError> {
        let table = self.txn.open_table(PARTICIPANTS).map_err(io_err)?;
        read_record(&table, id.0)
    }

    fn groups_for_stage(&self, stage: StageId) -> Result<Vec<GroupRecord>, StageError> {
        let index = self.txn.open_table(STAGE_GROUPS).map_err(io_err)?;
        Ok(prefix_keys(&index, stage.0)?
            .into_iter()
            .map(|group| GroupRecord {
                id: GroupId(group),
                stage,
            })
            .collect())
    }

    fn group_participants(&self, group: GroupId) -> Result<Vec<GroupParticipant>, StageError> {
        let table = self.txn.open_table(GROUP_PARTICIPANTS).map_err(io_err)?;
        Ok(prefix_entries(&table, group.0)?
            .into_iter()
            .map(|(seed, participant)| GroupParticipant {
                group,
                participant: ParticipantId(participant),
                seed: seed as u32,
            })
            .collect())
    }

    fn matches_for_group(&self, group: GroupId) -> Result<Vec<MatchRecord>, StageError> {
        let index = self.txn.open_table(GROUP_MATCHES).map_err(io_err)?;
        let slots = self.txn.open_table(MATCH_PARTICIPANTS).map_err(io_err)?;
        let scores = self.txn.open_table(SCORES).map_err(io_err)?;

        let mut records = Vec::new();
        for match_id in prefix_keys(&index, group.0)? {
            let participants = prefix_entries(&slots, match_id)?
                .into_iter()
                .map(|(_, p)| ParticipantId(p))
                .collect();

            let mut match_scores = BTreeMap::new();
            for entry in scores
                .range((match_id, 0u64)..=(match_id, u64::MAX))
                .map_err(io_err)?
            {
                let (key, value) = entry.map_err(io_err)?;
                match_scores.insert(ParticipantId(key.value().1), value.value());
            }

            records.push(MatchRecord {
                id: MatchId(match_id),
                group,
                participants,
                scores: match_scores,
            });
        }
        Ok(records)
    }

    fn bracket_link(&self, match_id: MatchId) -> Result<Option<BracketLink>, StageError> {
        let table = self.txn.open_table(BRACKET_LINKS).map_err(io_err)?;
        let next = table.get(match_id.0).map_err(io_err)?.map(|v| v.value());
        Ok(next.map(|next| BracketLink {
            match_id,
            next: next.map(MatchId),
        }))
    }
}

impl RosterProvider for RedbSnapshot {
    fn enrolled_participants(&self, event: EventId) -> Result<Vec<ParticipantId>, StageError> {
        let table = self.txn.open_table(ENROLLMENTS).map_err(io_err)?;
        Ok(prefix_entries(&table, event.0)?
            .into_iter()
            .map(|(_, p)| ParticipantId(p))
            .collect())
    }
}

// =============================================================================
// WRITE SIDE
// =============================================================================

/// Writer bound to one open redb write transaction.
struct RedbWriter<'t> {
    txn: &'t WriteTransaction,
}

impl RedbWriter<'_> {
    fn next_id(&self, counter: &str) -> Result<u64, StageError> {
        let mut meta = self.txn.open_table(META).map_err(io_err)?;
        let id = meta.get(counter).map_err(io_err)?.map(|v| v.value()).unwrap_or(1);
        meta.insert(counter, id.saturating_add(1)).map_err(io_err)?;
        Ok(id)
    }

    fn record_exists(
        &self,
        definition: TableDefinition<'static, u64, &'static [u8]>,
        id: u64,
    ) -> Result<bool, StageError> {
        let table = self.txn.open_table(definition).map_err(io_err)?;
        Ok(table.get(id).map_err(io_err)?.is_some())
    }

    fn group_stage(&self, group: GroupId) -> Result<StageId, StageError> {
        let groups = self.txn.open_table(GROUPS).map_err(io_err)?;
        groups
            .get(group.0)
            .map_err(io_err)?
            .map(|v| StageId(v.value()))
            .ok_or_else(|| StageError::InvalidArgument(format!("group {} does not exist", group)))
    }

    fn match_exists(&self, match_id: MatchId) -> Result<bool, StageError> {
        let matches = self.txn.open_table(MATCHES).map_err(io_err)?;
        Ok(matches.get(match_id.0).map_err(io_err)?.is_some())
    }

    fn match_slots(&self, match_id: MatchId) -> Result<Vec<ParticipantId>, StageError> {
        let slots = self.txn.open_table(MATCH_PARTICIPANTS).map_err(io_err)?;
        Ok(prefix_entries(&slots, match_id.0)?
            .into_iter()
            .map(|(_, p)| ParticipantId(p))
            .collect())
    }
}

impl StageWriter for RedbWriter<'_> {
    fn delete_groups_for_stage(&mut self, stage: StageId) -> Result<usize, StageError> {
        let groups = {
            let index = self.txn.open_table(STAGE_GROUPS).map_err(io_err)?;
            prefix_keys(&index, stage.0)?
        };

        let mut matches = Vec::new();
        {
            let mut index = self.txn.open_table(GROUP_MATCHES).map_err(io_err)?;
            for group in &groups {
                for match_id in prefix_keys(&index, *group)? {
                    index.remove((*group, match_id)).map_err(io_err)?;
                    matches.push(match_id);
                }
            }
        }

        {
            let mut table = self.txn.open_table(MATCHES).map_err(io_err)?;
            for match_id in &matches {
                table.remove(*match_id).map_err(io_err)?;
            }
        }
        {
            let mut table = self.txn.open_table(MATCH_PARTICIPANTS).map_err(io_err)?;
            for match_id in &matches {
                for slot in prefix_keys(&table, *match_id)? {
                    table.remove((*match_id, slot)).map_err(io_err)?;
                }
            }
        }
        {
            let mut table = self.txn.open_table(SCORES).map_err(io_err)?;
            for match_id in &matches {
                for participant in prefix_keys(&table, *match_id)? {
                    table.remove((*match_id, participant)).map_err(io_err)?;
                }
            }
        }
        {
            let mut table = self.txn.open_table(BRACKET_LINKS).map_err(io_err)?;
            for match_id in &matches {
                table.remove(*match_id).map_err(io_err)?;
            }
        }
        {
            let mut table = self.txn.open_table(GROUP_PARTICIPANTS).map_err(io_err)?;
            for group in &groups {
                for seed in prefix_keys(&table, *group)? {
                    table.remove((*group, seed)).map_err(io_err)?;
                }
            }
        }
        {
            let mut table = self.txn.open_table(GROUPS).map_err(io_err)?;
            let mut index = self.txn.open_table(STAGE_GROUPS).map_err(io_err)?;
            for group in &groups {
                table.remove(*group).map_err(io_err)?;
                index.remove((stage.0, *group)).map_err(io_err)?;
            }
        }

        Ok(groups.len())
    }

    fn insert_group(&mut self, stage: StageId) -> Result<GroupId, StageError> {
        if !self.record_exists(STAGES, stage.0)? {
            return Err(StageError::StageNotFound(stage));
        }
        let id = self.next_id("next_group_id")?;
        {
            let mut table = self.txn.open_table(GROUPS).map_err(io_err)?;
            table.insert(id, stage.0).map_err(io_err)?;
        }
        {
            let mut index = self.txn.open_table(STAGE_GROUPS).map_err(io_err)?;
            index.insert((stage.0, id), ()).map_err(io_err)?;
        }
        Ok(GroupId(id))
    }

    fn insert_group_participant(
        &mut self,
        group: GroupId,
        participant: ParticipantId,
        seed: u32,
    ) -> Result<(), StageError> {
        let stage = self.group_stage(group)?;
        if !self.record_exists(PARTICIPANTS, participant.0)? {
            return Err(StageError::ParticipantNotFound(participant));
        }

        let stage_groups = {
            let index = self.txn.open_table(STAGE_GROUPS).map_err(io_err)?;
            prefix_keys(&index, stage.0)?
        };

        let mut table = self.txn.open_table(GROUP_PARTICIPANTS).map_err(io_err)?;
        for other in stage_groups {
            if prefix_entries(&table, other)?
                .iter()
                .any(|(_, p)| *p == participant.0)
            {
                return Err(StageError::InvalidArgument(format!(
                    "participant {} is already placed in stage {}",
                    participant, stage
                )));
            }
        }
        if table
            .get((group.0, u64::from(seed)))
            .map_err(io_err)?
            .is_some()
        {
            return Err(StageError::InvalidArgument(format!(
                "seed {} is already taken in group {}",
                seed, group
            )));
        }
        table
            .insert((group.0, u64::from(seed)), participant.0)
            .map_err(io_err)?;
        Ok(())
    }

    fn insert_match(&mut self, group: GroupId) -> Result<MatchId, StageError> {
        self.group_stage(group)?;
        let id = self.next_id("next_match_id")?;
        {
            let mut table = self.txn.open_table(MATCHES).map_err(io_err)?;
            table.insert(id, group.0).map_err(io_err)?;
        }
        {
            let mut index = self.txn.open_table(GROUP_MATCHES).map_err(io_err)?;
            index.insert((group.0, id), ()).map_err(io_err)?;
        }
        Ok(MatchId(id))
    }

    fn insert_match_participant(
        &mut self,
        match_id: MatchId,
        participant: ParticipantId,
    ) -> Result<(), StageError> {
        if !self.match_exists(match_id)? {
            return Err(StageError::MatchNotFound(match_id));
        }
        if !self.record_exists(PARTICIPANTS, participant.0)? {
            return Err(StageError::ParticipantNotFound(participant));
        }
        let slots = self.match_slots(match_id)?;
        if slots.contains(&participant) {
            return Err(StageError::InvalidArgument(format!(
                "participant {} already plays match {}",
                participant, match_id
            )));
        }
        if slots.len() >= MAX_MATCH_PARTICIPANTS {
            return Err(StageError::MatchFull(match_id));
        }
        let mut table = self.txn.open_table(MATCH_PARTICIPANTS).map_err(io_err)?;
        table
            .insert((match_id.0, slots.len() as u64), participant.0)
            .map_err(io_err)?;
        Ok(())
    }

    fn insert_bracket_link(
        &mut self,
        match_id: MatchId,
        next: Option<MatchId>,
    ) -> Result<(), StageError> {
        if !self.match_exists(match_id)? {
            return Err(StageError::MatchNotFound(match_id));
        }
        if let Some(next) = next {
            if !self.match_exists(next)? {
                return Err(StageError::MatchNotFound(next));
            }
        }
        let mut table = self.txn.open_table(BRACKET_LINKS).map_err(io_err)?;
        table
            .insert(match_id.0, next.map(|n| n.0))
            .map_err(io_err)?;
        Ok(())
    }

    fn insert_event(&mut self, name: &str) -> Result<EventId, StageError> {
        let id = EventId(self.next_id("next_event_id")?);
        let bytes = encode(&Event {
            id,
            name: name.to_string(),
            status: EventStatus::Registration,
        })?;
        let mut table = self.txn.open_table(EVENTS).map_err(io_err)?;
        table.insert(id.0, bytes.as_slice()).map_err(io_err)?;
        Ok(id)
    }

    fn set_event_status(&mut self, event: EventId, status: EventStatus) -> Result<(), StageError> {
        let mut table = self.txn.open_table(EVENTS).map_err(io_err)?;
        let mut record: Event =
            read_record(&table, event.0)?.ok_or(StageError::EventNotFound(event))?;
        record.status = status;
        let bytes = encode(&record)?;
        table.insert(event.0, bytes.as_slice()).map_err(io_err)?;
        Ok(())
    }

    fn insert_stage(
        &mut self,
        event: EventId,
        kind: StageKind,
        order: u32,
    ) -> Result<StageId, StageError> {
        if !self.record_exists(EVENTS, event.0)? {
            return Err(StageError::EventNotFound(event));
        }
        let id = StageId(self.next_id("next_stage_id")?);
        let bytes = encode(&Stage {
            id,
            event,
            kind,
            order,
        })?;
        let mut table = self.txn.open_table(STAGES).map_err(io_err)?;
        table.insert(id.0, bytes.as_slice()).map_err(io_err)?;
        Ok(id)
    }

    fn insert_participant(
        &mut self,
        kind: ParticipantKind,
        name: &str,
    ) -> Result<ParticipantId, StageError> {
        let id = ParticipantId(self.next_id("next_participant_id")?);
        let bytes = encode(&Participant {
            id,
            kind,
            name: name.to_string(),
        })?;
        let mut table = self.txn.open_table(PARTICIPANTS).map_err(io_err)?;
        table.insert(id.0, bytes.as_slice()).map_err(io_err)?;
        Ok(id)
    }

    fn enroll(&mut self, event: EventId, participant: ParticipantId) -> Result<(), StageError> {
        if !self.record_exists(EVENTS, event.0)? {
            return Err(StageError::EventNotFound(event));
        }
        if !self.record_exists(PARTICIPANTS, participant.0)? {
            return Err(StageError::ParticipantNotFound(participant));
        }
        let mut table = self.txn.open_table(ENROLLMENTS).map_err(io_err)?;
        let roster = prefix_entries(&table, event.0)?;
        if roster.iter().any(|(_, p)| *p == participant.0) {
            return Ok(());
        }
        let sequence = roster.last().map(|(seq, _)| seq + 1).unwrap_or(0);
        table
            .insert((event.0, sequence), participant.0)
            .map_err(io_err)?;
        Ok(())
    }

    fn record_score(
        &mut self,
        match_id: MatchId,
        participant: ParticipantId,
        score: i64,
    ) -> Result<(), StageError> {
        if !self.match_exists(match_id)? {
            return Err(StageError::MatchNotFound(match_id));
        }
        if !self.match_slots(match_id)?.contains(&participant) {
            return Err(StageError::InvalidArgument(format!(
                "participant {} does not play match {}",
                participant, match_id
            )));
        }
        let mut table = self.txn.open_table(SCORES).map_err(io_err)?;
        table
            .insert((match_id.0, participant.0), score)
            .map_err(io_err)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
