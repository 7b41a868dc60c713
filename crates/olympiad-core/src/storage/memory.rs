//! # In-Memory Stage Storage
//!
//! An arena of ordered maps keyed by row id. A transaction runs against a
//! copy of the tables and replaces the live tables only on success, so a
//! failed regeneration leaves the previous structure untouched.

use crate::store::{RosterProvider, StageReader, StageStore, StageWriter};
use crate::{
    BracketLink, Event, EventId, EventStatus, GroupId, GroupParticipant, GroupRecord, MatchId,
    MatchRecord, Participant, ParticipantId, ParticipantKind, Stage, StageError, StageId,
    StageKind, primitives::MAX_MATCH_PARTICIPANTS,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-table id counters. Ids start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct IdCounters {
    event: u64,
    stage: u64,
    participant: u64,
    group: u64,
    match_: u64,
}

impl Default for IdCounters {
    fn default() -> Self {
        Self {
            event: 1,
            stage: 1,
            participant: 1,
            group: 1,
            match_: 1,
        }
    }
}

fn take(counter: &mut u64) -> u64 {
    let id = *counter;
    *counter = counter.saturating_add(1);
    id
}

/// All rows held by a [`MemoryStore`].
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTables {
    events: BTreeMap<EventId, Event>,
    stages: BTreeMap<StageId, Stage>,
    participants: BTreeMap<ParticipantId, Participant>,
    /// Event -> participants in enrollment order.
    enrollments: BTreeMap<EventId, Vec<ParticipantId>>,
    /// Group -> owning stage.
    groups: BTreeMap<GroupId, StageId>,
    /// Group -> seed -> participant.
    group_participants: BTreeMap<GroupId, BTreeMap<u32, ParticipantId>>,
    /// Match -> owning group.
    matches: BTreeMap<MatchId, GroupId>,
    /// Match -> participants in assignment order.
    match_participants: BTreeMap<MatchId, Vec<ParticipantId>>,
    scores: BTreeMap<MatchId, BTreeMap<ParticipantId, i64>>,
    bracket_links: BTreeMap<MatchId, Option<MatchId>>,
    ids: IdCounters,
}

impl StageTables {
    fn stage_of_group(&self, group: GroupId) -> Result<StageId, StageError> {
        self.groups.get(&group).copied().ok_or_else(|| {
            StageError::InvalidArgument(format!("group {} does not exist", group))
        })
    }

    /// Total number of match rows (all stages).
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Total number of group rows (all stages).
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

// =============================================================================
// READ SIDE
// =============================================================================

impl StageReader for StageTables {
    fn event(&self, id: EventId) -> Result<Option<Event>, StageError> {
        Ok(self.events.get(&id).cloned())
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>, StageError> {
        Ok(self.stages.get(&id).cloned())
    }

    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StageError> {
        Ok(self.participants.get(&id).cloned())
    }

    fn groups_for_stage(&self, stage: StageId) -> Result<Vec<GroupRecord>, StageError> {
        Ok(self
            .groups
            .iter()
            .filter(|(_, owner)| **owner == stage)
            .map(|(id, owner)| GroupRecord {
                id: *id,
                stage: *owner,
            })
            .collect())
    }

    fn group_participants(&self, group: GroupId) -> Result<Vec<GroupParticipant>, StageError> {
        Ok(self
            .group_participants
            .get(&group)
            .into_iter()
            .flat_map(|members| {
                members.iter().map(move |(seed, participant)| GroupParticipant {
                    group,
                    participant: *participant,
                    seed: *seed,
                })
            })
            .collect())
    }

    fn matches_for_group(&self, group: GroupId) -> Result<Vec<MatchRecord>, StageError> {
        Ok(self
            .matches
            .iter()
            .filter(|(_, owner)| **owner == group)
            .map(|(id, _)| MatchRecord {
                id: *id,
                group,
                participants: self.match_participants.get(id).cloned().unwrap_or_default(),
                scores: self.scores.get(id).cloned().unwrap_or_default(),
            })
            .collect())
    }

    fn bracket_link(&self, match_id: MatchId) -> Result<Option<BracketLink>, StageError> {
        Ok(self
            .bracket_links
            .get(&match_id)
            .map(|next| BracketLink {
                match_id,
                next: *next,
            }))
    }
}

impl RosterProvider for StageTables {
    fn enrolled_participants(&self, event: EventId) -> Result<Vec<ParticipantId>, StageError> {
        Ok(self.enrollments.get(&event).cloned().unwrap_or_default())
    }
}

// =============================================================================
// WRITE SIDE
// =============================================================================

impl StageWriter for StageTables {
    fn delete_groups_for_stage(&mut self, stage: StageId) -> Result<usize, StageError> {
        let doomed_groups: BTreeSet<GroupId> = self
            .groups
            .iter()
            .filter(|(_, owner)| **owner == stage)
            .map(|(id, _)| *id)
            .collect();
        let doomed_matches: Vec<MatchId> = self
            .matches
            .iter()
            .filter(|(_, group)| doomed_groups.contains(group))
            .map(|(id, _)| *id)
            .collect();

        for match_id in &doomed_matches {
            self.matches.remove(match_id);
            self.match_participants.remove(match_id);
            self.scores.remove(match_id);
            self.bracket_links.remove(match_id);
        }
        for group in &doomed_groups {
            self.groups.remove(group);
            self.group_participants.remove(group);
        }
        Ok(doomed_groups.len())
    }

    fn insert_group(&mut self, stage: StageId) -> Result<GroupId, StageError> {
        if !self.stages.contains_key(&stage) {
            return Err(StageError::StageNotFound(stage));
        }
        let id = GroupId(take(&mut self.ids.group));
        self.groups.insert(id, stage);
        Ok(id)
    }

    fn insert_group_participant(
        &mut self,
        group: GroupId,
        participant: ParticipantId,
        seed: u32,
    ) -> Result<(), StageError> {
        let stage = self.stage_of_group(group)?;
        if !self.participants.contains_key(&participant) {
            return Err(StageError::ParticipantNotFound(participant));
        }
        let already_placed = self
            .groups
            .iter()
            .filter(|(_, owner)| **owner == stage)
            .filter_map(|(id, _)| self.group_participants.get(id))
            .any(|members| members.values().any(|p| *p == participant));
        if already_placed {
            return Err(StageError::InvalidArgument(format!(
                "participant {} is already placed in stage {}",
                participant, stage
            )));
        }
        let members = self.group_participants.entry(group).or_default();
        if members.contains_key(&seed) {
            return Err(StageError::InvalidArgument(format!(
                "seed {} is already taken in group {}",
                seed, group
            )));
        }
        members.insert(seed, participant);
        Ok(())
    }

    fn insert_match(&mut self, group: GroupId) -> Result<MatchId, StageError> {
        self.stage_of_group(group)?;
        let id = MatchId(take(&mut self.ids.match_));
        self.matches.insert(id, group);
        Ok(id)
    }

    fn insert_match_participant(
        &mut self,
        match_id: MatchId,
        participant: ParticipantId,
    ) -> Result<(), StageError> {
        if !self.matches.contains_key(&match_id) {
            return Err(StageError::MatchNotFound(match_id));
        }
        if !self.participants.contains_key(&participant) {
            return Err(StageError::ParticipantNotFound(participant));
        }
        let slots = self.match_participants.entry(match_id).or_default();
        if slots.contains(&participant) {
            return Err(StageError::InvalidArgument(format!(
                "participant {} already plays match {}",
                participant, match_id
            )));
        }
        if slots.len() >= MAX_MATCH_PARTICIPANTS {
            return Err(StageError::MatchFull(match_id));
        }
        slots.push(participant);
        Ok(())
    }

    fn insert_bracket_link(
        &mut self,
        match_id: MatchId,
        next: Option<MatchId>,
    ) -> Result<(), StageError> {
        if !self.matches.contains_key(&match_id) {
            return Err(StageError::MatchNotFound(match_id));
        }
        if let Some(next) = next.filter(|n| !self.matches.contains_key(n)) {
            return Err(StageError::MatchNotFound(next));
        }
        self.bracket_links.insert(match_id, next);
        Ok(())
    }

    fn insert_event(&mut self, name: &str) -> Result<EventId, StageError> {
        let id = EventId(take(&mut self.ids.event));
        self.events.insert(
            id,
            Event {
                id,
                name: name.to_string(),
                status: EventStatus::Registration,
            },
        );
        Ok(id)
    }

    fn set_event_status(&mut self, event: EventId, status: EventStatus) -> Result<(), StageError> {
        let record = self
            .events
            .get_mut(&event)
            .ok_or(StageError::EventNotFound(event))?;
        record.status = status;
        Ok(())
    }

    fn insert_stage(
        &mut self,
        event: EventId,
        kind: StageKind,
        order: u32,
    ) -> Result<StageId, StageError> {
        if !self.events.contains_key(&event) {
            return Err(StageError::EventNotFound(event));
        }
        let id = StageId(take(&mut self.ids.stage));
        self.stages.insert(
            id,
            Stage {
                id,
                event,
                kind,
                order,
            },
        );
        Ok(id)
    }

    fn insert_participant(
        &mut self,
        kind: ParticipantKind,
        name: &str,
    ) -> Result<ParticipantId, StageError> {
        let id = ParticipantId(take(&mut self.ids.participant));
        self.participants.insert(
            id,
            Participant {
                id,
                kind,
                name: name.to_string(),
            },
        );
        Ok(id)
    }

    fn enroll(&mut self, event: EventId, participant: ParticipantId) -> Result<(), StageError> {
        if !self.events.contains_key(&event) {
            return Err(StageError::EventNotFound(event));
        }
        if !self.participants.contains_key(&participant) {
            return Err(StageError::ParticipantNotFound(participant));
        }
        let roster = self.enrollments.entry(event).or_default();
        if !roster.contains(&participant) {
            roster.push(participant);
        }
        Ok(())
    }

    fn record_score(
        &mut self,
        match_id: MatchId,
        participant: ParticipantId,
        score: i64,
    ) -> Result<(), StageError> {
        if !self.matches.contains_key(&match_id) {
            return Err(StageError::MatchNotFound(match_id));
        }
        let assigned = self
            .match_participants
            .get(&match_id)
            .is_some_and(|slots| slots.contains(&participant));
        if !assigned {
            return Err(StageError::InvalidArgument(format!(
                "participant {} does not play match {}",
                participant, match_id
            )));
        }
        self.scores
            .entry(match_id)
            .or_default()
            .insert(participant, score);
        Ok(())
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Volatile store backed by [`StageTables`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    tables: StageTables,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing tables (e.g. decoded from a snapshot file).
    #[must_use]
    pub fn from_tables(tables: StageTables) -> Self {
        Self { tables }
    }

    /// Borrow the live tables.
    #[must_use]
    pub fn tables(&self) -> &StageTables {
        &self.tables
    }
}

impl StageStore for MemoryStore {
    type Snapshot<'a> = &'a StageTables;

    fn snapshot(&self) -> Result<Self::Snapshot<'_>, StageError> {
        Ok(&self.tables)
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T, StageError>
    where
        F: FnOnce(&mut dyn StageWriter) -> Result<T, StageError>,
    {
        let mut working = self.tables.clone();
        let out = f(&mut working)?;
        self.tables = working;
        Ok(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================
