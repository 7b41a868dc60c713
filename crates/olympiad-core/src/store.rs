//! # Stage Store Contract
//!
//! The narrow storage interface the engine talks to.
//!
//! - `StageReader`: point-in-time read queries
//! - `RosterProvider`: enrolled participants of an event, in enrollment order
//! - `StageWriter`: inserts and cascading teardown, only reachable inside a transaction
//! - `StageStore`: hands out snapshots and runs all-or-nothing transactions
//!
//! All fallible operations return `Result<T, StageError>` so in-memory and
//! persistent backends behave uniformly.

use crate::{
    BracketLink, Event, EventId, EventStatus, GroupId, GroupParticipant, GroupRecord, MatchId,
    MatchRecord, Participant, ParticipantId, ParticipantKind, Stage, StageError, StageId,
    StageKind,
};

// =============================================================================
// READ SIDE
// =============================================================================

/// Read queries over one consistent view of the store.
pub trait StageReader {
    /// Lookup an event.
    fn event(&self, id: EventId) -> Result<Option<Event>, StageError>;

    /// Lookup a stage.
    fn stage(&self, id: StageId) -> Result<Option<Stage>, StageError>;

    /// Lookup a participant (display-name resolution).
    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StageError>;

    /// Groups of a stage in creation order.
    fn groups_for_stage(&self, stage: StageId) -> Result<Vec<GroupRecord>, StageError>;

    /// Members of a group in seed order.
    fn group_participants(&self, group: GroupId) -> Result<Vec<GroupParticipant>, StageError>;

    /// Matches of a group in creation order, with participants and scores.
    fn matches_for_group(&self, group: GroupId) -> Result<Vec<MatchRecord>, StageError>;

    /// Parent pointer of a bracket match, if one was written.
    fn bracket_link(&self, match_id: MatchId) -> Result<Option<BracketLink>, StageError>;

    /// Every match of a stage, group by group.
    fn matches_for_stage(&self, stage: StageId) -> Result<Vec<MatchRecord>, StageError> {
        let mut matches = Vec::new();
        for group in self.groups_for_stage(stage)? {
            matches.extend(self.matches_for_group(group.id)?);
        }
        Ok(matches)
    }

    /// Resolve a participant's display name.
    fn display_name(&self, id: ParticipantId) -> Result<String, StageError> {
        self.participant(id)?
            .map(|p| p.name)
            .ok_or(StageError::ParticipantNotFound(id))
    }

    /// Fetch a stage and check its kind.
    fn require_stage(&self, id: StageId, kind: StageKind) -> Result<Stage, StageError> {
        let stage = self.stage(id)?.ok_or(StageError::StageNotFound(id))?;
        if stage.kind != kind {
            return Err(StageError::WrongStageKind {
                stage: id,
                expected: kind,
                actual: stage.kind,
            });
        }
        Ok(stage)
    }
}

impl<R: StageReader + ?Sized> StageReader for &R {
    fn event(&self, id: EventId) -> Result<Option<Event>, StageError> {
        (**self).event(id)
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>, StageError> {
        (**self).stage(id)
    }

    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, StageError> {
        (**self).participant(id)
    }

    fn groups_for_stage(&self, stage: StageId) -> Result<Vec<GroupRecord>, StageError> {
        (**self).groups_for_stage(stage)
    }

    fn group_participants(&self, group: GroupId) -> Result<Vec<GroupParticipant>, StageError> {
        (**self).group_participants(group)
    }

    fn matches_for_group(&self, group: GroupId) -> Result<Vec<MatchRecord>, StageError> {
        (**self).matches_for_group(group)
    }

    fn bracket_link(&self, match_id: MatchId) -> Result<Option<BracketLink>, StageError> {
        (**self).bracket_link(match_id)
    }
}

/// Supplies the participants enrolled in an event, ordered by enrollment time.
pub trait RosterProvider {
    fn enrolled_participants(&self, event: EventId) -> Result<Vec<ParticipantId>, StageError>;
}

impl<P: RosterProvider + ?Sized> RosterProvider for &P {
    fn enrolled_participants(&self, event: EventId) -> Result<Vec<ParticipantId>, StageError> {
        (**self).enrolled_participants(event)
    }
}

// =============================================================================
// WRITE SIDE
// =============================================================================

/// Writes issued inside one store transaction.
///
/// The first block is what the generators use. The second block is the
/// registration surface owned by the surrounding CRUD layer; it lives here so
/// both backends enforce the same referential rules.
pub trait StageWriter {
    /// Remove every group of a stage, cascading to group members, matches,
    /// match participants, scores and bracket links. Returns the number of
    /// groups removed.
    fn delete_groups_for_stage(&mut self, stage: StageId) -> Result<usize, StageError>;

    /// Create a group in an existing stage.
    fn insert_group(&mut self, stage: StageId) -> Result<GroupId, StageError>;

    /// Add a member to a group. Seeds are unique per group and a participant
    /// appears at most once per stage.
    fn insert_group_participant(
        &mut self,
        group: GroupId,
        participant: ParticipantId,
        seed: u32,
    ) -> Result<(), StageError>;

    /// Create an empty match in a group.
    fn insert_match(&mut self, group: GroupId) -> Result<MatchId, StageError>;

    /// Assign a participant to a match (at most two per match).
    fn insert_match_participant(
        &mut self,
        match_id: MatchId,
        participant: ParticipantId,
    ) -> Result<(), StageError>;

    /// Record the parent of a bracket match; `None` marks the final.
    fn insert_bracket_link(
        &mut self,
        match_id: MatchId,
        next: Option<MatchId>,
    ) -> Result<(), StageError>;

    // -- registration --------------------------------------------------------

    fn insert_event(&mut self, name: &str) -> Result<EventId, StageError>;

    fn set_event_status(&mut self, event: EventId, status: EventStatus) -> Result<(), StageError>;

    fn insert_stage(
        &mut self,
        event: EventId,
        kind: StageKind,
        order: u32,
    ) -> Result<StageId, StageError>;

    fn insert_participant(
        &mut self,
        kind: ParticipantKind,
        name: &str,
    ) -> Result<ParticipantId, StageError>;

    /// Enroll a participant; enrolling twice is a no-op.
    fn enroll(&mut self, event: EventId, participant: ParticipantId) -> Result<(), StageError>;

    /// Set the score of a participant assigned to a match.
    fn record_score(
        &mut self,
        match_id: MatchId,
        participant: ParticipantId,
        score: i64,
    ) -> Result<(), StageError>;
}

// =============================================================================
// STORE
// =============================================================================

/// A transactional store.
///
/// `transaction` commits only when the closure returns `Ok`; on `Err` nothing
/// the closure wrote becomes visible and the previous state stays intact.
pub trait StageStore {
    type Snapshot<'a>: StageReader + RosterProvider
    where
        Self: 'a;

    /// A read view fixed at one point in time.
    fn snapshot(&self) -> Result<Self::Snapshot<'_>, StageError>;

    /// Run `f` atomically.
    fn transaction<T, F>(&mut self, f: F) -> Result<T, StageError>
    where
        F: FnOnce(&mut dyn StageWriter) -> Result<T, StageError>;
}
