//! # Stage Generator
//!
//! Turns an ordered roster into persisted stage structure.
//!
//! - Round-robin groups: participants dealt into buckets by enrollment order,
//!   one match per unordered pair of bucket members
//! - Single elimination: one group holding the whole bracket, a full match tree
//!   linked by parent pointers, first-round slots filled by standard seeding
//!
//! Every run is destructive: the stage's previous groups are torn down and the
//! new structure written inside the same store transaction. Planning is pure and
//! happens before the transaction opens.

use crate::primitives::{MAX_PARTICIPANTS, MIN_PARTICIPANTS};
use crate::seeding::{bracket_size, first_round_pairs, matches_in_round, round_count};
use crate::store::{RosterProvider, StageReader, StageStore, StageWriter};
use crate::{EventStatus, MatchId, ParticipantId, StageError, StageId, StageKind};
use serde::Serialize;
use std::collections::BTreeSet;

// =============================================================================
// PLANNING (pure)
// =============================================================================

/// Deal participants into round-robin buckets.
///
/// The effective group count is `max(1, min(k, n / 2))`, so every group has at
/// least two members. Participant `i` lands in bucket `i % groups`; bucket
/// sizes differ by at most one. Fewer than two participants yields no buckets.
#[must_use]
pub fn plan_groups(participants: &[ParticipantId], group_count: usize) -> Vec<Vec<ParticipantId>> {
    let n = participants.len();
    if n < MIN_PARTICIPANTS {
        return Vec::new();
    }
    let groups = group_count.min(n / 2).max(1);
    let mut buckets = vec![Vec::with_capacity(n.div_ceil(groups)); groups];
    for (i, participant) in participants.iter().enumerate() {
        buckets[i % groups].push(*participant);
    }
    buckets
}

/// Every unordered pair of bucket members, in member order.
fn round_robin_pairs(members: &[ParticipantId]) -> Vec<(ParticipantId, ParticipantId)> {
    let mut pairs = Vec::new();
    for (i, a) in members.iter().enumerate() {
        for b in &members[i + 1..] {
            pairs.push((*a, *b));
        }
    }
    pairs
}

/// Shape of a single-elimination bracket for a given roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketPlan {
    /// Smallest power of two holding every participant.
    pub bracket_size: usize,
    /// `log2(bracket_size)`.
    pub rounds: usize,
    /// First-round slots in match order; `None` is a bye.
    pub first_round: Vec<[Option<ParticipantId>; 2]>,
}

impl BracketPlan {
    /// Total matches in the tree (`bracket_size - 1`).
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.bracket_size - 1
    }

    /// Empty first-round slots (`bracket_size - n`).
    #[must_use]
    pub fn byes(&self) -> usize {
        self.first_round
            .iter()
            .flatten()
            .filter(|slot| slot.is_none())
            .count()
    }

    /// Number of matches in round `round` (0 is the first round).
    #[must_use]
    pub fn matches_in_round(&self, round: usize) -> usize {
        matches_in_round(self.bracket_size, round)
    }
}

/// Lay out a seeded bracket. Returns `None` for fewer than two participants.
///
/// Seed `s` (1-based) is `participants[s - 1]`; seeds beyond the roster are byes,
/// which by construction of the standard order fall against the top seeds.
#[must_use]
pub fn plan_bracket(participants: &[ParticipantId]) -> Option<BracketPlan> {
    let n = participants.len();
    if n < MIN_PARTICIPANTS {
        return None;
    }
    let size = bracket_size(n);
    let slot = |seed: usize| participants.get(seed - 1).copied();
    let first_round = first_round_pairs(size)
        .into_iter()
        .map(|(a, b)| [slot(a), slot(b)])
        .collect();
    Some(BracketPlan {
        bracket_size: size,
        rounds: round_count(size),
        first_round,
    })
}

// =============================================================================
// GENERATION (transactional)
// =============================================================================

/// What one generation run wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    pub stage: StageId,
    pub kind: StageKind,
    pub participants: usize,
    pub groups: usize,
    pub matches: usize,
    pub byes: usize,
}

impl GenerationSummary {
    fn empty(stage: StageId, kind: StageKind, participants: usize) -> Self {
        Self {
            stage,
            kind,
            participants,
            groups: 0,
            matches: 0,
            byes: 0,
        }
    }
}

/// Builds group and bracket structure for a stage.
pub struct StageGenerator;

impl StageGenerator {
    /// Rebuild a round-robin stage from `participants` split into `group_count` groups.
    ///
    /// # Errors
    /// - `StageNotFound` / `WrongStageKind` before anything is written
    /// - `TooManyParticipants` or duplicate ids (`InvalidArgument`) before anything is written
    /// - any store error, in which case the previous structure stays intact
    pub fn generate_groups<S: StageStore>(
        store: &mut S,
        stage: StageId,
        participants: &[ParticipantId],
        group_count: usize,
    ) -> Result<GenerationSummary, StageError> {
        store.snapshot()?.require_stage(stage, StageKind::Groups)?;
        validate_roster(participants)?;

        let buckets = plan_groups(participants, group_count);
        store.transaction(|w| {
            w.delete_groups_for_stage(stage)?;
            let mut summary =
                GenerationSummary::empty(stage, StageKind::Groups, participants.len());
            for bucket in &buckets {
                summary.matches += write_group(w, stage, bucket)?;
                summary.groups += 1;
            }
            Ok(summary)
        })
    }

    /// Rebuild a single-elimination stage from `participants` in seed order.
    ///
    /// Byes are left empty; no participant is advanced automatically.
    ///
    /// # Errors
    /// Same as [`StageGenerator::generate_groups`].
    pub fn generate_single_elimination<S: StageStore>(
        store: &mut S,
        stage: StageId,
        participants: &[ParticipantId],
    ) -> Result<GenerationSummary, StageError> {
        store
            .snapshot()?
            .require_stage(stage, StageKind::SingleElimination)?;
        validate_roster(participants)?;

        let plan = plan_bracket(participants);
        store.transaction(|w| {
            w.delete_groups_for_stage(stage)?;
            let mut summary =
                GenerationSummary::empty(stage, StageKind::SingleElimination, participants.len());
            if let Some(plan) = &plan {
                write_bracket(w, stage, participants, plan)?;
                summary.groups = 1;
                summary.matches = plan.match_count();
                summary.byes = plan.byes();
            }
            Ok(summary)
        })
    }

    /// Rebuild a stage from its event's current roster.
    ///
    /// Only allowed while the owning event is in registration. `group_count` is
    /// ignored for single-elimination stages.
    ///
    /// # Errors
    /// `StageLocked` once the event has started, plus everything the
    /// kind-specific generators return.
    pub fn regenerate<S: StageStore>(
        store: &mut S,
        stage: StageId,
        group_count: usize,
    ) -> Result<GenerationSummary, StageError> {
        let (kind, roster) = {
            let snapshot = store.snapshot()?;
            let record = snapshot
                .stage(stage)?
                .ok_or(StageError::StageNotFound(stage))?;
            let event = snapshot
                .event(record.event)?
                .ok_or(StageError::EventNotFound(record.event))?;
            if event.status != EventStatus::Registration {
                return Err(StageError::StageLocked {
                    stage,
                    event: event.id,
                    status: event.status,
                });
            }
            (record.kind, snapshot.enrolled_participants(event.id)?)
        };

        match kind {
            StageKind::Groups => Self::generate_groups(store, stage, &roster, group_count),
            StageKind::SingleElimination => {
                Self::generate_single_elimination(store, stage, &roster)
            }
        }
    }
}

fn validate_roster(participants: &[ParticipantId]) -> Result<(), StageError> {
    if participants.len() > MAX_PARTICIPANTS {
        return Err(StageError::TooManyParticipants {
            count: participants.len(),
            max: MAX_PARTICIPANTS,
        });
    }
    let mut seen = BTreeSet::new();
    for participant in participants {
        if !seen.insert(*participant) {
            return Err(StageError::InvalidArgument(format!(
                "participant {} appears twice in the roster",
                participant
            )));
        }
    }
    Ok(())
}

/// Write one round-robin group. Returns the number of matches created.
fn write_group(
    w: &mut dyn StageWriter,
    stage: StageId,
    members: &[ParticipantId],
) -> Result<usize, StageError> {
    let group = w.insert_group(stage)?;
    for (seed, participant) in members.iter().enumerate() {
        w.insert_group_participant(group, *participant, seed as u32)?;
    }
    let pairs = round_robin_pairs(members);
    for (a, b) in &pairs {
        let match_id = w.insert_match(group)?;
        w.insert_match_participant(match_id, *a)?;
        w.insert_match_participant(match_id, *b)?;
    }
    Ok(pairs.len())
}

/// Write the bracket group, its match tree, parent links and first-round slots.
fn write_bracket(
    w: &mut dyn StageWriter,
    stage: StageId,
    participants: &[ParticipantId],
    plan: &BracketPlan,
) -> Result<(), StageError> {
    let group = w.insert_group(stage)?;
    for (index, participant) in participants.iter().enumerate() {
        w.insert_group_participant(group, *participant, index as u32 + 1)?;
    }

    let mut rounds: Vec<Vec<MatchId>> = Vec::with_capacity(plan.rounds);
    for round in 0..plan.rounds {
        let mut matches = Vec::with_capacity(plan.matches_in_round(round));
        for _ in 0..plan.matches_in_round(round) {
            matches.push(w.insert_match(group)?);
        }
        rounds.push(matches);
    }

    for (round, matches) in rounds.iter().enumerate() {
        let parents = rounds.get(round + 1);
        for (i, match_id) in matches.iter().enumerate() {
            let next = parents.and_then(|p| p.get(i / 2)).copied();
            w.insert_bracket_link(*match_id, next)?;
        }
    }

    if let Some(first) = rounds.first() {
        for (match_id, slots) in first.iter().zip(&plan.first_round) {
            for participant in slots.iter().flatten() {
                w.insert_match_participant(*match_id, *participant)?;
            }
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
