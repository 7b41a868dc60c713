//! # Stage Presenter
//!
//! Rebuilds renderable views from persisted stage rows. Never writes.
//!
//! Bracket rounds are not stored. They are recovered from parent pointers: a
//! reverse index of feeders is built on every call and walked breadth-first
//! from the final, so a match's round is its distance from the final.

use crate::primitives::{MAX_FEEDERS, UNFILLED_SLOT, UNPLAYED_SCORE};
use crate::seeding::group_label;
use crate::store::{StageReader, StageStore};
use crate::{MatchId, MatchRecord, ParticipantId, StageError, StageId, StageKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// VIEW MODELS
// =============================================================================

/// Pairwise score lookup: name -> opponent name -> `"s1 - s2"` or `null`.
pub type ScoreTable = BTreeMap<String, BTreeMap<String, Option<String>>>;

/// One round-robin group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    /// Label derived from creation order: A, B, C, ...
    pub name: String,
    /// Display names in seed order.
    pub participants: Vec<String>,
    pub scores: ScoreTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupsStageView {
    pub groups: Vec<GroupView>,
    #[serde(rename = "totalParticipants")]
    pub total_participants: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchView {
    pub id: MatchId,
    pub p1: String,
    pub p2: String,
    pub score: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundView {
    pub matches: Vec<MatchView>,
}

/// Bracket rounds, first round first and the final last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BracketStageView {
    pub rounds: Vec<RoundView>,
}

/// View of either stage kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageView {
    Groups(GroupsStageView),
    SingleElimination(BracketStageView),
}

// =============================================================================
// PRESENTER
// =============================================================================

/// Read-only view builder over a stage store.
///
/// Each call reads from a single snapshot, so a concurrent regeneration is
/// either fully visible or not at all.
pub struct StagePresenter;

impl StagePresenter {
    /// Standings view of a round-robin stage.
    pub fn present_groups<S: StageStore>(
        store: &S,
        stage: StageId,
    ) -> Result<GroupsStageView, StageError> {
        let snapshot = store.snapshot()?;
        snapshot.require_stage(stage, StageKind::Groups)?;
        groups_view(&snapshot, stage)
    }

    /// Round-by-round view of a single-elimination stage.
    ///
    /// # Errors
    /// `CorruptBracket` when the stored links do not form one tree rooted at a
    /// single final.
    pub fn present_bracket<S: StageStore>(
        store: &S,
        stage: StageId,
    ) -> Result<BracketStageView, StageError> {
        let snapshot = store.snapshot()?;
        snapshot.require_stage(stage, StageKind::SingleElimination)?;
        bracket_view(&snapshot, stage)
    }

    /// View of a stage, whatever its kind.
    pub fn present<S: StageStore>(store: &S, stage: StageId) -> Result<StageView, StageError> {
        let snapshot = store.snapshot()?;
        let record = snapshot
            .stage(stage)?
            .ok_or(StageError::StageNotFound(stage))?;
        match record.kind {
            StageKind::Groups => groups_view(&snapshot, stage).map(StageView::Groups),
            StageKind::SingleElimination => {
                bracket_view(&snapshot, stage).map(StageView::SingleElimination)
            }
        }
    }
}

/// Display names looked up once per view.
struct NameCache<'r, R: StageReader> {
    reader: &'r R,
    names: BTreeMap<ParticipantId, String>,
}

impl<'r, R: StageReader> NameCache<'r, R> {
    fn new(reader: &'r R) -> Self {
        Self {
            reader,
            names: BTreeMap::new(),
        }
    }

    fn get(&mut self, id: ParticipantId) -> Result<String, StageError> {
        if let Some(name) = self.names.get(&id) {
            return Ok(name.clone());
        }
        let name = self.reader.display_name(id)?;
        self.names.insert(id, name.clone());
        Ok(name)
    }
}

// =============================================================================
// GROUPS
// =============================================================================

fn groups_view<R: StageReader>(reader: &R, stage: StageId) -> Result<GroupsStageView, StageError> {
    let mut names = NameCache::new(reader);
    let mut groups = Vec::new();
    let mut total_participants = 0;

    for (index, group) in reader.groups_for_stage(stage)?.into_iter().enumerate() {
        let members = reader.group_participants(group.id)?;
        total_participants += members.len();

        let mut participants = Vec::with_capacity(members.len());
        for member in &members {
            participants.push(names.get(member.participant)?);
        }

        let mut scores = ScoreTable::new();
        for record in reader.matches_for_group(group.id)? {
            let [a, b] = match record.participants.as_slice() {
                [a, b] => [*a, *b],
                _ => continue,
            };
            let (name_a, name_b) = (names.get(a)?, names.get(b)?);
            let forward = record.score_line();
            let backward = match (record.scores.get(&a), record.scores.get(&b)) {
                (Some(sa), Some(sb)) => Some(format!("{} - {}", sb, sa)),
                _ => None,
            };
            scores
                .entry(name_a.clone())
                .or_default()
                .insert(name_b.clone(), forward);
            scores.entry(name_b).or_default().insert(name_a, backward);
        }

        groups.push(GroupView {
            name: group_label(index),
            participants,
            scores,
        });
    }

    Ok(GroupsStageView {
        groups,
        total_participants,
    })
}

// =============================================================================
// BRACKET
// =============================================================================

fn corrupt(stage: StageId, reason: impl Into<String>) -> StageError {
    StageError::CorruptBracket {
        stage,
        reason: reason.into(),
    }
}

fn bracket_view<R: StageReader>(
    reader: &R,
    stage: StageId,
) -> Result<BracketStageView, StageError> {
    let matches: BTreeMap<MatchId, MatchRecord> = reader
        .matches_for_stage(stage)?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();
    if matches.is_empty() {
        return Ok(BracketStageView { rounds: Vec::new() });
    }

    // Reverse index over `next`, rebuilt on every call.
    let mut feeders: BTreeMap<MatchId, Vec<MatchId>> = BTreeMap::new();
    let mut finals = Vec::new();
    for id in matches.keys() {
        let link = reader
            .bracket_link(*id)?
            .ok_or_else(|| corrupt(stage, format!("match {} has no bracket link", id)))?;
        match link.next {
            None => finals.push(*id),
            Some(next) if !matches.contains_key(&next) => {
                return Err(corrupt(
                    stage,
                    format!("match {} points to match {} outside the stage", id, next),
                ));
            }
            Some(next) => feeders.entry(next).or_default().push(*id),
        }
    }

    let root = match finals.as_slice() {
        [root] => *root,
        [] => return Err(corrupt(stage, "no match is the final")),
        _ => {
            return Err(corrupt(
                stage,
                format!("{} matches claim to be the final", finals.len()),
            ));
        }
    };

    if let Some((id, children)) = feeders
        .iter()
        .find(|(_, children)| children.len() > MAX_FEEDERS)
    {
        return Err(corrupt(
            stage,
            format!("match {} is fed by {} matches", id, children.len()),
        ));
    }

    // Breadth-first from the final; depth = rounds before the final.
    let mut by_depth: BTreeMap<usize, Vec<MatchId>> = BTreeMap::new();
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::from([(root, 0usize)]);
    while let Some((id, depth)) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        by_depth.entry(depth).or_default().push(id);
        for feeder in feeders.get(&id).into_iter().flatten() {
            queue.push_back((*feeder, depth + 1));
        }
    }

    if visited.len() != matches.len() {
        return Err(corrupt(
            stage,
            format!(
                "{} matches are not connected to the final",
                matches.len() - visited.len()
            ),
        ));
    }

    let mut names = NameCache::new(reader);
    let mut rounds = Vec::with_capacity(by_depth.len());
    for ids in by_depth.values().rev() {
        let mut views = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = matches.get(id) {
                views.push(match_view(record, &mut names)?);
            }
        }
        rounds.push(RoundView { matches: views });
    }

    Ok(BracketStageView { rounds })
}

fn match_view<R: StageReader>(
    record: &MatchRecord,
    names: &mut NameCache<'_, R>,
) -> Result<MatchView, StageError> {
    let mut slot = |index: usize| -> Result<String, StageError> {
        match record.participants.get(index) {
            Some(id) => names.get(*id),
            None => Ok(UNFILLED_SLOT.to_string()),
        }
    };
    let p1 = slot(0)?;
    let p2 = slot(1)?;
    Ok(MatchView {
        id: record.id,
        p1,
        p2,
        score: record
            .score_line()
            .unwrap_or_else(|| UNPLAYED_SCORE.to_string()),
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::generator::StageGenerator;
    use crate::storage::MemoryStore;
    use crate::{ParticipantKind, StageWriter};

    fn stage_with(kind: StageKind, names: &[&str]) -> (MemoryStore, StageId, Vec<ParticipantId>) {
        let mut store = MemoryStore::new();
        let (stage, roster) = store
            .transaction(|w| {
                let event = w.insert_event("Foosball")?;
                let stage = w.insert_stage(event, kind, 1)?;
                let mut roster = Vec::new();
                for name in names {
                    let p = w.insert_participant(ParticipantKind::Team, name)?;
                    w.enroll(event, p)?;
                    roster.push(p);
                }
                Ok((stage, roster))
            })
            .expect("setup");
        (store, stage, roster)
    }

    #[test]
    fn groups_view_labels_and_null_scores() {
        let (mut store, stage, roster) = stage_with(StageKind::Groups, &["A1", "B1", "C1", "D1"]);
        StageGenerator::generate_groups(&mut store, stage, &roster, 2).expect("generate");

        let view = StagePresenter::present_groups(&store, stage).expect("present");
        assert_eq!(view.total_participants, 4);
        assert_eq!(view.groups[0].name, "A");
        assert_eq!(view.groups[1].name, "B");
        assert_eq!(view.groups[0].participants, vec!["A1", "C1"]);
        assert_eq!(view.groups[0].scores["A1"]["C1"], None);
        assert_eq!(view.groups[0].scores["C1"]["A1"], None);
    }

    #[test]
    fn groups_view_scores_are_mirrored() {
        let (mut store, stage, roster) = stage_with(StageKind::Groups, &["Ann", "Ben"]);
        StageGenerator::generate_groups(&mut store, stage, &roster, 1).expect("generate");
        let match_id = store.tables().matches_for_stage(stage).expect("matches")[0].id;
        store
            .transaction(|w| {
                w.record_score(match_id, roster[0], 3)?;
                w.record_score(match_id, roster[1], 1)
            })
            .expect("score");

        let view = StagePresenter::present_groups(&store, stage).expect("present");
        let scores = &view.groups[0].scores;
        assert_eq!(scores["Ann"]["Ben"].as_deref(), Some("3 - 1"));
        assert_eq!(scores["Ben"]["Ann"].as_deref(), Some("1 - 3"));
    }

    #[test]
    fn bracket_view_orders_rounds_first_to_final() {
        let (mut store, stage, roster) =
            stage_with(StageKind::SingleElimination, &["S1", "S2", "S3"]);
        StageGenerator::generate_single_elimination(&mut store, stage, &roster)
            .expect("generate");

        let view = StagePresenter::present_bracket(&store, stage).expect("present");
        assert_eq!(view.rounds.len(), 2);
        let first = &view.rounds[0].matches;
        assert_eq!((first[0].p1.as_str(), first[0].p2.as_str()), ("S1", UNFILLED_SLOT));
        assert_eq!((first[1].p1.as_str(), first[1].p2.as_str()), ("S2", "S3"));
        let last = &view.rounds[1].matches;
        assert_eq!(last.len(), 1);
        assert_eq!((last[0].p1.as_str(), last[0].p2.as_str()), ("?", "?"));
        assert!(
            view.rounds
                .iter()
                .flat_map(|r| &r.matches)
                .all(|m| m.score == UNPLAYED_SCORE)
        );
    }

    #[test]
    fn empty_bracket_has_no_rounds() {
        let (store, stage, _) = stage_with(StageKind::SingleElimination, &[]);
        let view = StagePresenter::present_bracket(&store, stage).expect("present");
        assert!(view.rounds.is_empty());
    }

    fn hand_built_bracket(
        links: impl FnOnce(&mut dyn StageWriter, &[MatchId]) -> Result<(), StageError>,
    ) -> (MemoryStore, StageId) {
        let (mut store, stage, _) = stage_with(StageKind::SingleElimination, &[]);
        store
            .transaction(|w| {
                let g = w.insert_group(stage)?;
                let ids = [w.insert_match(g)?, w.insert_match(g)?, w.insert_match(g)?];
                links(w, &ids)
            })
            .expect("rows");
        (store, stage)
    }

    #[test]
    fn missing_final_is_corrupt() {
        let (store, stage) = hand_built_bracket(|w, ids| {
            w.insert_bracket_link(ids[0], Some(ids[1]))?;
            w.insert_bracket_link(ids[1], Some(ids[2]))?;
            w.insert_bracket_link(ids[2], Some(ids[1]))
        });
        let err = StagePresenter::present_bracket(&store, stage).expect_err("corrupt");
        assert!(matches!(err, StageError::CorruptBracket { .. }));
    }

    #[test]
    fn two_finals_are_corrupt() {
        let (store, stage) = hand_built_bracket(|w, ids| {
            w.insert_bracket_link(ids[0], Some(ids[2]))?;
            w.insert_bracket_link(ids[1], None)?;
            w.insert_bracket_link(ids[2], None)
        });
        let err = StagePresenter::present_bracket(&store, stage).expect_err("corrupt");
        assert!(matches!(err, StageError::CorruptBracket { .. }));
    }

    #[test]
    fn cycle_beside_final_is_corrupt() {
        let (mut store, stage) = hand_built_bracket(|w, ids| {
            w.insert_bracket_link(ids[0], None)?;
            w.insert_bracket_link(ids[1], Some(ids[2]))?;
            w.insert_bracket_link(ids[2], Some(ids[1]))
        });
        let err = StagePresenter::present_bracket(&store, stage).expect_err("corrupt");
        assert!(matches!(err, StageError::CorruptBracket { .. }));

        // The same stage without links at all.
        store
            .transaction(|w| {
                w.delete_groups_for_stage(stage)?;
                let g = w.insert_group(stage)?;
                w.insert_match(g).map(|_| ())
            })
            .expect("rows");
        let err = StagePresenter::present_bracket(&store, stage).expect_err("corrupt");
        assert!(matches!(err, StageError::CorruptBracket { .. }));
    }

    #[test]
    fn three_feeders_are_corrupt() {
        let (mut store, stage, _) = stage_with(StageKind::SingleElimination, &[]);
        store
            .transaction(|w| {
                let g = w.insert_group(stage)?;
                let last = w.insert_match(g)?;
                w.insert_bracket_link(last, None)?;
                for _ in 0..3 {
                    let feeder = w.insert_match(g)?;
                    w.insert_bracket_link(feeder, Some(last))?;
                }
                Ok(())
            })
            .expect("rows");
        match StagePresenter::present_bracket(&store, stage) {
            Err(StageError::CorruptBracket { reason, .. }) => {
                assert!(reason.contains("fed by 3"), "{}", reason);
            }
            other => panic!("expected corrupt bracket, got {:?}", other),
        }
    }

    #[test]
    fn present_dispatches_by_kind() {
        let (mut store, stage, roster) = stage_with(StageKind::Groups, &["X", "Y"]);
        StageGenerator::generate_groups(&mut store, stage, &roster, 1).expect("generate");
        let view = StagePresenter::present(&store, stage).expect("present");
        assert!(matches!(view, StageView::Groups(_)));

        let err = StagePresenter::present_bracket(&store, stage).expect_err("wrong kind");
        assert!(matches!(err, StageError::WrongStageKind { .. }));
    }
}
