//! # Stage Scenario Tests (S0-S3)
//!
//! End-to-end runs of generation followed by presentation.
//!
//! ## Tiers
//! - S0: Concrete scenarios
//! - S1: Fresh-stage reads
//! - S2: Destructive regeneration and rollback
//! - S3: Integrity and lookup failures

use olympiad_core::seeding::standard_seeding;
use olympiad_core::{
    EventId, EventStatus, GroupId, MatchId, MemoryStore, ParticipantId, ParticipantKind, RedbStore,
    RosterProvider, StageError, StageGenerator, StageId, StageKind, StagePresenter, StageReader,
    StageStore, StageView, StageWriter, StorageBackend,
};
use tempfile::tempdir;

struct Fixture<S> {
    store: S,
    event: EventId,
    stage: StageId,
}

fn fixture<S: StageStore>(mut store: S, kind: StageKind, names: &[&str]) -> Fixture<S> {
    let (event, stage) = store
        .transaction(|w| {
            let event = w.insert_event("Olympiad Chess")?;
            let stage = w.insert_stage(event, kind, 1)?;
            for name in names {
                let p = w.insert_participant(ParticipantKind::Player, name)?;
                w.enroll(event, p)?;
            }
            Ok((event, stage))
        })
        .expect("fixture");
    Fixture {
        store,
        event,
        stage,
    }
}

impl<S: StageStore> Fixture<S> {
    fn enroll_more(&mut self, names: &[&str]) {
        let event = self.event;
        self.store
            .transaction(|w| {
                for name in names {
                    let p = w.insert_participant(ParticipantKind::Player, name)?;
                    w.enroll(event, p)?;
                }
                Ok(())
            })
            .expect("enroll");
    }

    fn roster(&self) -> Vec<ParticipantId> {
        self.store
            .snapshot()
            .expect("snapshot")
            .enrolled_participants(self.event)
            .expect("roster")
    }

    fn stage_match_ids(&self) -> Vec<MatchId> {
        self.store
            .snapshot()
            .expect("snapshot")
            .matches_for_stage(self.stage)
            .expect("matches")
            .iter()
            .map(|m| m.id)
            .collect()
    }
}

const EIGHT: [&str; 8] = [
    "Anand", "Botvinnik", "Capablanca", "Ding", "Euwe", "Fischer", "Gukesh", "Hou",
];

// =============================================================================
// TIER S0: CONCRETE SCENARIOS
// =============================================================================

mod s0_concrete {
    use super::*;

    /// S0.1: Three players in a single-elimination stage.
    #[test]
    fn three_player_bracket() {
        let mut fx = fixture(
            MemoryStore::new(),
            StageKind::SingleElimination,
            &EIGHT[..3],
        );
        let summary = StageGenerator::regenerate(&mut fx.store, fx.stage, 0).expect("generate");
        assert_eq!(summary.matches, 3);
        assert_eq!(summary.byes, 1);
        assert_eq!(standard_seeding(4), vec![1, 4, 2, 3]);

        let view = StagePresenter::present_bracket(&fx.store, fx.stage).expect("present");
        assert_eq!(view.rounds.len(), 2);

        let first = &view.rounds[0].matches;
        assert_eq!(first.len(), 2);
        assert_eq!((first[0].p1.as_str(), first[0].p2.as_str()), ("Anand", "?"));
        assert_eq!(
            (first[1].p1.as_str(), first[1].p2.as_str()),
            ("Botvinnik", "Capablanca")
        );

        let last = &view.rounds[1].matches;
        assert_eq!(last.len(), 1);
        assert_eq!((last[0].p1.as_str(), last[0].p2.as_str()), ("?", "?"));
    }

    /// S0.2: Eight players split into two round-robin groups.
    #[test]
    fn eight_players_two_groups() {
        let mut fx = fixture(MemoryStore::new(), StageKind::Groups, &EIGHT);
        let summary = StageGenerator::regenerate(&mut fx.store, fx.stage, 2).expect("generate");
        assert_eq!(summary.groups, 2);
        assert_eq!(summary.matches, 12);

        let view = StagePresenter::present_groups(&fx.store, fx.stage).expect("present");
        assert_eq!(view.total_participants, 8);
        for group in &view.groups {
            assert_eq!(group.participants.len(), 4);
        }
        assert_eq!(
            view.groups[0].participants,
            vec!["Anand", "Capablanca", "Euwe", "Gukesh"]
        );

        let snapshot = fx.store.snapshot().expect("snapshot");
        for group in snapshot.groups_for_stage(fx.stage).expect("groups") {
            assert_eq!(snapshot.matches_for_group(group.id).expect("matches").len(), 6);
        }
    }

    /// S0.3: The same scenario on the redb backend.
    #[test]
    fn eight_player_bracket_on_redb() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("olympiad.redb")).expect("open db");
        let mut fx = fixture(store, StageKind::SingleElimination, &EIGHT);
        StageGenerator::regenerate(&mut fx.store, fx.stage, 0).expect("generate");

        let view = StagePresenter::present_bracket(&fx.store, fx.stage).expect("present");
        let sizes: Vec<usize> = view.rounds.iter().map(|r| r.matches.len()).collect();
        assert_eq!(sizes, vec![4, 2, 1]);

        let first: Vec<(&str, &str)> = view.rounds[0]
            .matches
            .iter()
            .map(|m| (m.p1.as_str(), m.p2.as_str()))
            .collect();
        assert_eq!(
            first,
            vec![
                ("Anand", "Hou"),
                ("Ding", "Euwe"),
                ("Botvinnik", "Gukesh"),
                ("Capablanca", "Fischer"),
            ]
        );
    }
}

// =============================================================================
// TIER S1: FRESH-STAGE READS
// =============================================================================

mod s1_fresh_reads {
    use super::*;

    /// S1.1: An unscored group stage reports every pairing as null.
    #[test]
    fn fresh_groups_have_null_scores() {
        let mut fx = fixture(MemoryStore::new(), StageKind::Groups, &EIGHT[..6]);
        StageGenerator::regenerate(&mut fx.store, fx.stage, 2).expect("generate");

        let view = StagePresenter::present_groups(&fx.store, fx.stage).expect("present");
        for group in &view.groups {
            for (name, row) in &group.scores {
                assert!(!row.contains_key(name));
                assert_eq!(row.len(), group.participants.len() - 1);
                assert!(row.values().all(Option::is_none));
            }
        }
    }

    /// S1.2: A fresh bracket reports the unplayed placeholder everywhere.
    #[test]
    fn fresh_bracket_is_unplayed() {
        let mut fx = fixture(
            MemoryStore::new(),
            StageKind::SingleElimination,
            &EIGHT[..5],
        );
        StageGenerator::regenerate(&mut fx.store, fx.stage, 0).expect("generate");

        let view = StagePresenter::present_bracket(&fx.store, fx.stage).expect("present");
        assert!(
            view.rounds
                .iter()
                .flat_map(|r| &r.matches)
                .all(|m| m.score == "- vs -")
        );
    }

    /// S1.3: A recorded bracket result shows up as a score line.
    #[test]
    fn recorded_bracket_score_is_rendered() {
        let mut fx = fixture(
            MemoryStore::new(),
            StageKind::SingleElimination,
            &EIGHT[..2],
        );
        StageGenerator::regenerate(&mut fx.store, fx.stage, 0).expect("generate");
        let roster = fx.roster();
        let final_id = fx.stage_match_ids()[0];
        fx.store
            .transaction(|w| {
                w.record_score(final_id, roster[0], 2)?;
                w.record_score(final_id, roster[1], 0)
            })
            .expect("score");

        let view = StagePresenter::present(&fx.store, fx.stage).expect("present");
        let score = match &view {
            StageView::SingleElimination(bracket) => bracket.rounds[0].matches[0].score.clone(),
            StageView::Groups(_) => String::new(),
        };
        assert_eq!(score, "2 - 0");
    }

    /// S1.4: A never-generated stage presents as empty.
    #[test]
    fn empty_stage_views() {
        let fx = fixture(MemoryStore::new(), StageKind::Groups, &[]);
        let view = StagePresenter::present_groups(&fx.store, fx.stage).expect("present");
        assert!(view.groups.is_empty());
        assert_eq!(view.total_participants, 0);
    }
}

// =============================================================================
// TIER S2: DESTRUCTIVE REGENERATION AND ROLLBACK
// =============================================================================

mod s2_regeneration {
    use super::*;

    /// S2.1: (n=5, k=2) followed by (n=8, k=3) leaves only the second layout.
    #[test]
    fn regeneration_replaces_everything() {
        let mut fx = fixture(MemoryStore::new(), StageKind::Groups, &EIGHT[..5]);
        StageGenerator::regenerate(&mut fx.store, fx.stage, 2).expect("first");
        let first_matches = fx.stage_match_ids();
        assert_eq!(first_matches.len(), 3 + 1);

        fx.enroll_more(&EIGHT[5..]);
        let summary = StageGenerator::regenerate(&mut fx.store, fx.stage, 3).expect("second");
        assert_eq!(summary.groups, 3);
        assert_eq!(summary.matches, 3 + 3 + 1);

        let tables = fx.store.tables();
        assert_eq!(tables.group_count(), 3);
        assert_eq!(tables.match_count(), 7);
        let second_matches = fx.stage_match_ids();
        assert!(second_matches.iter().all(|m| !first_matches.contains(m)));

        let view = StagePresenter::present_groups(&fx.store, fx.stage).expect("present");
        assert_eq!(view.total_participants, 8);
    }

    /// S2.2: Regeneration discards recorded scores.
    #[test]
    fn regeneration_discards_scores() {
        let mut fx = fixture(MemoryStore::new(), StageKind::Groups, &EIGHT[..2]);
        StageGenerator::regenerate(&mut fx.store, fx.stage, 1).expect("first");
        let roster = fx.roster();
        let match_id = fx.stage_match_ids()[0];
        fx.store
            .transaction(|w| {
                w.record_score(match_id, roster[0], 1)?;
                w.record_score(match_id, roster[1], 1)
            })
            .expect("score");

        StageGenerator::regenerate(&mut fx.store, fx.stage, 1).expect("second");
        let view = StagePresenter::present_groups(&fx.store, fx.stage).expect("present");
        assert_eq!(view.groups[0].scores["Anand"]["Botvinnik"], None);
    }

    /// S2.3: Other stages are untouched by a regeneration.
    #[test]
    fn regeneration_is_stage_scoped() {
        let mut fx = fixture(MemoryStore::new(), StageKind::Groups, &EIGHT[..4]);
        let event = fx.event;
        let knockout = fx
            .store
            .transaction(|w| w.insert_stage(event, StageKind::SingleElimination, 2))
            .expect("stage");

        StageGenerator::regenerate(&mut fx.store, knockout, 0).expect("knockout");
        StageGenerator::regenerate(&mut fx.store, fx.stage, 2).expect("groups");
        StageGenerator::regenerate(&mut fx.store, fx.stage, 1).expect("groups again");

        let view = StagePresenter::present_bracket(&fx.store, knockout).expect("present");
        assert_eq!(view.rounds.len(), 2);
    }

    /// S2.4: A started event locks its stages.
    #[test]
    fn started_event_is_locked() {
        let mut fx = fixture(MemoryStore::new(), StageKind::Groups, &EIGHT[..4]);
        StageGenerator::regenerate(&mut fx.store, fx.stage, 2).expect("first");
        let event = fx.event;
        fx.store
            .transaction(|w| w.set_event_status(event, EventStatus::Running))
            .expect("start");

        let before = fx.store.clone();
        let err = StageGenerator::regenerate(&mut fx.store, fx.stage, 1).expect_err("locked");
        assert!(matches!(err, StageError::StageLocked { .. }));
        assert_eq!(fx.store, before);
    }

    /// S2.5: A store failure mid-rebuild leaves the previous structure visible.
    #[test]
    fn failed_rebuild_rolls_back_memory() {
        let mut fx = fixture(MemoryStore::new(), StageKind::Groups, &EIGHT[..5]);
        StageGenerator::regenerate(&mut fx.store, fx.stage, 2).expect("first");
        let before = StagePresenter::present_groups(&fx.store, fx.stage).expect("before");

        let mut flaky = FlakyStore::new(fx.store, 4);
        let roster = flaky
            .snapshot()
            .expect("snapshot")
            .enrolled_participants(fx.event)
            .expect("roster");
        let err = StageGenerator::generate_groups(&mut flaky, fx.stage, &roster, 1)
            .expect_err("injected failure");
        assert!(matches!(err, StageError::Storage(_)));

        let after = StagePresenter::present_groups(&flaky, fx.stage).expect("after");
        assert_eq!(before, after);
    }

    /// S2.6: The same failure on redb aborts the write transaction.
    #[test]
    fn failed_rebuild_rolls_back_redb() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("olympiad.redb")).expect("open db");
        let mut fx = fixture(store, StageKind::SingleElimination, &EIGHT[..6]);
        StageGenerator::regenerate(&mut fx.store, fx.stage, 0).expect("first");
        let before = StagePresenter::present_bracket(&fx.store, fx.stage).expect("before");

        fx.enroll_more(&EIGHT[6..]);
        let roster = fx.roster();
        let mut flaky = FlakyStore::new(fx.store, 10);
        let err = StageGenerator::generate_single_elimination(&mut flaky, fx.stage, &roster)
            .expect_err("injected failure");
        assert!(matches!(err, StageError::Storage(_)));

        let after = StagePresenter::present_bracket(&flaky, fx.stage).expect("after");
        assert_eq!(before, after);
    }

    /// S2.7: Runtime-selected backends regenerate identically.
    #[test]
    fn backends_agree() {
        let temp = tempdir().expect("temp dir");
        let memory = fixture(StorageBackend::default(), StageKind::Groups, &EIGHT);
        let redb = fixture(
            StorageBackend::with_redb(temp.path().join("agree.redb")).expect("open"),
            StageKind::Groups,
            &EIGHT,
        );
        let mut views = Vec::new();
        for mut fx in [memory, redb] {
            StageGenerator::regenerate(&mut fx.store, fx.stage, 3).expect("generate");
            views.push(StagePresenter::present(&fx.store, fx.stage).expect("present"));
        }
        assert_eq!(views[0], views[1]);
    }
}

// =============================================================================
// TIER S3: INTEGRITY AND LOOKUP FAILURES
// =============================================================================

mod s3_failures {
    use super::*;

    /// S3.1: Unknown stage ids are not-found for generators and presenters.
    #[test]
    fn unknown_stage() {
        let mut fx = fixture(MemoryStore::new(), StageKind::Groups, &EIGHT[..2]);
        let missing = StageId(404);
        assert!(
            StageGenerator::regenerate(&mut fx.store, missing, 1)
                .expect_err("generate")
                .is_not_found()
        );
        assert!(
            StagePresenter::present(&fx.store, missing)
                .expect_err("present")
                .is_not_found()
        );
    }

    /// S3.2: A group stage cannot be presented as a bracket and vice versa.
    #[test]
    fn wrong_kind() {
        let fx = fixture(MemoryStore::new(), StageKind::SingleElimination, &[]);
        let err = StagePresenter::present_groups(&fx.store, fx.stage).expect_err("kind");
        assert!(matches!(
            err,
            StageError::WrongStageKind {
                expected: StageKind::Groups,
                actual: StageKind::SingleElimination,
                ..
            }
        ));
    }

    /// S3.3: Stored rows with two finals fail fast on redb too.
    #[test]
    fn corrupt_bracket_on_redb() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("olympiad.redb")).expect("open db");
        let mut fx = fixture(store, StageKind::SingleElimination, &[]);
        let stage = fx.stage;
        fx.store
            .transaction(|w| {
                let g = w.insert_group(stage)?;
                let a = w.insert_match(g)?;
                let b = w.insert_match(g)?;
                w.insert_bracket_link(a, None)?;
                w.insert_bracket_link(b, None)
            })
            .expect("rows");

        let err = StagePresenter::present_bracket(&fx.store, fx.stage).expect_err("corrupt");
        assert!(matches!(err, StageError::CorruptBracket { .. }));
    }
}

// =============================================================================
// FAULT INJECTION
// =============================================================================

/// Store wrapper whose writer fails after a fixed number of inserts.
struct FlakyStore<S> {
    inner: S,
    inserts_before_failure: usize,
}

impl<S> FlakyStore<S> {
    fn new(inner: S, inserts_before_failure: usize) -> Self {
        Self {
            inner,
            inserts_before_failure,
        }
    }
}

impl<S: StageStore> StageStore for FlakyStore<S> {
    type Snapshot<'a>
        = S::Snapshot<'a>
    where
        Self: 'a;

    fn snapshot(&self) -> Result<Self::Snapshot<'_>, StageError> {
        self.inner.snapshot()
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T, StageError>
    where
        F: FnOnce(&mut dyn StageWriter) -> Result<T, StageError>,
    {
        let remaining = self.inserts_before_failure;
        self.inner.transaction(|w| {
            let mut flaky = FlakyWriter {
                inner: w,
                remaining,
            };
            f(&mut flaky)
        })
    }
}

struct FlakyWriter<'a> {
    inner: &'a mut dyn StageWriter,
    remaining: usize,
}

impl FlakyWriter<'_> {
    fn tick(&mut self) -> Result<(), StageError> {
        if self.remaining == 0 {
            return Err(StageError::Storage("connection lost".to_string()));
        }
        self.remaining -= 1;
        Ok(())
    }
}

impl StageWriter for FlakyWriter<'_> {
    fn delete_groups_for_stage(&mut self, stage: StageId) -> Result<usize, StageError> {
        self.inner.delete_groups_for_stage(stage)
    }

    fn insert_group(&mut self, stage: StageId) -> Result<GroupId, StageError> {
        self.tick()?;
        self.inner.insert_group(stage)
    }

    fn insert_group_participant(
        &mut self,
        group: GroupId,
        participant: ParticipantId,
        seed: u32,
    ) -> Result<(), StageError> {
        self.tick()?;
        self.inner.insert_group_participant(group, participant, seed)
    }

    fn insert_match(&mut self, group: GroupId) -> Result<MatchId, StageError> {
        self.tick()?;
        self.inner.insert_match(group)
    }

    fn insert_match_participant(
        &mut self,
        match_id: MatchId,
        participant: ParticipantId,
    ) -> Result<(), StageError> {
        self.tick()?;
        self.inner.insert_match_participant(match_id, participant)
    }

    fn insert_bracket_link(
        &mut self,
        match_id: MatchId,
        next: Option<MatchId>,
    ) -> Result<(), StageError> {
        self.tick()?;
        self.inner.insert_bracket_link(match_id, next)
    }

    fn insert_event(&mut self, name: &str) -> Result<EventId, StageError> {
        self.inner.insert_event(name)
    }

    fn set_event_status(&mut self, event: EventId, status: EventStatus) -> Result<(), StageError> {
        self.inner.set_event_status(event, status)
    }

    fn insert_stage(
        &mut self,
        event: EventId,
        kind: StageKind,
        order: u32,
    ) -> Result<StageId, StageError> {
        self.inner.insert_stage(event, kind, order)
    }

    fn insert_participant(
        &mut self,
        kind: ParticipantKind,
        name: &str,
    ) -> Result<ParticipantId, StageError> {
        self.inner.insert_participant(kind, name)
    }

    fn enroll(&mut self, event: EventId, participant: ParticipantId) -> Result<(), StageError> {
        self.inner.enroll(event, participant)
    }

    fn record_score(
        &mut self,
        match_id: MatchId,
        participant: ParticipantId,
        score: i64,
    ) -> Result<(), StageError> {
        self.inner.record_score(match_id, participant, score)
    }
}
