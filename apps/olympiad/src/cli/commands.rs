//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::render::{render_bracket, render_groups, render_summary};
use crate::config::{Backend, Settings};
use olympiad_core::seeding::{bracket_size, standard_seeding};
use olympiad_core::{
    EventId, EventStatus, MatchId, MemoryStore, ParticipantId, ParticipantKind, StageError,
    StageGenerator, StageId, StageKind, StagePresenter, StageStore, StageView, StageWriter,
    StorageBackend, formats::MAX_PERSISTENCE_PAYLOAD_SIZE, primitives::MAX_PARTICIPANTS,
    store_from_bytes, store_to_bytes,
};
use fslock::LockFile;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty database.
pub fn cmd_init(settings: &Settings, force: bool) -> Result<(), StageError> {
    let path = &settings.database;
    let _lock = WriterLock::acquire(path)?;
    if path.exists() {
        if !force {
            return Err(StageError::InvalidArgument(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(path)
            .map_err(|e| StageError::Storage(format!("Remove db: {}", e)))?;
    }

    let backend = match settings.backend {
        Backend::Redb => StorageBackend::with_redb(path)?,
        Backend::File => StorageBackend::InMemory(MemoryStore::new()),
    };
    save_backend(&backend, path)?;

    tracing::info!(
        database = %path.display(),
        backend = %settings.backend,
        persistent = backend.is_persistent(),
        "database initialized"
    );
    emit(
        settings,
        &serde_json::json!({
            "database": path.to_string_lossy(),
            "backend": settings.backend.to_string(),
        }),
        || format!("Initialized new {} database at {:?}", settings.backend, path),
    )
}

/// Reclaim free space in a redb database.
pub fn cmd_compact(settings: &Settings) -> Result<(), StageError> {
    require_database(&settings.database)?;
    let _lock = WriterLock::acquire(&settings.database)?;
    let mut backend = open_backend(settings)?;
    let compacted = match &mut backend {
        StorageBackend::Persistent(store) => {
            store.compact()?;
            true
        }
        // Snapshot files are rewritten whole on every save.
        StorageBackend::InMemory(_) => false,
    };

    tracing::info!(database = %settings.database.display(), compacted, "compaction finished");
    emit(
        settings,
        &serde_json::json!({
            "database": settings.database.to_string_lossy(),
            "compacted": compacted,
        }),
        || {
            if compacted {
                format!("Compacted {:?}", settings.database)
            } else {
                format!("Nothing to compact for {} backend", settings.backend)
            }
        },
    )
}

// =============================================================================
// REGISTRATION COMMANDS
// =============================================================================

/// Register an event.
pub fn cmd_event_add(settings: &Settings, name: &str) -> Result<(), StageError> {
    let name = non_empty(name, "event name")?;
    let id = mutate(settings, |w| w.insert_event(name))?;
    emit(
        settings,
        &serde_json::json!({ "event": id, "name": name, "status": EventStatus::Registration.as_str() }),
        || format!("Event {} '{}' created", id, name),
    )
}

/// Move an event to another lifecycle status.
pub fn cmd_event_status(settings: &Settings, event: u64, status: &str) -> Result<(), StageError> {
    let status: EventStatus = status.parse()?;
    let event = EventId(event);
    mutate(settings, |w| w.set_event_status(event, status))?;
    tracing::info!(event = %event, status = %status, "event status changed");
    emit(
        settings,
        &serde_json::json!({ "event": event, "status": status.as_str() }),
        || format!("Event {} is now {}", event, status),
    )
}

/// Add a stage to an event.
pub fn cmd_stage_add(
    settings: &Settings,
    event: u64,
    kind: &str,
    order: u32,
) -> Result<(), StageError> {
    let kind: StageKind = kind.parse()?;
    let event = EventId(event);
    let id = mutate(settings, |w| w.insert_stage(event, kind, order))?;
    emit(
        settings,
        &serde_json::json!({ "stage": id, "event": event, "kind": kind, "order": order }),
        || format!("Stage {} ({}) added to event {}", id, kind, event),
    )
}

/// Register a player or team.
pub fn cmd_participant_add(settings: &Settings, name: &str, team: bool) -> Result<(), StageError> {
    let name = non_empty(name, "participant name")?;
    let kind = if team {
        ParticipantKind::Team
    } else {
        ParticipantKind::Player
    };
    let id = mutate(settings, |w| w.insert_participant(kind, name))?;
    emit(
        settings,
        &serde_json::json!({ "participant": id, "name": name, "kind": kind }),
        || format!("Participant {} '{}' registered", id, name),
    )
}

/// Enroll a participant in an event.
pub fn cmd_enroll(settings: &Settings, event: u64, participant: u64) -> Result<(), StageError> {
    let (event, participant) = (EventId(event), ParticipantId(participant));
    mutate(settings, |w| w.enroll(event, participant))?;
    emit(
        settings,
        &serde_json::json!({ "event": event, "participant": participant }),
        || format!("Participant {} enrolled in event {}", participant, event),
    )
}

/// Record a score for a participant of a match.
pub fn cmd_score(
    settings: &Settings,
    match_id: u64,
    participant: u64,
    score: i64,
) -> Result<(), StageError> {
    let (match_id, participant) = (MatchId(match_id), ParticipantId(participant));
    mutate(settings, |w| w.record_score(match_id, participant, score))?;
    emit(
        settings,
        &serde_json::json!({ "match": match_id, "participant": participant, "score": score }),
        || format!("Match {}: participant {} scored {}", match_id, participant, score),
    )
}

// =============================================================================
// GENERATE COMMAND
// =============================================================================

/// Rebuild a stage from its event roster.
pub fn cmd_generate(
    settings: &Settings,
    stage: u64,
    groups: Option<usize>,
) -> Result<(), StageError> {
    let stage = StageId(stage);
    let group_count = groups.unwrap_or(settings.default_group_count);

    require_database(&settings.database)?;
    let _lock = WriterLock::acquire(&settings.database)?;
    let mut backend = open_backend(settings)?;
    let summary = StageGenerator::regenerate(&mut backend, stage, group_count)?;
    save_backend(&backend, &settings.database)?;

    tracing::info!(
        stage = %summary.stage,
        kind = %summary.kind,
        participants = summary.participants,
        groups = summary.groups,
        matches = summary.matches,
        byes = summary.byes,
        "stage generated"
    );
    if summary.participants < olympiad_core::primitives::MIN_PARTICIPANTS {
        tracing::warn!(stage = %stage, "fewer than two participants enrolled; stage left empty");
    }

    emit(settings, &summary, || render_summary(&summary))
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Render a stage.
pub fn cmd_show(settings: &Settings, stage: u64) -> Result<(), StageError> {
    let stage = StageId(stage);
    let backend = open_backend(settings)?;
    let view = StagePresenter::present(&backend, stage)?;

    match &view {
        StageView::Groups(groups) => tracing::info!(
            stage = %stage,
            groups = groups.groups.len(),
            participants = groups.total_participants,
            "groups stage presented"
        ),
        StageView::SingleElimination(bracket) => tracing::info!(
            stage = %stage,
            rounds = bracket.rounds.len(),
            "bracket stage presented"
        ),
    }

    emit(settings, &view, || match &view {
        StageView::Groups(groups) => render_groups(groups),
        StageView::SingleElimination(bracket) => render_bracket(bracket),
    })
}

// =============================================================================
// SEEDING COMMAND
// =============================================================================

/// Print the standard seeding order and first-round pairs.
pub fn cmd_seeding(settings: &Settings, size: usize) -> Result<(), StageError> {
    if size == 0 || size > MAX_PARTICIPANTS {
        return Err(StageError::InvalidArgument(format!(
            "Bracket size must be between 1 and {}",
            MAX_PARTICIPANTS
        )));
    }
    let size = bracket_size(size);
    let seeds = standard_seeding(size);
    let pairs: Vec<[usize; 2]> = seeds.chunks_exact(2).map(|p| [p[0], p[1]]).collect();

    emit(
        settings,
        &serde_json::json!({ "size": size, "seeds": seeds, "pairs": pairs }),
        || {
            let mut out = format!("Bracket size {}\n", size);
            for (i, [a, b]) in pairs.iter().enumerate() {
                out.push_str(&format!("  Match {}: seed {} vs seed {}\n", i + 1, a, b));
            }
            out
        },
    )
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Print `value` as JSON in json mode, otherwise the text built by `text`.
fn emit<T: Serialize>(
    settings: &Settings,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<(), StageError> {
    if settings.json_mode {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StageError::Serialization(e.to_string()))?;
        println!("{}", json);
    } else {
        let text = text();
        println!("{}", text.trim_end());
    }
    Ok(())
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str, StageError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StageError::InvalidArgument(format!("{} must not be empty", what)));
    }
    Ok(trimmed)
}

/// Run one write transaction against the configured store and persist it.
fn mutate<T>(
    settings: &Settings,
    f: impl FnOnce(&mut dyn StageWriter) -> Result<T, StageError>,
) -> Result<T, StageError> {
    require_database(&settings.database)?;
    let _lock = WriterLock::acquire(&settings.database)?;
    let mut backend = open_backend(settings)?;
    let out = backend.transaction(f)?;
    save_backend(&backend, &settings.database)?;
    Ok(out)
}

/// Open the configured store. The database must have been created by `init`.
pub fn open_backend(settings: &Settings) -> Result<StorageBackend, StageError> {
    let path = &settings.database;
    require_database(path)?;
    match settings.backend {
        Backend::Redb => StorageBackend::with_redb(path),
        Backend::File => {
            let metadata = std::fs::metadata(path)
                .map_err(|e| StageError::Storage(format!("Cannot read file metadata: {}", e)))?;
            if metadata.len() > MAX_PERSISTENCE_PAYLOAD_SIZE as u64 {
                return Err(StageError::Serialization(format!(
                    "File size {} bytes exceeds maximum allowed {} bytes",
                    metadata.len(),
                    MAX_PERSISTENCE_PAYLOAD_SIZE
                )));
            }
            let data =
                std::fs::read(path).map_err(|e| StageError::Storage(format!("Read db: {}", e)))?;
            Ok(StorageBackend::InMemory(store_from_bytes(&data)?))
        }
    }
}

fn require_database(path: &Path) -> Result<(), StageError> {
    if path.exists() {
        Ok(())
    } else {
        Err(StageError::DatabaseNotFound(format!(
            "{} (run `olympiad init` first)",
            path.display()
        )))
    }
}

/// Persist an in-memory store to its snapshot file. redb commits on its own.
///
/// The snapshot is written to a sibling temp file, synced, then renamed over
/// `path`, so readers see either the previous file or the new one.
pub fn save_backend(backend: &StorageBackend, path: &Path) -> Result<(), StageError> {
    let Some(store) = backend.as_memory() else {
        return Ok(());
    };
    let data = store_to_bytes(store)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| StageError::Storage(format!("Create temp file: {}", e)))?;
    temp.write_all(&data)
        .map_err(|e| StageError::Storage(format!("Write db: {}", e)))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StageError::Storage(format!("Sync db: {}", e)))?;
    temp.persist(path)
        .map_err(|e| StageError::Storage(format!("Replace db: {}", e)))?;
    Ok(())
}

/// Exclusive advisory lock on `<database>.lock`, held across one read-modify-write.
struct WriterLock {
    _file: LockFile,
}

impl WriterLock {
    fn acquire(database: &Path) -> Result<Self, StageError> {
        let mut name = database.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        let mut file = LockFile::open(path.as_path())
            .map_err(|e| StageError::Storage(format!("Open lock {}: {}", path.display(), e)))?;
        file.lock()
            .map_err(|e| StageError::Storage(format!("Lock {}: {}", path.display(), e)))?;
        Ok(Self { _file: file })
    }
}
