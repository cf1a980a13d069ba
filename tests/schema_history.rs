//! Behaviour of the revision history against the in-memory catalog
//!
//! Every property here runs the real revisions from `scribe::versions`
//! through the `Migrator`, exactly as a live run would.

use scribe::executor::DbError;
use scribe::migration::{
    Direction, DowngradeHazard, MemoryTarget, Migration, MigrationError, Migrator,
    MigratorOptions, ReferentialAction, RevisionChain, SchemaManager, SchemaTarget,
};
use scribe::versions::{self, HEAD};
use serde_json::json;

const ROOT: &str = "5befe308fa8b";
const TIMEZONE: &str = "2e961e0e3655";
const NOTES: &str = "28b3d11b4fd5";
const CASCADE: &str = "97848cbe17e9";

fn migrator() -> Migrator {
    Migrator::new(versions::chain().unwrap()).with_options(MigratorOptions {
        lock_timeout_seconds: 0,
        allow_lossy: false,
    })
}

fn lossy_migrator() -> Migrator {
    Migrator::new(versions::chain().unwrap()).with_options(MigratorOptions {
        lock_timeout_seconds: 0,
        allow_lossy: true,
    })
}

fn target_at(revision: &str) -> MemoryTarget {
    let target = MemoryTarget::new();
    migrator().upgrade(&target, revision).unwrap();
    assert_eq!(target.current_revision().unwrap().as_deref(), Some(revision));
    target
}

fn insert_meeting(target: &MemoryTarget, start_time: &str) -> serde_json::Value {
    let row = target
        .insert_row("meetings", json!({"title": "standup", "start_time": start_time}))
        .unwrap();
    row["id"].clone()
}

fn insert_transcription(target: &MemoryTarget, table: &str, meeting_id: &serde_json::Value) {
    target
        .insert_row(
            table,
            json!({
                "meeting_id": meeting_id,
                "session_uid": "session-1",
                "speaker": "alice",
                "text": "hello",
                "start_time": 0.0,
                "end_time": 1.5,
            }),
        )
        .unwrap();
}

#[test]
fn base_to_head_leaves_current_revision_at_head() {
    let target = MemoryTarget::new();
    let summary = migrator().upgrade(&target, "head").unwrap();

    assert_eq!(summary.from, None);
    assert_eq!(summary.to.as_deref(), Some(HEAD));
    let applied: Vec<&str> = summary.steps.iter().map(|s| s.revision.as_str()).collect();
    assert_eq!(applied, vec![ROOT, TIMEZONE, NOTES, CASCADE]);
    assert_eq!(target.current_revision().unwrap().as_deref(), Some(HEAD));

    let history = target.history().unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|r| r.direction == Direction::Up));

    // a second run has nothing to do
    assert!(migrator().upgrade(&target, "head").unwrap().is_noop());
}

#[test]
fn adjacent_up_down_restores_schema() {
    let chain = versions::chain().unwrap();
    for migration in chain.iter() {
        let target = MemoryTarget::new();
        if let Some(parent) = migration.down_revision() {
            migrator().upgrade(&target, parent).unwrap();
        }
        let before = target.snapshot();

        lossy_migrator()
            .apply_step(&target, migration.revision(), Direction::Up)
            .unwrap();
        assert_ne!(target.snapshot(), before, "{} changed nothing", migration.revision());

        lossy_migrator()
            .apply_step(&target, migration.revision(), Direction::Down)
            .unwrap();
        assert_eq!(target.snapshot(), before, "{} did not round-trip", migration.revision());
        assert_eq!(
            target.current_revision().unwrap().as_deref(),
            migration.down_revision()
        );
    }
}

#[test]
fn full_chain_round_trip_report_is_clean() {
    let report = migrator().verify_round_trips().unwrap();
    assert!(report.is_ok(), "{report:?}");
    assert_eq!(report.head.as_deref(), Some(HEAD));
    assert_eq!(report.steps.len(), 4);
}

#[test]
fn lossy_steps_declare_their_hazards() {
    let chain = versions::chain().unwrap();

    let timezone = chain.get(TIMEZONE).unwrap().downgrade_hazards();
    assert_eq!(timezone.len(), 2);
    assert!(timezone.iter().all(|h| matches!(
        h,
        DowngradeHazard::TimestampNarrowing { table, .. } if table == "meetings"
    )));

    let notes = chain.get(NOTES).unwrap().downgrade_hazards();
    assert_eq!(
        notes,
        vec![DowngradeHazard::TableDrop {
            revision: NOTES.to_string(),
            table: "transcription_notes".to_string(),
        }]
    );

    assert!(chain.get(CASCADE).unwrap().downgrade_hazards().is_empty());
}

#[test]
fn lossy_downgrade_requires_confirmation() {
    let target = target_at(HEAD);

    // dropping the cascade rules loses nothing
    migrator().downgrade(&target, NOTES).unwrap();

    let fingerprint = target.fingerprint().unwrap();
    let err = migrator().downgrade(&target, TIMEZONE).unwrap_err();
    match err {
        MigrationError::LossyDowngrade { hazards } => {
            assert_eq!(hazards.len(), 1);
            assert!(hazards[0].to_string().contains("transcription_notes"));
        }
        other => panic!("expected LossyDowngrade, got {other:?}"),
    }
    assert_eq!(target.fingerprint().unwrap(), fingerprint);
    assert_eq!(target.current_revision().unwrap().as_deref(), Some(NOTES));

    lossy_migrator().downgrade(&target, TIMEZONE).unwrap();
    assert!(!target.has_table("transcription_notes"));
}

#[test]
fn clone_drop_discards_note_rows() {
    let target = target_at(NOTES);
    let meeting = insert_meeting(&target, "2024-05-01T10:00:00+00:00");
    insert_transcription(&target, "transcription_notes", &meeting);
    assert_eq!(target.row_count("transcription_notes").unwrap(), 1);

    lossy_migrator().downgrade(&target, TIMEZONE).unwrap();
    migrator().upgrade(&target, NOTES).unwrap();

    assert_eq!(target.row_count("transcription_notes").unwrap(), 0);
}

#[test]
fn timezone_downgrade_discards_offsets() {
    let target = target_at(TIMEZONE);
    let meeting = insert_meeting(&target, "2024-05-01T10:00:00+02:00");

    lossy_migrator().downgrade(&target, ROOT).unwrap();
    let rows = target.rows("meetings").unwrap();
    assert_eq!(rows[0]["start_time"], json!("2024-05-01T08:00:00"));

    migrator().upgrade(&target, TIMEZONE).unwrap();
    let rows = target.rows("meetings").unwrap();
    assert_eq!(rows[0]["id"], meeting);
    assert_eq!(rows[0]["start_time"], json!("2024-05-01T08:00:00+00:00"));
}

#[test]
fn mismatched_step_is_refused_without_touching_schema() {
    let target = target_at(ROOT);
    let fingerprint = target.fingerprint().unwrap();

    let err = migrator().apply_step(&target, NOTES, Direction::Up).unwrap_err();
    match err {
        MigrationError::RevisionMismatch {
            revision,
            direction,
            expected,
            found,
        } => {
            assert_eq!(revision, NOTES);
            assert_eq!(direction, Direction::Up);
            assert_eq!(expected.as_deref(), Some(TIMEZONE));
            assert_eq!(found.as_deref(), Some(ROOT));
        }
        other => panic!("expected RevisionMismatch, got {other:?}"),
    }

    let err = migrator().apply_step(&target, CASCADE, Direction::Down).unwrap_err();
    assert!(matches!(err, MigrationError::RevisionMismatch { .. }));

    assert_eq!(target.fingerprint().unwrap(), fingerprint);
    assert_eq!(target.current_revision().unwrap().as_deref(), Some(ROOT));
    assert_eq!(target.history().unwrap().len(), 1);
}

#[test]
fn transcription_notes_indexes_before_and_after_cascade_step() {
    let target = target_at(NOTES);
    assert_eq!(
        target.index_names("transcription_notes"),
        vec![
            "transcription_notes_id_idx",
            "transcription_notes_meeting_id_idx",
            "transcription_notes_meeting_id_start_time_idx",
            "transcription_notes_pkey",
            "transcription_notes_session_uid_idx",
        ]
    );
    assert!(target
        .foreign_key("transcription_notes", "transcription_notes_meeting_id_fkey")
        .is_none());

    migrator().upgrade(&target, CASCADE).unwrap();
    assert_eq!(
        target.index_names("transcription_notes"),
        vec![
            "ix_transcription_notes_id",
            "ix_transcription_notes_meeting_id",
            "ix_transcription_notes_session_uid",
            "transcription_notes_pkey",
        ]
    );
    for name in [
        "ix_transcription_notes_id",
        "ix_transcription_notes_meeting_id",
        "ix_transcription_notes_session_uid",
    ] {
        assert!(!target.index(name).unwrap().unique, "{name} must not be unique");
    }

    for (table, fk) in [
        ("meeting_sessions", "meeting_sessions_meeting_id_fkey"),
        ("transcriptions", "transcriptions_meeting_id_fkey"),
        ("transcription_notes", "transcription_notes_meeting_id_fkey"),
    ] {
        let fk = target.foreign_key(table, fk).unwrap();
        assert_eq!(fk.on_delete, ReferentialAction::Cascade);
        assert_eq!(fk.ref_table, "meetings");
    }

    migrator().downgrade(&target, NOTES).unwrap();
    assert_eq!(
        target.index_names("transcription_notes"),
        vec![
            "transcription_notes_id_idx",
            "transcription_notes_meeting_id_idx",
            "transcription_notes_meeting_id_start_time_idx",
            "transcription_notes_pkey",
            "transcription_notes_session_uid_idx",
        ]
    );
    assert!(target
        .foreign_key("transcription_notes", "transcription_notes_meeting_id_fkey")
        .is_none());
}

#[test]
fn deleting_a_meeting_cascades_after_head() {
    let target = target_at(HEAD);
    let meeting = insert_meeting(&target, "2024-05-01T10:00:00+00:00");
    let other = insert_meeting(&target, "2024-05-02T10:00:00+00:00");
    target
        .insert_row("meeting_sessions", json!({"meeting_id": meeting, "session_uid": "session-1"}))
        .unwrap();
    insert_transcription(&target, "transcriptions", &meeting);
    insert_transcription(&target, "transcription_notes", &meeting);
    insert_transcription(&target, "transcriptions", &other);

    assert_eq!(target.delete_where("meetings", "id", meeting).unwrap(), 1);

    assert_eq!(target.row_count("meeting_sessions").unwrap(), 0);
    assert_eq!(target.row_count("transcriptions").unwrap(), 1);
    assert_eq!(target.row_count("transcription_notes").unwrap(), 0);
    assert_eq!(target.row_count("meetings").unwrap(), 1);
}

#[test]
fn deleting_a_referenced_meeting_fails_before_cascade_step() {
    let target = target_at(NOTES);
    let meeting = insert_meeting(&target, "2024-05-01T10:00:00+00:00");
    target
        .insert_row("meeting_sessions", json!({"meeting_id": meeting, "session_uid": "session-1"}))
        .unwrap();

    let err = target.delete_where("meetings", "id", meeting).unwrap_err();
    assert!(err.to_string().contains("meeting_sessions_meeting_id_fkey"));
    assert_eq!(target.row_count("meetings").unwrap(), 1);
}

#[test]
fn clone_table_copies_structure_but_not_rows() {
    let target = target_at(TIMEZONE);
    let meeting = insert_meeting(&target, "2024-05-01T10:00:00+00:00");
    insert_transcription(&target, "transcriptions", &meeting);

    migrator().upgrade(&target, NOTES).unwrap();

    assert!(target.has_table("transcription_notes"));
    assert_eq!(target.row_count("transcription_notes").unwrap(), 0);
    assert_eq!(target.row_count("transcriptions").unwrap(), 1);

    let snapshot = target.snapshot();
    assert_eq!(
        snapshot.tables["transcription_notes"].columns,
        snapshot.tables["transcriptions"].columns
    );
    assert!(snapshot.tables["transcription_notes"].foreign_keys.is_empty());
}

/// Creates a table, then fails on an index that does not exist
struct BrokenRevision;

impl Migration for BrokenRevision {
    fn revision(&self) -> &str {
        "ffffffffffff"
    }
    fn down_revision(&self) -> Option<&str> {
        Some(HEAD)
    }
    fn description(&self) -> &str {
        "broken"
    }
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.create_table_like("scratch", "meetings")?;
        manager.drop_index("scratch", "no_such_index")
    }
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        manager.drop_table("scratch")
    }
}

#[test]
fn failing_step_rolls_back_completely() {
    let target = target_at(HEAD);
    let fingerprint = target.fingerprint().unwrap();

    let mut revisions = versions::all();
    revisions.push(Box::new(BrokenRevision));
    let migrator = Migrator::new(RevisionChain::new(revisions).unwrap());

    let err = migrator.upgrade(&target, "head").unwrap_err();
    match err {
        MigrationError::DdlExecution {
            revision,
            direction,
            source,
        } => {
            assert_eq!(revision, "ffffffffffff");
            assert_eq!(direction, Direction::Up);
            assert!(source.to_string().contains("no_such_index"));
        }
        other => panic!("expected DdlExecution, got {other:?}"),
    }

    assert!(!target.has_table("scratch"));
    assert_eq!(target.fingerprint().unwrap(), fingerprint);
    assert_eq!(target.current_revision().unwrap().as_deref(), Some(HEAD));
    assert_eq!(target.history().unwrap().len(), 4);
    assert!(!target.is_locked());
}

#[test]
fn held_lock_times_out() {
    let target = MemoryTarget::new();
    assert!(target.try_lock().unwrap());

    let err = migrator().upgrade(&target, "head").unwrap_err();
    assert!(matches!(err, MigrationError::LockTimeout(_)));
    assert_eq!(target.current_revision().unwrap(), None);
    assert!(!target.has_table("meetings"));

    target.unlock().unwrap();
    migrator().upgrade(&target, "head").unwrap();
    assert!(!target.is_locked());
}

#[test]
fn commands_refuse_the_wrong_direction() {
    let target = target_at(HEAD);
    let err = migrator().upgrade(&target, "base").unwrap_err();
    assert!(matches!(
        err,
        MigrationError::DirectionMismatch { requested: Direction::Up, .. }
    ));

    let empty = MemoryTarget::new();
    let err = migrator().downgrade(&empty, "head").unwrap_err();
    assert!(matches!(
        err,
        MigrationError::DirectionMismatch { requested: Direction::Down, .. }
    ));
}

#[test]
fn relative_and_prefix_targets() {
    let target = MemoryTarget::new();
    let summary = migrator().upgrade(&target, "+2").unwrap();
    assert_eq!(summary.to.as_deref(), Some(TIMEZONE));

    migrator().upgrade(&target, "28b3").unwrap();
    assert_eq!(target.current_revision().unwrap().as_deref(), Some(NOTES));

    lossy_migrator().downgrade(&target, "-1").unwrap();
    assert_eq!(target.current_revision().unwrap().as_deref(), Some(TIMEZONE));

    let err = migrator().upgrade(&target, "zzz").unwrap_err();
    assert!(matches!(err, MigrationError::UnknownRevision(_)));
}

#[test]
fn stamp_sets_revision_without_ddl() {
    let target = MemoryTarget::new();
    let stamped = migrator().stamp(&target, "head").unwrap();
    assert_eq!(stamped.as_deref(), Some(HEAD));
    assert_eq!(target.current_revision().unwrap().as_deref(), Some(HEAD));
    assert!(!target.has_table("meetings"));

    migrator().stamp(&target, "base").unwrap();
    assert_eq!(target.current_revision().unwrap(), None);
}

#[test]
fn status_splits_applied_and_pending() {
    let target = target_at(TIMEZONE);
    let status = migrator().status(&target).unwrap();

    assert_eq!(status.current.as_deref(), Some(TIMEZONE));
    let applied: Vec<&str> = status.applied.iter().map(|r| r.revision.as_str()).collect();
    assert_eq!(applied, vec![ROOT, TIMEZONE]);
    let pending: Vec<&str> = status.pending.iter().map(|r| r.revision.as_str()).collect();
    assert_eq!(pending, vec![NOTES, CASCADE]);
    assert_eq!(status.next_pending(), Some(NOTES));
    assert!(!status.is_up_to_date());
    assert_eq!(status.history.len(), 2);
}
