use debrief_core::db;
use debrief_core::demo::{insert_history, insert_incident, insert_journal, NewIncident};
use debrief_core::domain::{JournalKind, TimelineEvent};
use debrief_core::timeline::build_timeline;

fn setup() -> (rusqlite::Connection, i64) {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    let incident_id = insert_incident(
        &conn,
        &NewIncident::named("INC0030001", "Timeline fixture"),
    )
    .expect("insert");
    (conn, incident_id)
}

#[test]
fn merged_timeline_is_chronological() {
    let (conn, id) = setup();
    insert_journal(
        &conn,
        id,
        JournalKind::Comment,
        "2026-05-01T09:30:00Z",
        "caller.one",
        "Still broken after reboot",
    )
    .expect("journal");
    insert_history(
        &conn,
        id,
        "state",
        Some("1"),
        Some("2"),
        "2026-05-01T09:00:00Z",
        "ops.engineer",
    )
    .expect("history");
    insert_history(
        &conn,
        id,
        "priority",
        Some("3"),
        Some("2"),
        "2026-05-01T10:00:00Z",
        "ops.engineer",
    )
    .expect("history");

    let timeline = build_timeline(&conn, id).expect("timeline");
    assert_eq!(timeline.len(), 3);
    for pair in timeline.windows(2) {
        assert!(
            pair[0].timestamp() <= pair[1].timestamp(),
            "timeline out of order: {} > {}",
            pair[0].timestamp(),
            pair[1].timestamp()
        );
    }
}

#[test]
fn unchanged_field_lines_are_dropped() {
    let (conn, id) = setup();
    insert_history(
        &conn,
        id,
        "category",
        Some("Software"),
        Some("Software"),
        "2026-05-01T09:00:00Z",
        "ops.engineer",
    )
    .expect("history");
    insert_history(
        &conn,
        id,
        "category",
        Some("Software"),
        Some("Hardware"),
        "2026-05-01T09:05:00Z",
        "ops.engineer",
    )
    .expect("history");

    let timeline = build_timeline(&conn, id).expect("timeline");
    assert_eq!(timeline.len(), 1);
    match &timeline[0] {
        TimelineEvent::FieldChange {
            change_description, ..
        } => {
            assert_eq!(
                change_description,
                "Category changed from \"Software\" to \"Hardware\""
            );
        }
        other => panic!("expected field change, got {other:?}"),
    }
}

#[test]
fn unwatched_fields_never_surface() {
    let (conn, id) = setup();
    insert_history(
        &conn,
        id,
        "short_description",
        Some("old"),
        Some("new"),
        "2026-05-01T09:00:00Z",
        "ops.engineer",
    )
    .expect("history");

    let timeline = build_timeline(&conn, id).expect("timeline");
    assert!(timeline.is_empty());
}

#[test]
fn missing_old_value_renders_as_empty_marker() {
    let (conn, id) = setup();
    insert_history(
        &conn,
        id,
        "assigned_to",
        None,
        Some("dana.okafor"),
        "2026-05-01T09:00:00Z",
        "service.desk",
    )
    .expect("history");

    let timeline = build_timeline(&conn, id).expect("timeline");
    match &timeline[0] {
        TimelineEvent::FieldChange {
            change_description, ..
        } => {
            assert_eq!(
                change_description,
                "Assigned To changed from \"(empty)\" to \"dana.okafor\""
            );
        }
        other => panic!("expected field change, got {other:?}"),
    }
}

#[test]
fn field_changes_precede_notes_at_equal_timestamps() {
    let (conn, id) = setup();
    insert_journal(
        &conn,
        id,
        JournalKind::WorkNote,
        "2026-05-01T09:00:00Z",
        "ops.engineer",
        "Escalating",
    )
    .expect("journal");
    insert_history(
        &conn,
        id,
        "state",
        Some("1"),
        Some("2"),
        "2026-05-01T09:00:00Z",
        "ops.engineer",
    )
    .expect("history");

    let timeline = build_timeline(&conn, id).expect("timeline");
    assert_eq!(timeline.len(), 2);
    assert!(matches!(timeline[0], TimelineEvent::FieldChange { .. }));
    assert!(matches!(timeline[1], TimelineEvent::WorkNote { .. }));
}
