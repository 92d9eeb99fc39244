use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use debrief_core::db;
use debrief_core::demo::seed_demo_dataset;
use debrief_core::ops::generate_analysis_at;

fn ts(s: &str) -> OffsetDateTime {
    OffsetDateTime::parse(s, &Rfc3339).expect("test timestamp")
}

#[test]
fn repeated_analysis_is_byte_identical() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    let summary = seed_demo_dataset(&mut conn).expect("seed");

    let now = ts("2026-03-02T00:00:00Z");
    let first = generate_analysis_at(&conn, Some(summary.focal_incident_id), now);
    let second = generate_analysis_at(&conn, Some(summary.focal_incident_id), now);

    assert!(first.success);
    let first_json = serde_json::to_value(&first).expect("serialize");
    let second_json = serde_json::to_value(&second).expect("serialize");
    assert_eq!(first_json, second_json);
}

#[test]
fn analysis_rejects_missing_and_unknown_ids() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");

    let env = generate_analysis_at(&conn, None, ts("2026-03-02T00:00:00Z"));
    assert!(!env.success);
    assert_eq!(env.error.as_deref(), Some("Incident id is required"));
    assert!(env.incident.is_none());
    assert!(env.timeline.is_none());
    assert!(env.debrief.is_none());

    let env = generate_analysis_at(&conn, Some(424242), ts("2026-03-02T00:00:00Z"));
    assert!(!env.success);
    assert_eq!(env.error.as_deref(), Some("Incident not found"));
}

#[test]
fn success_envelope_carries_all_three_sections() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    let summary = seed_demo_dataset(&mut conn).expect("seed");

    let env = generate_analysis_at(
        &conn,
        Some(summary.focal_incident_id),
        ts("2026-03-02T00:00:00Z"),
    );
    assert!(env.success);
    assert!(env.error.is_none());
    assert!(env.incident.is_some());
    assert!(env.debrief.is_some());
    let timeline = env.timeline.expect("timeline");
    // 4 effective field changes (one no-op line dropped) plus 3 notes.
    assert_eq!(timeline.len(), 7);
}
