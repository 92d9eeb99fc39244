use pretty_assertions::assert_eq;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use debrief_core::db;
use debrief_core::demo::{insert_incident, seed_demo_dataset, NewIncident};
use debrief_core::ops::generate_analysis_at;

fn ts(s: &str) -> OffsetDateTime {
    OffsetDateTime::parse(s, &Rfc3339).expect("test timestamp")
}

fn seeded() -> (rusqlite::Connection, i64) {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    let summary = seed_demo_dataset(&mut conn).expect("seed");
    (conn, summary.focal_incident_id)
}

#[test]
fn resolved_incident_debrief_metrics() {
    let (conn, focal) = seeded();
    let env = generate_analysis_at(&conn, Some(focal), ts("2026-03-02T00:00:00Z"));
    assert!(env.success, "analysis failed: {:?}", env.error);
    let debrief = env.debrief.expect("debrief");

    // Opened 08:00, resolved 14:30.
    assert_eq!(debrief.resolution_time.seconds, 6 * 3600 + 30 * 60);
    assert_eq!(debrief.resolution_time.display, "6 hours, 30 minutes");
    assert!(debrief.resolution_time.is_resolved);

    // First note not authored by the opener lands at 08:20.
    assert_eq!(debrief.first_response_time.seconds, 20 * 60);
    assert_eq!(debrief.first_response_time.display, "20 minutes");
    assert_eq!(
        debrief.first_response_time.responder.as_deref(),
        Some("dana.okafor")
    );

    assert_eq!(debrief.handoff_count, 1);
    assert_eq!(
        debrief.groups_involved,
        vec!["Service Desk".to_string(), "Database Ops".to_string()]
    );

    assert_eq!(debrief.note_counts.comments, 2);
    assert_eq!(debrief.note_counts.work_notes, 1);
    assert_eq!(debrief.note_counts.total, 3);
    assert_eq!(debrief.state_changes, 2);
    assert_eq!(debrief.priority_changes, 1);
    assert_eq!(debrief.reopen_count, 0);
}

#[test]
fn documented_reopen_free_resolution_scores_ninety() {
    let (conn, focal) = seeded();
    let env = generate_analysis_at(&conn, Some(focal), ts("2026-03-02T00:00:00Z"));
    let quality = env.debrief.expect("debrief").resolution_quality;

    assert_eq!(quality.score, 90);
    assert_eq!(
        quality.factors,
        vec![
            "Resolution code documented".to_string(),
            "Provides actionable resolution type".to_string(),
            "No reopens - permanent solution".to_string(),
        ]
    );
}

#[test]
fn hierarchy_and_sla_scores() {
    let (conn, focal) = seeded();
    let env = generate_analysis_at(&conn, Some(focal), ts("2026-03-02T00:00:00Z"));
    let debrief = env.debrief.expect("debrief");

    // Parent (+3), two children (+2), open problem (+2 +1).
    assert_eq!(debrief.hierarchy_complexity.score, 8);
    assert!(debrief
        .hierarchy_complexity
        .factors
        .contains(&"Part of parent incident chain".to_string()));
    assert!(debrief
        .hierarchy_complexity
        .factors
        .contains(&"2 child incidents spawned".to_string()));
    assert!(debrief
        .hierarchy_complexity
        .factors
        .contains(&"Linked to active problem".to_string()));

    // Four SLAs, one breached.
    assert_eq!(debrief.sla_compliance.total_slas, 4);
    assert_eq!(debrief.sla_compliance.breaches, 1);
    assert_eq!(debrief.sla_compliance.score, 75);
    assert_eq!(debrief.sla_compliance.factors, vec!["1 SLA breaches".to_string()]);
}

#[test]
fn cause_summary_falls_back_to_first_substantial_note() {
    let (conn, focal) = seeded();
    let env = generate_analysis_at(&conn, Some(focal), ts("2026-03-02T00:00:00Z"));
    let debrief = env.debrief.expect("debrief");

    assert_eq!(
        debrief.cause_summary,
        "Issue described as: Automated alert: connection pool saturation on payments-db-01"
    );
}

#[test]
fn open_incident_measures_against_injected_now() {
    let (conn, _) = seeded();
    let mut open = NewIncident::named("INC0040001", "Still burning");
    open.opened_at = Some("2026-06-01T00:00:00Z".to_string());
    open.updated_at = "2026-06-01T00:00:00Z".to_string();
    let id = insert_incident(&conn, &open).expect("insert");

    let env = generate_analysis_at(&conn, Some(id), ts("2026-06-01T01:00:00Z"));
    assert!(env.success, "analysis failed: {:?}", env.error);
    let rt = env.debrief.expect("debrief").resolution_time;
    assert_eq!(rt.seconds, 3600);
    assert!(!rt.is_resolved);
}

#[test]
fn missing_opening_time_yields_unknown_resolution() {
    let (conn, _) = seeded();
    let id = insert_incident(&conn, &NewIncident::named("INC0040002", "No open timestamp"))
        .expect("insert");

    let env = generate_analysis_at(&conn, Some(id), ts("2026-06-01T00:00:00Z"));
    assert!(env.success, "analysis failed: {:?}", env.error);
    let debrief = env.debrief.expect("debrief");
    assert_eq!(debrief.resolution_time.display, "Unknown - no opening time");
    assert_eq!(debrief.resolution_time.seconds, 0);
}
