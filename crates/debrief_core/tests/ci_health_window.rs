use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use debrief_core::ci_health::StressLevel;
use debrief_core::db;
use debrief_core::demo::{insert_config_item, insert_incident, seed_demo_dataset, NewIncident};
use debrief_core::ops::{ci_health_at, CiHealthData};

fn ts(s: &str) -> OffsetDateTime {
    OffsetDateTime::parse(s, &Rfc3339).expect("test timestamp")
}

fn setup() -> rusqlite::Connection {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    conn
}

fn report(env: debrief_core::ops::CiHealthEnvelope) -> debrief_core::ci_health::CiHealthReport {
    match env.data.expect("data") {
        CiHealthData::Report(report) => *report,
        CiHealthData::Absent(absent) => panic!("expected report, got absence hint: {absent:?}"),
    }
}

#[test]
fn concurrent_incident_burst_flags_high_overload() {
    let conn = setup();
    let ci = insert_config_item(&conn, "core-switch-01", "cmdb_ci_netgear", Some(4)).expect("ci");

    // Focal record references the CI loosely, by name.
    let mut focal = NewIncident::named("INC0060001", "Switch port flapping");
    focal.opened_at = Some("2026-05-10T12:00:00Z".to_string());
    focal.updated_at = "2026-05-10T12:00:00Z".to_string();
    focal.ci_ref = Some("core-switch-01".to_string());
    let focal_id = insert_incident(&conn, &focal).expect("insert");

    for (i, opened) in [
        "2026-05-09T06:00:00Z",
        "2026-05-09T18:00:00Z",
        "2026-05-10T09:00:00Z",
    ]
    .iter()
    .enumerate()
    {
        let mut inc = NewIncident::named(format!("INC006100{i}"), "Switch alert");
        inc.state = "2".to_string();
        inc.opened_at = Some(opened.to_string());
        inc.updated_at = opened.to_string();
        inc.ci_ref = Some(ci.to_string());
        insert_incident(&conn, &inc).expect("insert");
    }

    // Closed in-window incident and an out-of-window one: both excluded.
    let mut closed = NewIncident::named("INC0061008", "Old switch alert");
    closed.state = "7".to_string();
    closed.opened_at = Some("2026-05-10T10:00:00Z".to_string());
    closed.updated_at = "2026-05-10T10:00:00Z".to_string();
    closed.ci_ref = Some(ci.to_string());
    insert_incident(&conn, &closed).expect("insert");

    let mut stale = NewIncident::named("INC0061009", "Ancient switch alert");
    stale.state = "2".to_string();
    stale.opened_at = Some("2026-05-01T12:00:00Z".to_string());
    stale.updated_at = "2026-05-01T12:00:00Z".to_string();
    stale.ci_ref = Some(ci.to_string());
    insert_incident(&conn, &stale).expect("insert");

    let env = ci_health_at(&conn, Some(focal_id), None, ts("2026-05-10T13:00:00Z"));
    assert!(env.success, "expected report: {:?}", env.error);
    let report = report(env);

    assert!(report.ci_present);
    assert_eq!(report.ci_info.name, "core-switch-01");
    assert_eq!(report.time_window.pre_incident_hours, 48);
    assert_eq!(report.time_window.start_time, "2026-05-08T12:00:00Z");
    assert_eq!(report.time_window.incident_opened_at, "2026-05-10T12:00:00Z");

    assert_eq!(report.related_activity.concurrent_incidents.len(), 3);
    assert!(report.related_activity.change_requests.is_empty());
    assert!(report.related_activity.sla_events.is_empty());

    let stress = &report.stress_indicators;
    assert_eq!(stress.overload_indicator, StressLevel::High);
    assert_eq!(stress.stability_risk, StressLevel::Low);
    assert_eq!(stress.health_score, 75);
    assert!(stress
        .correlation_insights
        .contains(&"High incident concurrency - CI may be experiencing related issues".to_string()));
    assert_eq!(report.correlation_score, 3);
}

#[test]
fn demo_dataset_accumulates_change_and_sla_pressure() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    let summary = seed_demo_dataset(&mut conn).expect("seed");

    let env = ci_health_at(
        &conn,
        Some(summary.focal_incident_id),
        None,
        ts("2026-03-02T00:00:00Z"),
    );
    assert!(env.success, "expected report: {:?}", env.error);
    let report = report(env);

    // Three earlier incidents, two non-closed changes, one breached SLA.
    assert_eq!(report.related_activity.concurrent_incidents.len(), 3);
    assert_eq!(report.related_activity.change_requests.len(), 2);
    assert_eq!(
        report
            .related_activity
            .sla_events
            .iter()
            .filter(|s| s.breached)
            .count(),
        1
    );

    let stress = &report.stress_indicators;
    assert_eq!(stress.overload_indicator, StressLevel::High);
    assert_eq!(stress.stability_risk, StressLevel::High);
    assert_eq!(stress.health_score, 100 - 25 - 15 - 20);
    assert!(stress
        .correlation_insights
        .contains(&"RECOMMENDATION: Consider CI maintenance or monitoring enhancement".to_string()));
    assert!(stress.correlation_insights.contains(
        &"RECOMMENDATION: Evaluate change readiness - incident occurred during change window"
            .to_string()
    ));

    assert_eq!(report.correlation_score, 3 + 2 * 2 + 3);
}

#[test]
fn custom_window_hours_are_honored() {
    let conn = setup();
    insert_config_item(&conn, "db-host", "cmdb_ci_server", None).expect("ci");

    let mut focal = NewIncident::named("INC0062001", "Query latency");
    focal.opened_at = Some("2026-05-10T12:00:00Z".to_string());
    focal.updated_at = "2026-05-10T12:00:00Z".to_string();
    focal.ci_ref = Some("db-host".to_string());
    let focal_id = insert_incident(&conn, &focal).expect("insert");

    let env = ci_health_at(&conn, Some(focal_id), Some(24), ts("2026-05-10T13:00:00Z"));
    let report = report(env);
    assert_eq!(report.time_window.pre_incident_hours, 24);
    assert_eq!(report.time_window.start_time, "2026-05-09T12:00:00Z");

    // Non-positive requests fall back to the default.
    let env = ci_health_at(&conn, Some(focal_id), Some(0), ts("2026-05-10T13:00:00Z"));
    let report = self::report(env);
    assert_eq!(report.time_window.pre_incident_hours, 48);
}

#[test]
fn missing_ci_reference_yields_structured_hint() {
    let conn = setup();
    let mut focal = NewIncident::named("INC0063001", "Untracked asset failure");
    focal.opened_at = Some("2026-05-10T12:00:00Z".to_string());
    focal.updated_at = "2026-05-10T12:00:00Z".to_string();
    let focal_id = insert_incident(&conn, &focal).expect("insert");

    let env = ci_health_at(&conn, Some(focal_id), None, ts("2026-05-10T13:00:00Z"));
    assert!(!env.success);
    assert_eq!(
        env.error.as_deref(),
        Some("Configuration Item not connected")
    );
    match env.data.expect("data") {
        CiHealthData::Absent(absent) => {
            assert!(!absent.ci_present);
            assert!(!absent.friendly_message.is_empty());
        }
        CiHealthData::Report(_) => panic!("expected absence hint"),
    }
}

#[test]
fn unresolvable_ci_reference_is_treated_as_absent() {
    let conn = setup();
    let mut focal = NewIncident::named("INC0063002", "Bad CI pointer");
    focal.opened_at = Some("2026-05-10T12:00:00Z".to_string());
    focal.updated_at = "2026-05-10T12:00:00Z".to_string();
    focal.ci_ref = Some("no-such-ci".to_string());
    let focal_id = insert_incident(&conn, &focal).expect("insert");

    let env = ci_health_at(&conn, Some(focal_id), None, ts("2026-05-10T13:00:00Z"));
    assert!(!env.success);
    assert!(matches!(env.data, Some(CiHealthData::Absent(_))));
}

#[test]
fn invalid_ids_produce_error_envelopes() {
    let conn = setup();

    let env = ci_health_at(&conn, None, None, ts("2026-05-10T13:00:00Z"));
    assert!(!env.success);
    assert_eq!(env.error.as_deref(), Some("Incident id is required"));

    let env = ci_health_at(&conn, Some(9999), None, ts("2026-05-10T13:00:00Z"));
    assert!(!env.success);
    assert_eq!(env.error.as_deref(), Some("Incident not found"));
}
