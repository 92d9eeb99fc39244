use tempfile::tempdir;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use debrief_core::db;
use debrief_core::demo::seed_demo_dataset;
use debrief_core::gateway;
use debrief_core::ops::generate_analysis_at;

#[test]
fn seeds_a_coherent_on_disk_dataset() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("demo.sqlite");
    let mut conn = db::open(&db_path).expect("open");
    db::migrate(&mut conn).expect("migrate");

    let summary = seed_demo_dataset(&mut conn).expect("seed");
    assert_eq!(summary.incident_count, 7);

    let focal = gateway::get_incident(&conn, summary.focal_incident_id).expect("focal");
    assert_eq!(focal.number, "INC0010001");
    assert!(focal.parent_incident_id.is_some());
    assert!(focal.problem_id.is_some());
    assert!(focal.ci_ref.is_some());
}

#[test]
fn seeded_focal_incident_analyzes_cleanly() {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    let summary = seed_demo_dataset(&mut conn).expect("seed");

    let now = OffsetDateTime::parse("2026-03-02T00:00:00Z", &Rfc3339).expect("now");
    let env = generate_analysis_at(&conn, Some(summary.focal_incident_id), now);
    assert!(env.success, "analysis failed: {:?}", env.error);
    assert!(
        env.warnings.is_none(),
        "expected clean demo analysis, got: {:?}",
        env.warnings
    );
}
