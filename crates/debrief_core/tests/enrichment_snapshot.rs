use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use debrief_core::db;
use debrief_core::demo::seed_demo_dataset;
use debrief_core::ops::generate_analysis_at;

fn seeded_snapshot() -> debrief_core::enrich::IncidentSnapshot {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    let summary = seed_demo_dataset(&mut conn).expect("seed");

    let now = OffsetDateTime::parse("2026-03-02T00:00:00Z", &Rfc3339).expect("now");
    let env = generate_analysis_at(&conn, Some(summary.focal_incident_id), now);
    assert!(env.success, "analysis failed: {:?}", env.error);
    env.incident.expect("snapshot")
}

#[test]
fn snapshot_resolves_hierarchy_and_problem() {
    let snapshot = seeded_snapshot();

    assert!(snapshot.hierarchy.has_parent);
    let parent = snapshot.hierarchy.parent_incident.expect("parent");
    assert_eq!(parent.number, "INC0010000");
    assert_eq!(snapshot.hierarchy.child_count, 2);

    let problem = snapshot.problem_link.expect("problem");
    assert_eq!(problem.number, "PRB0004001");
    assert!(problem.is_open);

    assert_eq!(snapshot.state_display, "Resolved");
    assert_eq!(snapshot.priority_display, "1 - Critical");
}

#[test]
fn impact_network_walks_to_the_service_layer() {
    let snapshot = seeded_snapshot();
    let network = &snapshot.ci_impact_network;

    let primary = network.primary_ci.as_ref().expect("primary CI");
    assert_eq!(primary.name, "payments-db-01");

    assert_eq!(network.depth_analyzed, 2);
    assert_eq!(network.dependencies.len(), 2);
    let depths: Vec<i64> = network.dependencies.iter().map(|d| d.depth).collect();
    assert_eq!(depths, vec![1, 2]);

    // Reaching a service-class CI pins the score at its ceiling.
    assert_eq!(network.impacted_services, vec!["payments-service".to_string()]);
    assert_eq!(network.impact_score, 8);
}

#[test]
fn change_interventions_rate_implemented_fixes() {
    let snapshot = seeded_snapshot();
    let interventions = &snapshot.change_interventions;

    assert_eq!(interventions.related_changes.len(), 1);
    assert_eq!(interventions.related_changes[0].number, "CHG0003001");
    assert_eq!(interventions.changes_implemented, 1);
    assert_eq!(interventions.effectiveness_rating, "implemented_changes");
}

#[test]
fn workload_reflects_single_reassignment() {
    let snapshot = seeded_snapshot();
    let workload = &snapshot.assignee_workload;

    assert_eq!(workload.current_assignee.as_deref(), Some("dana.okafor"));
    assert_eq!(workload.reassignment_count, 1);
    assert_eq!(workload.stability, "high");
    assert_eq!(workload.overall_score, 60);
}

#[test]
fn well_categorized_incident_keeps_base_confidence() {
    let snapshot = seeded_snapshot();
    let quality = &snapshot.categorization_quality;

    assert_eq!(quality.confidence_score, 75);
    assert_eq!(quality.category, "Software");
    assert_eq!(quality.subcategory, "Database");
    assert!(quality.ci_attached);
    assert!(quality.risk_factors.is_empty());

    let details = snapshot.ci_details.as_ref().expect("ci details");
    assert_eq!(details.name, "payments-db-01");
    assert_eq!(details.impact, 5);
}
