use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{
    ChangeRequest, Incident, IncidentState, Priority, SlaRecord, TimelineEvent, WatchedField,
};
use crate::error::AppError;
use crate::gateway::{self, CiResolution};

/// Depth bound for the CI dependency walk.
pub const CI_NETWORK_MAX_DEPTH: i64 = 2;
/// Per-node cap on followed relationship edges.
pub const CI_NETWORK_EDGE_LIMIT: i64 = 10;

const DEFAULT_CI_IMPACT: i64 = 5;
const SERVICE_CLASS: &str = "service";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParentIncidentSummary {
    pub id: i64,
    pub number: String,
    pub short_description: String,
    pub state_display: String,
    pub opened_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hierarchy {
    pub has_parent: bool,
    pub parent_incident: Option<ParentIncidentSummary>,
    pub child_count: i64,
}

pub fn build_hierarchy(conn: &Connection, incident: &Incident) -> Result<Hierarchy, AppError> {
    let parent_incident = match incident.parent_incident_id {
        Some(parent_id) => gateway::find_incident(conn, parent_id)?.map(|p| ParentIncidentSummary {
            id: p.id,
            number: p.number,
            short_description: p.short_description,
            state_display: IncidentState::from_raw(&p.state).display().to_string(),
            opened_at: p.opened_at,
        }),
        None => None,
    };

    Ok(Hierarchy {
        has_parent: incident.parent_incident_id.is_some(),
        parent_incident,
        child_count: gateway::child_incident_count(conn, incident.id)?,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemLink {
    pub id: i64,
    pub number: String,
    pub short_description: String,
    pub state: String,
    pub priority: Option<String>,
    pub opened_at: Option<String>,
    pub resolved_at: Option<String>,
    pub is_open: bool,
}

pub fn problem_link(conn: &Connection, incident: &Incident) -> Result<Option<ProblemLink>, AppError> {
    let Some(problem_id) = incident.problem_id else {
        return Ok(None);
    };
    Ok(gateway::find_problem(conn, problem_id)?.map(|p| {
        let is_open = p.is_open();
        ProblemLink {
            id: p.id,
            number: p.number,
            short_description: p.short_description,
            state: p.state,
            priority: p.priority,
            opened_at: p.opened_at,
            resolved_at: p.resolved_at,
            is_open,
        }
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiDetails {
    pub id: i64,
    pub name: String,
    pub class: Option<String>,
    pub impact: i64,
    pub install_status: Option<String>,
    pub operational_status: Option<String>,
}

/// The incident's configuration item, or `None` when the reference is absent
/// or unresolvable.
pub fn ci_details(conn: &Connection, incident: &Incident) -> Result<Option<CiDetails>, AppError> {
    let Some(ci_ref) = incident.ci_ref.as_deref() else {
        return Ok(None);
    };
    let CiResolution::Resolved(ci_id) = gateway::resolve_ci(conn, ci_ref)? else {
        return Ok(None);
    };
    Ok(gateway::find_config_item(conn, ci_id)?.map(|ci| CiDetails {
        id: ci.id,
        name: ci.name,
        class: ci.class,
        impact: ci.impact.unwrap_or(DEFAULT_CI_IMPACT),
        install_status: ci.install_status,
        operational_status: ci.operational_status,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiDependency {
    pub id: i64,
    pub name: String,
    pub class: Option<String>,
    pub relationship: String,
    pub depth: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiImpactNetwork {
    pub primary_ci: Option<CiDetails>,
    pub dependencies: Vec<CiDependency>,
    pub impacted_services: Vec<String>,
    pub impact_score: i64,
    pub depth_analyzed: i64,
}

impl CiImpactNetwork {
    fn empty() -> Self {
        Self {
            primary_ci: None,
            dependencies: Vec::new(),
            impacted_services: Vec::new(),
            impact_score: 0,
            depth_analyzed: 0,
        }
    }
}

/// Bounded breadth-limited walk over CI relationship edges.
///
/// Service-class dependencies raise the impact score to 8, direct
/// dependencies to 6; the walk stops at `max_depth` and never revisits a CI.
/// Any fetch failure degrades to the partial network built so far.
pub fn ci_impact_network(conn: &Connection, incident: &Incident, max_depth: i64) -> CiImpactNetwork {
    let primary = match ci_details(conn, incident) {
        Ok(Some(ci)) => ci,
        Ok(None) => return CiImpactNetwork::empty(),
        Err(e) => {
            warn!(incident = incident.id, error = %e, "CI impact network: primary CI fetch failed");
            return CiImpactNetwork::empty();
        }
    };

    let mut network = CiImpactNetwork {
        impact_score: primary.impact,
        primary_ci: Some(primary.clone()),
        dependencies: Vec::new(),
        impacted_services: Vec::new(),
        depth_analyzed: 0,
    };

    let mut visited = std::collections::HashSet::new();
    visited.insert(primary.id);
    let mut frontier = vec![primary.id];

    for depth in 1..=max_depth {
        let mut next = Vec::new();
        for node in frontier {
            let related = match gateway::related_cis(conn, node, CI_NETWORK_EDGE_LIMIT) {
                Ok(r) => r,
                Err(e) => {
                    warn!(ci = node, error = %e, "CI impact network: relationship fetch failed");
                    continue;
                }
            };
            network.depth_analyzed = network.depth_analyzed.max(depth);

            for (ci, rel_type) in related {
                if !visited.insert(ci.id) {
                    continue;
                }

                let is_service = ci
                    .class
                    .as_deref()
                    .map(|c| c.to_lowercase().contains(SERVICE_CLASS))
                    .unwrap_or(false);
                if is_service {
                    network.impacted_services.push(ci.name.clone());
                    network.impact_score = network.impact_score.max(8);
                } else if depth == 1 {
                    network.impact_score = network.impact_score.max(6);
                }

                network.dependencies.push(CiDependency {
                    id: ci.id,
                    name: ci.name,
                    class: ci.class,
                    relationship: rel_type,
                    depth,
                });
                next.push(ci.id);
            }
        }
        frontier = next;
        if frontier.is_empty() {
            break;
        }
    }

    network
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeInterventions {
    pub related_changes: Vec<ChangeRequest>,
    pub changes_implemented: i64,
    pub effectiveness_rating: String,
}

impl ChangeInterventions {
    fn unknown() -> Self {
        Self {
            related_changes: Vec::new(),
            changes_implemented: 0,
            effectiveness_rating: "unknown".to_string(),
        }
    }
}

/// Changes linked to the incident via "fixes" relations, with an
/// implementation-effectiveness rating. Degrades to an empty result on
/// fetch failure.
pub fn change_interventions(conn: &Connection, incident_id: i64) -> ChangeInterventions {
    let related_changes = match gateway::changes_fixing_incident(conn, incident_id) {
        Ok(c) => c,
        Err(e) => {
            warn!(incident = incident_id, error = %e, "change interventions fetch failed");
            return ChangeInterventions::unknown();
        }
    };

    let changes_implemented = related_changes.iter().filter(|c| c.is_implemented()).count() as i64;
    let effectiveness_rating = if changes_implemented > 0 {
        "implemented_changes"
    } else if !related_changes.is_empty() {
        "pending_changes"
    } else {
        "unknown"
    }
    .to_string();

    ChangeInterventions {
        related_changes,
        changes_implemented,
        effectiveness_rating,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentChange {
    pub field: WatchedField,
    pub old_value: String,
    pub new_value: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssigneeWorkload {
    pub current_assignee: Option<String>,
    pub assignment_changes: Vec<AssignmentChange>,
    pub reassignment_count: i64,
    pub stability: String,
    pub overall_score: i64,
}

/// Assignment churn, derived from the merged timeline only.
pub fn assignee_workload(incident: &Incident, timeline: &[TimelineEvent]) -> AssigneeWorkload {
    let assignment_changes: Vec<AssignmentChange> = timeline
        .iter()
        .filter_map(|event| match event {
            TimelineEvent::FieldChange {
                timestamp,
                field,
                old_value,
                new_value,
                ..
            } if matches!(field, WatchedField::AssignedTo | WatchedField::AssignmentGroup) => {
                Some(AssignmentChange {
                    field: *field,
                    old_value: old_value.clone(),
                    new_value: new_value.clone(),
                    timestamp: timestamp.clone(),
                })
            }
            _ => None,
        })
        .collect();

    let reassignment_count = assignment_changes.len() as i64;
    let stability = if reassignment_count <= 1 { "high" } else { "low" }.to_string();
    let overall_score = if reassignment_count > 2 {
        30
    } else if reassignment_count > 0 {
        60
    } else {
        85
    };

    AssigneeWorkload {
        current_assignee: incident.assigned_to.clone(),
        assignment_changes,
        reassignment_count,
        stability,
        overall_score,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategorizationQuality {
    pub confidence_score: i64,
    pub category: String,
    pub subcategory: String,
    pub ci_attached: bool,
    pub risk_factors: Vec<String>,
    pub suggestions: Vec<String>,
}

fn keyword_position(haystack: &str, needle: &str) -> i64 {
    haystack.find(needle).map(|p| p as i64).unwrap_or(-1)
}

/// Heuristic assessment of how well the incident is categorized, judged
/// against its close notes.
pub fn categorization_quality(incident: &Incident) -> CategorizationQuality {
    let mut quality = CategorizationQuality {
        confidence_score: 75,
        category: incident
            .category
            .clone()
            .unwrap_or_else(|| "Not categorized".to_string()),
        subcategory: incident
            .subcategory
            .clone()
            .unwrap_or_else(|| "Not categorized".to_string()),
        ci_attached: incident.ci_ref.as_deref().is_some_and(|r| !r.is_empty()),
        risk_factors: Vec::new(),
        suggestions: Vec::new(),
    };

    let notes = incident
        .close_notes
        .as_deref()
        .unwrap_or("")
        .to_lowercase();

    if let Some(category) = incident.category.as_deref() {
        let category = category.to_lowercase();
        let hardware_pos = keyword_position(&notes, "hardware");
        let software_pos = keyword_position(&notes, "software");
        let mut mismatch = false;

        if category.contains("hardware") && software_pos > hardware_pos {
            mismatch = true;
            quality
                .suggestions
                .push("Category suggests hardware issue but resolution appears software-related".to_string());
        } else if category.contains("software") && hardware_pos > software_pos {
            mismatch = true;
            quality
                .suggestions
                .push("Category suggests software issue but resolution appears hardware-related".to_string());
        }

        if mismatch {
            quality.confidence_score -= 25;
            quality.risk_factors.push("Category-resolution mismatch".to_string());
        }
    }

    if !quality.ci_attached
        && (notes.contains("server") || notes.contains("database") || notes.contains("network"))
    {
        quality.confidence_score -= 15;
        quality
            .suggestions
            .push("Technical resolution documented but no CI attached".to_string());
        quality
            .risk_factors
            .push("Missing CI for technical issue".to_string());
    }

    if incident.category.is_none() {
        quality.confidence_score -= 20;
        quality
            .suggestions
            .push("Incident not properly categorized - missing category".to_string());
        quality.risk_factors.push("Uncategorized incident".to_string());
    }

    if incident.subcategory.is_none() {
        quality.confidence_score -= 10;
        quality
            .suggestions
            .push("Missing subcategory for better classification".to_string());
    }

    quality
}

/// Fully enriched, read-only view of one incident: the record itself plus
/// every secondary enrichment, composed once per analysis request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentSnapshot {
    #[serde(flatten)]
    pub incident: Incident,
    pub state_display: String,
    pub priority_display: String,
    pub hierarchy: Hierarchy,
    pub problem_link: Option<ProblemLink>,
    pub slas: Vec<SlaRecord>,
    pub ci_impact_network: CiImpactNetwork,
    pub change_interventions: ChangeInterventions,
    pub assignee_workload: AssigneeWorkload,
    pub categorization_quality: CategorizationQuality,
    pub ci_details: Option<CiDetails>,
}

/// Compose the full snapshot for one incident.
///
/// Hierarchy, problem link, and SLA lookups are primary (their failures
/// propagate); the remaining enrichments degrade to defaults with a logged
/// warning so a broken secondary query never fails the analysis.
pub fn compose_snapshot(
    conn: &Connection,
    incident: Incident,
    timeline: &[TimelineEvent],
) -> Result<IncidentSnapshot, AppError> {
    let hierarchy = build_hierarchy(conn, &incident)?;
    let problem = problem_link(conn, &incident)?;
    let slas = match gateway::slas_for_incident(conn, incident.id) {
        Ok(s) => s,
        Err(e) => {
            warn!(incident = incident.id, error = %e, "SLA lookup failed; treating as none attached");
            Vec::new()
        }
    };

    let network = ci_impact_network(conn, &incident, CI_NETWORK_MAX_DEPTH);
    let interventions = change_interventions(conn, incident.id);
    let workload = assignee_workload(&incident, timeline);
    let quality = categorization_quality(&incident);
    let details = match ci_details(conn, &incident) {
        Ok(d) => d,
        Err(e) => {
            warn!(incident = incident.id, error = %e, "CI details fetch failed; omitting");
            None
        }
    };

    Ok(IncidentSnapshot {
        state_display: IncidentState::from_raw(&incident.state).display().to_string(),
        priority_display: Priority::from_raw(&incident.priority).display().to_string(),
        incident,
        hierarchy,
        problem_link: problem,
        slas,
        ci_impact_network: network,
        change_interventions: interventions,
        assignee_workload: workload,
        categorization_quality: quality,
        ci_details: details,
    })
}
