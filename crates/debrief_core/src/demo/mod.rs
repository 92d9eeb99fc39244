use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::domain::JournalKind;
use crate::error::AppError;

fn insert_failed(what: &str, e: impl ToString) -> AppError {
    AppError::new("DB_INSERT_FAILED", format!("Failed to insert {what}")).with_details(e.to_string())
}

/// Insertable incident row. Only `number` and `short_description` are
/// mandatory; everything else defaults to an open, unassigned P4 record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewIncident {
    pub number: String,
    pub short_description: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub state: String,
    pub priority: String,
    pub opened_by: Option<String>,
    pub caller: Option<String>,
    pub assigned_to: Option<String>,
    pub assignment_group: Option<String>,
    pub opened_at: Option<String>,
    pub resolved_at: Option<String>,
    pub closed_at: Option<String>,
    pub updated_at: String,
    pub close_code: Option<String>,
    pub close_notes: Option<String>,
    pub reopen_count: i64,
    pub parent_incident_id: Option<i64>,
    pub problem_id: Option<i64>,
    pub ci_ref: Option<String>,
}

impl NewIncident {
    pub fn named(number: impl Into<String>, short_description: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            short_description: short_description.into(),
            description: None,
            category: None,
            subcategory: None,
            state: "1".to_string(),
            priority: "4".to_string(),
            opened_by: None,
            caller: None,
            assigned_to: None,
            assignment_group: None,
            opened_at: None,
            resolved_at: None,
            closed_at: None,
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            close_code: None,
            close_notes: None,
            reopen_count: 0,
            parent_incident_id: None,
            problem_id: None,
            ci_ref: None,
        }
    }
}

pub fn insert_incident(conn: &Connection, incident: &NewIncident) -> Result<i64, AppError> {
    conn.execute(
        r#"
      INSERT INTO incidents (
        number, short_description, description, category, subcategory,
        state, priority, opened_by, caller, assigned_to, assignment_group,
        opened_at, resolved_at, closed_at, updated_at,
        close_code, close_notes, reopen_count, parent_incident_id, problem_id, ci_ref
      ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21)
      "#,
        rusqlite::params![
            incident.number,
            incident.short_description,
            incident.description,
            incident.category,
            incident.subcategory,
            incident.state,
            incident.priority,
            incident.opened_by,
            incident.caller,
            incident.assigned_to,
            incident.assignment_group,
            incident.opened_at,
            incident.resolved_at,
            incident.closed_at,
            incident.updated_at,
            incident.close_code,
            incident.close_notes,
            incident.reopen_count,
            incident.parent_incident_id,
            incident.problem_id,
            incident.ci_ref,
        ],
    )
    .map_err(|e| insert_failed("incident", e))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_problem(
    conn: &Connection,
    number: &str,
    short_description: &str,
    state: &str,
    opened_at: &str,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO problems (number, short_description, state, opened_at) VALUES (?1,?2,?3,?4)",
        rusqlite::params![number, short_description, state, opened_at],
    )
    .map_err(|e| insert_failed("problem", e))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_config_item(
    conn: &Connection,
    name: &str,
    class: &str,
    impact: Option<i64>,
) -> Result<i64, AppError> {
    conn.execute(
        r#"
      INSERT INTO config_items (name, class, category, install_status, operational_status, impact)
      VALUES (?1, ?2, 'Infrastructure', 'Installed', 'Operational', ?3)
      "#,
        rusqlite::params![name, class, impact],
    )
    .map_err(|e| insert_failed("config item", e))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_ci_relationship(
    conn: &Connection,
    parent_ci: i64,
    child_ci: i64,
    rel_type: &str,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO ci_relationships (parent_ci, child_ci, rel_type) VALUES (?1,?2,?3)",
        rusqlite::params![parent_ci, child_ci, rel_type],
    )
    .map_err(|e| insert_failed("CI relationship", e))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewChange {
    pub number: String,
    pub short_description: String,
    pub change_type: Option<String>,
    pub state: String,
    pub risk: Option<String>,
    pub ci_id: Option<i64>,
    pub created_at: String,
    pub planned_start: Option<String>,
}

impl NewChange {
    pub fn named(number: impl Into<String>, short_description: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            short_description: short_description.into(),
            change_type: Some("Normal".to_string()),
            state: "New".to_string(),
            risk: Some("Moderate".to_string()),
            ci_id: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            planned_start: None,
        }
    }
}

pub fn insert_change(conn: &Connection, change: &NewChange) -> Result<i64, AppError> {
    conn.execute(
        r#"
      INSERT INTO change_requests (number, short_description, change_type, state, risk, ci_id, created_at, planned_start)
      VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
      "#,
        rusqlite::params![
            change.number,
            change.short_description,
            change.change_type,
            change.state,
            change.risk,
            change.ci_id,
            change.created_at,
            change.planned_start,
        ],
    )
    .map_err(|e| insert_failed("change request", e))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_task_relation(
    conn: &Connection,
    change_id: i64,
    incident_id: i64,
    rel_type: &str,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO task_relations (change_id, incident_id, rel_type) VALUES (?1,?2,?3)",
        rusqlite::params![change_id, incident_id, rel_type],
    )
    .map_err(|e| insert_failed("task relation", e))?;
    Ok(())
}

pub fn insert_sla(
    conn: &Connection,
    incident_id: i64,
    name: &str,
    stage: &str,
    created_at: &str,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO sla_records (incident_id, name, stage, created_at) VALUES (?1,?2,?3,?4)",
        rusqlite::params![incident_id, name, stage, created_at],
    )
    .map_err(|e| insert_failed("SLA record", e))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_journal(
    conn: &Connection,
    incident_id: i64,
    kind: JournalKind,
    created_at: &str,
    created_by: &str,
    content: &str,
) -> Result<i64, AppError> {
    let kind = match kind {
        JournalKind::Comment => "comment",
        JournalKind::WorkNote => "work_note",
    };
    conn.execute(
        "INSERT INTO journal_entries (incident_id, kind, created_at, created_by, content) VALUES (?1,?2,?3,?4,?5)",
        rusqlite::params![incident_id, kind, created_at, created_by, content],
    )
    .map_err(|e| insert_failed("journal entry", e))?;
    Ok(conn.last_insert_rowid())
}

#[allow(clippy::too_many_arguments)]
pub fn insert_history(
    conn: &Connection,
    incident_id: i64,
    field: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    created_at: &str,
    created_by: &str,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO history_lines (incident_id, field, old_value, new_value, created_at, created_by) VALUES (?1,?2,?3,?4,?5,?6)",
        rusqlite::params![incident_id, field, old_value, new_value, created_at, created_by],
    )
    .map_err(|e| insert_failed("history line", e))?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DemoSummary {
    pub focal_incident_id: i64,
    pub incident_count: i64,
}

/// Seed a deterministic demo dataset exercising every analysis path: a focal
/// resolved incident with journal, history, SLAs, hierarchy, a linked
/// problem, and a CI with in-window activity.
pub fn seed_demo_dataset(conn: &mut Connection) -> Result<DemoSummary, AppError> {
    let db_ci = insert_config_item(conn, "payments-db-01", "cmdb_ci_database", Some(5))?;
    let app_ci = insert_config_item(conn, "payments-app-01", "cmdb_ci_appl", Some(4))?;
    let svc_ci = insert_config_item(conn, "payments-service", "cmdb_ci_service", Some(8))?;
    insert_ci_relationship(conn, db_ci, app_ci, "Depends on")?;
    insert_ci_relationship(conn, app_ci, svc_ci, "Depends on")?;

    let problem_id = insert_problem(
        conn,
        "PRB0004001",
        "Recurring payments database connection pool exhaustion",
        "Open",
        "2026-02-28T09:00:00Z",
    )?;

    let mut parent = NewIncident::named("INC0010000", "Payments platform degradation");
    parent.state = "2".to_string();
    parent.priority = "1".to_string();
    parent.opened_at = Some("2026-03-01T07:30:00Z".to_string());
    parent.updated_at = "2026-03-01T12:00:00Z".to_string();
    let parent_id = insert_incident(conn, &parent)?;

    let mut focal = NewIncident::named("INC0010001", "Payments database connection failures");
    focal.description = Some("Users report intermittent payment failures at checkout".to_string());
    focal.category = Some("Software".to_string());
    focal.subcategory = Some("Database".to_string());
    focal.state = "6".to_string();
    focal.priority = "1".to_string();
    focal.opened_by = Some("monitoring.bot".to_string());
    focal.caller = Some("Alex Rivera".to_string());
    focal.assigned_to = Some("dana.okafor".to_string());
    focal.assignment_group = Some("Database Ops".to_string());
    focal.opened_at = Some("2026-03-01T08:00:00Z".to_string());
    focal.resolved_at = Some("2026-03-01T14:30:00Z".to_string());
    focal.updated_at = "2026-03-01T14:30:00Z".to_string();
    focal.close_code = Some("Solved (Permanently)".to_string());
    focal.close_notes =
        Some("Database connection pool resized; stale server sessions purged".to_string());
    focal.parent_incident_id = Some(parent_id);
    focal.problem_id = Some(problem_id);
    focal.ci_ref = Some(db_ci.to_string());
    let focal_id = insert_incident(conn, &focal)?;

    for (number, desc) in [
        ("INC0010002", "Checkout timeouts for EU customers"),
        ("INC0010003", "Payment retries exhausted"),
    ] {
        let mut child = NewIncident::named(number, desc);
        child.state = "2".to_string();
        child.priority = "2".to_string();
        child.opened_at = Some("2026-03-01T08:30:00Z".to_string());
        child.updated_at = "2026-03-01T09:00:00Z".to_string();
        child.parent_incident_id = Some(focal_id);
        child.ci_ref = Some("payments-db-01".to_string());
        insert_incident(conn, &child)?;
    }

    // Concurrent window activity on the same CI, ahead of the focal open time.
    for (i, number) in ["INC0009001", "INC0009002", "INC0009003"].iter().enumerate() {
        let opened = format!("2026-02-28T{:02}:00:00Z", 10 + i * 2);
        let mut inc = NewIncident::named(*number, "Earlier database alert");
        inc.state = "2".to_string();
        inc.priority = "3".to_string();
        inc.opened_at = Some(opened.clone());
        inc.updated_at = opened;
        inc.ci_ref = Some(db_ci.to_string());
        insert_incident(conn, &inc)?;
    }

    let mut fix_change = NewChange::named("CHG0003001", "Resize payments DB connection pool");
    fix_change.state = "Implemented".to_string();
    fix_change.ci_id = Some(db_ci);
    fix_change.created_at = "2026-02-28T16:00:00Z".to_string();
    let fix_change_id = insert_change(conn, &fix_change)?;
    insert_task_relation(conn, fix_change_id, focal_id, "fixes")?;

    let mut pending_change = NewChange::named("CHG0003002", "Patch database minor version");
    pending_change.state = "Scheduled".to_string();
    pending_change.ci_id = Some(db_ci);
    pending_change.created_at = "2026-02-28T18:00:00Z".to_string();
    insert_change(conn, &pending_change)?;

    insert_sla(conn, focal_id, "P1 Response", "Completed", "2026-03-01T08:00:00Z")?;
    insert_sla(conn, focal_id, "P1 Resolution", "Completed", "2026-03-01T08:00:00Z")?;
    insert_sla(conn, focal_id, "Customer Update", "Breached", "2026-03-01T08:00:00Z")?;
    insert_sla(conn, focal_id, "Vendor Escalation", "In progress", "2026-03-01T08:00:00Z")?;

    insert_journal(
        conn,
        focal_id,
        JournalKind::Comment,
        "2026-03-01T08:05:00Z",
        "monitoring.bot",
        "Automated alert: connection pool saturation on payments-db-01",
    )?;
    insert_journal(
        conn,
        focal_id,
        JournalKind::WorkNote,
        "2026-03-01T08:20:00Z",
        "dana.okafor",
        "Database server is refusing new connections; investigating pool configuration and recent deploys",
    )?;
    insert_journal(
        conn,
        focal_id,
        JournalKind::Comment,
        "2026-03-01T14:25:00Z",
        "dana.okafor",
        "Pool resized and stale sessions purged; payments succeeding again",
    )?;

    insert_history(
        conn,
        focal_id,
        "state",
        Some("1"),
        Some("2"),
        "2026-03-01T08:10:00Z",
        "dana.okafor",
    )?;
    insert_history(
        conn,
        focal_id,
        "assignment_group",
        Some("Service Desk"),
        Some("Database Ops"),
        "2026-03-01T08:15:00Z",
        "service.desk",
    )?;
    insert_history(
        conn,
        focal_id,
        "priority",
        Some("2"),
        Some("1"),
        "2026-03-01T08:40:00Z",
        "dana.okafor",
    )?;
    // No-op line: must never surface in the timeline.
    insert_history(
        conn,
        focal_id,
        "category",
        Some("Software"),
        Some("Software"),
        "2026-03-01T09:00:00Z",
        "dana.okafor",
    )?;
    insert_history(
        conn,
        focal_id,
        "state",
        Some("2"),
        Some("6"),
        "2026-03-01T14:30:00Z",
        "dana.okafor",
    )?;

    let incident_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
        .map_err(|e| insert_failed("demo summary count", e))?;

    Ok(DemoSummary {
        focal_incident_id: focal_id,
        incident_count,
    })
}
