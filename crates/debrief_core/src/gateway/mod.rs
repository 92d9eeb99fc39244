use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ChangeRequest, ConfigItem, HistoryLine, Incident, IncidentState, JournalEntry, JournalKind,
    Priority, Problem, SlaRecord, WatchedField,
};
use crate::error::AppError;

/// Hard cap applied server-side to keyword search results.
pub const SEARCH_PAGE_SIZE: i64 = 20;
/// Caps for windowed CI activity queries.
pub const CI_INCIDENT_LIMIT: i64 = 20;
pub const CI_CHANGE_LIMIT: i64 = 15;
pub const CI_SLA_LIMIT: i64 = 10;

const TICKET_PREFIX: &str = "INC";

const INCIDENT_COLUMNS: &str = r#"
  id, number, short_description, description, category, subcategory,
  state, priority, opened_by, caller, assigned_to, assignment_group,
  opened_at, resolved_at, closed_at, updated_at,
  close_code, close_notes, reopen_count, parent_incident_id, problem_id, ci_ref
"#;

fn incident_from_row(row: &Row<'_>) -> rusqlite::Result<Incident> {
    Ok(Incident {
        id: row.get(0)?,
        number: row.get(1)?,
        short_description: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        subcategory: row.get(5)?,
        state: row.get(6)?,
        priority: row.get(7)?,
        opened_by: row.get(8)?,
        caller: row.get(9)?,
        assigned_to: row.get(10)?,
        assignment_group: row.get(11)?,
        opened_at: row.get(12)?,
        resolved_at: row.get(13)?,
        closed_at: row.get(14)?,
        updated_at: row.get(15)?,
        close_code: row.get(16)?,
        close_notes: row.get(17)?,
        reopen_count: row.get(18)?,
        parent_incident_id: row.get(19)?,
        problem_id: row.get(20)?,
        ci_ref: row.get(21)?,
    })
}

fn query_failed(what: &str, e: impl ToString) -> AppError {
    AppError::new("DB_QUERY_FAILED", format!("Failed to {what}")).with_details(e.to_string())
}

pub fn get_incident(conn: &Connection, id: i64) -> Result<Incident, AppError> {
    find_incident(conn, id)?
        .ok_or_else(|| AppError::new("DB_NOT_FOUND", "Incident not found").with_details(id.to_string()))
}

pub fn find_incident(conn: &Connection, id: i64) -> Result<Option<Incident>, AppError> {
    let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1");
    conn.query_row(&sql, [id], incident_from_row)
        .optional()
        .map_err(|e| query_failed("query incident", e))
}

/// One row of the keyword search result page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentSearchHit {
    pub id: i64,
    pub number: String,
    pub short_description: String,
    pub state: String,
    pub state_display: String,
    pub priority: String,
    pub priority_display: String,
    pub assignment_group: Option<String>,
    pub opened_at: Option<String>,
    pub caller_display: Option<String>,
}

/// Keyword search over incidents, newest-updated first, capped at
/// [`SEARCH_PAGE_SIZE`].
///
/// A term that looks like a ticket-number prefix is matched against `number`
/// only; anything else is OR-matched across number, short description, and
/// description.
pub fn search_incidents(conn: &Connection, term: &str) -> Result<Vec<IncidentSearchHit>, AppError> {
    let term = term.trim();
    let by_number = term.to_uppercase().starts_with(TICKET_PREFIX);

    let sql = if by_number {
        format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents
             WHERE number LIKE '%' || ?1 || '%'
             ORDER BY updated_at DESC, id DESC
             LIMIT {SEARCH_PAGE_SIZE}"
        )
    } else {
        format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents
             WHERE number LIKE '%' || ?1 || '%'
                OR short_description LIKE '%' || ?1 || '%'
                OR description LIKE '%' || ?1 || '%'
             ORDER BY updated_at DESC, id DESC
             LIMIT {SEARCH_PAGE_SIZE}"
        )
    };

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| query_failed("prepare incident search", e))?;
    let rows = stmt
        .query_map([term], incident_from_row)
        .map_err(|e| query_failed("run incident search", e))?;

    let mut out = Vec::new();
    for r in rows {
        let inc = r.map_err(|e| query_failed("decode incident search row", e))?;
        out.push(IncidentSearchHit {
            id: inc.id,
            number: inc.number,
            short_description: inc.short_description,
            state_display: IncidentState::from_raw(&inc.state).display().to_string(),
            state: inc.state,
            priority_display: Priority::from_raw(&inc.priority).display().to_string(),
            priority: inc.priority,
            assignment_group: inc.assignment_group,
            opened_at: inc.opened_at,
            caller_display: inc.caller,
        });
    }
    Ok(out)
}

pub fn journal_entries_for(
    conn: &Connection,
    incident_id: i64,
) -> Result<Vec<JournalEntry>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, incident_id, kind, created_at, created_by, content
      FROM journal_entries
      WHERE incident_id = ?1
      ORDER BY created_at ASC, id ASC
      "#,
        )
        .map_err(|e| query_failed("prepare journal entries query", e))?;

    let rows = stmt
        .query_map([incident_id], |row| {
            let kind: String = row.get(2)?;
            Ok(JournalEntry {
                id: row.get(0)?,
                incident_id: row.get(1)?,
                kind: if kind == "comment" {
                    JournalKind::Comment
                } else {
                    JournalKind::WorkNote
                },
                created_at: row.get(3)?,
                created_by: row.get(4)?,
                content: row.get(5)?,
            })
        })
        .map_err(|e| query_failed("query journal entries", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| query_failed("decode journal entry row", e))?);
    }
    Ok(out)
}

/// History lines restricted to the watched-field set, oldest first.
pub fn history_lines_for(
    conn: &Connection,
    incident_id: i64,
) -> Result<Vec<HistoryLine>, AppError> {
    let placeholders = WatchedField::ALL
        .iter()
        .map(|f| format!("'{}'", f.column()))
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        r#"
      SELECT id, incident_id, field, old_value, new_value, created_at, created_by
      FROM history_lines
      WHERE incident_id = ?1 AND field IN ({placeholders})
      ORDER BY created_at ASC, id ASC
      "#
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| query_failed("prepare history lines query", e))?;
    let rows = stmt
        .query_map([incident_id], |row| {
            Ok(HistoryLine {
                id: row.get(0)?,
                incident_id: row.get(1)?,
                field: row.get(2)?,
                old_value: row.get(3)?,
                new_value: row.get(4)?,
                created_at: row.get(5)?,
                created_by: row.get(6)?,
            })
        })
        .map_err(|e| query_failed("query history lines", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| query_failed("decode history line row", e))?);
    }
    Ok(out)
}

fn sla_from_row(row: &Row<'_>) -> rusqlite::Result<SlaRecord> {
    Ok(SlaRecord {
        id: row.get(0)?,
        incident_id: row.get(1)?,
        name: row.get(2)?,
        stage: row.get(3)?,
        breach_at: row.get(4)?,
        planned_breach_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn slas_for_incident(conn: &Connection, incident_id: i64) -> Result<Vec<SlaRecord>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, incident_id, name, stage, breach_at, planned_breach_at, created_at
      FROM sla_records
      WHERE incident_id = ?1
      ORDER BY created_at ASC, id ASC
      "#,
        )
        .map_err(|e| query_failed("prepare SLA query", e))?;
    let rows = stmt
        .query_map([incident_id], sla_from_row)
        .map_err(|e| query_failed("query SLAs", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| query_failed("decode SLA row", e))?);
    }
    Ok(out)
}

pub fn find_problem(conn: &Connection, id: i64) -> Result<Option<Problem>, AppError> {
    conn.query_row(
        r#"
      SELECT id, number, short_description, state, priority, opened_at, resolved_at
      FROM problems
      WHERE id = ?1
      "#,
        [id],
        |row| {
            Ok(Problem {
                id: row.get(0)?,
                number: row.get(1)?,
                short_description: row.get(2)?,
                state: row.get(3)?,
                priority: row.get(4)?,
                opened_at: row.get(5)?,
                resolved_at: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(|e| query_failed("query problem", e))
}

pub fn child_incident_count(conn: &Connection, incident_id: i64) -> Result<i64, AppError> {
    conn.query_row(
        "SELECT COUNT(*) FROM incidents WHERE parent_incident_id = ?1",
        [incident_id],
        |row| row.get(0),
    )
    .map_err(|e| query_failed("count child incidents", e))
}

/// Outcome of configuration-item reference resolution. Loosely-linked data
/// (a CI name instead of an id) is expected, so an unmatched reference is a
/// value, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CiResolution {
    Resolved(i64),
    Unresolved,
}

/// Resolve a `ci_ref` to a configuration-item id: canonical id first, then
/// fallback lookup by name.
pub fn resolve_ci(conn: &Connection, ci_ref: &str) -> Result<CiResolution, AppError> {
    let ci_ref = ci_ref.trim();
    if ci_ref.is_empty() {
        return Ok(CiResolution::Unresolved);
    }

    if let Ok(id) = ci_ref.parse::<i64>() {
        let exists: Option<i64> = conn
            .query_row("SELECT id FROM config_items WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| query_failed("verify CI id", e))?;
        if let Some(id) = exists {
            return Ok(CiResolution::Resolved(id));
        }
    }

    let by_name: Option<i64> = conn
        .query_row(
            "SELECT id FROM config_items WHERE name = ?1 ORDER BY id ASC LIMIT 1",
            [ci_ref],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| query_failed("look up CI by name", e))?;

    match by_name {
        Some(id) => Ok(CiResolution::Resolved(id)),
        None => Ok(CiResolution::Unresolved),
    }
}

fn config_item_from_row(row: &Row<'_>) -> rusqlite::Result<ConfigItem> {
    Ok(ConfigItem {
        id: row.get(0)?,
        name: row.get(1)?,
        class: row.get(2)?,
        category: row.get(3)?,
        install_status: row.get(4)?,
        operational_status: row.get(5)?,
        impact: row.get(6)?,
        last_discovered: row.get(7)?,
    })
}

pub fn find_config_item(conn: &Connection, id: i64) -> Result<Option<ConfigItem>, AppError> {
    conn.query_row(
        r#"
      SELECT id, name, class, category, install_status, operational_status,
             impact, last_discovered
      FROM config_items
      WHERE id = ?1
      "#,
        [id],
        config_item_from_row,
    )
    .optional()
    .map_err(|e| query_failed("query config item", e))
}

/// Direct relationship edges out of a CI, for the bounded dependency walk.
pub fn related_cis(
    conn: &Connection,
    parent_ci: i64,
    limit: i64,
) -> Result<Vec<(ConfigItem, String)>, AppError> {
    let mut stmt = conn
        .prepare(&format!(
            r#"
      SELECT c.id, c.name, c.class, c.category, c.install_status,
             c.operational_status, c.impact, c.last_discovered, r.rel_type
      FROM ci_relationships r
      JOIN config_items c ON c.id = r.child_ci
      WHERE r.parent_ci = ?1
      ORDER BY c.id ASC
      LIMIT {limit}
      "#
        ))
        .map_err(|e| query_failed("prepare CI relationship query", e))?;

    let rows = stmt
        .query_map([parent_ci], |row| {
            Ok((config_item_from_row(row)?, row.get::<_, String>(8)?))
        })
        .map_err(|e| query_failed("query CI relationships", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| query_failed("decode CI relationship row", e))?);
    }
    Ok(out)
}

/// A CI's name alongside its id, for matching loosely-linked `ci_ref` values.
fn ci_ref_match_values(conn: &Connection, ci_id: i64) -> Result<(String, String), AppError> {
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM config_items WHERE id = ?1",
            [ci_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| query_failed("query CI name", e))?;
    Ok((ci_id.to_string(), name.unwrap_or_default()))
}

/// Other non-closed incidents on the same CI opened within the window,
/// most recent first, capped at [`CI_INCIDENT_LIMIT`].
pub fn incidents_for_ci_window(
    conn: &Connection,
    ci_id: i64,
    window_start: &str,
    window_end: &str,
    exclude_incident: i64,
) -> Result<Vec<Incident>, AppError> {
    let (id_text, name) = ci_ref_match_values(conn, ci_id)?;
    let sql = format!(
        "SELECT {INCIDENT_COLUMNS} FROM incidents
         WHERE (ci_ref = ?1 OR ci_ref = ?2)
           AND id != ?3
           AND opened_at >= ?4 AND opened_at <= ?5
           AND state != '7'
         ORDER BY opened_at DESC, id DESC
         LIMIT {CI_INCIDENT_LIMIT}"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| query_failed("prepare CI incidents query", e))?;
    let rows = stmt
        .query_map(
            rusqlite::params![id_text, name, exclude_incident, window_start, window_end],
            incident_from_row,
        )
        .map_err(|e| query_failed("query CI incidents", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| query_failed("decode CI incident row", e))?);
    }
    Ok(out)
}

fn change_from_row(row: &Row<'_>) -> rusqlite::Result<ChangeRequest> {
    Ok(ChangeRequest {
        id: row.get(0)?,
        number: row.get(1)?,
        short_description: row.get(2)?,
        change_type: row.get(3)?,
        state: row.get(4)?,
        risk: row.get(5)?,
        impact: row.get(6)?,
        priority: row.get(7)?,
        ci_id: row.get(8)?,
        created_at: row.get(9)?,
        planned_start: row.get(10)?,
        planned_end: row.get(11)?,
        work_end: row.get(12)?,
    })
}

const CHANGE_COLUMNS: &str = r#"
  id, number, short_description, change_type, state, risk, impact, priority,
  ci_id, created_at, planned_start, planned_end, work_end
"#;

/// Change requests directly referencing the CI created within the window,
/// capped at [`CI_CHANGE_LIMIT`].
pub fn changes_for_ci_window(
    conn: &Connection,
    ci_id: i64,
    window_start: &str,
    window_end: &str,
) -> Result<Vec<ChangeRequest>, AppError> {
    let sql = format!(
        "SELECT {CHANGE_COLUMNS} FROM change_requests
         WHERE ci_id = ?1 AND created_at >= ?2 AND created_at <= ?3
         ORDER BY created_at DESC, id DESC
         LIMIT {CI_CHANGE_LIMIT}"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| query_failed("prepare CI changes query", e))?;
    let rows = stmt
        .query_map(
            rusqlite::params![ci_id, window_start, window_end],
            change_from_row,
        )
        .map_err(|e| query_failed("query CI changes", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| query_failed("decode CI change row", e))?);
    }
    Ok(out)
}

/// In-window SLA records whose parent task is an incident on the same CI,
/// capped at [`CI_SLA_LIMIT`].
pub fn slas_for_ci_window(
    conn: &Connection,
    ci_id: i64,
    window_start: &str,
    window_end: &str,
) -> Result<Vec<SlaRecord>, AppError> {
    let (id_text, name) = ci_ref_match_values(conn, ci_id)?;
    let sql = format!(
        r#"
      SELECT s.id, s.incident_id, s.name, s.stage, s.breach_at, s.planned_breach_at, s.created_at
      FROM sla_records s
      JOIN incidents i ON i.id = s.incident_id
      WHERE (i.ci_ref = ?1 OR i.ci_ref = ?2)
        AND s.created_at >= ?3 AND s.created_at <= ?4
      ORDER BY s.created_at DESC, s.id DESC
      LIMIT {CI_SLA_LIMIT}
      "#
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| query_failed("prepare CI SLA query", e))?;
    let rows = stmt
        .query_map(
            rusqlite::params![id_text, name, window_start, window_end],
            sla_from_row,
        )
        .map_err(|e| query_failed("query CI SLAs", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| query_failed("decode CI SLA row", e))?);
    }
    Ok(out)
}

/// Changes linked to this incident through a "fixes" task relation.
pub fn changes_fixing_incident(
    conn: &Connection,
    incident_id: i64,
) -> Result<Vec<ChangeRequest>, AppError> {
    let sql = format!(
        r#"
      SELECT {CHANGE_COLUMNS}
      FROM change_requests
      WHERE id IN (
        SELECT change_id FROM task_relations
        WHERE incident_id = ?1 AND rel_type = 'fixes'
      )
      ORDER BY created_at ASC, id ASC
      "#
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| query_failed("prepare fixing changes query", e))?;
    let rows = stmt
        .query_map([incident_id], change_from_row)
        .map_err(|e| query_failed("query fixing changes", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| query_failed("decode fixing change row", e))?);
    }
    Ok(out)
}
