use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

use crate::ci_health::{self, CiAbsent, CiHealthOutcome, CiHealthReport, DEFAULT_WINDOW_HOURS};
use crate::debrief::{generate_debrief, Debrief};
use crate::domain::{TimelineEvent, ValidationWarning};
use crate::enrich::{compose_snapshot, IncidentSnapshot};
use crate::error::AppError;
use crate::gateway::{self, IncidentSearchHit};
use crate::timeline::build_timeline;

/// Envelope for the keyword search operation. Callers must branch on
/// `success` before reading the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<IncidentSearchHit>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchEnvelope {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            results: None,
            error: Some(error.into()),
        }
    }
}

/// Keyword search over incidents. Validation failures are reported without
/// touching the store.
pub fn search_incidents_op(conn: &Connection, term: &str) -> SearchEnvelope {
    if term.trim().is_empty() {
        return SearchEnvelope::failure("Search term is required");
    }

    match gateway::search_incidents(conn, term) {
        Ok(results) => SearchEnvelope {
            success: true,
            results: Some(results),
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "incident search failed");
            SearchEnvelope::failure(format!("Search failed: {e}"))
        }
    }
}

/// Envelope for the full analysis operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident: Option<IncidentSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<TimelineEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debrief: Option<Debrief>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<ValidationWarning>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisEnvelope {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            incident: None,
            timeline: None,
            debrief: None,
            warnings: None,
            error: Some(error.into()),
        }
    }
}

/// Compose an incident's full analysis: enriched snapshot, merged timeline,
/// derived debrief. Wall-clock entry point.
pub fn generate_analysis_op(conn: &Connection, incident_id: Option<i64>) -> AnalysisEnvelope {
    generate_analysis_at(conn, incident_id, OffsetDateTime::now_utc())
}

/// As [`generate_analysis_op`], with `now` injected. `now` flows only into
/// the resolution-time fallback, so a fixed instant yields fully
/// reproducible output.
pub fn generate_analysis_at(
    conn: &Connection,
    incident_id: Option<i64>,
    now: OffsetDateTime,
) -> AnalysisEnvelope {
    let Some(incident_id) = incident_id else {
        return AnalysisEnvelope::failure("Incident id is required");
    };

    let incident = match gateway::find_incident(conn, incident_id) {
        Ok(Some(incident)) => incident,
        Ok(None) => return AnalysisEnvelope::failure("Incident not found"),
        Err(e) => {
            warn!(incident = incident_id, error = %e, "incident fetch failed");
            return AnalysisEnvelope::failure(format!("Analysis failed: {e}"));
        }
    };

    let result: Result<AnalysisEnvelope, AppError> = (|| {
        let timeline = build_timeline(conn, incident_id)?;
        let snapshot = compose_snapshot(conn, incident, &timeline)?;
        let (debrief, warnings) = generate_debrief(&snapshot, &timeline, now);

        Ok(AnalysisEnvelope {
            success: true,
            incident: Some(snapshot),
            timeline: Some(timeline),
            debrief: Some(debrief),
            warnings: if warnings.is_empty() {
                None
            } else {
                Some(warnings)
            },
            error: None,
        })
    })();

    result.unwrap_or_else(|e| {
        warn!(incident = incident_id, error = %e, "analysis failed");
        AnalysisEnvelope::failure(format!("Analysis failed: {e}"))
    })
}

/// Payload of the CI health operation: a full report, or the structured
/// "no CI attached" hint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CiHealthData {
    Report(Box<CiHealthReport>),
    Absent(CiAbsent),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiHealthEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<CiHealthData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CiHealthEnvelope {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// CI health history for an incident's lookback window. Wall-clock entry
/// point; `window_hours` defaults to [`DEFAULT_WINDOW_HOURS`].
pub fn ci_health_op(
    conn: &Connection,
    incident_id: Option<i64>,
    window_hours: Option<i64>,
) -> CiHealthEnvelope {
    ci_health_at(conn, incident_id, window_hours, OffsetDateTime::now_utc())
}

pub fn ci_health_at(
    conn: &Connection,
    incident_id: Option<i64>,
    window_hours: Option<i64>,
    now: OffsetDateTime,
) -> CiHealthEnvelope {
    let Some(incident_id) = incident_id else {
        return CiHealthEnvelope::failure("Incident id is required");
    };
    let window_hours = window_hours
        .filter(|h| *h > 0)
        .unwrap_or(DEFAULT_WINDOW_HOURS);

    match ci_health::analyze_ci_health(conn, incident_id, window_hours, now) {
        Ok(CiHealthOutcome::Report(report)) => CiHealthEnvelope {
            success: true,
            data: Some(CiHealthData::Report(report)),
            error: None,
        },
        // Expected case, not an error: the payload tells the caller what to do.
        Ok(CiHealthOutcome::NoCi(absent)) => CiHealthEnvelope {
            success: false,
            data: Some(CiHealthData::Absent(absent)),
            error: Some("Configuration Item not connected".to_string()),
        },
        Err(e) if e.code == "DB_NOT_FOUND" => CiHealthEnvelope::failure("Incident not found"),
        Err(e) => {
            warn!(incident = incident_id, error = %e, "CI health analysis failed");
            CiHealthEnvelope::failure(format!("CI health analysis failed: {e}"))
        }
    }
}
