use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing::warn;

use crate::domain::{IncidentState, Priority};
use crate::error::AppError;
use crate::gateway::{self, CiResolution};

/// Default lookback window ahead of the incident's open time.
pub const DEFAULT_WINDOW_HOURS: i64 = 48;

/// Fixed weights of the correlation score (relative ranking only).
pub const INCIDENT_WEIGHT: i64 = 1;
pub const CHANGE_WEIGHT: i64 = 2;
pub const SLA_BREACH_WEIGHT: i64 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiInfo {
    pub id: i64,
    pub name: String,
    pub class: Option<String>,
    pub category: Option<String>,
    pub install_status: Option<String>,
    pub operational_status: Option<String>,
    pub last_discovered: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub pre_incident_hours: i64,
    pub start_time: String,
    pub incident_opened_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConcurrentIncident {
    pub id: i64,
    pub number: String,
    pub short_description: String,
    pub priority_display: String,
    pub state_display: String,
    pub opened_at: Option<String>,
    pub caller: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowChange {
    pub id: i64,
    pub number: String,
    pub short_description: String,
    pub change_type: Option<String>,
    pub state: String,
    pub risk: Option<String>,
    pub impact: Option<String>,
    pub created_at: String,
    pub planned_start: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSlaEvent {
    pub name: String,
    pub stage: String,
    pub breach_at: Option<String>,
    pub planned_breach_at: Option<String>,
    pub breached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedActivity {
    pub concurrent_incidents: Vec<ConcurrentIncident>,
    pub change_requests: Vec<WindowChange>,
    pub sla_events: Vec<WindowSlaEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StressIndicators {
    pub overload_indicator: StressLevel,
    pub stability_risk: StressLevel,
    pub correlation_insights: Vec<String>,
    pub health_score: i64,
}

/// Full CI health report for one incident's lookback window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiHealthReport {
    pub ci_present: bool,
    pub ci_info: CiInfo,
    pub time_window: TimeWindow,
    pub related_activity: RelatedActivity,
    pub stress_indicators: StressIndicators,
    pub correlation_score: i64,
    pub analysis_timestamp: String,
}

/// Well-formed payload for the expected "no CI attached" case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiAbsent {
    pub ci_present: bool,
    pub insights: String,
    pub friendly_message: String,
}

impl CiAbsent {
    pub fn hint() -> Self {
        Self {
            ci_present: false,
            insights: "No Configuration Item is currently assigned to this incident. \
                       CI health analysis is not available without a connected configuration item."
                .to_string(),
            friendly_message: "Add a Configuration Item to this incident to view its health \
                               history and correlation analysis."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CiHealthOutcome {
    Report(Box<CiHealthReport>),
    NoCi(CiAbsent),
}

fn format_rfc3339(dt: OffsetDateTime) -> Result<String, AppError> {
    dt.format(&Rfc3339).map_err(|e| {
        AppError::new("TIME_FORMAT_FAILED", "Failed to format timestamp").with_details(e.to_string())
    })
}

fn window_bounds(
    incident_id: i64,
    opened_at: &Option<String>,
    window_hours: i64,
    now: OffsetDateTime,
) -> Result<(String, String), AppError> {
    let opened = match opened_at.as_deref() {
        Some(s) => match OffsetDateTime::parse(s, &Rfc3339) {
            Ok(dt) => dt,
            Err(e) => {
                warn!(incident = incident_id, error = %e, "unparseable opened_at; anchoring window at now");
                now
            }
        },
        None => {
            warn!(incident = incident_id, "missing opened_at; anchoring window at now");
            now
        }
    };

    let start = opened - Duration::hours(window_hours);
    Ok((format_rfc3339(start)?, format_rfc3339(opened)?))
}

/// Single-pass CI correlation analysis over a fixed lookback window.
///
/// A missing or unresolvable CI reference is an expected case and yields
/// [`CiHealthOutcome::NoCi`]; only a missing incident is a hard failure.
/// Activity fetch failures degrade to empty lists with a logged warning.
pub fn analyze_ci_health(
    conn: &Connection,
    incident_id: i64,
    window_hours: i64,
    now: OffsetDateTime,
) -> Result<CiHealthOutcome, AppError> {
    let incident = gateway::get_incident(conn, incident_id)?;

    let ci_id = match incident.ci_ref.as_deref().filter(|r| !r.trim().is_empty()) {
        None => return Ok(CiHealthOutcome::NoCi(CiAbsent::hint())),
        Some(ci_ref) => match gateway::resolve_ci(conn, ci_ref)? {
            CiResolution::Resolved(id) => id,
            CiResolution::Unresolved => {
                warn!(incident = incident_id, ci_ref, "CI reference did not resolve");
                return Ok(CiHealthOutcome::NoCi(CiAbsent::hint()));
            }
        },
    };

    let ci_info = match gateway::find_config_item(conn, ci_id)? {
        Some(ci) => CiInfo {
            id: ci.id,
            name: ci.name,
            class: ci.class,
            category: ci.category,
            install_status: ci.install_status,
            operational_status: ci.operational_status,
            last_discovered: ci.last_discovered,
        },
        None => {
            warn!(incident = incident_id, ci = ci_id, "resolved CI row missing");
            return Ok(CiHealthOutcome::NoCi(CiAbsent::hint()));
        }
    };

    let (start_time, incident_opened_at) =
        window_bounds(incident_id, &incident.opened_at, window_hours, now)?;

    let concurrent_incidents = gateway::incidents_for_ci_window(
        conn,
        ci_id,
        &start_time,
        &incident_opened_at,
        incident_id,
    )
    .unwrap_or_else(|e| {
        warn!(incident = incident_id, error = %e, "CI incident activity fetch failed; using empty list");
        Vec::new()
    })
    .into_iter()
    .map(|inc| ConcurrentIncident {
        id: inc.id,
        number: inc.number,
        short_description: inc.short_description,
        priority_display: Priority::from_raw(&inc.priority).display().to_string(),
        state_display: IncidentState::from_raw(&inc.state).display().to_string(),
        opened_at: inc.opened_at,
        caller: inc.caller,
    })
    .collect::<Vec<_>>();

    let change_requests = gateway::changes_for_ci_window(conn, ci_id, &start_time, &incident_opened_at)
        .unwrap_or_else(|e| {
            warn!(incident = incident_id, error = %e, "CI change activity fetch failed; using empty list");
            Vec::new()
        })
        .into_iter()
        .map(|ch| WindowChange {
            active: ch.is_active(),
            id: ch.id,
            number: ch.number,
            short_description: ch.short_description,
            change_type: ch.change_type.clone(),
            state: ch.state,
            risk: ch.risk,
            impact: ch.impact,
            created_at: ch.created_at,
            planned_start: ch.planned_start,
        })
        .collect::<Vec<_>>();

    let sla_events = gateway::slas_for_ci_window(conn, ci_id, &start_time, &incident_opened_at)
        .unwrap_or_else(|e| {
            warn!(incident = incident_id, error = %e, "CI SLA activity fetch failed; using empty list");
            Vec::new()
        })
        .into_iter()
        .map(|sla| WindowSlaEvent {
            breached: sla.is_breached(),
            name: sla.name,
            stage: sla.stage,
            breach_at: sla.breach_at,
            planned_breach_at: sla.planned_breach_at,
        })
        .collect::<Vec<_>>();

    let related_activity = RelatedActivity {
        concurrent_incidents,
        change_requests,
        sla_events,
    };
    let stress_indicators = derive_stress_indicators(&related_activity);
    let correlation_score = correlation_score(&related_activity);

    Ok(CiHealthOutcome::Report(Box::new(CiHealthReport {
        ci_present: true,
        ci_info,
        time_window: TimeWindow {
            pre_incident_hours: window_hours,
            start_time,
            incident_opened_at,
        },
        related_activity,
        stress_indicators,
        correlation_score,
        analysis_timestamp: format_rfc3339(now)?,
    })))
}

fn active_change_count(activity: &RelatedActivity) -> i64 {
    activity.change_requests.iter().filter(|c| c.active).count() as i64
}

fn sla_breach_count(activity: &RelatedActivity) -> i64 {
    activity.sla_events.iter().filter(|s| s.breached).count() as i64
}

/// Derive overload/stability indicators and the 0-100 health score from
/// in-window activity.
fn derive_stress_indicators(activity: &RelatedActivity) -> StressIndicators {
    let mut indicators = StressIndicators {
        overload_indicator: StressLevel::Low,
        stability_risk: StressLevel::Low,
        correlation_insights: Vec::new(),
        health_score: 100,
    };

    let concurrent = activity.concurrent_incidents.len() as i64;
    let active_changes = active_change_count(activity);
    let breaches = sla_breach_count(activity);

    if concurrent >= 3 {
        indicators.overload_indicator = StressLevel::High;
        indicators
            .correlation_insights
            .push("High incident concurrency - CI may be experiencing related issues".to_string());
        indicators.health_score -= 25;
    } else if concurrent >= 1 {
        indicators.overload_indicator = StressLevel::Medium;
        indicators
            .correlation_insights
            .push("Multiple incidents affecting same CI".to_string());
        indicators.health_score -= 10;
    }

    if active_changes >= 2 {
        indicators.stability_risk = StressLevel::Medium;
        indicators
            .correlation_insights
            .push("Multiple concurrent changes involving CI".to_string());
        indicators.health_score -= 15;
    } else if active_changes >= 1 {
        indicators
            .correlation_insights
            .push("Change activity around incident time".to_string());
    }

    if breaches >= 1 {
        indicators.stability_risk = StressLevel::High;
        indicators
            .correlation_insights
            .push("SLA breaches indicate service level pressure".to_string());
        indicators.health_score -= 20;
    }

    if indicators.health_score < 75 {
        indicators
            .correlation_insights
            .push("RECOMMENDATION: Consider CI maintenance or monitoring enhancement".to_string());
    }
    if concurrent > 0 && active_changes > 0 {
        indicators.correlation_insights.push(
            "RECOMMENDATION: Evaluate change readiness - incident occurred during change window"
                .to_string(),
        );
    }

    indicators
}

/// Weighted activity sum, unbounded; used for relative ranking only.
fn correlation_score(activity: &RelatedActivity) -> i64 {
    let concurrent = activity.concurrent_incidents.len() as i64;
    let active_changes = active_change_count(activity);
    let breaches = sla_breach_count(activity);

    concurrent * INCIDENT_WEIGHT + active_changes * CHANGE_WEIGHT + breaches * SLA_BREACH_WEIGHT
}
