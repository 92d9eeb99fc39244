use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::{TimelineEvent, ValidationWarning, WatchedField, EMPTY_VALUE};
use crate::enrich::IncidentSnapshot;

/// Minimum note length (chars) for a note to carry cause information.
const CAUSE_MIN_NOTE_CHARS: usize = 10;
/// Maximum chars of the fallback cause excerpt.
const CAUSE_EXCERPT_CHARS: usize = 100;
/// Notes longer than this become medium-significance key events.
const KEY_EVENT_NOTE_CHARS: usize = 50;
/// Chars of note content carried into the key-event preview.
const KEY_EVENT_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionTime {
    pub seconds: i64,
    pub display: String,
    pub is_resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirstResponse {
    pub seconds: i64,
    pub display: String,
    pub responder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteCounts {
    pub comments: i64,
    pub work_notes: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyEvent {
    pub timestamp: String,
    pub description: String,
    pub user: String,
    pub significance: Significance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreWithFactors {
    pub score: i64,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlaCompliance {
    pub score: i64,
    pub breaches: i64,
    pub total_slas: i64,
    pub factors: Vec<String>,
}

/// The engine's structured post-incident summary: every metric is derived
/// from the (snapshot, timeline) pair alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Debrief {
    pub resolution_time: ResolutionTime,
    pub first_response_time: FirstResponse,
    pub handoff_count: i64,
    pub groups_involved: Vec<String>,
    pub note_counts: NoteCounts,
    pub state_changes: i64,
    pub priority_changes: i64,
    pub reopen_count: i64,
    pub cause_summary: String,
    pub key_events: Vec<KeyEvent>,
    pub resolution_quality: ScoreWithFactors,
    pub hierarchy_complexity: ScoreWithFactors,
    pub sla_compliance: SlaCompliance,
}

fn parse_ts(
    field: &str,
    raw: &Option<String>,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<OffsetDateTime> {
    let Some(s) = raw.as_deref() else { return None };
    match OffsetDateTime::parse(s, &Rfc3339) {
        Ok(dt) => Some(dt),
        Err(e) => {
            warnings.push(
                ValidationWarning::new(
                    "DEBRIEF_TS_PARSE_FAILED",
                    format!("Failed to parse {field} for debrief metrics"),
                )
                .with_details(format!("value={s}; err={e}")),
            );
            None
        }
    }
}

/// Format a duration into its coarsest applicable unit breakdown.
pub fn format_duration_seconds(secs: i64) -> String {
    let minutes = secs / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{} days, {} hours", days, hours % 24)
    } else if hours > 0 {
        format!("{} hours, {} minutes", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{} minutes", minutes)
    } else {
        format!("{} seconds", secs)
    }
}

fn elapsed_seconds(
    from_field: &str,
    from: OffsetDateTime,
    to_field: &str,
    to: OffsetDateTime,
    warnings: &mut Vec<ValidationWarning>,
) -> i64 {
    let secs = (to - from).whole_seconds();
    if secs < 0 {
        warnings.push(
            ValidationWarning::new(
                "DEBRIEF_TS_ORDER_VIOLATION",
                format!("{from_field} is later than {to_field}; clamping duration to zero"),
            )
            .with_details(format!("{from_field}={from}; {to_field}={to}")),
        );
        0
    } else {
        secs
    }
}

/// Elapsed time from opening to resolution, falling back to closure, then to
/// `now` for still-open incidents.
fn resolution_time(
    snapshot: &IncidentSnapshot,
    now: OffsetDateTime,
    warnings: &mut Vec<ValidationWarning>,
) -> ResolutionTime {
    let incident = &snapshot.incident;
    let Some(opened) = parse_ts("opened_at", &incident.opened_at, warnings) else {
        return ResolutionTime {
            seconds: 0,
            display: "Unknown - no opening time".to_string(),
            is_resolved: false,
        };
    };

    let is_resolved = incident.resolved_at.is_some();
    let end = parse_ts("resolved_at", &incident.resolved_at, warnings)
        .or_else(|| parse_ts("closed_at", &incident.closed_at, warnings))
        .unwrap_or(now);

    let seconds = elapsed_seconds("opened_at", opened, "resolution end", end, warnings);
    ResolutionTime {
        seconds,
        display: format_duration_seconds(seconds),
        is_resolved,
    }
}

/// Elapsed time to the first note authored by someone other than the opener.
fn first_response_time(
    snapshot: &IncidentSnapshot,
    timeline: &[TimelineEvent],
    warnings: &mut Vec<ValidationWarning>,
) -> FirstResponse {
    let incident = &snapshot.incident;
    let Some(opened) = parse_ts("opened_at", &incident.opened_at, warnings) else {
        return FirstResponse {
            seconds: 0,
            display: "Unknown - no opening time".to_string(),
            responder: None,
        };
    };

    let opener = incident.opened_by.as_deref().unwrap_or("");
    let first = timeline
        .iter()
        .find(|e| e.note_content().is_some() && e.user() != opener);

    let Some(event) = first else {
        return FirstResponse {
            seconds: 0,
            display: "No response recorded".to_string(),
            responder: None,
        };
    };

    let Some(responded) = parse_ts(
        "first_response",
        &Some(event.timestamp().to_string()),
        warnings,
    ) else {
        return FirstResponse {
            seconds: 0,
            display: "No response recorded".to_string(),
            responder: None,
        };
    };

    let seconds = elapsed_seconds("opened_at", opened, "first_response", responded, warnings);
    FirstResponse {
        seconds,
        display: format_duration_seconds(seconds),
        responder: Some(event.user().to_string()),
    }
}

/// Reassignment events: any change to assignee or assignment group.
fn count_handoffs(timeline: &[TimelineEvent]) -> i64 {
    timeline
        .iter()
        .filter(|e| {
            matches!(
                e.field(),
                Some(WatchedField::AssignedTo) | Some(WatchedField::AssignmentGroup)
            )
        })
        .count() as i64
}

/// Distinct assignment groups in first-appearance order, from both sides of
/// every assignment-group change.
fn groups_involved(timeline: &[TimelineEvent]) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for event in timeline {
        let TimelineEvent::FieldChange {
            field: WatchedField::AssignmentGroup,
            old_value,
            new_value,
            ..
        } = event
        else {
            continue;
        };
        for value in [old_value, new_value] {
            if !value.is_empty() && value != EMPTY_VALUE && !groups.contains(value) {
                groups.push(value.clone());
            }
        }
    }
    groups
}

fn count_notes(timeline: &[TimelineEvent]) -> NoteCounts {
    let mut counts = NoteCounts {
        comments: 0,
        work_notes: 0,
        total: 0,
    };
    for event in timeline {
        match event {
            TimelineEvent::Comment { .. } => {
                counts.comments += 1;
                counts.total += 1;
            }
            TimelineEvent::WorkNote { .. } => {
                counts.work_notes += 1;
                counts.total += 1;
            }
            TimelineEvent::FieldChange { .. } => {}
        }
    }
    counts
}

fn count_field_changes(timeline: &[TimelineEvent], field: WatchedField) -> i64 {
    timeline.iter().filter(|e| e.field() == Some(field)).count() as i64
}

/// Ordered keyword rules for cause classification; the first matching
/// category wins.
const CAUSE_RULES: [(&[&str], &str); 6] = [
    (
        &["network", "connectivity"],
        "Network or connectivity related issue",
    ),
    (
        &["server", "system", "down"],
        "Server or system related issue",
    ),
    (
        &["application", "software"],
        "Application or software related issue",
    ),
    (
        &["user", "access", "login"],
        "User access or authentication issue",
    ),
    (&["performance", "slow"], "Performance related issue"),
    (&["hardware", "disk", "memory"], "Hardware related issue"),
];

fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    let truncated: String = s.chars().take(max_chars).collect();
    let was_truncated = s.chars().count() > max_chars;
    (truncated, was_truncated)
}

/// Classify the earliest substantial note via ordered keyword matching, or
/// fall back to a truncated excerpt of that note.
fn cause_summary(timeline: &[TimelineEvent]) -> String {
    let first = timeline.iter().find_map(|e| {
        e.note_content()
            .filter(|c| c.chars().count() > CAUSE_MIN_NOTE_CHARS)
    });

    let Some(content) = first else {
        return "No detailed information available in journal entries".to_string();
    };

    let lowered = content.to_lowercase();
    for (keywords, label) in CAUSE_RULES {
        if keywords.iter().any(|k| lowered.contains(k)) {
            return label.to_string();
        }
    }

    let (excerpt, truncated) = truncate_chars(content, CAUSE_EXCERPT_CHARS);
    if truncated {
        format!("Issue described as: {excerpt}...")
    } else {
        format!("Issue described as: {excerpt}")
    }
}

/// Significant field changes (high) plus substantial notes (medium, with a
/// short preview).
fn identify_key_events(timeline: &[TimelineEvent]) -> Vec<KeyEvent> {
    let mut key_events = Vec::new();
    for event in timeline {
        match event {
            TimelineEvent::FieldChange {
                timestamp,
                user,
                field,
                change_description,
                ..
            } => {
                if field.is_significant() {
                    key_events.push(KeyEvent {
                        timestamp: timestamp.clone(),
                        description: change_description.clone(),
                        user: user.clone(),
                        significance: Significance::High,
                        content_preview: None,
                    });
                }
            }
            TimelineEvent::Comment {
                timestamp,
                user,
                content,
            }
            | TimelineEvent::WorkNote {
                timestamp,
                user,
                content,
            } => {
                if content.chars().count() > KEY_EVENT_NOTE_CHARS {
                    let (preview, truncated) = truncate_chars(content, KEY_EVENT_PREVIEW_CHARS);
                    let description = match event {
                        TimelineEvent::Comment { .. } => "Comment added",
                        _ => "Work note added",
                    };
                    key_events.push(KeyEvent {
                        timestamp: timestamp.clone(),
                        description: description.to_string(),
                        user: user.clone(),
                        significance: Significance::Medium,
                        content_preview: Some(if truncated {
                            format!("{preview}...")
                        } else {
                            preview
                        }),
                    });
                }
            }
        }
    }
    key_events
}

/// Resolution quality, 0-100, base 50: rewards a documented, actionable
/// close code and a reopen-free lifecycle.
fn resolution_quality(snapshot: &IncidentSnapshot) -> ScoreWithFactors {
    let incident = &snapshot.incident;
    let mut quality = ScoreWithFactors {
        score: 50,
        factors: Vec::new(),
    };

    match incident.close_code.as_deref().filter(|c| !c.is_empty()) {
        Some(code) => {
            quality.score += 20;
            quality.factors.push("Resolution code documented".to_string());
            let upper = code.to_uppercase();
            if !upper.contains("WON'T FIX") && !upper.contains("DUPLICATE") {
                quality
                    .factors
                    .push("Provides actionable resolution type".to_string());
            } else {
                quality.score -= 10;
            }
        }
        None => {
            quality.factors.push("Missing close code".to_string());
            quality.score -= 20;
        }
    }

    let reopen_count = incident.reopen_count;
    if reopen_count == 0 {
        quality.score += 20;
        quality
            .factors
            .push("No reopens - permanent solution".to_string());
    } else if reopen_count <= 2 {
        quality.factors.push("Minimal reopens - acceptable".to_string());
    } else {
        quality.score -= 15;
        quality
            .factors
            .push("Multiple reopens - solution quality concern".to_string());
    }

    quality
}

/// Hierarchy complexity, 0-10 scale, base 0: parents, spawned children, and
/// problem linkage each add weight.
fn hierarchy_complexity(snapshot: &IncidentSnapshot) -> ScoreWithFactors {
    let mut complexity = ScoreWithFactors {
        score: 0,
        factors: Vec::new(),
    };

    if snapshot.hierarchy.has_parent {
        complexity.score += 3;
        complexity
            .factors
            .push("Part of parent incident chain".to_string());
    }

    let child_count = snapshot.hierarchy.child_count;
    if child_count > 0 {
        complexity.score += child_count;
        complexity
            .factors
            .push(format!("{child_count} child incidents spawned"));
    }

    if let Some(problem) = &snapshot.problem_link {
        complexity.score += 2;
        if problem.is_open {
            complexity.score += 1;
            complexity.factors.push("Linked to active problem".to_string());
        } else {
            complexity
                .factors
                .push("Linked to resolved problem".to_string());
        }
    }

    complexity
}

/// SLA compliance, 0-100: percentage of attached SLAs whose stage does not
/// indicate breach, rounded to nearest integer. No SLAs means score 0.
fn sla_compliance(snapshot: &IncidentSnapshot) -> SlaCompliance {
    let mut compliance = SlaCompliance {
        score: 0,
        breaches: 0,
        total_slas: 0,
        factors: Vec::new(),
    };

    if snapshot.slas.is_empty() {
        compliance.factors.push("No SLAs attached".to_string());
        return compliance;
    }

    compliance.total_slas = snapshot.slas.len() as i64;
    compliance.breaches = snapshot.slas.iter().filter(|s| s.is_breached()).count() as i64;

    let met = compliance.total_slas - compliance.breaches;
    compliance.score = ((met as f64 / compliance.total_slas as f64) * 100.0).round() as i64;

    if compliance.breaches == 0 {
        compliance.factors.push("All SLAs met".to_string());
    } else {
        compliance
            .factors
            .push(format!("{} SLA breaches", compliance.breaches));
    }

    compliance
}

/// Derive the full debrief from a snapshot and its merged timeline.
///
/// Pure: no fetches, no randomness; `now` is injected and used only as the
/// resolution-time fallback for still-open incidents. Identical inputs yield
/// identical output.
pub fn generate_debrief(
    snapshot: &IncidentSnapshot,
    timeline: &[TimelineEvent],
    now: OffsetDateTime,
) -> (Debrief, Vec<ValidationWarning>) {
    let mut warnings = Vec::new();

    let debrief = Debrief {
        resolution_time: resolution_time(snapshot, now, &mut warnings),
        first_response_time: first_response_time(snapshot, timeline, &mut warnings),
        handoff_count: count_handoffs(timeline),
        groups_involved: groups_involved(timeline),
        note_counts: count_notes(timeline),
        state_changes: count_field_changes(timeline, WatchedField::State),
        priority_changes: count_field_changes(timeline, WatchedField::Priority),
        reopen_count: snapshot.incident.reopen_count,
        cause_summary: cause_summary(timeline),
        key_events: identify_key_events(timeline),
        resolution_quality: resolution_quality(snapshot),
        hierarchy_complexity: hierarchy_complexity(snapshot),
        sla_compliance: sla_compliance(snapshot),
    };

    (debrief, warnings)
}
