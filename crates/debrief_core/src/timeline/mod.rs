use rusqlite::Connection;

use crate::domain::{JournalKind, TimelineEvent, WatchedField, EMPTY_VALUE};
use crate::error::AppError;
use crate::gateway;

/// Render a field change as a human-readable sentence.
pub fn format_field_change(field: WatchedField, old_value: &str, new_value: &str) -> String {
    format!(
        "{} changed from \"{}\" to \"{}\"",
        field.label(),
        old_value,
        new_value
    )
}

/// Merge journal entries and watched-field history into one chronologically
/// ordered event sequence.
///
/// Guarantees:
/// - only actual changes (old != new) produce field-change events;
/// - events are sorted by timestamp ascending with a stable comparison;
/// - at identical timestamps, field changes sort before notes (the field
///   changes are concatenated first and the sort is stable).
///
/// The returned sequence is the sole input for every downstream metric.
pub fn build_timeline(conn: &Connection, incident_id: i64) -> Result<Vec<TimelineEvent>, AppError> {
    let mut events = Vec::new();

    for line in gateway::history_lines_for(conn, incident_id)? {
        let Some(field) = WatchedField::from_column(&line.field) else {
            continue;
        };

        let old_raw = line.old_value.as_deref().unwrap_or("");
        let new_raw = line.new_value.as_deref().unwrap_or("");
        if old_raw == new_raw {
            continue;
        }

        let old_value = if old_raw.is_empty() {
            EMPTY_VALUE.to_string()
        } else {
            old_raw.to_string()
        };
        let new_value = if new_raw.is_empty() {
            EMPTY_VALUE.to_string()
        } else {
            new_raw.to_string()
        };

        events.push(TimelineEvent::FieldChange {
            timestamp: line.created_at,
            user: line.created_by,
            field,
            change_description: format_field_change(field, &old_value, &new_value),
            old_value,
            new_value,
        });
    }

    for entry in gateway::journal_entries_for(conn, incident_id)? {
        let event = match entry.kind {
            JournalKind::Comment => TimelineEvent::Comment {
                timestamp: entry.created_at,
                user: entry.created_by,
                content: entry.content,
            },
            JournalKind::WorkNote => TimelineEvent::WorkNote {
                timestamp: entry.created_at,
                user: entry.created_by,
                content: entry.content,
            },
        };
        events.push(event);
    }

    // Canonical RFC3339 UTC timestamps compare chronologically as strings.
    events.sort_by(|a, b| a.timestamp().cmp(b.timestamp()));

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_change_description_names_the_field() {
        let s = format_field_change(WatchedField::AssignmentGroup, "Service Desk", "Network Ops");
        assert_eq!(
            s,
            "Assignment Group changed from \"Service Desk\" to \"Network Ops\""
        );
    }
}
