use serde::{Deserialize, Serialize};

/// Canonical incident representation: a read-only point-in-time view of one
/// row in the backing store.
///
/// Notes:
/// - All timestamps are nullable RFC3339 UTC strings; the store writes only
///   canonical values, so string ordering is chronological.
/// - `state` and `priority` hold the raw store codes; use [`IncidentState`]
///   and [`Priority`] for display and classification.
/// - `ci_ref` may hold a canonical configuration-item id or a loose CI name;
///   resolution happens in the gateway and may legitimately fail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    pub id: i64,
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

/// Incident lifecycle states, decoded from the raw store codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    New,
    InProgress,
    OnHold,
    Resolved,
    Closed,
    Canceled,
    Unknown,
}

impl IncidentState {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "1" => Self::New,
            "2" => Self::InProgress,
            "3" => Self::OnHold,
            "6" => Self::Resolved,
            "7" => Self::Closed,
            "8" => Self::Canceled,
            _ => Self::Unknown,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InProgress => "In Progress",
            Self::OnHold => "On Hold",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
            Self::Canceled => "Canceled",
            Self::Unknown => "Unknown",
        }
    }
}

/// Incident priority, raw codes 1 (critical) through 4 (low).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Moderate,
    Low,
    Unknown,
}

impl Priority {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "1" => Self::Critical,
            "2" => Self::High,
            "3" => Self::Moderate,
            "4" => Self::Low,
            _ => Self::Unknown,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::Critical => "1 - Critical",
            Self::High => "2 - High",
            Self::Moderate => "3 - Moderate",
            Self::Low => "4 - Low",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Problem {
    pub id: i64,
    pub number: String,
    pub short_description: String,
    pub state: String,
    pub priority: Option<String>,
    pub opened_at: Option<String>,
    pub resolved_at: Option<String>,
}

impl Problem {
    /// A problem still counts as active unless explicitly resolved or closed.
    pub fn is_open(&self) -> bool {
        !matches!(self.state.as_str(), "Resolved" | "Closed")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigItem {
    pub id: i64,
    pub name: String,
    pub class: Option<String>,
    pub category: Option<String>,
    pub install_status: Option<String>,
    pub operational_status: Option<String>,
    pub impact: Option<i64>,
    pub last_discovered: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRequest {
    pub id: i64,
    pub number: String,
    pub short_description: String,
    pub change_type: Option<String>,
    pub state: String,
    pub risk: Option<String>,
    pub impact: Option<String>,
    pub priority: Option<String>,
    pub ci_id: Option<i64>,
    pub created_at: String,
    pub planned_start: Option<String>,
    pub planned_end: Option<String>,
    pub work_end: Option<String>,
}

impl ChangeRequest {
    pub fn is_active(&self) -> bool {
        !matches!(self.state.as_str(), "Closed" | "Cancelled")
    }

    pub fn is_implemented(&self) -> bool {
        matches!(self.state.as_str(), "Closed" | "Implemented")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlaRecord {
    pub id: i64,
    pub incident_id: i64,
    pub name: String,
    pub stage: String,
    pub breach_at: Option<String>,
    pub planned_breach_at: Option<String>,
    pub created_at: String,
}

impl SlaRecord {
    /// Breach is signalled by the stage text, e.g. "Breached".
    pub fn is_breached(&self) -> bool {
        self.stage.to_lowercase().contains("breach")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    Comment,
    WorkNote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: i64,
    pub incident_id: i64,
    pub kind: JournalKind,
    pub created_at: String,
    pub created_by: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryLine {
    pub id: i64,
    pub incident_id: i64,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: String,
    pub created_by: String,
}

/// The closed set of audited incident fields. History lines on any other
/// field never become timeline events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatchedField {
    State,
    Priority,
    AssignedTo,
    AssignmentGroup,
    Category,
    Subcategory,
}

impl WatchedField {
    pub const ALL: [WatchedField; 6] = [
        WatchedField::State,
        WatchedField::Priority,
        WatchedField::AssignedTo,
        WatchedField::AssignmentGroup,
        WatchedField::Category,
        WatchedField::Subcategory,
    ];

    pub fn from_column(column: &str) -> Option<Self> {
        match column {
            "state" => Some(Self::State),
            "priority" => Some(Self::Priority),
            "assigned_to" => Some(Self::AssignedTo),
            "assignment_group" => Some(Self::AssignmentGroup),
            "category" => Some(Self::Category),
            "subcategory" => Some(Self::Subcategory),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Priority => "priority",
            Self::AssignedTo => "assigned_to",
            Self::AssignmentGroup => "assignment_group",
            Self::Category => "category",
            Self::Subcategory => "subcategory",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::State => "State",
            Self::Priority => "Priority",
            Self::AssignedTo => "Assigned To",
            Self::AssignmentGroup => "Assignment Group",
            Self::Category => "Category",
            Self::Subcategory => "Subcategory",
        }
    }

    /// Fields whose changes count as key events and handoffs.
    pub fn is_significant(&self) -> bool {
        matches!(
            self,
            Self::State | Self::Priority | Self::AssignedTo | Self::AssignmentGroup
        )
    }
}

/// Placeholder rendered for absent old/new values in field changes.
pub const EMPTY_VALUE: &str = "(empty)";

/// One atomic occurrence in an incident's history.
///
/// The merged, ordered sequence of these events is the sole source of truth
/// for every debrief metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEvent {
    FieldChange {
        timestamp: String,
        user: String,
        field: WatchedField,
        old_value: String,
        new_value: String,
        change_description: String,
    },
    Comment {
        timestamp: String,
        user: String,
        content: String,
    },
    WorkNote {
        timestamp: String,
        user: String,
        content: String,
    },
}

impl TimelineEvent {
    pub fn timestamp(&self) -> &str {
        match self {
            Self::FieldChange { timestamp, .. }
            | Self::Comment { timestamp, .. }
            | Self::WorkNote { timestamp, .. } => timestamp,
        }
    }

    pub fn user(&self) -> &str {
        match self {
            Self::FieldChange { user, .. }
            | Self::Comment { user, .. }
            | Self::WorkNote { user, .. } => user,
        }
    }

    /// Free-text content for notes; `None` for field changes.
    pub fn note_content(&self) -> Option<&str> {
        match self {
            Self::Comment { content, .. } | Self::WorkNote { content, .. } => Some(content),
            Self::FieldChange { .. } => None,
        }
    }

    pub fn field(&self) -> Option<WatchedField> {
        match self {
            Self::FieldChange { field, .. } => Some(*field),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
