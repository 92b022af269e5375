use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Task priority, transported as its ordinal (1 = most urgent).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Urgent,
    Important,
    #[default]
    Normal,
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Urgent => 1,
            Priority::Important => 2,
            Priority::Normal => 3,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Urgent),
            2 => Ok(Priority::Important),
            3 => Ok(Priority::Normal),
            other => Err(format!("priority must be 1..=3, got {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
    Postponed,
    Cancelled,
}

/// A task as the remote store represents it. `status == Cancelled` is the only
/// form of deletion; rows are never physically destroyed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub context: Option<String>,
    pub priority: Priority,
    pub pomodoros: u32,
    pub pomodoros_done: u32,
    pub target_hour: Option<String>,
    pub suggested_hour: Option<String>,
    pub status: TaskStatus,
    pub date: String,
    pub position: u32,
    pub created_at: DateTime<Utc>,
    pub done_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        validate_date(&self.date, "task.date")?;
        if let Some(hour) = self.target_hour.as_deref() {
            validate_hhmm(hour, "task.target_hour")?;
        }
        if let Some(hour) = self.suggested_hour.as_deref() {
            validate_hhmm(hour, "task.suggested_hour")?;
        }
        if self.pomodoros == 0 {
            return Err("task.pomodoros must be >= 1".to_string());
        }
        if self.pomodoros_done > self.pomodoros {
            return Err("task.pomodoros_done must be <= task.pomodoros".to_string());
        }
        Ok(())
    }

    /// Position is only meaningful within this subset of a day's tasks.
    pub fn is_active(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Postponed)
    }
}

/// Partial task fields as the AI parse boundary returns them. Any subset may
/// be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: Option<String>,
    pub context: Option<String>,
    pub priority: Option<Priority>,
    pub pomodoros: Option<u32>,
    pub target_hour: Option<String>,
    pub suggested_hour: Option<String>,
}

impl TaskDraft {
    /// Fills in every missing field with its documented fallback: priority
    /// defaults to Normal, pomodoros to 1 (floored at 1), optional strings
    /// stay absent. `fallback_title` covers drafts the parser returned with
    /// no usable title.
    pub fn into_new_task(self, fallback_title: &str, date: &str) -> NewTask {
        let title = self
            .title
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| fallback_title.trim().to_string());

        NewTask {
            title,
            priority: self.priority.unwrap_or_default(),
            pomodoros: self.pomodoros.unwrap_or(1).max(1),
            target_hour: normalize_optional(self.target_hour),
            context: normalize_optional(self.context),
            date: date.to_string(),
        }
    }
}

/// Payload for task creation. The remote store answers with only the new id;
/// the caller reconstructs the full task locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub priority: Priority,
    pub pomodoros: u32,
    pub target_hour: Option<String>,
    pub context: Option<String>,
    pub date: String,
}

impl NewTask {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "task.title")?;
        validate_date(&self.date, "task.date")?;
        if let Some(hour) = self.target_hour.as_deref() {
            validate_hhmm(hour, "task.target_hour")?;
        }
        if self.pomodoros == 0 {
            return Err("task.pomodoros must be >= 1".to_string());
        }
        Ok(())
    }

    /// Local reconstruction of the created task around the server-assigned id.
    pub fn into_task(self, id: String, created_at: DateTime<Utc>) -> Task {
        Task {
            id,
            title: self.title,
            context: self.context,
            priority: self.priority,
            pomodoros: self.pomodoros,
            pomodoros_done: 0,
            target_hour: self.target_hour,
            suggested_hour: None,
            status: TaskStatus::Pending,
            date: self.date,
            position: 0,
            created_at,
            done_at: None,
        }
    }
}

/// Partial update payload; absent fields are left untouched by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pomodoros: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pomodoros_done: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_hour: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn status_done(done_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(TaskStatus::Done),
            done_at: Some(done_at),
            ..Self::default()
        }
    }

    pub fn status_postponed() -> Self {
        Self {
            status: Some(TaskStatus::Postponed),
            ..Self::default()
        }
    }

    pub fn status_cancelled() -> Self {
        Self {
            status: Some(TaskStatus::Cancelled),
            ..Self::default()
        }
    }

    pub fn pomodoros_done(count: u32) -> Self {
        Self {
            pomodoros_done: Some(count),
            ..Self::default()
        }
    }
}

/// Ephemeral focus-session state. The engine owns the only instance in the
/// process; it never outlives cancellation or target completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivePomodoro {
    pub task_id: String,
    /// Denormalized so the display stays stable if the task list changes
    /// underneath the session.
    pub task_title: String,
    pub seconds_left: u32,
    pub is_break: bool,
    pub is_paused: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayStats {
    pub total: u32,
    pub done: u32,
    pub pomodoros_done: u32,
    pub pomodoros_total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeekDayStats {
    pub date: String,
    pub total: u32,
    pub done: u32,
    pub pomodoros: u32,
    pub score: Option<f64>,
}

/// Trailing-window aggregates. The boundary currently reports this empty;
/// an all-zero value is a valid result, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeekStats {
    pub days: Vec<WeekDayStats>,
    pub avg_score: f64,
    pub completion_rate: f64,
    pub total_pomodoros: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feedback {
    pub date: String,
    pub score: u8,
    pub notes: Option<String>,
    pub tasks_done: u32,
    pub tasks_total: u32,
}

impl Feedback {
    pub fn validate(&self) -> Result<(), String> {
        validate_date(&self.date, "feedback.date")?;
        if !(1..=5).contains(&self.score) {
            return Err("feedback.score must be 1..=5".to_string());
        }
        Ok(())
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| format!("{field_name} must be HH:MM"))?;
    Ok(())
}

pub(crate) fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    let parsed = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    // chrono tolerates unpadded components; date keys are compared as
    // strings, so only the canonical form is accepted.
    if parsed.format("%Y-%m-%d").to_string() != value {
        return Err(format!("{field_name} must be zero-padded YYYY-MM-DD"));
    }
    Ok(())
}
