//! Client-side engine for an AI-assisted day planner: a task store mirroring
//! one day of the remote agenda, a single-instance pomodoro timer bound to
//! those tasks, calendar-day navigation and locally derived day statistics.
//!
//! All durable state lives behind the remote task service; the store
//! rehydrates from it on every day load. The active pomodoro session and the
//! selected date are transient process state.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::day_navigation;
pub use application::pomodoro::{BREAK_SECONDS, PomodoroEngine, WORK_SECONDS};
pub use application::stats::compute_day_stats;
pub use application::task_store::TaskStore;
pub use domain::models::{
    ActivePomodoro, DayStats, Feedback, NewTask, Priority, Task, TaskDraft, TaskPatch, TaskStatus,
    WeekDayStats, WeekStats,
};
pub use infrastructure::agenda_client::{
    AgendaService, DEFAULT_BASE_URL, ReorderEntry, ReqwestAgendaClient,
};
pub use infrastructure::error::AgendaError;
pub use infrastructure::notifier::{LogNotifier, Notifier};
