pub mod day_navigation;
pub mod pomodoro;
pub mod stats;
pub mod task_store;
