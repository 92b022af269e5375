use crate::domain::models::{DayStats, Task, TaskStatus};

/// Derives the day's aggregate counters from a task collection. Always a
/// fresh, pure derivation; nothing is cached, so there is no invalidation to
/// get wrong.
pub fn compute_day_stats(tasks: &[Task]) -> DayStats {
    DayStats {
        total: tasks.len() as u32,
        done: tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Done)
            .count() as u32,
        pomodoros_done: tasks.iter().map(|task| task.pomodoros_done).sum(),
        pomodoros_total: tasks.iter().map(|task| task.pomodoros).sum(),
    }
}
