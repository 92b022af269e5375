use crate::application::day_navigation;
use crate::application::stats::compute_day_stats;
use crate::domain::models::{
    DayStats, Feedback, Task, TaskDraft, TaskPatch, WeekStats, validate_date,
};
use crate::infrastructure::agenda_client::{AgendaService, ReorderEntry};
use crate::infrastructure::error::AgendaError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const UNTITLED_TASK: &str = "Untitled task";

/// Authoritative in-process mirror of one day's tasks and the single write
/// path to the remote task service.
///
/// Mutations are fire-and-forget relative to each other: nothing serializes
/// overlapping calls against the same task id. Each committed write carries a
/// monotonic stamp so that a response arriving out of order is discarded
/// instead of silently clobbering a newer local state.
pub struct TaskStore<S: AgendaService> {
    service: Arc<S>,
    state: Mutex<StoreState>,
    next_stamp: AtomicU64,
    now_provider: NowProvider,
}

#[derive(Debug)]
struct StoreState {
    current_date: String,
    tasks: Vec<Task>,
    day_stats: DayStats,
    week_stats: Option<WeekStats>,
    write_stamps: HashMap<String, u64>,
    /// Raised while an optimistic reorder awaits server confirmation; left
    /// raised when the persistence fails, because the local positions are
    /// intentionally not rolled back.
    reorder_pending: bool,
}

impl<S: AgendaService> TaskStore<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            state: Mutex::new(StoreState {
                current_date: day_navigation::today(),
                tasks: Vec::new(),
                day_stats: DayStats::default(),
                week_stats: None,
                write_stamps: HashMap::new(),
                reorder_pending: false,
            }),
            next_stamp: AtomicU64::new(0),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn current_date(&self) -> String {
        self.state
            .lock()
            .map(|state| state.current_date.clone())
            .unwrap_or_default()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state
            .lock()
            .map(|state| state.tasks.clone())
            .unwrap_or_default()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.tasks.iter().find(|task| task.id == id).cloned())
    }

    pub fn day_stats(&self) -> DayStats {
        self.state
            .lock()
            .map(|state| state.day_stats.clone())
            .unwrap_or_default()
    }

    pub fn week_stats(&self) -> Option<WeekStats> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.week_stats.clone())
    }

    pub fn reorder_pending(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.reorder_pending)
            .unwrap_or(false)
    }

    /// Replaces the collection with `date`'s tasks. The primary fetch carries
    /// server-shaped stats; when it fails, a degraded fetch recomputes stats
    /// locally from the raw task list. When both fail, exactly one
    /// connectivity error surfaces and the previous collection stays in
    /// place; partial staleness beats a blanked screen.
    pub async fn load_day(&self, date: &str) -> Result<(), AgendaError> {
        validate_date(date, "date").map_err(AgendaError::InvalidInput)?;

        let (tasks, stats) = match self.service.fetch_agenda(date).await {
            Ok(loaded) => loaded,
            Err(primary) => {
                log::debug!("primary agenda fetch failed, trying degraded path: {primary}");
                match self.service.fetch_tasks(date).await {
                    Ok(tasks) => {
                        let stats = compute_day_stats(&tasks);
                        (tasks, stats)
                    }
                    Err(fallback) => {
                        return Err(AgendaError::Connectivity(format!(
                            "task service unreachable for {date}: {fallback}"
                        )));
                    }
                }
            }
        };

        let mut state = self.lock_state()?;
        state.current_date = date.to_string();
        state.tasks = tasks;
        state.day_stats = stats;
        state.write_stamps.clear();
        state.reorder_pending = false;
        Ok(())
    }

    pub async fn go_next_day(&self) -> Result<(), AgendaError> {
        let next = day_navigation::next_day(&self.current_date())?;
        self.load_day(&next).await
    }

    pub async fn go_prev_day(&self) -> Result<(), AgendaError> {
        let prev = day_navigation::prev_day(&self.current_date())?;
        self.load_day(&prev).await
    }

    pub async fn go_today(&self) -> Result<(), AgendaError> {
        self.load_day(&day_navigation::today()).await
    }

    /// Parses free text into a task, fills the documented defaults, persists
    /// it and appends it to the collection. Either step failing surfaces as a
    /// single "could not interpret text" signal and applies nothing.
    pub async fn create_from_text(
        &self,
        text: &str,
        priority_hint: Option<u8>,
    ) -> Result<Task, AgendaError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AgendaError::InvalidInput(
                "task text must not be empty".to_string(),
            ));
        }

        let draft = self
            .service
            .parse_text(text, priority_hint)
            .await
            .map_err(interpretation_failure)?;
        let new_task = draft.into_new_task(text, &self.current_date());
        let id = self
            .service
            .create_task(&new_task)
            .await
            .map_err(interpretation_failure)?;

        let task = new_task.into_task(id, (self.now_provider)());
        let mut state = self.lock_state()?;
        state.tasks.push(task.clone());
        state.day_stats = compute_day_stats(&state.tasks);
        Ok(task)
    }

    /// Hands the day-plan text to the parse boundary; the caller confirms the
    /// resulting candidates with [`TaskStore::create_batch_from_plan`].
    pub async fn parse_day_plan(&self, text: &str) -> Result<Vec<TaskDraft>, AgendaError> {
        self.service.parse_day_plan(text).await
    }

    /// Persists an ordered sequence of candidate tasks one create call at a
    /// time, then reloads the day. Creation is not transactional: a failure
    /// partway leaves the earlier creates in place on the server (at-least-once),
    /// and the error reports how far the batch got.
    pub async fn create_batch_from_plan(
        &self,
        drafts: Vec<TaskDraft>,
    ) -> Result<usize, AgendaError> {
        let date = self.current_date();
        let mut created = 0usize;
        for draft in drafts {
            let new_task = draft.into_new_task(UNTITLED_TASK, &date);
            self.service.create_task(&new_task).await.map_err(|error| {
                AgendaError::Mutation(format!(
                    "day plan stopped after {created} created task(s): {error}"
                ))
            })?;
            created += 1;
        }

        self.load_day(&date).await?;
        Ok(created)
    }

    /// Sends a partial update. The server's response is authoritative and
    /// replaces the local copy, unless a newer write already committed, in
    /// which case the stale response is discarded. Failure leaves prior
    /// state untouched.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, AgendaError> {
        let stamp = self.begin_write();
        let updated = self.service.update_task(id, &patch).await?;
        self.apply_authoritative(id, stamp, updated.clone())?;
        Ok(updated)
    }

    /// Logical delete: transitions the task to cancelled on the server, then
    /// drops it from the local collection.
    pub async fn remove(&self, id: &str) -> Result<(), AgendaError> {
        let stamp = self.begin_write();
        self.service
            .update_task(id, &TaskPatch::status_cancelled())
            .await?;

        let mut state = self.lock_state()?;
        state.tasks.retain(|task| task.id != id);
        state.write_stamps.insert(id.to_string(), stamp);
        state.day_stats = compute_day_stats(&state.tasks);
        Ok(())
    }

    /// Applies `position = index` for each id synchronously, before the
    /// network call resolves. On persistence failure the optimistic positions
    /// are NOT rolled back; the pending marker stays raised so the
    /// inconsistency window is observable instead of silent.
    pub async fn reorder(&self, ordered_ids: &[String]) -> Result<(), AgendaError> {
        let entries = {
            let mut state = self.lock_state()?;
            for (index, id) in ordered_ids.iter().enumerate() {
                if let Some(task) = state.tasks.iter_mut().find(|task| &task.id == id) {
                    task.position = index as u32;
                }
            }
            state.tasks.sort_by_key(|task| task.position);
            state.reorder_pending = true;

            ordered_ids
                .iter()
                .enumerate()
                .map(|(index, id)| ReorderEntry {
                    id: id.clone(),
                    position: index as u32,
                })
                .collect::<Vec<_>>()
        };

        self.service.reorder(&entries).await?;
        self.lock_state()?.reorder_pending = false;
        Ok(())
    }

    /// Marks the task done, stamping the completion time, then reloads the
    /// day to pick up any server-side side effects of the transition.
    pub async fn complete(&self, id: &str) -> Result<Task, AgendaError> {
        let done_at = (self.now_provider)();
        let task = self.update(id, TaskPatch::status_done(done_at)).await?;
        let date = self.current_date();
        self.load_day(&date).await?;
        Ok(task)
    }

    /// Marks the task postponed. No reload; the transition has no server-side
    /// side effects worth re-reading.
    pub async fn postpone(&self, id: &str) -> Result<Task, AgendaError> {
        self.update(id, TaskPatch::status_postponed()).await
    }

    /// Best-effort refresh of the weekly aggregates. The boundary reporting
    /// an empty window is a valid result; an unreachable boundary is logged
    /// and otherwise ignored.
    pub async fn fetch_week_stats(&self, window_days: u32) {
        match self.service.week_stats(window_days).await {
            Ok(stats) => {
                if let Ok(mut state) = self.state.lock() {
                    state.week_stats = Some(stats);
                }
            }
            Err(error) => log::debug!("week stats unavailable: {error}"),
        }
    }

    pub async fn submit_feedback(
        &self,
        score: u8,
        notes: Option<&str>,
    ) -> Result<Feedback, AgendaError> {
        if !(1..=5).contains(&score) {
            return Err(AgendaError::InvalidInput(
                "feedback score must be 1..=5".to_string(),
            ));
        }
        let date = self.current_date();
        self.service.submit_feedback(&date, score, notes).await
    }

    pub async fn feedback_for(&self, date: &str) -> Result<Option<Feedback>, AgendaError> {
        self.service.get_feedback(date).await
    }

    fn begin_write(&self) -> u64 {
        self.next_stamp.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Commits an authoritative server representation under `stamp`. A
    /// response older than the entity's current stamp is dropped: the later
    /// write already won. Replace-only: a response for an id that is no
    /// longer in the collection (the day changed while the call was in
    /// flight) is dropped too, never inserted.
    fn apply_authoritative(&self, id: &str, stamp: u64, task: Task) -> Result<bool, AgendaError> {
        let mut state = self.lock_state()?;
        let current = state.write_stamps.get(id).copied().unwrap_or(0);
        if stamp < current {
            log::debug!("discarding stale response for task {id} (stamp {stamp} < {current})");
            return Ok(false);
        }

        let Some(existing) = state.tasks.iter_mut().find(|existing| existing.id == id) else {
            log::debug!("discarding response for task {id}, not in the current collection");
            return Ok(false);
        };
        *existing = task;
        state.write_stamps.insert(id.to_string(), stamp);
        state.day_stats = compute_day_stats(&state.tasks);
        Ok(true)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, StoreState>, AgendaError> {
        self.state
            .lock()
            .map_err(|error| AgendaError::InvalidInput(format!("store lock poisoned: {error}")))
    }
}

fn interpretation_failure(error: AgendaError) -> AgendaError {
    match error {
        already @ AgendaError::Interpretation(_) => already,
        other => AgendaError::Interpretation(format!("could not turn text into a task: {other}")),
    }
}
