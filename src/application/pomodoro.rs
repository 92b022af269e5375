use crate::application::task_store::TaskStore;
use crate::domain::models::{ActivePomodoro, TaskPatch};
use crate::infrastructure::agenda_client::AgendaService;
use crate::infrastructure::notifier::Notifier;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const WORK_SECONDS: u32 = 1500;
pub const BREAK_SECONDS: u32 = 300;
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Single-instance focus-session state machine.
///
/// Idle until `start` binds a session to a task, then alternates Working and
/// OnBreak phases on a one-second tick until the task's pomodoro target is
/// reached or the session is cancelled. The tick source is an owned, abortable
/// handle; starting a new session supersedes and stops the previous one, so at
/// most one timer exists per engine.
pub struct PomodoroEngine<S: AgendaService> {
    store: Arc<TaskStore<S>>,
    notifier: Arc<dyn Notifier>,
    session: Mutex<Option<ActivePomodoro>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: AgendaService + 'static> PomodoroEngine<S> {
    pub fn new(store: Arc<TaskStore<S>>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            session: Mutex::new(None),
            ticker: Mutex::new(None),
        }
    }

    pub fn session(&self) -> Option<ActivePomodoro> {
        self.session.lock().ok().and_then(|slot| slot.clone())
    }

    /// Binds a new session to `task_id` and starts the tick source. A no-op
    /// when the id resolves to nothing or the task's pomodoro target is
    /// already reached. Any prior session is superseded: its timer stops
    /// before the new one spawns.
    pub fn start(self: &Arc<Self>, task_id: &str) -> bool {
        let Some(task) = self.store.task(task_id) else {
            log::debug!("pomodoro start ignored, unknown task {task_id}");
            return false;
        };
        if task.pomodoros_done >= task.pomodoros {
            log::debug!("pomodoro start ignored, nothing left to do on {task_id}");
            return false;
        }

        self.abort_ticker();
        let Ok(mut slot) = self.session.lock() else {
            return false;
        };
        *slot = Some(ActivePomodoro {
            task_id: task.id,
            task_title: task.title,
            seconds_left: WORK_SECONDS,
            is_break: false,
            is_paused: false,
        });
        drop(slot);

        self.spawn_ticker();
        true
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn resume(&self) {
        self.set_paused(false);
    }

    /// Force-advances the current phase boundary without waiting for the
    /// countdown. Leaving the Working phase this way abandons the interval
    /// without crediting `pomodoros_done`; leaving OnBreak applies the same
    /// target check as the natural boundary.
    pub fn skip(&self) {
        if let Ok(mut slot) = self.session.lock() {
            self.cross_phase_boundary(&mut slot, false);
        }
    }

    /// Stops the tick source and discards the session. Persistence already
    /// confirmed by earlier boundaries stays; nothing else is written.
    pub fn cancel(&self) {
        self.abort_ticker();
        if let Ok(mut slot) = self.session.lock() {
            *slot = None;
        }
    }

    /// One second of session time. Returns false once there is no session
    /// left to advance, which lets the tick source wind itself down.
    pub fn tick(&self) -> bool {
        let Ok(mut slot) = self.session.lock() else {
            return false;
        };
        let Some(session) = slot.as_mut() else {
            return false;
        };
        if session.is_paused {
            return true;
        }

        session.seconds_left = session.seconds_left.saturating_sub(1);
        if session.seconds_left > 0 {
            return true;
        }
        self.cross_phase_boundary(&mut slot, true)
    }

    /// Leaves the current phase. Out of Working: credit one pomodoro through
    /// the store's write path (detached, so the phase flip never waits on the
    /// network) and flip to OnBreak. Out of OnBreak: continue Working only if
    /// the reconciled persisted count says the target is not reached yet,
    /// otherwise return to Idle. `credit` is false on the skip path.
    fn cross_phase_boundary(&self, slot: &mut Option<ActivePomodoro>, credit: bool) -> bool {
        let Some(session) = slot.as_mut() else {
            return false;
        };

        if !session.is_break {
            if credit {
                self.persist_credit(&session.task_id);
            }
            session.is_break = true;
            session.seconds_left = BREAK_SECONDS;
            self.notifier
                .notify("Work session complete", Some("time for a break"));
            return true;
        }

        let target_remaining = self
            .store
            .task(&session.task_id)
            .map(|task| task.pomodoros_done < task.pomodoros)
            .unwrap_or(false);
        if target_remaining {
            session.is_break = false;
            session.seconds_left = WORK_SECONDS;
            self.notifier.notify("Break over", Some("back to work"));
            true
        } else {
            *slot = None;
            self.notifier.notify("All sessions complete", None);
            false
        }
    }

    fn persist_credit(&self, task_id: &str) {
        let Some(task) = self.store.task(task_id) else {
            return;
        };
        let credited = (task.pomodoros_done + 1).min(task.pomodoros);
        let store = Arc::clone(&self.store);
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            if let Err(error) = store
                .update(&task_id, TaskPatch::pomodoros_done(credited))
                .await
            {
                log::warn!("could not persist pomodoro credit for {task_id}: {error}");
            }
        });
    }

    fn set_paused(&self, paused: bool) {
        if let Ok(mut slot) = self.session.lock()
            && let Some(session) = slot.as_mut()
        {
            session.is_paused = paused;
        }
    }

    fn spawn_ticker(self: &Arc<Self>) {
        let engine = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval fire is immediate; the countdown starts one
            // period later.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if !engine.tick() {
                    break;
                }
            }
        });

        if let Ok(mut ticker) = self.ticker.lock()
            && let Some(previous) = ticker.replace(handle)
        {
            previous.abort();
        }
    }

    fn abort_ticker(&self) {
        if let Ok(mut ticker) = self.ticker.lock()
            && let Some(handle) = ticker.take()
        {
            handle.abort();
        }
    }
}

impl<S: AgendaService> Drop for PomodoroEngine<S> {
    fn drop(&mut self) {
        if let Ok(mut ticker) = self.ticker.lock()
            && let Some(handle) = ticker.take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        Feedback, NewTask, Priority, Task, TaskDraft, TaskStatus, WeekStats,
    };
    use crate::infrastructure::agenda_client::ReorderEntry;
    use crate::infrastructure::error::AgendaError;
    use crate::infrastructure::notifier::test_support::RecordingNotifier;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Minimal service: a mutable task list plus an update counter. Updates
    /// apply the pomodoros_done patch, which is all the engine writes.
    #[derive(Default)]
    struct FakeTaskService {
        tasks: Mutex<Vec<Task>>,
        update_calls: AtomicUsize,
    }

    #[async_trait]
    impl AgendaService for FakeTaskService {
        async fn parse_text(
            &self,
            _text: &str,
            _priority_hint: Option<u8>,
        ) -> Result<TaskDraft, AgendaError> {
            Ok(TaskDraft::default())
        }

        async fn parse_day_plan(&self, _text: &str) -> Result<Vec<TaskDraft>, AgendaError> {
            Ok(Vec::new())
        }

        async fn create_task(&self, _task: &NewTask) -> Result<String, AgendaError> {
            Err(AgendaError::Mutation("not under test".to_string()))
        }

        async fn fetch_tasks(&self, _date: &str) -> Result<Vec<Task>, AgendaError> {
            Ok(self.tasks.lock().expect("task lock").clone())
        }

        async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, AgendaError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            let mut tasks = self.tasks.lock().expect("task lock");
            let task = tasks
                .iter_mut()
                .find(|task| task.id == id)
                .ok_or_else(|| AgendaError::Mutation(format!("task not found: {id}")))?;
            if let Some(done) = patch.pomodoros_done {
                task.pomodoros_done = done;
            }
            if let Some(status) = patch.status {
                task.status = status;
            }
            Ok(task.clone())
        }

        async fn reorder(&self, _entries: &[ReorderEntry]) -> Result<(), AgendaError> {
            Ok(())
        }

        async fn submit_feedback(
            &self,
            _date: &str,
            _score: u8,
            _notes: Option<&str>,
        ) -> Result<Feedback, AgendaError> {
            Err(AgendaError::Mutation("not under test".to_string()))
        }

        async fn get_feedback(&self, _date: &str) -> Result<Option<Feedback>, AgendaError> {
            Ok(None)
        }

        async fn week_stats(&self, _window_days: u32) -> Result<WeekStats, AgendaError> {
            Ok(WeekStats::default())
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn task_with_target(id: &str, pomodoros: u32, pomodoros_done: u32) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            context: None,
            priority: Priority::Normal,
            pomodoros,
            pomodoros_done,
            target_hour: None,
            suggested_hour: None,
            status: TaskStatus::Pending,
            date: "2026-03-02".to_string(),
            position: 0,
            created_at: fixed_time(),
            done_at: None,
        }
    }

    struct Rig {
        service: Arc<FakeTaskService>,
        store: Arc<TaskStore<FakeTaskService>>,
        engine: Arc<PomodoroEngine<FakeTaskService>>,
        notifier: Arc<RecordingNotifier>,
    }

    async fn rig_with(tasks: Vec<Task>) -> Rig {
        let service = Arc::new(FakeTaskService::default());
        *service.tasks.lock().expect("task lock") = tasks;
        let store = Arc::new(TaskStore::new(Arc::clone(&service)));
        store.load_day("2026-03-02").await.expect("load day");
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = Arc::new(PomodoroEngine::new(
            Arc::clone(&store),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        ));
        Rig {
            service,
            store,
            engine,
            notifier,
        }
    }

    fn tick_many(engine: &PomodoroEngine<FakeTaskService>, count: u32) {
        for _ in 0..count {
            engine.tick();
        }
    }

    #[tokio::test]
    async fn start_on_unknown_task_is_a_no_op() {
        let rig = rig_with(vec![task_with_target("a", 1, 0)]).await;
        assert!(!rig.engine.start("missing"));
        assert!(rig.engine.session().is_none());
    }

    #[tokio::test]
    async fn start_with_target_already_reached_is_a_no_op() {
        let rig = rig_with(vec![task_with_target("a", 2, 2)]).await;
        assert!(!rig.engine.start("a"));
        assert!(rig.engine.session().is_none());
    }

    #[tokio::test]
    async fn start_initializes_a_working_session() {
        let rig = rig_with(vec![task_with_target("a", 1, 0)]).await;
        assert!(rig.engine.start("a"));

        let session = rig.engine.session().expect("session");
        assert_eq!(session.task_id, "a");
        assert_eq!(session.task_title, "task a");
        assert_eq!(session.seconds_left, WORK_SECONDS);
        assert!(!session.is_break);
        assert!(!session.is_paused);
        rig.engine.cancel();
    }

    #[tokio::test]
    async fn full_session_lifecycle_for_a_single_pomodoro_task() {
        let rig = rig_with(vec![task_with_target("a", 1, 0)]).await;
        rig.engine.start("a");

        tick_many(&rig.engine, WORK_SECONDS - 1);
        let session = rig.engine.session().expect("still working");
        assert!(!session.is_break);
        assert_eq!(session.seconds_left, 1);

        // The 1500th tick crosses into the break phase immediately; the
        // counter persistence runs detached behind it.
        rig.engine.tick();
        let session = rig.engine.session().expect("on break");
        assert!(session.is_break);
        assert_eq!(session.seconds_left, BREAK_SECONDS);
        tokio::task::yield_now().await;
        assert_eq!(rig.store.task("a").expect("present").pomodoros_done, 1);
        assert_eq!(rig.service.update_calls.load(Ordering::SeqCst), 1);

        tick_many(&rig.engine, BREAK_SECONDS);
        assert!(rig.engine.session().is_none());
        assert_eq!(
            rig.notifier.titles(),
            vec!["Work session complete", "All sessions complete"]
        );

        // Idle ticks change nothing.
        assert!(!rig.engine.tick());
        assert_eq!(rig.store.task("a").expect("present").pomodoros_done, 1);
    }

    #[tokio::test]
    async fn break_end_continues_working_while_target_remains() {
        let rig = rig_with(vec![task_with_target("a", 2, 0)]).await;
        rig.engine.start("a");

        tick_many(&rig.engine, WORK_SECONDS);
        tokio::task::yield_now().await;
        assert_eq!(rig.store.task("a").expect("present").pomodoros_done, 1);

        tick_many(&rig.engine, BREAK_SECONDS);
        let session = rig.engine.session().expect("second work phase");
        assert!(!session.is_break);
        assert_eq!(session.seconds_left, WORK_SECONDS);
        assert!(rig.notifier.titles().contains(&"Break over".to_string()));
        rig.engine.cancel();
    }

    #[tokio::test]
    async fn status_change_mid_session_does_not_end_the_session() {
        let rig = rig_with(vec![task_with_target("a", 3, 0)]).await;
        rig.engine.start("a");
        tick_many(&rig.engine, WORK_SECONDS);
        tokio::task::yield_now().await;

        // The task is marked done while the session is on break; only the
        // counters decide whether the session continues.
        rig.store
            .update("a", TaskPatch::status_done(fixed_time()))
            .await
            .expect("mark done");

        tick_many(&rig.engine, BREAK_SECONDS);
        let session = rig.engine.session().expect("still working");
        assert!(!session.is_break);
        assert_eq!(session.seconds_left, WORK_SECONDS);
        rig.engine.cancel();
    }

    #[tokio::test]
    async fn natural_work_completion_credits_exactly_once() {
        let rig = rig_with(vec![task_with_target("a", 3, 0)]).await;
        rig.engine.start("a");

        tick_many(&rig.engine, WORK_SECONDS);
        tokio::task::yield_now().await;

        assert_eq!(rig.service.update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rig.store.task("a").expect("present").pomodoros_done, 1);
        rig.engine.cancel();
    }

    #[tokio::test]
    async fn skip_out_of_working_abandons_without_credit() {
        let rig = rig_with(vec![task_with_target("a", 2, 0)]).await;
        rig.engine.start("a");
        tick_many(&rig.engine, 10);

        rig.engine.skip();
        tokio::task::yield_now().await;

        let session = rig.engine.session().expect("on break");
        assert!(session.is_break);
        assert_eq!(session.seconds_left, BREAK_SECONDS);
        assert_eq!(rig.service.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(rig.store.task("a").expect("present").pomodoros_done, 0);
        rig.engine.cancel();
    }

    #[tokio::test]
    async fn skip_out_of_break_applies_the_same_target_check() {
        let rig = rig_with(vec![task_with_target("a", 2, 0)]).await;
        rig.engine.start("a");
        tick_many(&rig.engine, WORK_SECONDS);
        tokio::task::yield_now().await;

        // Target not reached: skipping the break resumes work.
        rig.engine.skip();
        let session = rig.engine.session().expect("working again");
        assert!(!session.is_break);
        assert_eq!(session.seconds_left, WORK_SECONDS);

        // Second interval completes the target; skipping that break ends the
        // session.
        tick_many(&rig.engine, WORK_SECONDS);
        tokio::task::yield_now().await;
        assert_eq!(rig.store.task("a").expect("present").pomodoros_done, 2);
        rig.engine.skip();
        assert!(rig.engine.session().is_none());
    }

    #[tokio::test]
    async fn pause_freezes_the_countdown() {
        let rig = rig_with(vec![task_with_target("a", 1, 0)]).await;
        rig.engine.start("a");

        rig.engine.pause();
        tick_many(&rig.engine, 50);
        let session = rig.engine.session().expect("paused session");
        assert_eq!(session.seconds_left, WORK_SECONDS);
        assert!(session.is_paused);

        rig.engine.resume();
        tick_many(&rig.engine, 50);
        let session = rig.engine.session().expect("running session");
        assert_eq!(session.seconds_left, WORK_SECONDS - 50);
        rig.engine.cancel();
    }

    #[tokio::test]
    async fn cancel_is_final_regardless_of_phase() {
        let rig = rig_with(vec![task_with_target("a", 2, 0)]).await;
        rig.engine.start("a");
        tick_many(&rig.engine, WORK_SECONDS + 10);
        tokio::task::yield_now().await;

        rig.engine.cancel();
        assert!(rig.engine.session().is_none());
        assert!(!rig.engine.tick());

        // Only the already-confirmed credit survives cancellation.
        assert_eq!(rig.store.task("a").expect("present").pomodoros_done, 1);
        assert_eq!(rig.service.update_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn restart_supersedes_the_previous_session() {
        let rig = rig_with(vec![
            task_with_target("a", 2, 0),
            task_with_target("b", 1, 0),
        ]).await;
        rig.engine.start("a");
        tick_many(&rig.engine, 25);

        assert!(rig.engine.start("b"));
        let session = rig.engine.session().expect("superseding session");
        assert_eq!(session.task_id, "b");
        assert_eq!(session.seconds_left, WORK_SECONDS);
        rig.engine.cancel();
    }

    #[tokio::test]
    async fn counter_never_exceeds_the_target() {
        let rig = rig_with(vec![task_with_target("a", 1, 0)]).await;
        rig.engine.start("a");

        // Run two full cycles' worth of ticks; the session ends after one.
        tick_many(&rig.engine, 2 * (WORK_SECONDS + BREAK_SECONDS));
        tokio::task::yield_now().await;

        let task = rig.store.task("a").expect("present");
        assert!(task.pomodoros_done <= task.pomodoros);
        assert_eq!(task.pomodoros_done, 1);
    }
}
