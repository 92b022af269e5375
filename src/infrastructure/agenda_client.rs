use crate::application::stats::compute_day_stats;
use crate::domain::models::{DayStats, Feedback, NewTask, Task, TaskDraft, TaskPatch, WeekStats};
use crate::infrastructure::error::AgendaError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";

/// One (id, position) assignment of a bulk reorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReorderEntry {
    pub id: String,
    pub position: u32,
}

/// The remote task service as the client consumes it: AI parsing, CRUD over
/// tasks, bulk reorder, feedback and weekly stats. Soft delete is an alias of
/// `update_task` with `status = cancelled`; there is no physical delete.
#[async_trait]
pub trait AgendaService: Send + Sync {
    async fn parse_text(
        &self,
        text: &str,
        priority_hint: Option<u8>,
    ) -> Result<TaskDraft, AgendaError>;

    async fn parse_day_plan(&self, text: &str) -> Result<Vec<TaskDraft>, AgendaError>;

    /// Returns the server-assigned id of the created task.
    async fn create_task(&self, task: &NewTask) -> Result<String, AgendaError>;

    async fn fetch_tasks(&self, date: &str) -> Result<Vec<Task>, AgendaError>;

    /// Tasks plus day stats in one shot. The default derives stats locally
    /// from the raw task list; implementations may override when the backend
    /// grows a dedicated aggregate endpoint.
    async fn fetch_agenda(&self, date: &str) -> Result<(Vec<Task>, DayStats), AgendaError> {
        let tasks = self.fetch_tasks(date).await?;
        let stats = compute_day_stats(&tasks);
        Ok((tasks, stats))
    }

    /// The response is authoritative and replaces the caller's local copy.
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, AgendaError>;

    async fn reorder(&self, entries: &[ReorderEntry]) -> Result<(), AgendaError>;

    async fn submit_feedback(
        &self,
        date: &str,
        score: u8,
        notes: Option<&str>,
    ) -> Result<Feedback, AgendaError>;

    /// The backend does not implement feedback retrieval yet; implementations
    /// report absence rather than an error.
    async fn get_feedback(&self, date: &str) -> Result<Option<Feedback>, AgendaError>;

    /// The backend does not implement weekly aggregation yet; implementations
    /// report a zeroed result rather than an error.
    async fn week_stats(&self, window_days: u32) -> Result<WeekStats, AgendaError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAgendaClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
struct ParseRequest<'a> {
    texto: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority_hint: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitFeedbackResponse {
    #[serde(default)]
    tasks_done: u32,
    #[serde(default)]
    tasks_total: u32,
}

impl ReqwestAgendaClient {
    pub fn new(base_url: &str) -> Result<Self, AgendaError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| AgendaError::InvalidInput(format!("invalid base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AgendaError::InvalidInput(
                "base url cannot be a base".to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AgendaError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| AgendaError::InvalidInput("base url cannot be a base".to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn transport_error(operation: &str, error: reqwest::Error) -> AgendaError {
        AgendaError::Connectivity(format!("network error while {operation}: {error}"))
    }

    fn http_error(operation: &str, status: reqwest::StatusCode, body: &str) -> AgendaError {
        let message = if body.trim().is_empty() {
            format!("{operation} failed: http {}", status.as_u16())
        } else {
            format!("{operation} failed: http {}; body={body}", status.as_u16())
        };
        AgendaError::Mutation(message)
    }

    async fn read_body(
        operation: &str,
        response: reqwest::Response,
    ) -> Result<(reqwest::StatusCode, String), AgendaError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| Self::transport_error(operation, error))?;
        Ok((status, body))
    }
}

#[async_trait]
impl AgendaService for ReqwestAgendaClient {
    async fn parse_text(
        &self,
        text: &str,
        priority_hint: Option<u8>,
    ) -> Result<TaskDraft, AgendaError> {
        let endpoint = self.endpoint(&["parse"])?;
        let response = self
            .client
            .post(endpoint)
            .json(&ParseRequest {
                texto: text,
                priority_hint,
            })
            .send()
            .await
            .map_err(|error| Self::transport_error("parsing task text", error))?;

        let (status, body) = Self::read_body("parsing task text", response).await?;
        if !status.is_success() {
            return Err(AgendaError::Interpretation(format!(
                "parse rejected: http {}; body={body}",
                status.as_u16()
            )));
        }

        serde_json::from_str(&body).map_err(|error| {
            AgendaError::Interpretation(format!("unusable parse payload: {error}; body={body}"))
        })
    }

    async fn parse_day_plan(&self, text: &str) -> Result<Vec<TaskDraft>, AgendaError> {
        let endpoint = self.endpoint(&["parse-day"])?;
        let response = self
            .client
            .post(endpoint)
            .json(&ParseRequest {
                texto: text,
                priority_hint: None,
            })
            .send()
            .await
            .map_err(|error| Self::transport_error("parsing day plan", error))?;

        let (status, body) = Self::read_body("parsing day plan", response).await?;
        if !status.is_success() {
            return Err(AgendaError::Interpretation(format!(
                "day-plan parse rejected: http {}; body={body}",
                status.as_u16()
            )));
        }

        serde_json::from_str(&body).map_err(|error| {
            AgendaError::Interpretation(format!("unusable day-plan payload: {error}; body={body}"))
        })
    }

    async fn create_task(&self, task: &NewTask) -> Result<String, AgendaError> {
        task.validate().map_err(AgendaError::InvalidInput)?;

        let endpoint = self.endpoint(&["tasks"])?;
        let response = self
            .client
            .post(endpoint)
            .json(task)
            .send()
            .await
            .map_err(|error| Self::transport_error("creating task", error))?;

        let (status, body) = Self::read_body("creating task", response).await?;
        if !status.is_success() {
            return Err(Self::http_error("task create", status, &body));
        }

        let parsed: CreateTaskResponse = serde_json::from_str(&body).map_err(|error| {
            AgendaError::Mutation(format!("invalid task create payload: {error}; body={body}"))
        })?;
        parsed
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                AgendaError::Mutation("task create response did not include id".to_string())
            })
    }

    async fn fetch_tasks(&self, date: &str) -> Result<Vec<Task>, AgendaError> {
        crate::domain::models::validate_date(date, "date").map_err(AgendaError::InvalidInput)?;

        let endpoint = self.endpoint(&["agenda", date])?;
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|error| Self::transport_error("fetching tasks", error))?;

        let (status, body) = Self::read_body("fetching tasks", response).await?;
        if !status.is_success() {
            return Err(Self::http_error("task fetch", status, &body));
        }

        serde_json::from_str(&body).map_err(|error| {
            AgendaError::Connectivity(format!("invalid task list payload: {error}; body={body}"))
        })
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, AgendaError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AgendaError::InvalidInput("task id must not be empty".to_string()));
        }

        let endpoint = self.endpoint(&["tasks", id])?;
        let response = self
            .client
            .patch(endpoint)
            .json(patch)
            .send()
            .await
            .map_err(|error| Self::transport_error("updating task", error))?;

        let (status, body) = Self::read_body("updating task", response).await?;
        if !status.is_success() {
            return Err(Self::http_error("task update", status, &body));
        }

        serde_json::from_str(&body).map_err(|error| {
            AgendaError::Mutation(format!("invalid task update payload: {error}; body={body}"))
        })
    }

    async fn reorder(&self, entries: &[ReorderEntry]) -> Result<(), AgendaError> {
        let endpoint = self.endpoint(&["tasks", "reorder"])?;
        let response = self
            .client
            .patch(endpoint)
            .json(entries)
            .send()
            .await
            .map_err(|error| Self::transport_error("reordering tasks", error))?;

        let (status, body) = Self::read_body("reordering tasks", response).await?;
        if !status.is_success() {
            return Err(Self::http_error("task reorder", status, &body));
        }
        Ok(())
    }

    async fn submit_feedback(
        &self,
        date: &str,
        score: u8,
        notes: Option<&str>,
    ) -> Result<Feedback, AgendaError> {
        let endpoint = self.endpoint(&["feedback"])?;
        let payload = serde_json::json!({
            "date": date,
            "score": score,
            "notes": notes,
        });
        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|error| Self::transport_error("submitting feedback", error))?;

        let (status, body) = Self::read_body("submitting feedback", response).await?;
        if !status.is_success() {
            return Err(Self::http_error("feedback submit", status, &body));
        }

        // The backend acknowledges with counters only; rebuild the stored
        // record around the submitted fields.
        let parsed: SubmitFeedbackResponse = serde_json::from_str(&body).unwrap_or(
            SubmitFeedbackResponse {
                tasks_done: 0,
                tasks_total: 0,
            },
        );
        let feedback = Feedback {
            date: date.to_string(),
            score,
            notes: notes.map(ToOwned::to_owned),
            tasks_done: parsed.tasks_done,
            tasks_total: parsed.tasks_total,
        };
        feedback.validate().map_err(AgendaError::InvalidInput)?;
        Ok(feedback)
    }

    async fn get_feedback(&self, _date: &str) -> Result<Option<Feedback>, AgendaError> {
        // No retrieval endpoint upstream yet.
        Ok(None)
    }

    async fn week_stats(&self, _window_days: u32) -> Result<WeekStats, AgendaError> {
        // No aggregation endpoint upstream yet.
        Ok(WeekStats::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ReqwestAgendaClient {
        ReqwestAgendaClient::new(DEFAULT_BASE_URL).expect("valid base url")
    }

    #[test]
    fn endpoint_builds_expected_paths() {
        let client = client();
        let agenda = client.endpoint(&["agenda", "2026-03-02"]).expect("endpoint");
        assert_eq!(agenda.as_str(), "http://localhost:8000/agenda/2026-03-02");

        let reorder = client.endpoint(&["tasks", "reorder"]).expect("endpoint");
        assert_eq!(reorder.as_str(), "http://localhost:8000/tasks/reorder");
    }

    #[test]
    fn endpoint_escapes_hostile_task_ids() {
        let client = client();
        let url = client
            .endpoint(&["tasks", "../escape"])
            .expect("endpoint");
        // The embedded slash is percent-encoded, so the id stays a single
        // path segment and cannot traverse upward.
        assert_eq!(url.path(), "/tasks/..%2Fescape");
        assert!(!url.path().contains("/../"));
    }

    #[test]
    fn new_rejects_unusable_base_url() {
        assert!(ReqwestAgendaClient::new("not a url").is_err());
        assert!(ReqwestAgendaClient::new("mailto:nobody@example.com").is_err());
    }

    #[test]
    fn reorder_entries_serialize_as_id_position_pairs() {
        let entries = vec![
            ReorderEntry {
                id: "a".to_string(),
                position: 0,
            },
            ReorderEntry {
                id: "b".to_string(),
                position: 1,
            },
        ];
        let encoded = serde_json::to_value(&entries).expect("serialize entries");
        assert_eq!(
            encoded,
            serde_json::json!([
                { "id": "a", "position": 0 },
                { "id": "b", "position": 1 },
            ])
        );
    }

    #[tokio::test]
    async fn unimplemented_boundary_reads_are_benign() {
        let client = client();
        let feedback = client.get_feedback("2026-03-02").await.expect("no error");
        assert!(feedback.is_none());

        let stats = client.week_stats(7).await.expect("no error");
        assert_eq!(stats, WeekStats::default());
        assert!(stats.days.is_empty());
    }
}
