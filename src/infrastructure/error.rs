use thiserror::Error;

/// Failure taxonomy at the remote-service boundary. Connectivity and
/// interpretation failures surface distinctly; best-effort concerns
/// (notifications, week stats) are swallowed before they reach this type.
#[derive(Debug, Error)]
pub enum AgendaError {
    #[error("connectivity error: {0}")]
    Connectivity(String),
    #[error("could not interpret text: {0}")]
    Interpretation(String),
    #[error("mutation rejected: {0}")]
    Mutation(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgendaError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, AgendaError::Connectivity(_))
    }
}
