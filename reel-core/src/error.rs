use reel_shared::SeatId;

/// Everything a call against the remote cinema API can fail with
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// 409 on a hold request, naming the seats another shopper secured first
    #[error("Seats no longer available: {}", join_ids(.seat_ids))]
    SeatsUnavailable {
        seat_ids: Vec<SeatId>,
        message: String,
    },

    #[error("API returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ApiError::Status { status, code: None, message: message.into() }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::SeatsUnavailable { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::SeatsUnavailable { .. } => Some(409),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(_) | ApiError::Decode(_) => None,
        }
    }

    /// Message fit for a toast: the server's text when it sent one
    pub fn user_message(&self) -> String {
        match self {
            ApiError::SeatsUnavailable { message, .. } | ApiError::Status { message, .. } => message.clone(),
            ApiError::Transport(_) => "Network error, please try again".to_string(),
            ApiError::Decode(_) => "Unexpected response from server".to_string(),
        }
    }
}

fn join_ids(ids: &[SeatId]) -> String {
    ids.iter().map(SeatId::as_str).collect::<Vec<_>>().join(", ")
}
