use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("Invalid working window: {0}")]
    InvalidWindow(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Calendar gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Calendar authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid event range: end {end} is not after start {start}")]
    InvalidEventRange { start: String, end: String },

    #[error(transparent)]
    InvalidWindow(#[from] SlotError),
}

impl From<reqwest::Error> for CalendarError {
    fn from(err: reqwest::Error) -> Self {
        CalendarError::GatewayUnavailable(err.to_string())
    }
}

/// 401 and 403 mean the token was rejected; anything else is an outage.
impl From<google_calendar::ClientError> for CalendarError {
    fn from(err: google_calendar::ClientError) -> Self {
        match &err {
            google_calendar::ClientError::HttpError { status, .. }
                if matches!(status.as_u16(), 401 | 403) =>
            {
                CalendarError::AuthenticationFailed(err.to_string())
            }
            google_calendar::ClientError::EmptyRefreshToken => {
                CalendarError::AuthenticationFailed(err.to_string())
            }
            _ => CalendarError::GatewayUnavailable(err.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model request failed: {0}")]
    Model(String),

    #[error("Invalid tool call: {0}")]
    InvalidToolCall(String),

    #[error("Model returned an empty reply")]
    EmptyReply,

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid config line {line}: {content}")]
    InvalidLine { line: usize, content: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("{0} must be set")]
    Missing(String),

    #[error("Failed to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },
}
