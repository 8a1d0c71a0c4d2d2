use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("server rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("server returned status {status}")]
    Status { status: u16 },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid api url: {0}")]
    Url(#[from] url::ParseError),
}

impl GatewayError {
    /// Text recorded in a store: the server's own words when it sent any,
    /// the operation's fallback otherwise.
    pub fn store_message(&self, fallback: &str) -> String {
        match self {
            GatewayError::Rejected { message, .. } => message.clone(),
            _ => fallback.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Rejected { status, .. } | GatewayError::Status { status } => {
                Some(*status)
            }
            GatewayError::Transport(err) => err.status().map(|status| status.as_u16()),
            GatewayError::Url(_) => None,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, GatewayError>;

/// A client-side precondition failed; no request was issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("no data file selected")]
    MissingDataFile,
    #[error("no analysis type selected")]
    MissingTaskType,
    #[error("analysis type '{0}' cannot be requested")]
    UnsupportedTaskType(String),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("no files selected")]
    NoFiles,
    #[error("no generated protocol is staged")]
    NothingStaged,
}
