use thiserror::Error;

#[derive(Debug, Error)]
pub enum CirunError {
    #[error("no credentials: provide a GitHub token, an Azure DevOps token, or both")]
    MissingCredential,

    #[error("invalid config '{path}': {message}")]
    InvalidConfig { path: String, message: String },

    #[error("workflows[{index}]: {message}")]
    MalformedEntry { index: usize, message: String },

    #[error("invalid API url '{0}'")]
    InvalidUrl(String),

    #[error("failed to trigger {target}: unauthorized (bad credentials)")]
    Unauthorized { target: String },

    #[error("failed to trigger {target}: {status} - {body}")]
    DispatchRejected {
        target: String,
        status: u16,
        body: String,
    },

    #[error("unexpected HTTP {status} from {url}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CirunError {
    /// Errors that make the whole batch unusable, as opposed to a single
    /// remote call going wrong.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CirunError::MissingCredential
                | CirunError::InvalidConfig { .. }
                | CirunError::MalformedEntry { .. }
                | CirunError::InvalidUrl(_)
                | CirunError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CirunError>;
