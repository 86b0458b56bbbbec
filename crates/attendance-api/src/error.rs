use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API URL is not configured; run `attendance config set-url <url>`")]
    NotConfigured,
    #[error("invalid API URL {0:?}: must be an http(s) URL")]
    InvalidUrl(String),
    #[error("{0}")]
    Validation(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-2xx response; `message` comes from the body when it has one.
    #[error("{message}")]
    Status { status: u16, message: String },
    /// 2xx response whose body reports `ok: false`.
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Whether the backend itself refused the request, as opposed to the
    /// request never completing.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            ApiError::Status { .. } | ApiError::Rejected(_) | ApiError::Validation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
