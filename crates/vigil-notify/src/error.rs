/// Errors raised by the alarm delivery sinks.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Sink configuration is missing a required field or contains an
    /// invalid value.
    #[error("Notify: invalid sink configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP request to an external alarm endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The external endpoint answered with a non-success status.
    #[error("Notify: endpoint {url} answered {status}: {body}")]
    Endpoint {
        url: String,
        status: u16,
        body: String,
    },

    /// JSON serialization of the alarm payload failed.
    #[error("Notify: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
