use thiserror::Error;

/// Failures surfaced by the catalog and registration clients.
///
/// `Remote` means the service answered but reported a failure through its
/// embedded status code; `Transport` covers everything below that (timeouts,
/// connection failures, non-2xx HTTP).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog error: {message} (status {code})")]
    Remote { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("checkpoint write failed: {0}")]
    Checkpoint(#[from] std::io::Error),

    #[error("invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),
}
