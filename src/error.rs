/// Errors surfaced by the draw session and the prize inventory.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DrawError {
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("A draw is already in progress")]
    DrawInProgress,

    #[error("No draw is in progress")]
    NoDrawInProgress,

    #[error("Draw does not belong to this session or has already ended")]
    StaleDraw,

    #[error("Invalid draw settings: {0}")]
    InvalidSettings(String),

    #[error("Unknown prize: {0}")]
    UnknownPrize(String),

    #[error("Reset must be confirmed")]
    ResetNotConfirmed,
}

/// Failures talking to the text/image generation service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No API key configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Service returned no usable content")]
    EmptyResponse,

    #[error("Malformed inline data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Request timed out")]
    Timeout,
}
