//! Error types for study note generation.

use std::time::Duration;

/// Errors that can occur while turning a page photo into study notes.
#[derive(Debug, thiserror::Error)]
pub enum NotesError {
    /// The uploaded image bytes could not be read.
    #[error("Error processing image: {0}")]
    ImageProcessing(String),

    /// The model call failed. `source` carries the provider-level cause.
    #[error("⚠️ Error connecting to {provider}: {source}")]
    ModelInvocation {
        /// Display name of the model backend (e.g. "Gemini").
        provider: String,
        /// Underlying failure.
        #[source]
        source: Box<NotesError>,
    },

    /// Missing or invalid configuration (API key, sampling parameters).
    #[error("configuration error: {0}")]
    Config(String),

    /// API key rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit or quota exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Request or response was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters (e.g. unknown model).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The response was well-formed JSON but not what we expected.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The model service could not be reached (connect failure, timeout).
    #[error("{0}")]
    Unavailable(String),

    /// Other network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (e.g. writing the notes file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The notes do not follow the Hindi/English line pairing (strict mode).
    #[error("notes format violation: {0}")]
    FormatViolation(String),
}

/// Prefix of every user-facing model failure message.
pub const WARNING_MARKER: &str = "⚠️";

impl NotesError {
    /// Wraps a provider-level error as a model invocation failure.
    pub fn invocation(provider: impl Into<String>, source: NotesError) -> Self {
        match source {
            already @ Self::ModelInvocation { .. } => already,
            source => Self::ModelInvocation {
                provider: provider.into(),
                source: Box::new(source),
            },
        }
    }

    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Unavailable(_)
            | Self::Network(_)
            | Self::FormatViolation(_) => true,
            Self::ModelInvocation { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns the suggested retry delay, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::Unavailable(_) => Some(Duration::from_secs(1)),
            Self::Network(_) => Some(Duration::from_secs(2)),
            Self::ModelInvocation { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    /// True when the failure happened before any model call was made.
    pub fn is_image_error(&self) -> bool {
        matches!(self, Self::ImageProcessing(_))
    }

    /// Renders the error as the single warning line shown in place of notes.
    ///
    /// Model failures already carry the warning marker; anything else gets
    /// it prepended so every failure reads the same way on screen.
    pub fn warning_text(&self) -> String {
        match self {
            Self::ModelInvocation { .. } => self.to_string(),
            other => format!("{WARNING_MARKER} {other}"),
        }
    }
}

/// Result type alias for study note operations.
pub type Result<T> = std::result::Result<T, NotesError>;

/// Parses a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Maximum length of an API error body echoed back to the user.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Trims an API error body down to something fit for display.
///
/// Google wraps errors as `{"error": {"message": ...}}`; when that shape is
/// present only the message is kept.
pub(crate) fn sanitize_error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned());

    if message.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        message
    }
}
