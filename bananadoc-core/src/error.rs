use thiserror::Error;

#[derive(Error, Debug)]
pub enum BananaDocError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Caller-supplied input rejected before any model or LLM call.
///
/// The `Display` text is user-facing and returned verbatim by the HTTP layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Query exceeds maximum length of {max} characters")]
    QueryTooLong { max: usize },

    #[error("Query contains potentially unsafe content")]
    UnsafeQuery,

    #[error("Image data is empty")]
    EmptyImage,

    #[error("Invalid base64 encoding: {0}")]
    InvalidBase64(String),

    #[error("Image size exceeds maximum allowed size of {max_mb}MB")]
    ImageTooLarge { max_mb: usize },

    #[error("Invalid image format. Only JPEG and PNG are supported.")]
    UnsupportedImageFormat,

    #[error("Could not decode image: {0}")]
    UndecodableImage(String),

    #[error("Invalid deficiency type")]
    InvalidDeficiencyName,
}
