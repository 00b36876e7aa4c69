use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// A single raw provider record that could not be turned into a candle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationError {
    #[error("record has {found} fields, expected at least {expected}")]
    TooShort { found: usize, expected: usize },

    #[error("field {field} is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },

    #[error("field {field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}
