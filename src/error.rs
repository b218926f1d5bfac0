use thiserror::Error;

/// Input file could not be turned into records. No run is started.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not read input file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed row: {0}")]
    Csv(#[from] csv::Error),
    #[error("could not read spreadsheet: {0}")]
    Excel(String),
    #[error("header is missing the '{0}' column")]
    MissingColumn(&'static str),
    #[error("input file has no header row")]
    MissingHeader,
}

/// One lookup failed. Recovered per item, never fatal to a run.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("network error: {0}")]
    Network(String),
    #[error("remote service rejected the request with status {status}")]
    RemoteRejection { status: u16 },
    #[error("lookup timed out")]
    Timeout,
    #[error("invalid lookup endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LookupError::Timeout
        } else if let Some(status) = e.status() {
            LookupError::RemoteRejection {
                status: status.as_u16(),
            }
        } else {
            LookupError::Network(e.to_string())
        }
    }
}

/// The scheduler's own coordination broke. Aborts the whole run.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("lookup task for item {index} panicked")]
    TaskPanicked { index: usize },
    #[error("lookup task for item {index} was cancelled")]
    TaskCancelled { index: usize },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not write export: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not serialize row: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}
