use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("cannot reach pingops server: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("progress stream error: {0}")]
    Stream(String),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
