use thiserror::Error;

#[derive(Debug, Error)]
pub enum PingOpsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("progress stream unavailable: {0}")]
    StreamUnavailable(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PingOpsError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "InvalidInput",
            Self::JobNotFound(_) => "JobNotFound",
            Self::StreamUnavailable(_) => "StreamUnavailable",
            Self::AccessDenied(_) => "AccessDenied",
            Self::Upstream(_) => "UpstreamError",
            Self::InternalError(_) => "InternalError",
            Self::Io(_) => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, PingOpsError>;

#[cfg(test)]
mod tests {
    use super::PingOpsError;

    #[test]
    fn io_errors_report_as_internal() {
        let err = PingOpsError::from(std::io::Error::other("disk gone"));
        assert_eq!(err.error_code(), "InternalError");
        assert_eq!(err.to_string(), "disk gone");
    }

    #[test]
    fn job_not_found_names_the_job() {
        let err = PingOpsError::JobNotFound("abc".to_string());
        assert_eq!(err.error_code(), "JobNotFound");
        assert_eq!(err.to_string(), "job not found: abc");
    }
}
