use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (connection refused, DNS, timeout)
    #[error("{0}")]
    Network(String),
    /// The backend answered with a non-success status
    #[error("backend returned {status}{}", detail_suffix(.detail))]
    Status {
        status: StatusCode,
        detail: Option<String>,
    },
    /// Knowledge document lookup failed
    #[error("File not found")]
    NotFound { name: String },
    /// The response body did not match the expected shape
    #[error("invalid response from backend: {0}")]
    Decode(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) if !d.is_empty() => format!(": {}", d),
        _ => String::new(),
    }
}

impl ApiError {
    /// The backend-supplied `detail` text, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_includes_detail() {
        let err = ApiError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: Some("Execution error: boom".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "backend returned 500 Internal Server Error: Execution error: boom"
        );
        assert_eq!(err.detail(), Some("Execution error: boom"));
    }

    #[test]
    fn not_found_reads_like_a_missing_file() {
        let err = ApiError::NotFound { name: "loops.md".to_string() };
        assert_eq!(err.to_string(), "File not found");
        assert_eq!(err.detail(), None);
    }
}
