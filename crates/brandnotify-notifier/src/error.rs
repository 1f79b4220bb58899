use thiserror::Error;

/// Outcome class of a failed delivery.
///
/// `Transient` covers network failures, timeouts, 408/429 and 5xx responses;
/// the pipeline retries those with back-off. `Permanent` covers everything the
/// provider rejected outright (invalid address, payload refused) and is never
/// retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("transient send failure: {0}")]
    Transient(String),

    #[error("permanent send failure: {0}")]
    Permanent(String),
}

impl SendError {
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, SendError::Transient(_))
    }

    /// Classify a non-2xx provider response.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("status {} body {}", status.as_u16(), truncate(body));
        if status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
        {
            SendError::Transient(detail)
        } else {
            SendError::Permanent(detail)
        }
    }

    /// Classify a transport-level failure. Only request construction errors are permanent.
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_builder() {
            SendError::Permanent(err.to_string())
        } else {
            SendError::Transient(err.to_string())
        }
    }
}

fn truncate(s: &str) -> String {
    const MAX: usize = 512;
    if s.chars().count() > MAX {
        let head: String = s.chars().take(MAX).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
        ] {
            assert!(SendError::from_status(status, "").is_retriable(), "{status}");
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::PAYLOAD_TOO_LARGE,
        ] {
            assert!(!SendError::from_status(status, "").is_retriable(), "{status}");
        }
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        let SendError::Permanent(detail) = SendError::from_status(StatusCode::BAD_REQUEST, &body)
        else {
            panic!("expected permanent");
        };
        assert!(detail.len() < 600);
        assert!(detail.ends_with("..."));
    }
}
