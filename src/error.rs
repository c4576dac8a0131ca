use std::time::Duration;

/// Everything that can go wrong talking to the tracking backend.
#[derive(Clone, Debug, Fail, PartialEq)]
pub enum ApiError {
    #[fail(display = "{} {} timed out after {:?}", method, url, after)]
    Timeout {
        method: String,
        url: String,
        after: Duration,
    },

    #[fail(display = "{} {} was cancelled", method, url)]
    Cancelled { method: String, url: String },

    #[fail(display = "{} {} failed: {}", method, url, message)]
    Network {
        method: String,
        url: String,
        message: String,
    },

    #[fail(display = "{} {} failed: {} {}", method, url, status, detail)]
    Http {
        method: String,
        url: String,
        status: u16,
        detail: String,
    },

    #[fail(display = "{} {} returned an unexpected body: {}", method, url, message)]
    Decode {
        method: String,
        url: String,
        message: String,
    },
}

impl ApiError {
    /// HTTP status for `Http` failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The request never produced a response.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout { .. } | ApiError::Cancelled { .. } | ApiError::Network { .. }
        )
    }
}
