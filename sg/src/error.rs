//! SMS error types

use thiserror::Error;

/// Errors that can occur while sending a message
#[derive(Debug, Error)]
pub enum SmsError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = SmsError::Api {
            status: 400,
            code: Some(21211),
            message: "Invalid 'To' phone number".to_string(),
        };
        assert_eq!(err.to_string(), "API error 400: Invalid 'To' phone number");
    }

    #[test]
    fn test_missing_env_display() {
        let err = SmsError::MissingEnv("TWILIO_AUTH_TOKEN");
        assert!(err.to_string().contains("TWILIO_AUTH_TOKEN"));
    }
}
