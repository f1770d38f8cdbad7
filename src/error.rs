use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Every failure a client action can end in.
///
/// None of these are fatal: each one is scoped to the action that raised it.
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected before any network call was made.
    #[error("{0}")]
    Validation(String),
    /// The current identity may not perform the action.
    #[error("{0}")]
    Forbidden(String),
    /// The backend answered with a non-success status.
    #[error("{status}: {}", message.as_deref().unwrap_or("no message"))]
    Api {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),
    #[error("geocoding failed: {0}")]
    Geocode(String),
    #[error("local state: {0:#}")]
    Storage(anyhow::Error),
    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// The text shown to the user: our own message for client-side errors,
    /// the server's message when it sent one, `fallback` otherwise.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Validation(msg) | Self::Forbidden(msg) => msg.clone(),
            Self::Api {
                message: Some(msg), ..
            } => msg.clone(),
            _ => fallback.to_owned(),
        }
    }

    /// Whether the request never left the client.
    pub const fn is_client_side(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Forbidden(_))
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errs: validator::ValidationErrors) -> Self {
        // Report one problem at a time, picking a stable field so the message
        // does not depend on hash order.
        let message = errs
            .field_errors()
            .into_iter()
            .min_by(|a, b| a.0.cmp(&b.0))
            .and_then(|(_, list)| list.first())
            .map(|e| {
                e.message
                    .as_ref()
                    .map_or_else(|| e.code.to_string(), ToString::to_string)
            })
            .unwrap_or_else(|| errs.to_string());
        Self::Validation(message)
    }
}

/// Error body as sent by the backend. Handlers disagree on the field name.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error: Option<serde_json::Value>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.message.or(self.msg).or_else(|| match self.error {
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_server_message() {
        let err = Error::Api {
            status: StatusCode::BAD_REQUEST,
            message: Some("Report already taken".to_owned()),
        };
        assert_eq!(err.user_message("Failed to take"), "Report already taken");

        let err = Error::Api {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: None,
        };
        assert_eq!(err.user_message("Failed to take"), "Failed to take");
    }

    #[test]
    fn error_body_field_priority() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"msg":"second","message":"first"}"#).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("first"));

        let body: ErrorBody = serde_json::from_str(r#"{"error":"third"}"#).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("third"));

        let body: ErrorBody = serde_json::from_str(r#"{"error":{"code":1}}"#).unwrap();
        assert_eq!(body.into_message(), None);
    }
}
