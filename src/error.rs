//! Error handler for ftpadmin.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Message returned whenever storage misbehaves. Raw driver errors are
/// logged, never sent back to the caller.
const GENERIC_STORAGE_MESSAGE: &str = "Operation failed; check log files.";

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("storage call timed out after {0} second(s)")]
    StorageTimeout(u64),

    #[error("record not found")]
    NotFound,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credential hashing failed: {0}")]
    Credential(String),
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

/// Join every accumulated validation message into one displayable
/// block, one message per line.
pub fn join_messages(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .values()
        .flat_map(|issues| issues.iter().map(|issue| issue.to_string()))
        .collect();
    messages.sort();
    messages.join("\n")
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => response
                .details(&join_messages(validation_errors))
                .errors(validation_errors),

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "storage request failed");

                ResponseError::default()
                    .title("Storage failure.")
                    .details(GENERIC_STORAGE_MESSAGE)
            },

            ServerError::StorageTimeout(secs) => {
                tracing::error!(timeout_secs = secs, "storage call timed out");

                ResponseError::default()
                    .title("Storage failure.")
                    .details(GENERIC_STORAGE_MESSAGE)
            },

            ServerError::NotFound => response
                .title("Record not found.")
                .details("No such user or group.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Config(details)
            | ServerError::Credential(details) => {
                tracing::error!(%details, "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::ValidationError;

    #[test]
    fn test_join_messages_one_per_line() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "login",
            ValidationError::new("format")
                .with_message("Invalid user name.".into()),
        );
        errors.add(
            "password",
            ValidationError::new("too_short")
                .with_message("Password is too short.".into()),
        );

        let joined = join_messages(&errors);
        assert_eq!(joined.lines().count(), 2);
        assert!(joined.contains("Invalid user name."));
        assert!(joined.contains("Password is too short."));
    }
}
