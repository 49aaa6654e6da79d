/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 */

//! Error masking: decides what an authentication failure may reveal to the caller.
//!
//! Three classes exist:
//! - generic errors, rendered as `500` with a fixed message;
//! - [`ResponseError`]s, which carry an explicit status and caller-facing message;
//! - invalid-token errors, always `401` with [`INVALID_TOKEN_MESSAGE`], even
//!   when wrapped inside other errors.
//!
//! Any `5xx` outcome is rendered with [`INTERNAL_ERROR_MESSAGE`]; the original
//! error is logged. Plain-text and JSON renderings apply the same masking.

use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use forward_auth_types::ErrorBody;
use thiserror::Error;

use crate::error::{AuthError, InvalidTokenError, INVALID_TOKEN_MESSAGE};

pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied";
pub const BAD_REQUEST_MESSAGE: &str = "Invalid request";

/// An error with an explicit HTTP status and a message meant for the caller.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ResponseError {
    status: StatusCode,
    message: String,
}

impl ResponseError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The masked status and message to send to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub message: String,
}

/// Compute the caller-facing rendering of `err`, walking its whole source chain.
pub fn error_response(err: &(dyn StdError + 'static)) -> ErrorResponse {
    let mut classified: Option<(StatusCode, String)> = None;

    for e in std::iter::successors(Some(err), |&e| e.source()) {
        if is_invalid_token(e) {
            return ErrorResponse {
                status: StatusCode::UNAUTHORIZED,
                message: INVALID_TOKEN_MESSAGE.to_string(),
            };
        }
        if classified.is_none() {
            classified = classify(e);
        }
    }

    let (status, message) = classified.unwrap_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_ERROR_MESSAGE.to_string(),
    ));

    if status.is_server_error() {
        return ErrorResponse {
            status,
            message: INTERNAL_ERROR_MESSAGE.to_string(),
        };
    }
    ErrorResponse { status, message }
}

fn is_invalid_token(e: &(dyn StdError + 'static)) -> bool {
    e.is::<InvalidTokenError>() || matches!(e.downcast_ref::<AuthError>(), Some(AuthError::InvalidToken(_)))
}

fn classify(e: &(dyn StdError + 'static)) -> Option<(StatusCode, String)> {
    if let Some(res) = e.downcast_ref::<ResponseError>() {
        return Some((res.status, res.message.clone()));
    }
    match e.downcast_ref::<AuthError>()? {
        AuthError::PolicyRejected(_) => Some((StatusCode::FORBIDDEN, ACCESS_DENIED_MESSAGE.to_string())),
        AuthError::InvalidRequest(_) | AuthError::InvalidRedirectUri { .. } => {
            Some((StatusCode::BAD_REQUEST, BAD_REQUEST_MESSAGE.to_string()))
        }
        _ => None,
    }
}

fn log_masked(err: &(dyn StdError + 'static), res: &ErrorResponse) {
    if res.status.is_server_error() {
        tracing::error!(status = res.status.as_u16(), "Authentication error: {err}");
    } else {
        tracing::debug!(status = res.status.as_u16(), "Authentication rejected: {err}");
    }
}

/// Render `err` as `text/plain` with body `Error: <message>`.
pub fn text_response(err: &(dyn StdError + 'static)) -> Response {
    let res = error_response(err);
    log_masked(err, &res);
    (res.status, format!("Error: {}", res.message)).into_response()
}

/// Render `err` as `application/json` with body `{"error": "<message>"}`.
pub fn json_response(err: &(dyn StdError + 'static)) -> Response {
    let res = error_response(err);
    log_masked(err, &res);
    (res.status, Json(ErrorBody::new(res.message))).into_response()
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        json_response(&self)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        json_response(&self)
    }
}
