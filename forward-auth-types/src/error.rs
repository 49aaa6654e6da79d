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

//! JSON error envelope.
//!
//! Every authentication failure rendered as JSON has the shape
//! `{ "error": "<message>" }`. The message is always the *masked* text chosen
//! by the provider core, never the internal error detail.

use serde::{Deserialize, Serialize};

/// Body of a JSON error response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_error_object() {
        let body = ErrorBody::new("Access token is invalid");
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"error":"Access token is invalid"}"#);
    }
}
