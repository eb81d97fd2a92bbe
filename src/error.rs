// Error handling module
// Defines the HTTP failure taxonomy and the one place raw failures are normalized into it

use serde_json::Value;
use thiserror::Error;

/// Message surfaced when the backend never produced a response
pub const UNREACHABLE_MESSAGE: &str = "Kleff backend is unreachable. Please try again later.";

/// Body fields searched for a human-readable message, highest priority first
const MESSAGE_FIELDS: [&str; 4] = ["detail", "title", "message", "error"];

/// Failure of a single identity API request
///
/// Every failed request resolves to exactly one of these variants, regardless of whether the
/// server answered with an error status or the request never got a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpException {
    /// Server answered 404
    #[error("{0}")]
    NotFound(String),

    /// Server answered 422
    #[error("{0}")]
    InvalidInput(String),

    /// Any other status, including the synthetic 503 (unreachable) and 500 (unclassified)
    #[error("{message}")]
    Generic { status: u16, message: String },
}

impl HttpException {
    /// HTTP status this failure represents
    pub fn status(&self) -> u16 {
        match self {
            HttpException::NotFound(_) => 404,
            HttpException::InvalidInput(_) => 422,
            HttpException::Generic { status, .. } => *status,
        }
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        match self {
            HttpException::NotFound(message) | HttpException::InvalidInput(message) => message,
            HttpException::Generic { message, .. } => message,
        }
    }

    /// Message, or `fallback` when the failure carries an empty one
    pub fn message_or(&self, fallback: &str) -> String {
        let message = self.message().trim();
        if message.is_empty() {
            fallback.to_string()
        } else {
            message.to_string()
        }
    }

    /// Normalize an error status and its raw body
    pub fn from_response(status: u16, body: &str) -> Self {
        let fallback = format!("Request failed with status code {}", status);
        let message = extract_message(body, &fallback);

        match status {
            404 => HttpException::NotFound(message),
            422 => HttpException::InvalidInput(message),
            _ => HttpException::Generic { status, message },
        }
    }

    /// The request was sent (or attempted) but no response came back
    pub fn unreachable() -> Self {
        HttpException::Generic {
            status: 503,
            message: UNREACHABLE_MESSAGE.to_string(),
        }
    }

    /// Normalize a transport-level error from reqwest
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_response(status.as_u16(), "");
        }

        // Failures before sending or after a response arrived are not "unreachable"
        if err.is_builder() || err.is_decode() || err.is_body() {
            return Self::unclassified(&err.to_string());
        }

        if err.is_connect() || err.is_timeout() || err.is_request() {
            return Self::unreachable();
        }

        Self::unclassified(&err.to_string())
    }

    /// Catch-all for failures that fit no other shape
    pub fn unclassified(message: &str) -> Self {
        let message = if message.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            message.to_string()
        };

        HttpException::Generic {
            status: 500,
            message,
        }
    }
}

/// Pull a message out of an error body
///
/// A JSON string body is the message itself. A JSON object yields the first string field among
/// `detail`, `title`, `message`, `error`. Plain text is used verbatim. Anything else falls back.
pub fn extract_message(body: &str, fallback: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(text)) if !text.is_empty() => text,
        Ok(Value::Object(map)) => MESSAGE_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string()),
        Ok(_) => fallback.to_string(),
        Err(_) if !body.trim().is_empty() => body.to_string(),
        Err(_) => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_uses_detail() {
        let err = HttpException::from_response(404, r#"{"detail":"x"}"#);
        assert_eq!(err, HttpException::NotFound("x".to_string()));
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_not_found_falls_back_to_title() {
        let err = HttpException::from_response(404, r#"{"title":"y"}"#);
        assert_eq!(err, HttpException::NotFound("y".to_string()));
    }

    #[test]
    fn test_message_priority_order() {
        let body = r#"{"error":"e","message":"m","title":"t","detail":"d"}"#;
        assert_eq!(extract_message(body, "fb"), "d");

        let body = r#"{"error":"e","message":"m","title":"t"}"#;
        assert_eq!(extract_message(body, "fb"), "t");

        let body = r#"{"error":"e","message":"m"}"#;
        assert_eq!(extract_message(body, "fb"), "m");

        let body = r#"{"error":"e"}"#;
        assert_eq!(extract_message(body, "fb"), "e");
    }

    #[test]
    fn test_non_string_fields_are_skipped() {
        // Go-style errors sometimes nest objects under "error"
        let body = r#"{"detail":{"code":7},"error":"flat"}"#;
        assert_eq!(extract_message(body, "fb"), "flat");

        let body = r#"{"error":{"code":"bad"}}"#;
        assert_eq!(extract_message(body, "fb"), "fb");
    }

    #[test]
    fn test_plain_and_string_bodies() {
        assert_eq!(extract_message(r#""quoted""#, "fb"), "quoted");
        assert_eq!(extract_message("Bad Gateway", "fb"), "Bad Gateway");
        assert_eq!(extract_message("", "fb"), "fb");
        assert_eq!(extract_message("   ", "fb"), "fb");
        assert_eq!(extract_message("[1,2]", "fb"), "fb");
    }

    #[test]
    fn test_invalid_input_status() {
        let err = HttpException::from_response(422, r#"{"message":"email taken"}"#);
        assert_eq!(err, HttpException::InvalidInput("email taken".to_string()));
        assert_eq!(err.status(), 422);
    }

    #[test]
    fn test_generic_status_preserved() {
        let err = HttpException::from_response(401, r#"{"error":"missing or invalid authentication"}"#);
        assert_eq!(
            err,
            HttpException::Generic {
                status: 401,
                message: "missing or invalid authentication".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_body_uses_transport_message() {
        let err = HttpException::from_response(500, "");
        assert_eq!(err.message(), "Request failed with status code 500");

        // An empty JSON string carries no more text than an empty body
        let err = HttpException::from_response(502, "\"\"");
        assert_eq!(err.message(), "Request failed with status code 502");
    }

    #[test]
    fn test_unreachable() {
        let err = HttpException::unreachable();
        assert_eq!(err.status(), 503);
        assert_eq!(err.to_string(), UNREACHABLE_MESSAGE);
    }

    #[test]
    fn test_unclassified_defaults() {
        assert_eq!(HttpException::unclassified("").message(), "Unknown error");
        assert_eq!(HttpException::unclassified("boom").status(), 500);
    }

    #[test]
    fn test_message_or() {
        let err = HttpException::NotFound(String::new());
        assert_eq!(err.message_or("Failed to sign in"), "Failed to sign in");

        let err = HttpException::NotFound("user not found".to_string());
        assert_eq!(err.message_or("Failed to sign in"), "user not found");
    }

    #[tokio::test]
    async fn test_builder_error_is_unclassified() {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();

        let mapped = HttpException::from_transport(&err);
        assert_eq!(mapped.status(), 500);
        assert!(!mapped.message().is_empty());
    }
}
