use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::firestore::error::{
    aborted, already_exists, deadline_exceeded, failed_precondition, internal_error, invalid_argument,
    not_found, permission_denied, resource_exhausted, unauthenticated, unavailable, FirestoreError,
    RemoteStatus,
};

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<GoogleError>,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Maps a non-2xx response to an error, preferring the envelope's `status`
/// string over the HTTP status code.
pub fn map_http_error(status: StatusCode, body: &str) -> FirestoreError {
    let payload = extract_error_payload(body).unwrap_or_default();
    from_google_error(status.as_u16(), payload, status.canonical_reason())
}

/// Maps an `{"error": {...}}` envelope found in a successful response body, or
/// an error entry of a streamed `runQuery` result.
pub fn map_error_payload(http_status: u16, error: &JsonValue) -> FirestoreError {
    let payload = serde_json::from_value::<GoogleError>(error.clone()).unwrap_or_default();
    from_google_error(http_status, payload, None)
}

fn from_google_error(http_status: u16, payload: GoogleError, reason: Option<&str>) -> FirestoreError {
    let message = payload
        .message
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| reason.unwrap_or("Firestore request failed").to_string());
    let code = payload.code.unwrap_or(http_status);
    let error = match payload.status.as_deref() {
        Some(status) => map_status_code(status, message),
        None => map_status_number(code, message),
    };
    error.with_remote_status(RemoteStatus {
        code,
        status: payload.status,
    })
}

fn map_status_number(code: u16, message: String) -> FirestoreError {
    match code {
        400 | 413 | 415 => invalid_argument(message),
        401 => unauthenticated(message),
        403 => permission_denied(message),
        404 => not_found(message),
        408 | 504 => deadline_exceeded(message),
        409 => aborted(message),
        412 => failed_precondition(message),
        429 => resource_exhausted(message),
        502 | 503 => unavailable(message),
        _ => internal_error(message),
    }
}

fn map_status_code(status: &str, message: String) -> FirestoreError {
    match status {
        "INVALID_ARGUMENT" | "OUT_OF_RANGE" => invalid_argument(message),
        "FAILED_PRECONDITION" => failed_precondition(message),
        "UNAUTHENTICATED" => unauthenticated(message),
        "PERMISSION_DENIED" => permission_denied(message),
        "NOT_FOUND" => not_found(message),
        "ALREADY_EXISTS" => already_exists(message),
        "ABORTED" => aborted(message),
        "RESOURCE_EXHAUSTED" => resource_exhausted(message),
        "UNAVAILABLE" => unavailable(message),
        "DEADLINE_EXCEEDED" => deadline_exceeded(message),
        _ => internal_error(message),
    }
}

fn extract_error_payload(body: &str) -> Option<GoogleError> {
    serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_status_wins_over_http_code() {
        let body = r#"{"error":{"code":409,"message":"Too much contention","status":"ABORTED"}}"#;
        let err = map_http_error(StatusCode::CONFLICT, body);
        assert_eq!(err.code_str(), "firestore/aborted");
        assert_eq!(err.message(), "Too much contention");
        let remote = err.remote().expect("remote status");
        assert_eq!(remote.code, 409);
        assert_eq!(remote.status.as_deref(), Some("ABORTED"));
    }

    #[test]
    fn falls_back_to_http_status() {
        let err = map_http_error(StatusCode::FORBIDDEN, "not json");
        assert_eq!(err.code_str(), "firestore/permission-denied");
        assert_eq!(err.message(), "Forbidden");
        assert!(err.is_remote());
    }

    #[test]
    fn maps_inline_error_payloads() {
        let err = map_error_payload(200, &json!({"code": 6, "message": "exists", "status": "ALREADY_EXISTS"}));
        assert_eq!(err.code_str(), "firestore/already-exists");
        assert_eq!(err.remote().unwrap().code, 6);
    }
}
