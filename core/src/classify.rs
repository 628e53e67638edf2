//! Mapping of transport outcomes onto `NetError`.
//!
//! Pure functions; nothing here performs I/O or touches shared state.

use serde_json::Value;

use crate::error::{BoxError, NetError, TransportError};
use crate::http::{HttpResponse, TransportOutcome};

/// Classify a failed call.
///
/// `status` is the received status code, if any. A cancelled transport
/// error always wins, since a cancelled task may still have seen a status.
pub fn classify(status: Option<u16>, error: Option<TransportError>, body: &[u8]) -> NetError {
    if matches!(error, Some(TransportError::Cancelled)) {
        return NetError::Cancelled;
    }
    let source = error.map(|e| Box::new(e) as BoxError);

    match status {
        Some(400) => NetError::BadRequest { source },
        Some(401) => NetError::Unauthorized { source },
        Some(403) => NetError::Prohibited {
            message: server_message(body),
            body: body.to_vec(),
        },
        Some(404) => NetError::NotFound { source },
        Some(408) => NetError::Timeout {
            status: Some(408),
            source,
        },
        Some(422) => NetError::DecodingFailed {
            status: Some(422),
            source,
        },
        Some(status @ 500..=599) => NetError::ServerError { status, source },
        Some(status) => NetError::RequestFailed {
            status: Some(status),
            source,
        },
        None => match source {
            Some(source) => transport_failure(source),
            None => NetError::Unknown { source: None },
        },
    }
}

/// Without a status line, only the transport error tells what happened.
fn transport_failure(source: BoxError) -> NetError {
    match source.downcast_ref::<TransportError>() {
        Some(TransportError::TimedOut(_)) => NetError::Timeout {
            status: None,
            source: Some(source),
        },
        _ => NetError::RequestFailed {
            status: None,
            source: Some(source),
        },
    }
}

/// Split an outcome into a 2xx response or a classified error.
pub fn settle(outcome: TransportOutcome) -> Result<HttpResponse, NetError> {
    match outcome {
        TransportOutcome::Response(response) if response.is_success() => Ok(response),
        TransportOutcome::Response(response) => {
            Err(classify(Some(response.status), None, &response.body))
        }
        TransportOutcome::Failure(error) => Err(classify(None, Some(error), &[])),
    }
}

/// Human-readable message from a 403 body: a JSON `message` field, else
/// the body text itself.
pub fn server_message(body: &[u8]) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        if let Some(Value::String(message)) = map.get("message") {
            return message.clone();
        }
    }
    String::from_utf8_lossy(body).trim().to_string()
}
