//! GraphQL Response Envelope
//!
//! Classifies an HTTP reply carrying a GraphQL response. A non-200 status
//! or a non-empty `errors` array is always a failure, even when `data` is
//! also present: partial GraphQL data is not trusted.

use serde::Deserialize;
use serde_json::Value;

use crate::adapters::http::status_error;
use crate::domain::observation::FetchError;
use crate::ports::http_transport::HttpReply;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

/// Extract `data` from a GraphQL reply.
pub fn parse_envelope(reply: &HttpReply) -> Result<Value, FetchError> {
    if reply.status != 200 {
        return Err(status_error(reply));
    }

    let envelope: Envelope = serde_json::from_str(&reply.body)
        .map_err(|e| FetchError::Decode(format!("response is not a GraphQL envelope: {e}")))?;

    if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        return Err(FetchError::Provider(format!(
            "graphql errors: {}",
            messages.join("; ")
        )));
    }

    match envelope.data {
        Some(Value::Null) | None => Err(FetchError::Decode("response has no data".into())),
        Some(data) => Ok(data),
    }
}
