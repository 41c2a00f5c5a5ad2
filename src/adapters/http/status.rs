//! HTTP status classification shared by GraphQL and REST adapters.

use crate::domain::observation::FetchError;
use crate::ports::http_transport::HttpReply;

/// Map a non-success HTTP status onto the fetch taxonomy.
///
/// 5xx is transient and retryable; every other status (including 429) is
/// treated as a stable provider answer.
pub fn status_error(reply: &HttpReply) -> FetchError {
  let snippet: String = reply.body.chars().take(200).collect();
  if (500..600).contains(&reply.status) {
    FetchError::Transport(format!("HTTP {}: {snippet}", reply.status))
  } else {
    FetchError::Provider(format!("HTTP {}: {snippet}", reply.status))
  }
}
