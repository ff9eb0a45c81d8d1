//! Retryability classification for upstream errors.

use glossgen_shared::GlossgenError;

/// True when an error is an upstream throttling response.
///
/// An error is rate-limited when its recorded HTTP status is 429, or — for
/// transports that only surface a message — when the message contains "429".
/// Everything else (non-429 4xx, 5xx, parse and validation failures) is
/// permanent and must propagate after a single attempt.
pub fn is_rate_limited(error: &GlossgenError) -> bool {
    match error {
        GlossgenError::Upstream { status, message } => {
            status == &Some(429) || message.contains("429")
        }
        _ => false,
    }
}
