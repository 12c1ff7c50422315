//! Request/response translation between the two dialects.
//!
//! - `request`: OpenAI chat completion request → Anthropic Messages request
//! - `response`: Anthropic Messages response → OpenAI chat completion
//! - `streaming`: Anthropic SSE events → OpenAI chunk sequence

pub mod request;
pub mod response;
pub mod streaming;

pub use request::translate_request;
pub use response::translate_response;
pub use streaming::StreamTranslator;

use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
