//! Inbound conversions from provider wire formats into the neutral message model.
//!
//! These parse the message arrays that OpenAI-compatible and Anthropic-compatible
//! clients send, so one [`ChatRequest`](crate::types::ChatRequest) can be built from
//! either dialect. Outbound conversions live in each adapter's request builder.

pub mod anthropic;
pub mod openai;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::LlmError;

fn decode_base64(data: &str) -> Result<Vec<u8>, LlmError> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| LlmError::InvalidParameter(format!("invalid base64 image data: {e}")))
}
