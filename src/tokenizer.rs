//! Token counting for pre-flight prompt estimates and streamed usage accounting.
//!
//! Counts here are estimates. Whenever the provider reports usage (or exposes a native
//! counting endpoint) that number is authoritative.

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

use crate::types::{ChatRequest, ModelReference, NeutralContent, NeutralMessage};

const TOKENS_PER_CONVERSATION: u32 = 3;
const TOKENS_PER_MESSAGE: u32 = 4;
const TOKENS_PER_TOOL_CALL: u32 = 3;
/// Flat cost of an attached image or file
const TOKENS_PER_FILE: u32 = 1105;

static O200K_BASE: Lazy<Option<CoreBPE>> =
    Lazy::new(|| load("o200k_base", tiktoken_rs::o200k_base));
static CL100K_BASE: Lazy<Option<CoreBPE>> =
    Lazy::new(|| load("cl100k_base", tiktoken_rs::cl100k_base));
static P50K_BASE: Lazy<Option<CoreBPE>> = Lazy::new(|| load("p50k_base", tiktoken_rs::p50k_base));
static R50K_BASE: Lazy<Option<CoreBPE>> = Lazy::new(|| load("r50k_base", tiktoken_rs::r50k_base));

fn load<E: std::fmt::Display>(name: &str, f: fn() -> Result<CoreBPE, E>) -> Option<CoreBPE> {
    match f() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!(
                encoding = name,
                error = %e,
                "failed to load tokenizer, using length heuristic"
            );
            None
        }
    }
}

/// Something that can count tokens in a string.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> u32;
}

/// BPE encodings known to the tokenizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TokenEncoding {
    #[default]
    O200kBase,
    Cl100kBase,
    P50kBase,
    R50kBase,
}

impl TokenEncoding {
    /// Unknown names fall back to `o200k_base`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "cl100k_base" => Self::Cl100kBase,
            "p50k_base" => Self::P50kBase,
            "r50k_base" | "gpt2" => Self::R50kBase,
            _ => Self::O200kBase,
        }
    }

    fn bpe(self) -> Option<&'static CoreBPE> {
        match self {
            Self::O200kBase => O200K_BASE.as_ref(),
            Self::Cl100kBase => CL100K_BASE.as_ref(),
            Self::P50kBase => P50K_BASE.as_ref(),
            Self::R50kBase => R50K_BASE.as_ref(),
        }
    }
}

/// [`TokenCounter`] backed by tiktoken.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiktokenCounter {
    encoding: TokenEncoding,
}

impl TiktokenCounter {
    pub fn new(encoding: TokenEncoding) -> Self {
        Self { encoding }
    }

    /// Counter for the encoding named by the model reference.
    pub fn for_reference(reference: &ModelReference) -> Self {
        Self::new(
            reference
                .tokenizer
                .as_deref()
                .map(TokenEncoding::from_name)
                .unwrap_or_default(),
        )
    }

    pub fn encoding(&self) -> TokenEncoding {
        self.encoding
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let n = self.encoding.bpe().map_or_else(
            || text.len().div_ceil(4),
            |bpe| bpe.encode_with_special_tokens(text).len(),
        );
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

/// Pre-flight prompt token estimate for `request`.
pub fn estimate_prompt_tokens(request: &ChatRequest, counter: &dyn TokenCounter) -> u32 {
    let system = request
        .effective_system_prompt()
        .map_or(0, |s| TOKENS_PER_MESSAGE + counter.count_tokens(&s));

    let messages: u32 = request
        .messages
        .iter()
        .map(|m| estimate_message_tokens(m, counter) + TOKENS_PER_MESSAGE)
        .sum();

    TOKENS_PER_CONVERSATION + system + messages
}

fn estimate_message_tokens(message: &NeutralMessage, counter: &dyn TokenCounter) -> u32 {
    message
        .contents
        .iter()
        .map(|c| match c {
            NeutralContent::Text { content }
            | NeutralContent::Error { content }
            | NeutralContent::Think { content, .. } => counter.count_tokens(content),
            NeutralContent::FileUrl { .. }
            | NeutralContent::FileBlob { .. }
            | NeutralContent::File { .. } => TOKENS_PER_FILE,
            NeutralContent::ToolCall {
                id,
                name,
                arguments,
            } => {
                counter.count_tokens(id)
                    + counter.count_tokens(name)
                    + counter.count_tokens(arguments)
                    + TOKENS_PER_TOOL_CALL
            }
            NeutralContent::ToolCallResponse { response, .. } => counter.count_tokens(response),
        })
        .sum()
}
