//! Incremental decoder for a streamed top-level JSON array (`[{...},{...}]`).
//!
//! Each array element is yielded as soon as its closing brace arrives. Structural
//! characters are ASCII, so scanning bytes is safe for any UTF-8 split.

use futures_util::{Stream, StreamExt};

use super::types::JsonValueStream;
use crate::error::LlmError;

#[derive(Debug, Default)]
pub struct JsonArrayDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already scanned
    pos: usize,
    /// Start of the element being read
    start: Option<usize>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonArrayDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every element completed by them.
    ///
    /// Elements that are not valid JSON are logged and dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<serde_json::Value> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        let mut i = self.pos;
        while i < self.buf.len() {
            let b = self.buf[i];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                i += 1;
                continue;
            }

            if self.depth == 0 {
                // Outside any element only `{` matters; `[`, `,`, `]` and whitespace are framing.
                if b == b'{' {
                    self.start = Some(i);
                    self.depth = 1;
                }
                i += 1;
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0
                        && let Some(start) = self.start.take()
                    {
                        match serde_json::from_slice(&self.buf[start..=i]) {
                            Ok(v) => out.push(v),
                            Err(e) => {
                                tracing::warn!(error = %e, "skipping malformed JSON array element")
                            }
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }

        // Drop what is no longer needed
        let keep_from = self.start.unwrap_or(self.buf.len());
        self.buf.drain(..keep_from);
        self.start = self.start.map(|_| 0);
        self.pos = self.buf.len();

        out
    }

    /// Whether an element is still open.
    pub fn has_partial(&self) -> bool {
        self.start.is_some()
    }
}

/// Decode a streamed JSON array body into its elements.
pub fn stream_json_array_values<S, B>(byte_stream: S, label: impl Into<String>) -> JsonValueStream
where
    S: Stream<Item = Result<B, LlmError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let label = label.into();
    let out = async_stream::stream! {
        let mut bytes = Box::pin(byte_stream);
        let mut decoder = JsonArrayDecoder::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for value in decoder.push(chunk.as_ref()) {
                        yield Ok(value);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        if decoder.has_partial() {
            tracing::warn!(provider = %label, "JSON array stream ended inside an element");
        }
    };
    Box::pin(out)
}
