//! Splits inline `<think>...</think>` markup out of a text stream.
//!
//! Some models emit reasoning inside the plain text channel. The parser decides from the
//! first characters of a text run whether it opens with the think tag, emits reasoning
//! as [`ChatSegment::Think`] and the rest as [`ChatSegment::Text`].
//!
//! A text run starts at the beginning of the stream and again after every tool call or
//! tool result, so reasoning interleaved with tool calls is recognised in each step.
//!
//! Output order follows input order. Usage, native reasoning and signatures that arrive
//! while text is held back wait for that text to resolve; any other segment flushes the
//! held text first.

use futures::StreamExt;

use super::types::SegmentStream;
use crate::types::ChatSegment;

pub const DEFAULT_OPEN_TAG: &str = "<think>";
pub const DEFAULT_CLOSE_TAG: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Not yet known whether the run opens with the tag
    Undecided,
    Text,
    Think,
}

#[derive(Debug, Clone)]
pub struct ThinkTagParser {
    open: String,
    close: String,
    mode: Mode,
    pre_buffer: String,
    think_buffer: String,
    /// Segments that arrived while text was held back
    held: Vec<ChatSegment>,
}

impl Default for ThinkTagParser {
    fn default() -> Self {
        Self::with_tags(DEFAULT_OPEN_TAG, DEFAULT_CLOSE_TAG)
    }
}

impl ThinkTagParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            mode: Mode::Undecided,
            pre_buffer: String::new(),
            think_buffer: String::new(),
            held: Vec::new(),
        }
    }

    /// Feed one segment; returns the segments that are now certain.
    pub fn push(&mut self, segment: ChatSegment) -> Vec<ChatSegment> {
        let token = match segment {
            ChatSegment::Text { content } => content,
            other => return self.push_other(other),
        };

        let mut out = Vec::new();
        self.push_text(token, &mut out);
        if !self.has_pending() {
            out.append(&mut self.held);
        }
        out
    }

    fn push_text(&mut self, token: String, out: &mut Vec<ChatSegment>) {
        let token = match self.mode {
            Mode::Undecided => match self.decide(token, out) {
                Some(rest) => rest,
                None => return,
            },
            _ => token,
        };

        match self.mode {
            Mode::Text => {
                if !token.is_empty() {
                    out.push(ChatSegment::text(token));
                }
            }
            Mode::Think => self.push_think(&token, out),
            Mode::Undecided => {}
        }
    }

    fn push_other(&mut self, segment: ChatSegment) -> Vec<ChatSegment> {
        let waits = matches!(
            segment,
            ChatSegment::Usage(_)
                | ChatSegment::Think { .. }
                | ChatSegment::ThinkingSignature { .. }
        );
        if waits {
            if self.has_pending() {
                self.held.push(segment);
                return Vec::new();
            }
            return vec![segment];
        }

        let mut out = self.flush_pending();
        out.append(&mut self.held);
        if self.mode == Mode::Text
            && matches!(
                segment,
                ChatSegment::ToolCall { .. } | ChatSegment::ToolCallResponse { .. }
            )
        {
            self.mode = Mode::Undecided;
        }
        out.push(segment);
        out
    }

    fn has_pending(&self) -> bool {
        !self.pre_buffer.is_empty() || !self.think_buffer.is_empty()
    }

    /// Emit held-back text. An undecided prefix becomes text; a think block stays open.
    fn flush_pending(&mut self) -> Vec<ChatSegment> {
        let mut out = Vec::new();
        if self.mode == Mode::Undecided && !self.pre_buffer.is_empty() {
            self.mode = Mode::Text;
            out.push(ChatSegment::text(std::mem::take(&mut self.pre_buffer)));
        }
        if self.mode == Mode::Think && !self.think_buffer.is_empty() {
            out.push(ChatSegment::think(std::mem::take(&mut self.think_buffer)));
        }
        out
    }

    /// Resolve an undecided run. Returns text still to be processed in the decided mode.
    fn decide(&mut self, token: String, out: &mut Vec<ChatSegment>) -> Option<String> {
        self.pre_buffer.push_str(&token);

        if self.pre_buffer.len() > self.open.len() {
            if self.pre_buffer.starts_with(&self.open) {
                self.mode = Mode::Think;
                let rest = self.pre_buffer[self.open.len()..].to_string();
                self.pre_buffer.clear();
                return Some(rest);
            }
            self.mode = Mode::Text;
            out.push(ChatSegment::text(std::mem::take(&mut self.pre_buffer)));
            return None;
        }

        if self.pre_buffer == self.open {
            self.mode = Mode::Think;
            self.pre_buffer.clear();
            return None;
        }

        if !self.open.starts_with(self.pre_buffer.as_str()) {
            self.mode = Mode::Text;
            out.push(ChatSegment::text(std::mem::take(&mut self.pre_buffer)));
        }
        None
    }

    fn push_think(&mut self, token: &str, out: &mut Vec<ChatSegment>) {
        if token.is_empty() {
            return;
        }
        self.think_buffer.push_str(token);

        if let Some(index) = self.think_buffer.find(self.close.as_str()) {
            let before = &self.think_buffer[..index];
            if !before.is_empty() {
                out.push(ChatSegment::think(before));
            }
            let after = &self.think_buffer[index + self.close.len()..];
            if !after.is_empty() {
                out.push(ChatSegment::text(after));
            }
            self.think_buffer.clear();
            self.mode = Mode::Text;
            return;
        }

        let overlap = suffix_prefix_overlap(&self.think_buffer, &self.close);
        let emit_len = self.think_buffer.len() - overlap;
        if emit_len > 0 {
            out.push(ChatSegment::think(&self.think_buffer[..emit_len]));
            self.think_buffer.drain(..emit_len);
        }
    }

    /// Flush buffered text at end of stream.
    ///
    /// An undecided prefix is text; an unterminated think block is still reasoning.
    pub fn finish(&mut self) -> Vec<ChatSegment> {
        let mut out = self.flush_pending();
        out.append(&mut self.held);
        out
    }
}

/// Longest suffix of `s` that is a prefix of `pattern`, in bytes. Char-boundary safe.
fn suffix_prefix_overlap(s: &str, pattern: &str) -> usize {
    pattern
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .filter(|len| *len <= s.len())
        .rev()
        .find(|len| s.ends_with(&pattern[..*len]))
        .unwrap_or(0)
}

/// Apply a default [`ThinkTagParser`] to a segment stream.
///
/// Errors pass through and end the stream; buffered text is not flushed after an error.
pub fn apply_think_tag_parser(stream: SegmentStream) -> SegmentStream {
    apply_think_tag_parser_with(stream, ThinkTagParser::default())
}

pub fn apply_think_tag_parser_with(stream: SegmentStream, parser: ThinkTagParser) -> SegmentStream {
    let mut inner = stream;
    let mut parser = parser;
    Box::pin(async_stream::stream! {
        while let Some(item) = inner.next().await {
            match item {
                Ok(segment) => {
                    for out in parser.push(segment) {
                        yield Ok(out);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        for out in parser.finish() {
            yield Ok(out);
        }
    })
}
