//! Incremental token usage accounting.
//!
//! Before the provider reports usage, output and reasoning tokens are estimated from the
//! streamed deltas so hosts can meter a turn while it runs. The first usage the provider
//! reports replaces the estimate and estimation stops: provider counts are forwarded
//! unchanged from then on.

use std::sync::Arc;

use futures::StreamExt;

use super::types::SegmentStream;
use crate::tokenizer::TokenCounter;
use crate::types::{ChatSegment, ChatTokenUsage};

pub struct UsageAccumulator {
    counter: Arc<dyn TokenCounter>,
    usage: ChatTokenUsage,
    upstream_reported: bool,
}

impl UsageAccumulator {
    pub fn new(input_tokens: u32, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            counter,
            usage: ChatTokenUsage::input_only(input_tokens),
            upstream_reported: false,
        }
    }

    pub fn usage(&self) -> ChatTokenUsage {
        self.usage
    }

    /// Observe one segment; returns the usage segment to emit after it, if any.
    pub fn observe(&mut self, segment: &ChatSegment) -> Option<ChatSegment> {
        match segment {
            ChatSegment::Usage(reported) => {
                self.usage = *reported;
                self.upstream_reported = true;
                None
            }
            _ if self.upstream_reported => None,
            ChatSegment::Text { content } => {
                self.usage.output_tokens =
                    self.usage.output_tokens.saturating_add(self.counter.count_tokens(content));
                Some(ChatSegment::Usage(self.usage))
            }
            ChatSegment::Think { content } => {
                self.usage.reasoning_tokens =
                    self.usage.reasoning_tokens.saturating_add(self.counter.count_tokens(content));
                Some(ChatSegment::Usage(self.usage))
            }
            _ => None,
        }
    }
}

/// Wrap `stream` with usage accounting.
///
/// Yields `Usage{input_tokens}` first, then every upstream segment followed by a refreshed
/// estimate after each text or think delta.
pub fn with_usage_accounting(
    stream: SegmentStream,
    input_tokens: u32,
    counter: Arc<dyn TokenCounter>,
) -> SegmentStream {
    let mut inner = stream;
    let mut acc = UsageAccumulator::new(input_tokens, counter);
    Box::pin(async_stream::stream! {
        yield Ok(ChatSegment::Usage(acc.usage()));
        while let Some(item) = inner.next().await {
            match item {
                Ok(segment) => {
                    let extra = acc.observe(&segment);
                    yield Ok(segment);
                    if let Some(extra) = extra {
                        yield Ok(extra);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    })
}
