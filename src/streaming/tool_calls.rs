//! Tool-call aggregation.
//!
//! Providers stream a tool call as many fragments sharing an index. Contiguous fragments
//! with the same index form one call; arguments are concatenated in arrival order and
//! `id`/`name` keep the last value seen.

use crate::error::LlmError;
use crate::types::{ChatSegment, ToolCall};

#[derive(Debug, Clone, Default)]
struct PendingCall {
    index: u32,
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl PendingCall {
    fn finalize(self) -> Result<ToolCall, LlmError> {
        match (self.id, self.name) {
            (Some(id), Some(name)) => Ok(ToolCall {
                id,
                name,
                arguments: self.arguments,
            }),
            _ => Err(LlmError::IncompleteToolCall { index: self.index }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolCallAggregator {
    current: Option<PendingCall>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a segment. Returns the previous call when this fragment starts a new index.
    ///
    /// Segments other than tool-call fragments are ignored.
    pub fn push(&mut self, segment: &ChatSegment) -> Result<Option<ToolCall>, LlmError> {
        let ChatSegment::ToolCall {
            index,
            id,
            name,
            arguments,
        } = segment
        else {
            return Ok(None);
        };

        let finished = match self.current.take() {
            Some(pending) if pending.index != *index => Some(pending.finalize()?),
            Some(pending) => {
                self.current = Some(pending);
                None
            }
            None => None,
        };

        let pending = self.current.get_or_insert_with(|| PendingCall {
            index: *index,
            ..Default::default()
        });
        if let Some(id) = id.as_deref().filter(|s| !s.is_empty()) {
            pending.id = Some(id.to_string());
        }
        if let Some(name) = name.as_deref().filter(|s| !s.is_empty()) {
            pending.name = Some(name.to_string());
        }
        if let Some(arguments) = arguments {
            pending.arguments.push_str(arguments);
        }

        Ok(finished)
    }

    /// Finalize the open group at end of stream.
    pub fn finish(&mut self) -> Result<Option<ToolCall>, LlmError> {
        self.current.take().map(PendingCall::finalize).transpose()
    }

    /// Drop any partially aggregated call (used on cancellation).
    pub fn discard(&mut self) {
        self.current = None;
    }
}

/// Aggregate every tool call in `segments`.
pub fn aggregate_tool_calls(
    segments: impl IntoIterator<Item = ChatSegment>,
) -> Result<Vec<ToolCall>, LlmError> {
    let mut aggregator = ToolCallAggregator::new();
    let mut calls = Vec::new();
    for segment in segments {
        if let Some(call) = aggregator.push(&segment)? {
            calls.push(call);
        }
    }
    if let Some(call) = aggregator.finish()? {
        calls.push(call);
    }
    Ok(calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frag(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> ChatSegment {
        ChatSegment::tool_call(
            index,
            id.map(str::to_string),
            name.map(str::to_string),
            Some(args.to_string()),
        )
    }

    #[test]
    fn one_index_yields_one_call() {
        let calls = aggregate_tool_calls(vec![
            frag(0, Some("call_1"), Some("get_weather"), ""),
            frag(0, None, None, "{\"city\":"),
            ChatSegment::text("ignored"),
            frag(0, None, None, "\"Paris\"}"),
        ])
        .expect("complete");
        assert_eq!(
            calls,
            vec![ToolCall {
                id: "call_1".into(),
                name: "get_weather".into(),
                arguments: "{\"city\":\"Paris\"}".into(),
            }]
        );
    }

    #[test]
    fn two_indices_yield_two_calls() {
        let calls = aggregate_tool_calls(vec![
            frag(0, Some("a"), Some("f"), "{}"),
            frag(1, Some("b"), Some("g"), "{\"x\":"),
            frag(1, None, None, "1}"),
        ])
        .expect("complete");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].arguments, "{\"x\":1}");
    }

    #[test]
    fn id_and_name_take_the_last_value() {
        let calls = aggregate_tool_calls(vec![
            frag(0, Some("old"), Some("f"), ""),
            frag(0, Some("new"), Some(""), ""),
        ])
        .expect("complete");
        assert_eq!(calls[0].id, "new");
        assert_eq!(calls[0].name, "f");
    }

    #[test]
    fn missing_id_is_an_error() {
        let err = aggregate_tool_calls(vec![ChatSegment::tool_call(
            0,
            None,
            None,
            Some("{}".into()),
        )])
        .expect_err("incomplete");
        assert_eq!(err, LlmError::IncompleteToolCall { index: 0 });
    }

    #[test]
    fn discard_drops_partial_state() {
        let mut agg = ToolCallAggregator::new();
        agg.push(&frag(0, Some("a"), None, "{")).expect("push");
        agg.discard();
        assert_eq!(agg.finish(), Ok(None));
    }

    proptest! {
        #[test]
        fn arguments_concatenate_in_arrival_order(
            pieces in proptest::collection::vec(".{0,8}", 1..12)
        ) {
            let mut segments = vec![frag(3, Some("id"), Some("name"), "")];
            segments.extend(pieces.iter().map(|p| frag(3, None, None, p)));
            let calls = aggregate_tool_calls(segments).expect("complete");
            prop_assert_eq!(calls.len(), 1);
            prop_assert_eq!(&calls[0].arguments, &pieces.concat());
        }
    }
}
