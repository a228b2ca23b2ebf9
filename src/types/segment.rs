//! Segment model: one incremental unit of normalized model output.

use serde::{Deserialize, Serialize};

/// Why a generation stopped.
///
/// The first five values describe upstream outcomes; the rest are recorded at the
/// turn boundary when a turn fails (see [`crate::error::LlmError::finish_reason`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
    UpstreamError,
    InternalConfigIssue,
    BadParameter,
    Cancelled,
}

impl FinishReason {
    /// Map an OpenAI chat-completions `finish_reason`. Unknown values map to `None`.
    pub fn from_openai(value: &str) -> Option<Self> {
        match value {
            "stop" => Some(Self::Stop),
            "length" => Some(Self::Length),
            "tool_calls" => Some(Self::ToolCalls),
            "content_filter" => Some(Self::ContentFilter),
            "function_call" => Some(Self::FunctionCall),
            _ => None,
        }
    }

    /// Map an Anthropic `stop_reason`. Unknown values map to `None`.
    pub fn from_anthropic(value: &str) -> Option<Self> {
        match value {
            "end_turn" | "stop_sequence" | "pause_turn" => Some(Self::Stop),
            "max_tokens" => Some(Self::Length),
            "tool_use" => Some(Self::ToolCalls),
            "refusal" => Some(Self::ContentFilter),
            _ => None,
        }
    }

    /// Map a Gemini `finishReason`. Unknown values map to `None`.
    pub fn from_gemini(value: &str) -> Option<Self> {
        match value {
            "STOP" => Some(Self::Stop),
            "MAX_TOKENS" => Some(Self::Length),
            "SAFETY" | "RECITATION" | "OTHER" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
            | "LANGUAGE" | "IMAGE_SAFETY" => Some(Self::ContentFilter),
            "MALFORMED_FUNCTION_CALL" => Some(Self::ToolCalls),
            _ => None,
        }
    }

    /// Whether this reason records a failed turn rather than an upstream outcome.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::UpstreamError | Self::InternalConfigIssue | Self::BadParameter | Self::Cancelled
        )
    }
}

/// Token usage. Counts are absolute for the turn so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub reasoning_tokens: u32,
    pub cache_tokens: u32,
    #[serde(default)]
    pub cache_creation_tokens: u32,
}

impl ChatTokenUsage {
    pub fn input_only(input_tokens: u32) -> Self {
        Self {
            input_tokens,
            ..Default::default()
        }
    }
}

/// Where an image segment's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 {
        data: String,
        content_type: String,
        /// Partial preview frame, replaced by a later full image
        #[serde(default)]
        preview: bool,
    },
    Url {
        url: String,
    },
}

/// One incremental unit of model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatSegment {
    Text {
        content: String,
    },
    Think {
        content: String,
    },
    ThinkingSignature {
        signature: String,
    },
    ToolCall {
        index: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },
    ToolCallResponse {
        tool_call_id: String,
        response: String,
        duration_ms: u64,
        is_success: bool,
    },
    Image {
        source: ImageSource,
    },
    Usage(ChatTokenUsage),
    FinishReason(FinishReason),
    /// Error content the provider returned in-band (e.g. a refusal rendered as text).
    Error {
        content: String,
    },
}

impl ChatSegment {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn think(content: impl Into<String>) -> Self {
        Self::Think {
            content: content.into(),
        }
    }

    pub fn signature(signature: impl Into<String>) -> Self {
        Self::ThinkingSignature {
            signature: signature.into(),
        }
    }

    /// Tool-call fragment.
    pub fn tool_call(
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    ) -> Self {
        Self::ToolCall {
            index,
            id,
            name,
            arguments,
        }
    }

    pub fn base64_image(data: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::Image {
            source: ImageSource::Base64 {
                data: data.into(),
                content_type: content_type.into(),
                preview: false,
            },
        }
    }

    pub fn preview_image(data: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::Image {
            source: ImageSource::Base64 {
                data: data.into(),
                content_type: content_type.into(),
                preview: true,
            },
        }
    }

    /// Text or think content carried by this segment.
    pub fn content_str(&self) -> Option<&str> {
        match self {
            Self::Text { content } | Self::Think { content } | Self::Error { content } => {
                Some(content)
            }
            _ => None,
        }
    }
}

/// Aggregated tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Full argument JSON as the model produced it (not re-validated).
    pub arguments: String,
}

/// Concatenated text of all `Text` segments.
pub fn segments_text<'a>(segments: impl IntoIterator<Item = &'a ChatSegment>) -> String {
    segments
        .into_iter()
        .filter_map(|s| match s {
            ChatSegment::Text { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

/// Concatenated content of all `Think` segments.
pub fn segments_think<'a>(segments: impl IntoIterator<Item = &'a ChatSegment>) -> String {
    segments
        .into_iter()
        .filter_map(|s| match s {
            ChatSegment::Think { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

/// Append `segment` to `out`, merging it into the previous item when both are text,
/// both are think, or both are fragments of the same tool call.
pub fn push_merged(out: &mut Vec<ChatSegment>, segment: ChatSegment) {
    let segment = match out.last_mut() {
        Some(prev) => match merge_into(prev, segment) {
            Some(rest) => rest,
            None => return,
        },
        None => segment,
    };
    out.push(segment);
}

/// Returns the segment back when it cannot be merged into `prev`.
fn merge_into(prev: &mut ChatSegment, next: ChatSegment) -> Option<ChatSegment> {
    match (prev, next) {
        (ChatSegment::Text { content: prev }, ChatSegment::Text { content }) => {
            prev.push_str(&content);
            None
        }
        (ChatSegment::Think { content: prev }, ChatSegment::Think { content }) => {
            prev.push_str(&content);
            None
        }
        (
            ChatSegment::ToolCall {
                index: prev_index,
                id: prev_id,
                name: prev_name,
                arguments: prev_args,
            },
            ChatSegment::ToolCall {
                index,
                id,
                name,
                arguments,
            },
        ) if *prev_index == index => {
            if id.is_some() {
                *prev_id = id;
            }
            if name.is_some() {
                *prev_name = name;
            }
            if let Some(arguments) = arguments {
                prev_args.get_or_insert_with(String::new).push_str(&arguments);
            }
            None
        }
        (_, next) => Some(next),
    }
}

/// Merge a segment sequence with [`push_merged`].
pub fn merge_segments(segments: impl IntoIterator<Item = ChatSegment>) -> Vec<ChatSegment> {
    let mut out = Vec::new();
    for segment in segments {
        push_merged(&mut out, segment);
    }
    out
}

/// A complete, already-merged response returned by the unary call shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub segments: Vec<ChatSegment>,
}

impl ChatCompletion {
    pub fn from_segments(segments: impl IntoIterator<Item = ChatSegment>) -> Self {
        Self {
            segments: merge_segments(segments),
        }
    }

    pub fn text(&self) -> String {
        segments_text(&self.segments)
    }

    pub fn think(&self) -> String {
        segments_think(&self.segments)
    }

    /// Last usage reported for the turn.
    pub fn usage(&self) -> Option<ChatTokenUsage> {
        self.segments.iter().rev().find_map(|s| match s {
            ChatSegment::Usage(u) => Some(*u),
            _ => None,
        })
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.segments.iter().rev().find_map(|s| match s {
            ChatSegment::FinishReason(r) => Some(*r),
            _ => None,
        })
    }

    /// Aggregate the tool-call fragments in this completion.
    pub fn tool_calls(&self) -> Result<Vec<ToolCall>, crate::error::LlmError> {
        crate::streaming::aggregate_tool_calls(self.segments.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_mappings() {
        assert_eq!(FinishReason::from_openai("stop"), Some(FinishReason::Stop));
        assert_eq!(FinishReason::from_openai("normal"), None);
        assert_eq!(
            FinishReason::from_anthropic("pause_turn"),
            Some(FinishReason::Stop)
        );
        assert_eq!(
            FinishReason::from_anthropic("refusal"),
            Some(FinishReason::ContentFilter)
        );
        assert_eq!(
            FinishReason::from_gemini("MALFORMED_FUNCTION_CALL"),
            Some(FinishReason::ToolCalls)
        );
        assert_eq!(FinishReason::from_gemini("FINISH_REASON_UNSPECIFIED"), None);
    }

    #[test]
    fn merge_joins_adjacent_items() {
        let merged = merge_segments(vec![
            ChatSegment::think("a"),
            ChatSegment::think("b"),
            ChatSegment::text("Hel"),
            ChatSegment::text("lo"),
            ChatSegment::tool_call(0, Some("call_1".into()), Some("f".into()), Some("{".into())),
            ChatSegment::tool_call(0, None, None, Some("}".into())),
            ChatSegment::tool_call(1, Some("call_2".into()), Some("g".into()), None),
        ]);
        assert_eq!(
            merged,
            vec![
                ChatSegment::think("ab"),
                ChatSegment::text("Hello"),
                ChatSegment::tool_call(
                    0,
                    Some("call_1".into()),
                    Some("f".into()),
                    Some("{}".into())
                ),
                ChatSegment::tool_call(1, Some("call_2".into()), Some("g".into()), None),
            ]
        );
    }

    #[test]
    fn completion_accessors() {
        let completion = ChatCompletion::from_segments(vec![
            ChatSegment::Usage(ChatTokenUsage::input_only(5)),
            ChatSegment::text("Hi"),
            ChatSegment::FinishReason(FinishReason::Stop),
            ChatSegment::Usage(ChatTokenUsage {
                input_tokens: 5,
                output_tokens: 1,
                ..Default::default()
            }),
        ]);
        assert_eq!(completion.text(), "Hi");
        assert_eq!(completion.finish_reason(), Some(FinishReason::Stop));
        assert_eq!(completion.usage().map(|u| u.output_tokens), Some(1));
    }

    #[test]
    fn segment_serializes_with_type_tag() {
        let json = serde_json::to_value(ChatSegment::text("x")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "text", "data": {"content": "x"}})
        );
        let json =
            serde_json::to_value(ChatSegment::FinishReason(FinishReason::ToolCalls)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "finish_reason", "data": "tool_calls"})
        );
    }
}
