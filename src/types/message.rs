//! Neutral message model: a provider-independent conversation.

use serde::{Deserialize, Serialize};

/// Conversation role. System text travels separately in [`NeutralSystemMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeutralRole {
    User,
    Assistant,
    Tool,
}

/// Opaque handle to a file held by the host application's storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// One content part of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NeutralContent {
    Text {
        content: String,
    },
    Error {
        content: String,
    },
    /// Reasoning content. `signature` is provider-opaque and must be replayed unchanged.
    Think {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    FileUrl {
        url: String,
    },
    FileBlob {
        media_type: String,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
    File {
        file: FileRef,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    ToolCallResponse {
        tool_call_id: String,
        response: String,
        is_success: bool,
        duration_ms: u64,
    },
}

impl NeutralContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn think(content: impl Into<String>, signature: Option<String>) -> Self {
        Self::Think {
            content: content.into(),
            signature,
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn tool_response(tool_call_id: impl Into<String>, response: impl Into<String>) -> Self {
        Self::ToolCallResponse {
            tool_call_id: tool_call_id.into(),
            response: response.into(),
            is_success: true,
            duration_ms: 0,
        }
    }

    pub fn is_think(&self) -> bool {
        matches!(self, Self::Think { .. })
    }

    pub fn is_tool_response(&self) -> bool {
        matches!(self, Self::ToolCallResponse { .. })
    }

    /// Data URL for a blob (`data:{media_type};base64,...`).
    pub fn data_url(media_type: &str, bytes: &[u8]) -> String {
        use base64::Engine;
        format!(
            "data:{media_type};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeutralMessage {
    pub role: NeutralRole,
    pub contents: Vec<NeutralContent>,
}

impl NeutralMessage {
    pub fn new(role: NeutralRole, contents: Vec<NeutralContent>) -> Self {
        Self { role, contents }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(NeutralRole::User, vec![NeutralContent::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(NeutralRole::Assistant, vec![NeutralContent::text(text)])
    }

    pub fn tool(tool_call_id: impl Into<String>, response: impl Into<String>) -> Self {
        Self::new(
            NeutralRole::Tool,
            vec![NeutralContent::tool_response(tool_call_id, response)],
        )
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(|c| match c {
                NeutralContent::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_call(&self) -> bool {
        self.contents
            .iter()
            .any(|c| matches!(c, NeutralContent::ToolCall { .. }))
    }
}

/// One block of system text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemBlock {
    pub text: String,
    /// Request provider-side prompt caching for this block
    #[serde(default)]
    pub cache_control: bool,
}

/// System prompt, possibly split into blocks with cache hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeutralSystemMessage {
    pub blocks: Vec<SystemBlock>,
}

impl NeutralSystemMessage {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![SystemBlock {
                text: text.into(),
                cache_control: false,
            }],
        }
    }

    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
