//! Gemini streamGenerateContent fixtures tests

use chatwire::providers::gemini::GeminiDecoder;
use chatwire::types::{ChatSegment, ChatTokenUsage, FinishReason};

use crate::support;

#[tokio::test]
async fn gemini_thought_call_and_text_fixture() {
    let segments = support::ok_segments(
        support::decode_json_array(
            support::load_fixture_in_chunks("gemini/text_and_function_call.json", 16),
            GeminiDecoder::new("gemini"),
        )
        .await,
    );

    assert_eq!(
        segments,
        vec![
            ChatSegment::think("Let me think"),
            ChatSegment::Usage(ChatTokenUsage {
                input_tokens: 20,
                output_tokens: 4,
                reasoning_tokens: 4,
                ..Default::default()
            }),
            ChatSegment::signature("Q2lnbmF0dXJl"),
            ChatSegment::tool_call(
                0,
                Some("call_0".into()),
                Some("get_weather".into()),
                Some("{\"city\":\"Oslo\"}".into())
            ),
            ChatSegment::text("Calling the tool."),
            ChatSegment::Usage(ChatTokenUsage {
                input_tokens: 20,
                output_tokens: 20,
                reasoning_tokens: 4,
                cache_tokens: 8,
                cache_creation_tokens: 0,
            }),
            ChatSegment::FinishReason(FinishReason::Stop),
        ]
    );
}
