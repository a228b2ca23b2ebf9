//! OpenAI Responses streaming fixtures tests

use chatwire::providers::openai_responses::ResponsesDecoder;
use chatwire::types::{ChatSegment, ChatTokenUsage, FinishReason};

use crate::support;

#[tokio::test]
async fn responses_reasoning_then_function_call_fixture() {
    let segments = support::ok_segments(
        support::decode_sse(
            support::load_sse_fixture_as_bytes("openai_responses/reasoning_function_call.sse"),
            ResponsesDecoder::new("openai"),
        )
        .await,
    );

    assert_eq!(
        segments,
        vec![
            ChatSegment::think("Need the weather."),
            ChatSegment::think("\n\n"),
            ChatSegment::signature("gAAAAenc"),
            ChatSegment::tool_call(
                0,
                Some("call_w".into()),
                Some("get_weather".into()),
                Some(String::new())
            ),
            ChatSegment::tool_call(0, None, None, Some("{\"city\":".into())),
            ChatSegment::tool_call(0, None, None, Some("\"Oslo\"}".into())),
            ChatSegment::Usage(ChatTokenUsage {
                input_tokens: 50,
                output_tokens: 30,
                reasoning_tokens: 12,
                ..Default::default()
            }),
            ChatSegment::FinishReason(FinishReason::ToolCalls),
        ]
    );
}
