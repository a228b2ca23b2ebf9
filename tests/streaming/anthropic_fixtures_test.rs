//! Anthropic streaming fixtures tests

use chatwire::error::LlmError;
use chatwire::providers::anthropic::AnthropicStreamState;
use chatwire::streaming::aggregate_tool_calls;
use chatwire::types::{ChatSegment, ChatTokenUsage, FinishReason, ToolCall};

use crate::support;

#[tokio::test]
async fn anthropic_thinking_text_and_tool_use_fixture() {
    let segments = support::ok_segments(
        support::decode_sse(
            support::load_sse_fixture_as_bytes("anthropic/thinking_tool_use.sse"),
            AnthropicStreamState::new("anthropic"),
        )
        .await,
    );

    let start_usage = ChatTokenUsage {
        input_tokens: 120,
        output_tokens: 1,
        cache_tokens: 100,
        ..Default::default()
    };
    assert_eq!(
        segments,
        vec![
            ChatSegment::Usage(start_usage),
            ChatSegment::think("The user wants weather."),
            ChatSegment::signature("EqQBCkYIBxgCKkCsig"),
            ChatSegment::text("Checking."),
            ChatSegment::tool_call(
                0,
                Some("toolu_01".into()),
                Some("get_weather".into()),
                Some(String::new())
            ),
            ChatSegment::tool_call(0, None, None, Some("{\"city\": ".into())),
            ChatSegment::tool_call(0, None, None, Some("\"Oslo\"}".into())),
            ChatSegment::FinishReason(FinishReason::ToolCalls),
            ChatSegment::Usage(ChatTokenUsage {
                output_tokens: 58,
                ..start_usage
            }),
        ]
    );

    assert_eq!(
        aggregate_tool_calls(segments).expect("calls"),
        vec![ToolCall {
            id: "toolu_01".into(),
            name: "get_weather".into(),
            arguments: "{\"city\": \"Oslo\"}".into(),
        }]
    );
}

#[tokio::test]
async fn anthropic_error_event_fixture() {
    let items = support::decode_sse(
        support::load_fixture_in_chunks("anthropic/overloaded_error.sse", 13),
        AnthropicStreamState::new("anthropic"),
    )
    .await;
    assert_eq!(items.len(), 2);
    assert!(matches!(items[0], Ok(ChatSegment::Usage(_))));
    assert!(matches!(
        &items[1],
        Err(LlmError::UpstreamStream { provider, payload })
            if provider == "anthropic" && payload.contains("overloaded_error")
    ));
}
