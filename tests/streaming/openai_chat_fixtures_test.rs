//! OpenAI chat-completions streaming fixtures tests

use chatwire::error::LlmError;
use chatwire::providers::openai_compatible::{OpenAiChunkDecoder, ProviderStrategy};
use chatwire::streaming::aggregate_tool_calls;
use chatwire::types::{ChatSegment, ChatTokenUsage, FinishReason, ModelProvider, ToolCall};

use crate::support;

fn decoder(provider: ModelProvider) -> OpenAiChunkDecoder {
    OpenAiChunkDecoder::new(ProviderStrategy::for_provider(provider).expect("strategy"))
}

#[tokio::test]
async fn reasoning_text_usage_in_emission_order() {
    let items = support::decode_sse(
        support::load_sse_fixture_as_bytes("openai/reasoning_text_usage.sse"),
        decoder(ModelProvider::DeepSeek),
    )
    .await;

    assert_eq!(
        support::ok_segments(items),
        vec![
            ChatSegment::think("Two plus "),
            ChatSegment::think("two."),
            ChatSegment::text("Hello"),
            ChatSegment::text(" world"),
            ChatSegment::FinishReason(FinishReason::Stop),
            ChatSegment::Usage(ChatTokenUsage {
                input_tokens: 9,
                output_tokens: 12,
                reasoning_tokens: 4,
                ..Default::default()
            }),
        ]
    );
}

#[tokio::test]
async fn chunk_boundaries_do_not_change_the_result() {
    let by_event = support::decode_sse(
        support::load_sse_fixture_as_bytes("openai/reasoning_text_usage.sse"),
        decoder(ModelProvider::DeepSeek),
    )
    .await;
    for size in [1, 7, 64] {
        let by_bytes = support::decode_sse(
            support::load_fixture_in_chunks("openai/reasoning_text_usage.sse", size),
            decoder(ModelProvider::DeepSeek),
        )
        .await;
        assert_eq!(by_bytes, by_event, "chunk size {size}");
    }
}

#[tokio::test]
async fn two_tool_calls_aggregate_by_index() {
    let segments = support::ok_segments(
        support::decode_sse(
            support::load_sse_fixture_as_bytes("openai/two_tool_calls.sse"),
            decoder(ModelProvider::OpenAI),
        )
        .await,
    );
    assert!(segments.contains(&ChatSegment::FinishReason(FinishReason::ToolCalls)));

    let calls = aggregate_tool_calls(segments).expect("complete calls");
    assert_eq!(
        calls,
        vec![
            ToolCall {
                id: "call_a".into(),
                name: "get_weather".into(),
                arguments: "{\"city\":\"Oslo\"}".into(),
            },
            ToolCall {
                id: "call_b".into(),
                name: "get_time".into(),
                arguments: "{\"tz\":\"CET\"}".into(),
            },
        ]
    );
}

#[tokio::test]
async fn malformed_frame_is_skipped() {
    let items = support::decode_sse(
        support::load_sse_fixture_as_bytes("openai/malformed_frame.sse"),
        decoder(ModelProvider::OpenAI),
    )
    .await;
    assert_eq!(
        support::ok_segments(items),
        vec![
            ChatSegment::text("Hel"),
            ChatSegment::text("lo"),
            ChatSegment::FinishReason(FinishReason::Stop),
        ]
    );
}

#[tokio::test]
async fn nameless_tool_call_is_incomplete() {
    let segments = support::ok_segments(
        support::decode_sse(
            support::load_sse_fixture_as_bytes("openai/nameless_tool_call.sse"),
            decoder(ModelProvider::OpenAI),
        )
        .await,
    );
    assert_eq!(
        aggregate_tool_calls(segments),
        Err(LlmError::IncompleteToolCall { index: 0 })
    );
}

#[tokio::test]
async fn in_band_error_ends_the_stream() {
    let items = support::decode_sse(
        support::load_sse_fixture_as_bytes("openai/in_band_error.sse"),
        decoder(ModelProvider::OpenAI),
    )
    .await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok(ChatSegment::text("partial")));
    assert!(matches!(
        &items[1],
        Err(LlmError::UpstreamStream { payload, .. }) if payload.contains("upstream overloaded")
    ));
}
