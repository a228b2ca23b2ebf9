//! Image generation streaming fixtures tests

use chatwire::providers::image_generation::ImageEventDecoder;
use chatwire::types::{ChatSegment, ChatTokenUsage, FinishReason};

use crate::support;

#[tokio::test]
async fn previews_precede_the_final_image() {
    let segments = support::ok_segments(
        support::decode_sse(
            support::load_sse_fixture_as_bytes("image/partial_then_completed.sse"),
            ImageEventDecoder::new("openai"),
        )
        .await,
    );

    assert_eq!(
        segments,
        vec![
            ChatSegment::preview_image("UEFSVDA=", "image/png"),
            ChatSegment::preview_image("UEFSVDE=", "image/png"),
            ChatSegment::base64_image("RklOQUw=", "image/png"),
            ChatSegment::Usage(ChatTokenUsage {
                input_tokens: 12,
                output_tokens: 272,
                ..Default::default()
            }),
            ChatSegment::FinishReason(FinishReason::Stop),
        ]
    );
}
