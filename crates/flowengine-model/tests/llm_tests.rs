//! Integration tests for the streaming aggregator and the sequenced test
//! adapter (testable property #3 from §8, scenario S6).

use flowengine_core::{Content, LlmRequest, LlmResponse, Role};
use flowengine_model::{Aggregator, ModelAdapter, SequencedModel};
use futures::StreamExt;

#[tokio::test]
async fn s6_streaming_text_then_aggregate() {
    let model = SequencedModel::new(
        "demo",
        vec![vec![
            LlmResponse { content: Some(Content::text(Role::Model, "Par")), partial: true, ..Default::default() },
            LlmResponse { content: Some(Content::text(Role::Model, "is")), partial: true, ..Default::default() },
            LlmResponse { content: Some(Content::text(Role::Model, "\n")), partial: true, ..Default::default() },
        ]],
    );

    let mut stream = model.generate_content(LlmRequest::new("demo"), true, None).await.unwrap();
    let mut aggregator = Aggregator::new();
    let mut emitted = Vec::new();

    while let Some(response) = stream.next().await {
        emitted.extend(aggregator.push(response.unwrap()));
    }
    if let Some(agg) = aggregator.close() {
        emitted.push(agg);
    }

    assert_eq!(emitted.len(), 4);
    assert!(emitted[..3].iter().all(|r| r.partial));
    let last = &emitted[3];
    assert!(!last.partial);
    assert_eq!(last.content.as_ref().unwrap().parts[0].text_str(), Some("Paris\n"));
}
