//! End-to-end session tests: shelf, cache and turns over the Gemini wire
//! format.

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gemdesk_engine::{CacheStatus, SendOutcome, SessionError, TurnEvent};

use crate::common::{
    STREAM_PATH, final_chunk, generate_bodies, mount_cache, mount_cache_delete,
    mount_count_tokens, mount_stream, mount_upload, session, text_chunk, write_file,
};

const CSV: &[u8] = b"region,total\nnorth,10\nsouth,7\n";

fn drain(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn streamed_text(events: &[TurnEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            TurnEvent::TextDelta(delta) => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn shelf_file_is_cached_and_answer_streams_from_cache() {
    let server = MockServer::start().await;
    mount_upload(&server, "abc", "text/csv").await;
    mount_count_tokens(&server, 1234).await;
    mount_cache(&server, "cachedContents/c1").await;
    mount_stream(&server, &[text_chunk("Hel"), final_chunk("lo")]).await;
    mount_cache_delete(&server, "cachedContents/c1", 1).await;

    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "sales.csv", CSV);
    let mut session = session(&server);

    let added = session.add_file(&file).await.unwrap();
    assert_eq!(added.display_name, "sales.csv");
    assert_eq!(added.token_count, 1234);
    assert_eq!(added.cache, CacheStatus::Active { files: 1 });
    assert_eq!(added.budget.budget().map(|b| b.used), Some(1234));

    let (tx, rx) = mpsc::channel(64);
    let SendOutcome::Completed(turn) = session.send("total by region?", tx).await.unwrap() else {
        panic!("expected a completed turn");
    };
    assert_eq!(turn.text, "Hello");
    assert!(turn.chart.is_none());

    let events = drain(rx);
    assert_eq!(streamed_text(&events), "Hello");
    assert!(matches!(events.last(), Some(TurnEvent::Finished { text }) if text == "Hello"));

    let bodies = generate_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["cachedContent"], "cachedContents/c1");
    assert!(bodies[0].get("tools").is_none());
    let contents = bodies[0]["contents"].as_array().unwrap();
    let last = contents.last().unwrap();
    assert_eq!(last["role"], "user");
    assert_eq!(last["parts"][0]["text"], "total by region?");
    assert!(last["parts"][0].get("fileData").is_none());

    assert_eq!(session.state().history().len(), 2);
    session.shutdown().await;
}

#[tokio::test]
async fn search_grounding_sends_files_inline() {
    let server = MockServer::start().await;
    mount_upload(&server, "abc", "text/csv").await;
    mount_count_tokens(&server, 50).await;
    mount_cache(&server, "cachedContents/c1").await;
    mount_stream(&server, &[final_chunk("Found it")]).await;

    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "sales.csv", CSV);
    let mut session = session(&server);
    session.add_file(&file).await.unwrap();
    assert!(session.toggle_search_grounding());

    let (tx, _rx) = mpsc::channel(64);
    session.send("latest prices?", tx).await.unwrap();

    let bodies = generate_bodies(&server).await;
    let body = &bodies[0];
    assert!(body.get("cachedContent").is_none());
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0]["functionDeclarations"][0]["name"], "generate_chart");
    assert!(tools[1].get("googleSearch").is_some());

    let last = body["contents"].as_array().unwrap().last().unwrap();
    assert_eq!(
        last["parts"][0]["fileData"]["fileUri"],
        "https://example.test/files/abc"
    );
    assert_eq!(last["parts"][1]["text"], "latest prices?");
}

#[tokio::test]
async fn restricted_cache_falls_back_to_inline_files() {
    let server = MockServer::start().await;
    mount_upload(&server, "abc", "text/csv").await;
    mount_count_tokens(&server, 50).await;
    Mock::given(method("POST"))
        .and(path("/v1beta/cachedContents"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;
    mount_stream(&server, &[final_chunk("ok")]).await;

    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "sales.csv", CSV);
    let mut session = session(&server);

    let added = session.add_file(&file).await.unwrap();
    assert!(matches!(added.cache, CacheStatus::Restricted(_)), "{:?}", added.cache);
    assert_eq!(session.shelf().len(), 1);

    let (tx, _rx) = mpsc::channel(64);
    session.send("summarize", tx).await.unwrap();

    let body = &generate_bodies(&server).await[0];
    assert!(body.get("cachedContent").is_none());
    assert_eq!(body["tools"].as_array().unwrap().len(), 1);
    let last = body["contents"].as_array().unwrap().last().unwrap();
    assert!(last["parts"][0].get("fileData").is_some());
}

#[tokio::test]
async fn failed_turn_leaves_history_untouched_and_next_turn_works() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_stream(&server, &[final_chunk("second try")]).await;
    mount_count_tokens(&server, 10).await;

    let mut session = session(&server);

    let (tx, rx) = mpsc::channel(64);
    let err = session.send("hello", tx).await.unwrap_err();
    assert!(matches!(err, SessionError::Turn(_)), "{err:?}");
    assert!(session.state().history().is_empty());
    assert!(!session.state().turn_in_flight());

    let events = drain(rx);
    let Some(TurnEvent::Failed(message)) = events.last() else {
        panic!("expected a failure event, got {events:?}");
    };
    assert!(message.starts_with("❌ Error:"), "{message}");
    assert!(message.contains("API key not valid"), "{message}");

    let (tx, _rx) = mpsc::channel(64);
    let SendOutcome::Completed(turn) = session.send("hello again", tx).await.unwrap() else {
        panic!("expected a completed turn");
    };
    assert_eq!(turn.text, "second try");
    assert_eq!(session.state().history().len(), 2);

    // The failed exchange is absent from the retried request.
    let retried = &generate_bodies(&server).await[1];
    let texts: Vec<_> = retried["contents"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["parts"][0]["text"].as_str())
        .collect();
    assert!(!texts.contains(&"hello"), "{texts:?}");
    assert_eq!(texts.last(), Some(&"hello again"));
}

#[tokio::test]
async fn chart_call_renders_and_exports() {
    let server = MockServer::start().await;
    mount_count_tokens(&server, 10).await;
    mount_stream(
        &server,
        &[
            text_chunk("Here is the breakdown."),
            json!({"candidates": [{
                "content": {"parts": [{"functionCall": {
                    "name": "generate_chart",
                    "args": {"chart_type": "bar", "title": "Sales",
                             "data": {"labels": ["North", "South"], "values": [10, 7]}}
                }}]},
                "finishReason": "STOP"
            }]}),
        ],
    )
    .await;

    let mut session = session(&server);
    let (tx, rx) = mpsc::channel(64);
    let SendOutcome::Completed(turn) = session.send("chart sales by region", tx).await.unwrap()
    else {
        panic!("expected a completed turn");
    };

    let chart = turn.chart.expect("chart rendered");
    assert_eq!(chart.title(), "Sales");
    assert!(chart.svg().contains(">North</text>"));

    let events = drain(rx);
    assert!(events.iter().any(|e| matches!(e, TurnEvent::ChartRendering)));
    assert!(events.iter().any(|e| matches!(e, TurnEvent::ChartReady(c) if c.title() == "Sales")));

    let dir = TempDir::new().unwrap();
    let exported = session.export_chart(dir.path()).unwrap();
    assert_eq!(exported.parent(), Some(dir.path()));
    let written = std::fs::read_to_string(&exported).unwrap();
    assert!(written.starts_with("<svg"));

    assert!(session.discard_chart().is_some());
    assert!(matches!(
        session.export_chart(dir.path()),
        Err(SessionError::NoChart)
    ));
}

#[tokio::test]
async fn removing_last_file_deletes_cache() {
    let server = MockServer::start().await;
    mount_upload(&server, "abc", "text/csv").await;
    mount_count_tokens(&server, 40).await;
    mount_cache(&server, "cachedContents/c1").await;
    mount_cache_delete(&server, "cachedContents/c1", 1).await;

    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "sales.csv", CSV);
    let mut session = session(&server);
    session.add_file(&file).await.unwrap();

    let removed = session.remove_file(0).await.unwrap();
    assert_eq!(removed.display_name, "sales.csv");
    assert_eq!(removed.cache, CacheStatus::Empty);
    assert!(session.shelf().is_empty());

    // Nothing left to release.
    session.shutdown().await;
}
