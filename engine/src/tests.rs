//! Session-level tests against the in-memory provider.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gemdesk_context::{PollPolicy, ShelfError};
use gemdesk_providers::fake::{FakeCall, FakeProvider};
use gemdesk_tools::{DefaultThumbnailer, OfficeConverter, WebFetcher};
use gemdesk_types::{ResponseChunk, Role, StreamEvent, ToolCall};
use gemdesk_utils::ValidationError;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;

use super::*;
use crate::commands::{DEFAULT_PRESET_QUERY, SYSTEM_PROMPT};
use crate::conversation::EMPTY_RESPONSE;

fn collaborators() -> Collaborators {
    Collaborators {
        normalizer: Arc::new(DefaultNormalizer::with_parts(
            OfficeConverter::disabled(),
            WebFetcher::new().unwrap(),
        )),
        thumbnailer: Arc::new(DefaultThumbnailer::images_only()),
        renderer: Arc::new(SvgChartRenderer::default()),
    }
}

fn settings() -> SessionSettings {
    SessionSettings {
        min_send_interval: Duration::ZERO,
        poll: PollPolicy {
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        },
        ..SessionSettings::default()
    }
}

fn session_with(provider: &Arc<FakeProvider>, settings: SessionSettings) -> ChatSession {
    ChatSession::new(provider.clone(), settings, collaborators())
}

fn session(provider: &Arc<FakeProvider>) -> ChatSession {
    session_with(provider, settings())
}

fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn events() -> (mpsc::Sender<TurnEvent>, mpsc::Receiver<TurnEvent>) {
    mpsc::channel(64)
}

fn text(delta: &str) -> StreamEvent {
    StreamEvent::Chunk(ResponseChunk::TextDelta(delta.to_string()))
}

#[tokio::test]
async fn empty_file_is_rejected_before_any_remote_call() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "empty.pdf", b"");

    let err = session.add_file(&path).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::FileEmpty)
    ));
    assert!(provider.calls().is_empty());
    assert!(session.shelf().is_empty());
}

#[tokio::test]
async fn dangerous_extension_is_rejected() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "setup.exe", b"MZ");

    let err = session.add_file(&path).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::DangerousExtension(_))
    ));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn private_url_is_rejected_before_any_remote_call() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);

    let err = session.add_url("http://127.0.0.1/admin").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::UrlPrivateHost)
    ));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn added_file_is_uploaded_cached_and_counted() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "sales.csv", b"month,total\njan,3\n");

    let outcome = session.add_file(&path).await.unwrap();
    assert_eq!(outcome.display_name, "sales.csv");
    assert_eq!(outcome.cache, CacheStatus::Active { files: 1 });
    assert!(matches!(outcome.budget, BudgetReading::Estimate(_)));
    assert_eq!(session.shelf().len(), 1);

    let upload = provider.calls().into_iter().find_map(|call| match call {
        FakeCall::Upload {
            display_name,
            mime_type,
            bytes,
        } => Some((display_name, mime_type, bytes)),
        _ => None,
    });
    assert_eq!(
        upload,
        Some(("sales.csv".to_string(), "text/csv".to_string(), 18))
    );
}

#[tokio::test]
async fn full_shelf_rejects_before_upload() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session_with(
        &provider,
        SessionSettings {
            max_files: 1,
            ..settings()
        },
    );
    let dir = TempDir::new().unwrap();
    session
        .add_file(&write_file(&dir, "a.txt", b"a"))
        .await
        .unwrap();
    provider.clear_calls();

    let err = session
        .add_file(&write_file(&dir, "b.txt", b"b"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Shelf(ShelfError::Full { max: 1 })));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn failed_ingestion_leaves_shelf_unchanged() {
    let provider = Arc::new(FakeProvider::new());
    provider.fail_ingestion("unsupported codec");
    let mut session = session(&provider);
    let dir = TempDir::new().unwrap();

    let err = session
        .add_file(&write_file(&dir, "clip.mp4", b"not really a video"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unsupported codec"), "{err}");
    assert!(session.shelf().is_empty());
    assert_eq!(session.cache_status(), &CacheStatus::Empty);
}

#[tokio::test]
async fn count_failure_degrades_to_file_count() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);
    let dir = TempDir::new().unwrap();
    session
        .add_file(&write_file(&dir, "notes.txt", b"hello"))
        .await
        .unwrap();

    provider.fail_count_tokens(500, "boom");
    let reading = session.refresh_budget().await;
    assert_eq!(reading, BudgetReading::Unavailable { files: 1 });
    assert_eq!(session.budget().to_string(), "1 files loaded");
}

#[tokio::test]
async fn removing_a_file_rebuilds_and_reports() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);
    let dir = TempDir::new().unwrap();
    session
        .add_file(&write_file(&dir, "a.txt", b"a"))
        .await
        .unwrap();

    let outcome = session.remove_file(0).await.unwrap();
    assert_eq!(outcome.display_name, "a.txt");
    assert_eq!(outcome.cache, CacheStatus::Empty);
    assert!(
        provider
            .calls()
            .iter()
            .any(|call| matches!(call, FakeCall::DeleteCache(_)))
    );
    assert!(matches!(
        session.remove_file(0).await,
        Err(SessionError::Shelf(ShelfError::IndexOutOfRange { .. }))
    ));
}

#[tokio::test]
async fn overlong_message_is_rejected() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);
    let (tx, _rx) = events();

    let err = session.send(&"x".repeat(60_000), tx).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::MessageTooLong { .. })
    ));
    assert!(provider.generate_requests().is_empty());
}

#[tokio::test]
async fn help_and_unknown_commands_skip_the_model() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);

    let (tx, _rx) = events();
    assert_eq!(
        session.send("/help", tx.clone()).await.unwrap(),
        SendOutcome::Help(HELP_TEXT)
    );
    assert_eq!(
        session.send("/nope please", tx).await.unwrap(),
        SendOutcome::UnknownCommand("/nope".to_string())
    );
    assert!(provider.generate_requests().is_empty());
    assert!(session.state().history().is_empty());
}

#[tokio::test]
async fn preset_turn_uses_fallback_query_and_restores_depth() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);
    session.set_thinking_level(ThinkingLevel::Low);
    let (tx, _rx) = events();

    session.send("/report", tx.clone()).await.unwrap();
    session.send("and now?", tx).await.unwrap();

    let requests = provider.generate_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].thinking_level, ThinkingLevel::Medium);
    assert_eq!(requests[1].thinking_level, ThinkingLevel::Low);
    assert_eq!(session.state().thinking_level(), ThinkingLevel::Low);

    // The second request carries the default preamble again
    let gemdesk_types::Part::Text(instruction) = &requests[1].contents[0].parts[0] else {
        panic!("preamble must be text");
    };
    assert_eq!(instruction, SYSTEM_PROMPT);

    let history = session.state().history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].text, DEFAULT_PRESET_QUERY);
    assert!(
        history
            .iter()
            .all(|turn| !turn.text.contains("executive summarizer"))
    );
}

#[tokio::test]
async fn failed_stream_leaves_history_unchanged() {
    let provider = Arc::new(FakeProvider::new());
    provider.push_stream(vec![
        text("half an ans"),
        StreamEvent::Error("API error 503: overloaded".to_string()),
    ]);
    let mut session = session(&provider);
    let (tx, mut rx) = events();

    let err = session.send("question", tx.clone()).await.unwrap_err();
    assert!(matches!(err, SessionError::Turn(TurnError::Generation(_))));
    assert!(session.state().history().is_empty());
    assert!(!session.state().turn_in_flight());

    let mut failed = None;
    while let Ok(event) = rx.try_recv() {
        if let TurnEvent::Failed(message) = event {
            failed = Some(message);
        }
    }
    assert_eq!(
        failed.as_deref(),
        Some("❌ Error: API error 503: overloaded")
    );

    // The slot is free again
    let outcome = session.send("question", tx).await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Completed(TurnOutcome {
            text: "ok".to_string(),
            chart: None,
        })
    );
    assert_eq!(session.state().history().len(), 2);
}

#[tokio::test]
async fn successful_turn_appends_user_then_model() {
    let provider = Arc::new(FakeProvider::new());
    provider.push_stream(vec![StreamEvent::Done]);
    let mut session = session(&provider);
    let (tx, _rx) = events();

    session.send("  hello  ", tx).await.unwrap();
    let history = session.state().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Model);
    assert_eq!(history[1].text, EMPTY_RESPONSE);
}

#[tokio::test]
async fn rate_limit_blocks_rapid_sends() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session_with(
        &provider,
        SessionSettings {
            min_send_interval: Duration::from_secs(60),
            ..SessionSettings::default()
        },
    );
    let (tx, _rx) = events();

    session.send("one", tx.clone()).await.unwrap();
    let err = session.send("two", tx).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::RateLimited { .. })
    ));
    assert_eq!(provider.generate_requests().len(), 1);
}

#[tokio::test]
async fn rendered_chart_is_kept_for_export() {
    let provider = Arc::new(FakeProvider::new());
    provider.push_stream(vec![
        StreamEvent::Chunk(ResponseChunk::ToolCall(ToolCall::new(
            "c1",
            "generate_chart",
            json!({
                "chart_type": "line",
                "title": "Growth",
                "data": {"x": [1, 2, 3], "y": [2, 4, 8]}
            }),
        ))),
        StreamEvent::Done,
    ]);
    let mut session = session(&provider);
    let (tx, _rx) = events();

    let dir = TempDir::new().unwrap();
    assert!(matches!(
        session.export_chart(dir.path()),
        Err(SessionError::NoChart)
    ));

    session.send("plot growth", tx).await.unwrap();
    assert_eq!(session.last_chart().map(RenderedChart::title), Some("Growth"));
    assert_eq!(
        session.state().history()[1].text,
        "📊 **Chart Generated: Growth**\n\n"
    );

    let path = session.export_chart(dir.path()).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("<svg"));

    assert!(session.discard_chart().is_some());
    assert!(session.last_chart().is_none());
}

#[tokio::test]
async fn search_toggle_changes_request_tools() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);
    let (tx, _rx) = events();

    assert!(session.toggle_search_grounding());
    session.send("latest news?", tx).await.unwrap();
    let request = provider.generate_requests().pop().unwrap();
    assert!(request.tools.contains(&gemdesk_types::ToolSpec::GoogleSearch));
}

#[tokio::test]
async fn shutdown_releases_cache() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = session(&provider);
    let dir = TempDir::new().unwrap();
    session
        .add_file(&write_file(&dir, "a.txt", b"a"))
        .await
        .unwrap();
    provider.clear_calls();

    session.shutdown().await;
    assert!(matches!(
        provider.calls().as_slice(),
        [FakeCall::DeleteCache(name)] if name == "cachedContents/c1"
    ));
}
