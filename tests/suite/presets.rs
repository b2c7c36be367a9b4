//! Slash commands as seen on the wire.

use tokio::sync::mpsc;
use wiremock::MockServer;

use gemdesk_engine::commands::{DEFAULT_PRESET_QUERY, SYSTEM_PROMPT};
use gemdesk_engine::{HELP_TEXT, Preset, SendOutcome, TurnEvent};
use gemdesk_types::ThinkingLevel;

use crate::common::{final_chunk, generate_bodies, mount_count_tokens, mount_stream, session};

#[tokio::test]
async fn report_preset_overrides_prompt_and_depth_for_one_turn() {
    let server = MockServer::start().await;
    mount_count_tokens(&server, 10).await;
    mount_stream(&server, &[final_chunk("## Executive Summary")]).await;

    let mut session = session(&server);
    session.set_thinking_level(ThinkingLevel::Low);

    let (tx, mut rx) = mpsc::channel(64);
    session.send("/REPORT", tx).await.unwrap();
    assert_eq!(rx.recv().await, Some(TurnEvent::PresetApplied(Preset::Report)));

    let (tx, _rx) = mpsc::channel(64);
    session.send("and the risks?", tx).await.unwrap();

    let bodies = generate_bodies(&server).await;
    assert_eq!(bodies.len(), 2);

    let preset_turn = &bodies[0];
    assert_eq!(
        preset_turn["generationConfig"]["thinkingConfig"]["thinkingLevel"],
        "medium"
    );
    assert_eq!(
        preset_turn["contents"][0]["parts"][0]["text"],
        Preset::Report.prompt()
    );
    let last = preset_turn["contents"].as_array().unwrap().last().unwrap();
    assert_eq!(last["parts"][0]["text"], DEFAULT_PRESET_QUERY);

    // The next plain turn is back on the session's own settings.
    let plain_turn = &bodies[1];
    assert_eq!(
        plain_turn["generationConfig"]["thinkingConfig"]["thinkingLevel"],
        "low"
    );
    assert_eq!(plain_turn["contents"][0]["parts"][0]["text"], SYSTEM_PROMPT);
    assert_eq!(plain_turn["contents"][1]["role"], "model");
}

#[tokio::test]
async fn help_and_unknown_commands_stay_local() {
    let server = MockServer::start().await;
    let mut session = session(&server);

    let (tx, _rx) = mpsc::channel(8);
    assert_eq!(
        session.send("/help", tx).await.unwrap(),
        SendOutcome::Help(HELP_TEXT)
    );
    let (tx, _rx) = mpsc::channel(8);
    assert_eq!(
        session.send("/frobnicate now", tx).await.unwrap(),
        SendOutcome::UnknownCommand("/frobnicate".to_string())
    );

    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    assert!(session.state().history().is_empty());
}
