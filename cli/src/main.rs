//! GemDesk CLI - binary entry point.
//!
//! ```text
//! main() -> config -> GeminiClient -> ChatSession -> REPL loop
//!                                          |
//!                              send() -> worker -> TurnEvents -> printer
//! ```
//!
//! Each chat turn gets its own event channel; the printer task ends when the
//! worker drops its sender, so output is flushed before the next prompt.

mod repl;

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use gemdesk_engine::{ChatSession, Collaborators, GemdeskConfig, SendOutcome, SessionError};
use gemdesk_providers::{ApiConfig, GeminiClient};
use gemdesk_types::ModelNameKind;
use gemdesk_utils::validate_api_key;

use repl::{REPL_HELP, ReplCommand, format_meter, format_shelf, print_events};

const EVENT_CHANNEL_CAPACITY: usize = 256;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Streamed answers go to stdout; without a log file, stay silent.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.gemdesk/logs/gemdesk.log
    if let Some(config_path) = GemdeskConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("gemdesk.log"));
    }

    // Fallback: ./.gemdesk/logs/gemdesk.log
    candidates.push(PathBuf::from(".gemdesk").join("logs").join("gemdesk.log"));

    candidates
}

fn build_session() -> Result<ChatSession> {
    let config = match GemdeskConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Ignoring config: {e}");
            GemdeskConfig::default()
        }
    };

    let api_key = config.api_key().context(
        "GEMINI_API_KEY not found. Set it in the environment or under [api_keys] in ~/.gemdesk/config.toml",
    )?;
    validate_api_key(api_key.as_str())?;

    let model = config.model()?;
    if model.kind() == ModelNameKind::Unverified {
        tracing::warn!(model = %model, "Unrecognized model name; requests may fail");
        println!("⚠️  Unrecognized model {model}; continuing anyway.");
    }
    let settings = config.session_settings()?;
    let client = GeminiClient::new(ApiConfig::new(api_key, model.clone()))?;
    let collaborators = Collaborators::detect()?;

    tracing::info!(model = %model, "Session ready");
    println!("GemDesk ({model}). :help for commands, /help for presets.");
    Ok(ChatSession::new(Arc::new(client), settings, collaborators))
}

fn default_export_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn report(err: &SessionError) {
    // Turn failures were already printed by the event printer.
    if !matches!(err, SessionError::Turn(_)) {
        println!("❌ {err}");
    }
}

/// Run one REPL line. Returns `false` when the user asked to quit.
async fn handle_line(session: &mut ChatSession, line: &str) -> bool {
    match ReplCommand::parse(line) {
        ReplCommand::Empty => {}
        ReplCommand::Quit => return false,
        ReplCommand::Help => println!("{REPL_HELP}"),
        ReplCommand::Invalid(message) => println!("{message}"),
        ReplCommand::Add(path) => {
            println!("Uploading {path}...");
            match session.add_file(Path::new(path)).await {
                Ok(added) => println!(
                    "✅ {} ({} tokens). {} {}",
                    added.display_name,
                    added.token_count,
                    added.cache.message(),
                    format_meter(added.budget)
                ),
                Err(e) => report(&e),
            }
        }
        ReplCommand::Url(url) => {
            println!("Fetching {url}...");
            match session.add_url(url).await {
                Ok(added) => println!(
                    "✅ {} ({} tokens). {}",
                    added.display_name,
                    added.token_count,
                    format_meter(added.budget)
                ),
                Err(e) => report(&e),
            }
        }
        ReplCommand::Remove(index) => match session.remove_file(index).await {
            Ok(removed) => println!(
                "Removed {}. {}",
                removed.display_name,
                format_meter(removed.budget)
            ),
            Err(e) => report(&e),
        },
        ReplCommand::Shelf => println!("{}", format_shelf(session.shelf())),
        ReplCommand::Think(level) => {
            session.set_thinking_level(level);
            println!("Thinking level: {}", level.as_str());
        }
        ReplCommand::Search(setting) => {
            let enabled = match setting {
                Some(enabled) => {
                    session.set_search_grounding(enabled);
                    enabled
                }
                None => session.toggle_search_grounding(),
            };
            println!("Search grounding {}", if enabled { "on" } else { "off" });
        }
        ReplCommand::Context => {
            println!("{}", format_meter(session.budget()));
            println!("{}", session.cache_status().message());
        }
        ReplCommand::Export(target) => {
            let result = match target {
                Some(path) => session
                    .export_chart_to(Path::new(path))
                    .map(|()| PathBuf::from(path)),
                None => session.export_chart(&default_export_dir()),
            };
            match result {
                Ok(path) => println!("Chart saved to {}", path.display()),
                Err(e) => report(&e),
            }
        }
        ReplCommand::Discard => match session.discard_chart() {
            Some(chart) => println!("Discarded chart: {}", chart.title()),
            None => println!("No chart to discard."),
        },
        ReplCommand::Chat(text) => {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let printer = tokio::spawn(print_events(rx));
            let result = session.send(text, tx).await;
            let _ = printer.await;
            match result {
                Ok(SendOutcome::Help(help)) => println!("{help}"),
                Ok(SendOutcome::UnknownCommand(command)) => {
                    println!("Unknown command: {command}. Type /help for options.");
                }
                Ok(SendOutcome::Completed(_)) => {
                    if session.last_chart().is_some() {
                        tracing::debug!("Chart available for export");
                    }
                }
                Err(e) => report(&e),
            }
        }
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let mut session = build_session()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if !handle_line(&mut session, &line).await {
            break;
        }
    }

    session.shutdown().await;
    tracing::info!("Session closed");
    Ok(())
}
