//! Line-oriented front end: `:` commands and event printing.
//!
//! Anything that is not a `:` command goes to the session as chat input,
//! which is where `/` presets are handled.

use std::io::Write;

use tokio::sync::mpsc;

use gemdesk_engine::{BudgetReading, Shelf, TurnEvent};
use gemdesk_types::ThinkingLevel;
use gemdesk_utils::validate_thinking_level;

pub const REPL_HELP: &str = "\
:add <path>        add a local file to the shelf
:url <url>         add a web page or a linked file
:rm <n>            remove shelf entry n
:shelf             list the shelf by category
:think <level>     reasoning depth: minimal, low, medium, high
:search [on|off]   toggle Google Search grounding
:ctx               show the context meter and cache status
:export [path]     save the last chart (default: downloads folder)
:discard           drop the last chart
:q, :quit          exit
/help              chat commands and analysis presets";

/// Parsed REPL input.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Add(&'a str),
    Url(&'a str),
    Remove(usize),
    Shelf,
    Think(ThinkingLevel),
    Search(Option<bool>),
    Context,
    Export(Option<&'a str>),
    Discard,
    Help,
    Quit,
    Chat(&'a str),
    Empty,
    Invalid(String),
}

impl<'a> ReplCommand<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ReplCommand::Empty;
        }
        let Some(command) = trimmed.strip_prefix(':') else {
            return ReplCommand::Chat(raw);
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, arg)| (name, arg.trim()));
        let arg = (!arg.is_empty()).then_some(arg);

        match (name, arg) {
            ("add", Some(path)) => ReplCommand::Add(path),
            ("url", Some(url)) => ReplCommand::Url(url),
            ("rm", Some(raw_index)) => match raw_index.parse::<usize>() {
                Ok(n) if n > 0 => ReplCommand::Remove(n - 1),
                _ => ReplCommand::Invalid(format!("Not a shelf position: {raw_index}")),
            },
            ("shelf" | "ls", None) => ReplCommand::Shelf,
            ("think", Some(level)) => match validate_thinking_level(level) {
                Ok(level) => ReplCommand::Think(level),
                Err(e) => ReplCommand::Invalid(e.to_string()),
            },
            ("search", None) => ReplCommand::Search(None),
            ("search", Some("on")) => ReplCommand::Search(Some(true)),
            ("search", Some("off")) => ReplCommand::Search(Some(false)),
            ("ctx" | "context", None) => ReplCommand::Context,
            ("export", path) => ReplCommand::Export(path),
            ("discard", None) => ReplCommand::Discard,
            ("help" | "h", None) => ReplCommand::Help,
            ("q" | "quit", None) => ReplCommand::Quit,
            ("add" | "url" | "rm" | "think", None) => {
                ReplCommand::Invalid(format!(":{name} needs an argument"))
            }
            _ => ReplCommand::Invalid(format!("Unknown command: :{name}")),
        }
    }
}

/// Shelf grouped by category, with 1-based positions for `:rm`.
#[must_use]
pub fn format_shelf(shelf: &Shelf) -> String {
    if shelf.is_empty() {
        return "Shelf is empty.".to_string();
    }
    let mut out = String::new();
    for group in shelf.grouped() {
        out.push_str(&format!(
            "{} ({})\n",
            group.category.label(),
            group.entries.len()
        ));
        for (index, file) in group.entries {
            out.push_str(&format!(
                "  [{}] {} ({} tokens)\n",
                index + 1,
                file.display_name(),
                file.token_count()
            ));
        }
    }
    out.push_str(&format!("{} / {} files", shelf.len(), shelf.max_files()));
    out
}

#[must_use]
pub fn format_meter(reading: BudgetReading) -> String {
    match reading.budget() {
        Some(budget) => format!("Context: {reading} [{}]", budget.band().as_str()),
        None => format!("Context: {reading}"),
    }
}

fn render_event(event: &TurnEvent) -> Option<String> {
    match event {
        TurnEvent::PresetApplied(preset) => Some(format!("{}\n", preset.label())),
        TurnEvent::TextDelta(delta) => Some(delta.clone()),
        TurnEvent::ChartRendering => Some("\n🎨 Rendering chart...\n".to_string()),
        TurnEvent::ChartReady(chart) => Some(format!(
            "📊 Chart ready: {} (:export to save)\n",
            chart.title()
        )),
        TurnEvent::ChartFailed(err) => Some(format!("❌ Chart generation failed: {err}\n")),
        TurnEvent::Finished { .. } => Some("\n".to_string()),
        TurnEvent::Failed(message) => Some(format!("\n{message}\n")),
    }
}

/// Print turn events until the channel closes.
pub async fn print_events(mut rx: mpsc::Receiver<TurnEvent>) {
    let mut out = std::io::stdout();
    while let Some(event) = rx.recv().await {
        if let Some(text) = render_event(&event) {
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
    }
}
