//! Slash-command dispatch and analysis presets.
//!
//! Input that does not start with `/` passes through untouched. Help and
//! unknown commands are terminal: they never reach the model. A preset swaps
//! the preamble and the reasoning depth for exactly one turn.

use gemdesk_context::Preamble;
use gemdesk_types::ThinkingLevel;

pub const SYSTEM_PROMPT: &str = "\
You are an expert analyst assistant with advanced multimodal capabilities.

When analyzing files:
- For text and PDF documents: always reference page numbers when available
- For images, charts and diagrams: describe visual elements, trends and patterns
- For video content: give timestamps in MM:SS format for specific moments or events
- For audio content: give timestamps in MM:SS format for key points
- For spreadsheets and data: reference cell locations or row and column numbers
- For presentations: describe slide layouts, visual elements, charts and diagrams
- Synthesize information across all provided files
- When comparing files, explicitly note connections and discrepancies";

pub const DEFAULT_ACKNOWLEDGEMENT: &str = "Understood. I will provide expert analysis with \
specific references to page numbers, timestamps (in MM:SS format with seconds), and data \
locations as appropriate.";

pub const PRESET_ACKNOWLEDGEMENT: &str =
    "Understood. I will analyze according to the specified mode.";

/// Query used when a preset command has no text after it.
pub const DEFAULT_PRESET_QUERY: &str =
    "Analyze the uploaded files according to the specified mode.";

pub const DEFAULT_PREAMBLE: Preamble<'static> = Preamble {
    instruction: SYSTEM_PROMPT,
    acknowledgement: DEFAULT_ACKNOWLEDGEMENT,
};

const HELP_ALIASES: &[&str] = &["/help", "/commands"];

pub const HELP_TEXT: &str = "\
**Available Commands:**

**`/report`** - Generate executive summary and cohesive report
**`/synthesize`** - Identify patterns and generate novel insights
**`/error-check`** - Find contradictions and inconsistencies

Example: `/report` or `/synthesize focus on financial data`

**Charting:**
Just ask! Say \"plot sales over time\" or \"chart customer acquisition vs revenue\".
Charts are generated automatically when you ask for a visualization.

Other features:
- **Thinking level** - Adjust reasoning depth (minimal/low/medium/high)";

const REPORT_PROMPT: &str = "\
You are a concise executive summarizer analyzing multiple data sources.

Your task:
- Write one cohesive summary that integrates ALL uploaded files
- Highlight key points, main themes and important takeaways
- Organize with clear section headers and cite sources with page numbers or timestamps

Output format:
## Executive Summary
## Key Findings
## Detailed Analysis
## Recommendations (if applicable)

Synthesize; do not just list what each file contains.";

const SYNTHESIZE_PROMPT: &str = "\
You are a research synthesizer identifying novel insights and patterns.

Your task:
- Find connections, patterns and emerging themes across ALL uploaded files
- Identify gaps in the data and generate theories that emerge from combining sources
- Explain your reasoning and support every claim with evidence from the files

Output format:
## Synthesis Overview
## Novel Insights
## Supporting Evidence
## Implications
## Gaps & Future Directions";

const ERROR_CHECK_PROMPT: &str = "\
You are a meticulous fact-checker identifying contradictions and inconsistencies.

Your task:
- Cross-reference ALL uploaded files systematically
- Flag discrepancies in numbers, dates, facts or claims and where sources disagree
- Distinguish clear contradictions from differing perspectives

For each issue give its type, severity (Critical / Moderate / Minor), the
conflicting sources with page numbers or timestamps, details, and an assessment.

Output format:
## Summary
## Critical Issues
## Moderate Issues
## Minor Issues
## Verified Consistencies (Optional)

If the files are consistent, say so clearly.";

/// Analysis mode selected by a slash command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Report,
    Synthesize,
    ErrorCheck,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Report, Preset::Synthesize, Preset::ErrorCheck];

    #[must_use]
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Preset::Report => &["/report", "/summarize", "/digest"],
            Preset::Synthesize => &["/synthesize", "/theory", "/insights"],
            Preset::ErrorCheck => &["/error-check", "/contradictions", "/verify"],
        }
    }

    /// Case-insensitive lookup of a command token such as `/Report`.
    #[must_use]
    pub fn from_command(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL.into_iter().find(|preset| {
            preset
                .aliases()
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(token))
        })
    }

    #[must_use]
    pub fn thinking_level(self) -> ThinkingLevel {
        match self {
            Preset::Report => ThinkingLevel::Medium,
            Preset::Synthesize | Preset::ErrorCheck => ThinkingLevel::High,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Preset::Report => "📋 REPORT MODE",
            Preset::Synthesize => "🔬 SYNTHESIS MODE",
            Preset::ErrorCheck => "🔍 ERROR-CHECK MODE",
        }
    }

    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Preset::Report => REPORT_PROMPT,
            Preset::Synthesize => SYNTHESIZE_PROMPT,
            Preset::ErrorCheck => ERROR_CHECK_PROMPT,
        }
    }

    #[must_use]
    pub fn preamble(self) -> Preamble<'static> {
        Preamble {
            instruction: self.prompt(),
            acknowledgement: PRESET_ACKNOWLEDGEMENT,
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Preamble for a turn with or without a preset.
#[must_use]
pub fn preamble_for(preset: Option<Preset>) -> Preamble<'static> {
    preset.map_or(DEFAULT_PREAMBLE, Preset::preamble)
}

/// Outcome of inspecting one line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Plain chat text.
    Passthrough(String),
    ShowHelp,
    PresetActive { preset: Preset, query: String },
    UnknownCommand(String),
}

impl DispatchResult {
    /// Whether the input ends here without a model call.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchResult::ShowHelp | DispatchResult::UnknownCommand(_))
    }
}

#[must_use]
pub fn dispatch(raw: &str) -> DispatchResult {
    if !raw.starts_with('/') {
        return DispatchResult::Passthrough(raw.to_string());
    }

    let (token, rest) = raw
        .split_once(char::is_whitespace)
        .map_or((raw, ""), |(token, rest)| (token, rest.trim()));

    if HELP_ALIASES.iter().any(|alias| alias.eq_ignore_ascii_case(token)) {
        return DispatchResult::ShowHelp;
    }

    match Preset::from_command(token) {
        Some(preset) => {
            let query = if rest.is_empty() {
                DEFAULT_PRESET_QUERY.to_string()
            } else {
                rest.to_string()
            };
            tracing::debug!(preset = preset.label(), "Preset command");
            DispatchResult::PresetActive { preset, query }
        }
        None => DispatchResult::UnknownCommand(token.to_string()),
    }
}
