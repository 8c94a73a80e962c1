//! Built-in system prompts.
//!
//! Prompts are embedded at compile time from the `prompts/` directory so
//! they're always available and versioned with the codebase.

/// General credibility review with patent checks
pub const BASIC: &str = include_str!("../prompts/basic.md");

/// Structured report with an explicit search strategy
pub const STRICT: &str = include_str!("../prompts/strict.md");

/// All preset names and their content
pub const PRESETS: &[(&str, &str)] = &[("basic", BASIC), ("strict", STRICT)];

/// Look up a preset by name
pub fn preset(name: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
        .map(|(_, content)| *content)
}

/// Build the first user turn from a system prompt and the ad script
pub fn compose_prompt(system_prompt: &str, payload: &str) -> String {
    format!("{}\n\n[Ad script]:\n{}", system_prompt, payload)
}
