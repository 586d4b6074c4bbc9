//! Console rendering of turn records

use std::io::IsTerminal;

use colored::{ColoredString, Colorize};

use crate::ids::USER_SPEAKER;
use crate::orchestrator::TurnRecord;

/// Display name used when a speaker has no usable name
pub const FALLBACK_SPEAKER: &str = "assistant";

/// True when stdout can render ANSI colors and `NO_COLOR` is unset
pub fn supports_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

/// Strip a `<namespace>-` prefix from a speaker id
pub fn normalize_name<'a>(name: Option<&'a str>, namespace: Option<&str>) -> &'a str {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return FALLBACK_SPEAKER;
    };

    namespace
        .and_then(|ns| name.strip_prefix(ns))
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name)
}

/// Indent every line by two spaces; blank lines become just the indent
pub fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn paint(label: &str, speaker: &str) -> ColoredString {
    match speaker {
        USER_SPEAKER => label.bright_magenta(),
        "planner" => label.bright_blue(),
        "researcher" => label.bright_green(),
        "editor" => label.bright_yellow(),
        _ => label.bright_cyan(),
    }
}

/// Label plus indented content, colored per speaker when `color` is set
pub fn format_entry(label: &str, content: &str, speaker: &str, color: bool) -> String {
    if color {
        format!("{}\n{}", paint(label, speaker), indent(content))
    } else {
        format!("{label}\n{}", indent(content))
    }
}

/// Render one streamed record as `turn N: <speaker>` followed by its content.
///
/// `turn` is the caller's 1-based count of agent turns.
pub fn format_record(record: &TurnRecord, turn: usize, namespace: Option<&str>, color: bool) -> String {
    let speaker = normalize_name(Some(&record.speaker_id), namespace);
    let label = if record.speaker_id == USER_SPEAKER {
        USER_SPEAKER.to_string()
    } else {
        format!("turn {turn}: {speaker}")
    };
    format_entry(&label, &record.content, speaker, color)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(speaker: &str, content: &str) -> TurnRecord {
        TurnRecord {
            speaker_id: speaker.into(),
            content: content.into(),
            sequence_number: 1,
            is_final: false,
        }
    }

    #[test]
    fn test_indent_keeps_blank_lines() {
        assert_eq!(indent("one\n\ntwo"), "  one\n  \n  two");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name(Some("demo-planner"), Some("demo")), "planner");
        assert_eq!(normalize_name(Some("planner"), Some("demo")), "planner");
        assert_eq!(normalize_name(Some(""), None), FALLBACK_SPEAKER);
        assert_eq!(normalize_name(None, None), FALLBACK_SPEAKER);
    }

    #[test]
    fn test_plain_record_label() {
        let out = format_record(&record("demo-editor", "Ship it.\nNext: QA"), 3, Some("demo"), false);
        assert_eq!(out, "turn 3: editor\n  Ship it.\n  Next: QA");
    }

    #[test]
    fn test_no_color_disables_color() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("NO_COLOR", "1");
            assert!(!supports_color());
            Ok(())
        });
    }

    #[test]
    fn test_colored_label() {
        colored::control::set_override(true);
        let out = format_entry("user", "hello", USER_SPEAKER, true);
        colored::control::unset_override();
        assert!(out.contains("\u{1b}["));
        assert!(out.ends_with("\n  hello"));
    }
}
