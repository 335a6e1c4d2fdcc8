use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

/// Phrases agents print when they are waiting on the user
const ATTENTION_PHRASES: &[&str] = &[
    // Tool permission prompts
    "Do you want to proceed?",
    "Do you want to allow",
    "Allow once",
    "press Enter to approve",
    // Question / selection prompts
    "Enter to select",
    "Type something",
    "Esc to cancel",
    // Waiting for a response
    "I'll wait for your",
    "waiting for your response",
    "Let me know when",
    "Please let me know",
    "What would you like",
    "How would you like",
    "Should I proceed",
    "Would you like me to",
    "please provide",
    "please specify",
    "I need more information",
    "Could you clarify",
    "awaiting your",
    "ready when you are",
    "let me know if you'd like",
    "Feel free to ask",
    "Is there anything else",
    "What else can I help",
    "Want me to",
    "Shall I",
    "Do you want me to",
    "Ready to proceed",
];

static RE_ATTENTION: Lazy<Regex> = Lazy::new(|| {
    let alternation = ATTENTION_PHRASES
        .iter()
        .map(|phrase| regex::escape(phrase))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).expect("attention phrases form a valid regex")
});

/// How attention heuristics are gathered each discovery cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttentionStrategy {
    /// tmux searches pane content itself as part of `list-panes`
    #[default]
    Inline,
    /// One `capture-pane` per agent pane, run sequentially
    Capture,
}

impl FromStr for AttentionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(AttentionStrategy::Inline),
            "capture" => Ok(AttentionStrategy::Capture),
            other => Err(format!("unknown attention strategy '{}'", other)),
        }
    }
}

/// Decide whether captured pane content looks like the agent is waiting on
/// the user. Only the last `max_lines` lines are considered.
pub fn needs_attention(content: &str, max_lines: usize) -> bool {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    let recent = &lines[start..];

    if recent.iter().any(|line| RE_ATTENTION.is_match(line)) {
        return true;
    }

    // Most recent non-empty line ending in a question mark catches ad-hoc
    // questions that no phrase covers.
    recent
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.ends_with('?'))
}

/// The attention phrases as a POSIX extended regex for tmux's `#{C/r:...}`
/// content search. Metacharacters are wrapped in bracket expressions since
/// tmux formats do not pass backslashes through reliably.
pub fn attention_search_pattern() -> String {
    ATTENTION_PHRASES
        .iter()
        .map(|phrase| {
            phrase
                .chars()
                .map(|c| match c {
                    '?' | '.' | '*' | '+' | '(' | ')' | '|' | '^' | '$' | '[' | ']' => {
                        format!("[{}]", c)
                    }
                    '{' | '}' | '#' | ',' => ".".to_string(),
                    _ => c.to_string(),
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_permission_prompt() {
        let content = "Bash(rm -rf target)\n\nDo you want to proceed?\n❯ 1. Yes\n  2. No\n";
        assert!(needs_attention(content, 15));
    }

    #[test]
    fn test_detect_trailing_question_past_blank_lines() {
        let content = "Refactored the parser.\nShould the old API stay around?\n\n\n   \n";
        assert!(needs_attention(content, 15));
    }

    #[test]
    fn test_question_not_last_line_is_ignored() {
        let content = "Why does this fail?\nFixed it by bumping the timeout.\n";
        assert!(!needs_attention(content, 15));
    }

    #[test]
    fn test_phrase_outside_window_is_ignored() {
        let mut content = String::from("Would you like me to continue\n");
        for i in 0..20 {
            content.push_str(&format!("compiling crate {}\n", i));
        }
        assert!(!needs_attention(&content, 15));
        assert!(needs_attention(&content, 25));
    }

    #[test]
    fn test_busy_output_needs_nothing() {
        let content = "Reading src/main.rs\nEditing src/lib.rs\n";
        assert!(!needs_attention(content, 15));
        assert!(!needs_attention("", 15));
    }

    #[test]
    fn test_search_pattern_has_no_backslashes() {
        let pattern = attention_search_pattern();
        assert!(!pattern.contains('\\'));
        assert!(!pattern.contains('}'));
        assert!(pattern.contains("Do you want to proceed[?]"));
        assert!(pattern.contains("I'll wait for your"));
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Capture".parse::<AttentionStrategy>(), Ok(AttentionStrategy::Capture));
        assert_eq!("inline".parse::<AttentionStrategy>(), Ok(AttentionStrategy::Inline));
        assert!("server".parse::<AttentionStrategy>().is_err());
    }
}
