mod client;
mod heuristics;

#[cfg(test)]
pub use client::parse_pane_line;
pub use client::{RawPane, TmuxClient};
pub use heuristics::{needs_attention, AttentionStrategy};

use chrono::{DateTime, Utc};

/// Derived attention status of an agent pane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PaneStatus {
    /// Agent is waiting at its prompt, nothing new to look at
    #[default]
    Idle,
    /// Agent produced output since the last cycle
    Busy,
    /// Agent appears to be asking the user something
    NeedsAttention,
    /// Agent finished and the user has not looked yet
    Unread,
}

impl PaneStatus {
    /// Integer code used in the persisted state file.
    pub fn code(self) -> u8 {
        match self {
            PaneStatus::Idle => 0,
            PaneStatus::Busy => 1,
            PaneStatus::NeedsAttention => 2,
            PaneStatus::Unread => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PaneStatus::Idle),
            1 => Some(PaneStatus::Busy),
            2 => Some(PaneStatus::NeedsAttention),
            3 => Some(PaneStatus::Unread),
            _ => None,
        }
    }

    /// Whether the pane should pull the user's eye in the viewer.
    pub fn wants_attention(self) -> bool {
        matches!(self, PaneStatus::NeedsAttention | PaneStatus::Unread)
    }
}

/// A tmux pane running a recognized agent
#[derive(Debug, Clone, Default)]
pub struct Pane {
    /// Address in `session:window.pane` form (e.g. "main:2.1")
    pub target: String,
    pub window_name: String,
    /// Working directory of the pane
    pub path: String,
    pub short_path: String,
    pub git_branch: String,
    pub git_dirty: bool,
    /// PID of the process started in the pane
    pub pid: u32,
    /// Registered agent name the pane resolved to
    pub agent: String,
    pub status: PaneStatus,
    /// tmux `window_activity`, bumped whenever the window prints output
    pub window_activity: i64,
    pub heuristic_attention: bool,
    pub last_active: Option<DateTime<Utc>>,
    /// Hidden from the default view but still tracked
    pub stashed: bool,
}

/// Split a target like "foo:2.1" into ("foo", "2", "1").
fn parse_target(target: &str) -> (&str, &str, &str) {
    let Some((session, rest)) = target.rsplit_once(':') else {
        return (target, "", "");
    };
    match rest.rsplit_once('.') {
        Some((window, pane)) => (session, window, pane),
        None => (session, rest, ""),
    }
}

/// The `session:window` part of a target.
pub fn window_target(target: &str) -> String {
    let (session, window, _) = parse_target(target);
    format!("{}:{}", session, window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("main:2.1"), ("main", "2", "1"));
        assert_eq!(parse_target("my:session:0.3"), ("my:session", "0", "3"));
        assert_eq!(parse_target("main:2"), ("main", "2", ""));
        assert_eq!(parse_target("main"), ("main", "", ""));
    }

    #[test]
    fn test_window_target() {
        assert_eq!(window_target("dev:1.0"), "dev:1");
    }

    #[test]
    fn test_status_codes_are_stable() {
        for status in [
            PaneStatus::Idle,
            PaneStatus::Busy,
            PaneStatus::NeedsAttention,
            PaneStatus::Unread,
        ] {
            assert_eq!(PaneStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(PaneStatus::NeedsAttention.code(), 2);
        assert_eq!(PaneStatus::from_code(9), None);
    }
}
