use std::process::{Output, Stdio};
use thiserror::Error;
use tokio::process::Command;

use super::heuristics::{attention_search_pattern, AttentionStrategy};
use super::window_target;

/// Fields every `list-panes` line must carry
const PANE_FIELDS: usize = 6;

const PANE_FORMAT: &str = "#{session_name}:#{window_index}.#{pane_index}\t#{pane_current_command}\t#{pane_current_path}\t#{pane_pid}\t#{window_name}\t#{window_activity}";

/// Errors from tmux commands invoked on the user's behalf
#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("failed to run tmux {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("tmux {command} failed: {stderr}")]
    Failed { command: &'static str, stderr: String },
}

/// One line of `list-panes` output before agent resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPane {
    pub target: String,
    pub command: String,
    pub path: String,
    pub pid: u32,
    pub window_name: String,
    pub window_activity: i64,
    /// Result of the inline content search, when it was requested
    pub attention: Option<bool>,
}

/// Client for interacting with tmux via CLI
#[derive(Debug, Clone)]
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
}

impl TmuxClient {
    pub fn new() -> Self {
        Self::with_path("tmux")
    }

    pub fn with_path(tmux_path: impl Into<String>) -> Self {
        Self {
            tmux_path: tmux_path.into(),
        }
    }

    /// List every pane across all sessions. With the inline strategy tmux
    /// also searches each pane's content for attention phrases.
    pub async fn list_panes(&self, strategy: AttentionStrategy) -> Result<Vec<RawPane>, TmuxError> {
        let mut format = PANE_FORMAT.to_string();
        if strategy == AttentionStrategy::Inline {
            format.push_str(&format!("\t#{{C/r:{}}}", attention_search_pattern()));
        }

        let output = self.run("list-panes", &["list-panes", "-a", "-F", format.as_str()]).await;
        let output = match output {
            Ok(output) => output,
            Err(TmuxError::Failed { stderr, .. })
                if stderr.contains("no server running") || stderr.contains("no sessions") =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_pane_line).collect())
    }

    /// Capture the last `lines` lines of a pane, optionally keeping escape
    /// sequences for display.
    pub async fn capture_pane(
        &self,
        target: &str,
        lines: usize,
        escapes: bool,
    ) -> Result<String, TmuxError> {
        let start = format!("-{}", lines);
        let mut args = vec!["capture-pane", "-t", target, "-p", "-S", start.as_str()];
        if escapes {
            args.push("-e");
        }
        let output = self.run("capture-pane", &args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Switch the current client to the pane's window and select the pane.
    pub async fn switch_to_pane(&self, target: &str) -> Result<(), TmuxError> {
        let window = window_target(target);
        self.run("switch-client", &["switch-client", "-t", window.as_str()])
            .await?;
        self.run("select-pane", &["select-pane", "-t", target]).await?;
        Ok(())
    }

    /// Kill a pane. If it is the only pane in its window, kill the window.
    pub async fn kill_pane(&self, target: &str) -> Result<(), TmuxError> {
        let window = window_target(target);
        let output = self
            .run("list-panes", &["list-panes", "-t", window.as_str()])
            .await?;
        let pane_count = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count();

        if pane_count <= 1 {
            self.run("kill-window", &["kill-window", "-t", window.as_str()])
                .await?;
        } else {
            self.run("kill-pane", &["kill-pane", "-t", target]).await?;
        }
        Ok(())
    }

    async fn run(&self, command: &'static str, args: &[&str]) -> Result<Output, TmuxError> {
        let output = Command::new(&self.tmux_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| TmuxError::Spawn { command, source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TmuxError::Failed { command, stderr });
        }
        Ok(output)
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one tab-delimited `list-panes` line. Short lines are dropped.
pub fn parse_pane_line(line: &str) -> Option<RawPane> {
    let parts: Vec<&str> = line.splitn(PANE_FIELDS + 1, '\t').collect();
    if parts.len() < PANE_FIELDS {
        return None;
    }

    // tmux reports the matching line number, 0 when nothing matched
    let attention = parts
        .get(PANE_FIELDS)
        .map(|hit| hit.trim().parse::<u64>().map(|n| n > 0).unwrap_or(false));

    Some(RawPane {
        target: parts[0].to_string(),
        command: parts[1].to_string(),
        path: parts[2].to_string(),
        pid: parts[3].trim().parse().unwrap_or(0),
        window_name: parts[4].to_string(),
        window_activity: parts[5].trim().parse().unwrap_or(0),
        attention,
    })
}
