use std::path::PathBuf;
use std::time::Duration;

use crate::tmux::AttentionStrategy;

/// Agent command names recognized without any extra configuration.
pub const DEFAULT_AGENTS: &[&str] = &["claude", "codex", "gemini", "opencode", "aider"];

pub const LOG_FILE_NAME: &str = "agent-mux.log";

/// State directory from `AGENT_MUX_STATE_DIR`, falling back to
/// `~/.local/state/agent-mux`. Needed before logging is set up, so it is
/// resolved without the rest of the configuration.
pub fn state_dir_from_env() -> PathBuf {
    match std::env::var("AGENT_MUX_STATE_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => default_state_dir(),
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".local")
        .join("state")
        .join("agent-mux")
}

/// Runtime configuration shared by the viewer and the watch daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the state file, lock file and log
    pub state_dir: PathBuf,
    /// Path to the tmux binary
    pub tmux_path: String,
    /// How attention heuristics are gathered during discovery
    pub attention: AttentionStrategy,
    /// Agent command names added on top of [`DEFAULT_AGENTS`]
    pub extra_agents: Vec<String>,
    /// Daemon interval during the first `warmup_cycles` cycles
    pub warmup_interval: Duration,
    /// Number of cycles that use `warmup_interval`
    pub warmup_cycles: u32,
    /// Daemon steady-state interval
    pub watch_interval: Duration,
    /// Viewer refresh interval
    pub viewer_interval: Duration,
    /// Lines of pane content inspected by the attention heuristic
    pub capture_lines: usize,
    /// Lines of pane content shown in the viewer preview
    pub preview_lines: usize,
}

impl Config {
    /// Build the configuration from defaults and `AGENT_MUX_*` environment
    /// variables. Invalid values are logged, so call this after logging is
    /// initialized.
    pub fn from_env() -> Self {
        let mut config = Self {
            state_dir: state_dir_from_env(),
            ..Self::default()
        };

        if let Ok(tmux) = std::env::var("AGENT_MUX_TMUX") {
            if !tmux.trim().is_empty() {
                config.tmux_path = tmux;
            }
        }
        if let Ok(value) = std::env::var("AGENT_MUX_ATTENTION") {
            match value.parse() {
                Ok(strategy) => config.attention = strategy,
                Err(e) => tracing::warn!(value = %value, error = %e, "Ignoring AGENT_MUX_ATTENTION"),
            }
        }
        if let Ok(agents) = std::env::var("AGENT_MUX_AGENTS") {
            config.extra_agents = parse_agent_list(&agents);
        }

        config
    }

    /// All agent command names the registry should know about.
    pub fn agent_names(&self) -> impl Iterator<Item = &str> {
        DEFAULT_AGENTS
            .iter()
            .copied()
            .chain(self.extra_agents.iter().map(String::as_str))
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("watch.lock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join(LOG_FILE_NAME)
    }

    /// Sleep interval for the given zero-based daemon cycle.
    pub fn interval_for_cycle(&self, cycle: u64) -> Duration {
        if cycle < u64::from(self.warmup_cycles) {
            self.warmup_interval
        } else {
            self.watch_interval
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            tmux_path: "tmux".to_string(),
            attention: AttentionStrategy::default(),
            extra_agents: Vec::new(),
            warmup_interval: Duration::from_millis(250),
            warmup_cycles: 4,
            watch_interval: Duration::from_millis(500),
            viewer_interval: Duration::from_secs(2),
            capture_lines: 15,
            preview_lines: 50,
        }
    }
}

fn parse_agent_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent_list_skips_blanks() {
        assert_eq!(
            parse_agent_list(" cursor-agent, ,goose,"),
            vec!["cursor-agent".to_string(), "goose".to_string()]
        );
    }

    #[test]
    fn test_interval_slows_down_after_warmup() {
        let config = Config::default();
        assert_eq!(config.interval_for_cycle(0), config.warmup_interval);
        assert_eq!(config.interval_for_cycle(3), config.warmup_interval);
        assert_eq!(config.interval_for_cycle(4), config.watch_interval);
    }

    #[test]
    fn test_agent_names_include_extras() {
        let config = Config {
            extra_agents: vec!["goose".to_string()],
            ..Config::default()
        };
        let names: Vec<&str> = config.agent_names().collect();
        assert!(names.contains(&"claude"));
        assert!(names.contains(&"goose"));
    }

    #[test]
    fn test_paths_live_in_state_dir() {
        let config = Config {
            state_dir: PathBuf::from("/tmp/am"),
            ..Config::default()
        };
        assert_eq!(config.state_path(), PathBuf::from("/tmp/am/state.json"));
        assert_eq!(config.lock_path(), PathBuf::from("/tmp/am/watch.lock"));
        assert_eq!(config.log_path(), PathBuf::from("/tmp/am/agent-mux.log"));
    }

    #[test]
    fn test_early_log_path_matches_config() {
        let early = state_dir_from_env().join(LOG_FILE_NAME);
        assert_eq!(Config::from_env().log_path(), early);
    }
}
