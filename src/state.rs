use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::tmux::Pane;

/// Schema version of the state file. Documents with any other version are
/// ignored as a whole.
pub const STATE_VERSION: u32 = 4;

/// A pane as remembered in the state file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CachedPane {
    pub target: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub window_name: String,
    pub path: String,
    pub short_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_branch: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub git_dirty: bool,
    pub stashed: bool,
    /// Status code of a user override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_override: Option<u8>,
    /// Window activity recorded when the override was set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_activity: Option<i64>,
    /// Activity baseline at the end of the writer's last cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_activity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

impl CachedPane {
    /// Cache the display metadata of a live pane. Status fields are filled in
    /// by the reconciler.
    pub fn from_pane(pane: &Pane) -> Self {
        Self {
            target: pane.target.clone(),
            window_name: pane.window_name.clone(),
            path: pane.path.clone(),
            short_path: pane.short_path.clone(),
            git_branch: pane.git_branch.clone(),
            git_dirty: pane.git_dirty,
            stashed: pane.stashed,
            last_active: pane.last_active,
            ..Self::default()
        }
    }

    /// Rebuild a display-only pane from the cache, used before the first
    /// live discovery completes.
    pub fn to_pane(&self) -> Pane {
        Pane {
            target: self.target.clone(),
            window_name: self.window_name.clone(),
            path: self.path.clone(),
            short_path: self.short_path.clone(),
            git_branch: self.git_branch.clone(),
            git_dirty: self.git_dirty,
            window_activity: self.window_activity.unwrap_or(0),
            last_active: self.last_active,
            stashed: self.stashed,
            ..Pane::default()
        }
    }
}

/// Viewer cursor position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LastPosition {
    pub pane_target: String,
    pub cursor: usize,
    pub scroll_start: usize,
}

/// The shared state document written by both the viewer and the daemon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct State {
    pub version: u32,
    pub panes: Vec<CachedPane>,
    pub last_position: LastPosition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidebar_width: Option<u16>,
}

impl State {
    pub fn pane(&self, target: &str) -> Option<&CachedPane> {
        self.panes.iter().find(|p| p.target == target)
    }

    /// Targets the viewer has stashed.
    pub fn stashed_targets(&self) -> impl Iterator<Item = &str> {
        self.panes
            .iter()
            .filter(|p| p.stashed)
            .map(|p| p.target.as_str())
    }
}

/// Reads and writes the state file. There is no lock around the
/// read-modify-write cycle; writers keep to the fields they own.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state document. A missing file, malformed JSON or a version
    /// mismatch all mean "no prior state".
    pub fn load(&self) -> Option<State> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "No state file");
                return None;
            }
        };

        let state: State = match serde_json::from_str(&data) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring malformed state file");
                return None;
            }
        };

        if state.version != STATE_VERSION {
            tracing::info!(
                found = state.version,
                expected = STATE_VERSION,
                "Ignoring state file from another schema version"
            );
            return None;
        }
        Some(state)
    }

    /// Write the whole document, stamped with the current version. The file
    /// is replaced atomically so readers never observe a partial write.
    pub fn save(&self, state: &State) -> Result<()> {
        let mut state = state.clone();
        state.version = STATE_VERSION;
        let json = serde_json::to_string_pretty(&state).context("Failed to serialize state")?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let tmp = self.path.with_extension(format!("json.{}.tmp", std::process::id()));
        {
            let mut file = std::fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
        }
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
