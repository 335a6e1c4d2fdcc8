use crossterm::event::KeyEvent;

use crate::tmux::Pane;

/// Actions that can be dispatched through the viewer
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// A discovery pass finished
    PanesUpdated(Vec<Pane>),
    /// Captured content for the preview pane
    PreviewLoaded { target: String, content: String },
    /// An error occurred
    Error(String),
    /// Informational message for the footer
    Status(String),
    /// Switch the tmux client to a pane, then quit
    SwitchToPane(String),
    /// Kill a pane (or its window when it is the only pane)
    KillPane(String),
    /// Capture a pane for the preview
    LoadPreview(String),
    /// Restart the background watch daemon
    RestartDaemon,
}
