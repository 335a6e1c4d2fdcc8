//! Field-ownership merge for the shared state file.
//!
//! The daemon owns statuses, activity baselines and overrides. The viewer
//! owns the cursor position, sidebar width and stashed flags. Overrides may
//! originate in either process. Each writer re-reads the file right before
//! writing and replaces only the fields it owns, so a daemon write never
//! erases the viewer's cursor and vice versa.

use std::collections::HashSet;

use crate::reconcile::Reconciler;
use crate::state::{CachedPane, LastPosition, State, StateStore};
use crate::tmux::Pane;

/// Build the document the daemon writes at the end of a cycle. Foreign
/// overrides in `fresh` are absorbed into `reconciler` first; viewer-owned
/// fields are carried over from `fresh` untouched.
pub fn daemon_snapshot(fresh: State, reconciler: &mut Reconciler, panes: &mut [Pane]) -> State {
    reconciler.merge_overrides(&fresh);

    let stashed: HashSet<&str> = fresh.stashed_targets().collect();
    for pane in panes.iter_mut() {
        pane.stashed = stashed.contains(pane.target.as_str());
    }

    let mut cached: Vec<CachedPane> = panes.iter().map(CachedPane::from_pane).collect();
    reconciler.apply_to_cache(&mut cached);

    State {
        panes: cached,
        ..fresh
    }
}

/// Build the document the viewer writes. Daemon-owned fields for panes the
/// file already knows are kept; the viewer contributes its own overrides,
/// stashed flags and UI position.
pub fn viewer_snapshot(
    fresh: State,
    reconciler: &Reconciler,
    panes: &[Pane],
    position: LastPosition,
    sidebar_width: Option<u16>,
) -> State {
    let cached = panes
        .iter()
        .map(|pane| {
            let mut mine = CachedPane::from_pane(pane);
            reconciler.apply_to_cache(std::slice::from_mut(&mut mine));
            let Some(theirs) = fresh.pane(&pane.target) else {
                return mine;
            };

            if mine.status_override.is_some() {
                // The override decides the status until new output arrives
                mine.last_status = mine.status_override;
            } else {
                mine.status_override = theirs.status_override;
                mine.override_activity = theirs.override_activity;
                mine.last_status = theirs.last_status.or(mine.last_status);
            }
            mine.window_activity = theirs.window_activity.or(mine.window_activity);
            mine
        })
        .collect();

    State {
        version: fresh.version,
        panes: cached,
        last_position: position,
        sidebar_width,
    }
}

/// Daemon end-of-cycle write. Failures are logged; the in-memory reconciler
/// stays authoritative either way.
pub fn persist_daemon_cycle(store: &StateStore, reconciler: &mut Reconciler, panes: &mut [Pane]) {
    let fresh = store.load().unwrap_or_default();
    let next = daemon_snapshot(fresh, reconciler, panes);
    if let Err(e) = store.save(&next) {
        tracing::warn!(path = %store.path().display(), error = %e, "Failed to persist state");
    }
}
