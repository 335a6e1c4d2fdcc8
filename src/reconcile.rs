//! Status state machine shared by the viewer and the watch daemon.
//!
//! ```text
//! Idle  -> Busy            window activity increased
//! Busy  -> Unread          activity stopped, no attention phrase
//! *     -> NeedsAttention  attention heuristic matched (when not busy)
//! NeedsAttention, Unread   sticky until activity, a match or the user
//! ```
//!
//! A user override pins a status until the window produces new output.

use std::collections::{HashMap, HashSet};

use crate::state::{CachedPane, State};
use crate::tmux::{Pane, PaneStatus};

/// A status set by the user, valid until the window's activity moves past
/// the value captured when it was set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusOverride {
    pub status: PaneStatus,
    pub window_activity: i64,
}

/// Per-target memory of the previous cycle. Process-local; seeded from and
/// merged with the state file.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    prev_activity: HashMap<String, i64>,
    prev_status: HashMap<String, PaneStatus>,
    overrides: HashMap<String, StatusOverride>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore baselines, statuses and overrides from a persisted document.
    pub fn seed_from_state(&mut self, state: &State) {
        for cached in &state.panes {
            if let Some(activity) = cached.window_activity {
                self.prev_activity.insert(cached.target.clone(), activity);
            }
            if let Some(status) = cached.last_status.and_then(PaneStatus::from_code) {
                self.prev_status.insert(cached.target.clone(), status);
            }
            if let Some(ov) = cached_override(cached) {
                self.overrides.insert(cached.target.clone(), ov);
            }
        }
    }

    /// Record activity baselines for fresh panes without running the state
    /// machine, carrying known statuses onto them. Used on the viewer's first
    /// live load so the next `reconcile` compares against real baselines.
    pub fn seed(&mut self, panes: &mut [Pane]) {
        for pane in panes.iter_mut() {
            self.prev_activity
                .insert(pane.target.clone(), pane.window_activity);
            if let Some(&status) = self.prev_status.get(&pane.target) {
                pane.status = status;
            }
        }
        self.cleanup(panes);
    }

    /// Run the state machine over one discovery cycle, updating each pane's
    /// status in place. Targets not present in `panes` are forgotten.
    pub fn reconcile(&mut self, panes: &mut [Pane]) {
        for pane in panes.iter_mut() {
            pane.status = self.next_status(pane);
            self.prev_activity
                .insert(pane.target.clone(), pane.window_activity);
            self.prev_status.insert(pane.target.clone(), pane.status);
        }
        self.cleanup(panes);
    }

    fn next_status(&mut self, pane: &Pane) -> PaneStatus {
        if let Some(ov) = self.overrides.get(&pane.target).copied() {
            if pane.window_activity > ov.window_activity {
                tracing::debug!(pane = %pane.target, "New output supersedes override");
                self.overrides.remove(&pane.target);
            } else {
                return ov.status;
            }
        }

        let prev_status = self.status(&pane.target);
        let active = self
            .prev_activity
            .get(&pane.target)
            .is_some_and(|&prev| pane.window_activity > prev);

        if active {
            PaneStatus::Busy
        } else if pane.heuristic_attention {
            PaneStatus::NeedsAttention
        } else if prev_status == PaneStatus::Busy {
            PaneStatus::Unread
        } else if prev_status.wants_attention() {
            prev_status
        } else {
            PaneStatus::Idle
        }
    }

    /// Last resolved status for a target, `Idle` if never seen.
    pub fn status(&self, target: &str) -> PaneStatus {
        self.prev_status.get(target).copied().unwrap_or_default()
    }

    #[cfg(test)]
    pub fn override_for(&self, target: &str) -> Option<StatusOverride> {
        self.overrides.get(target).copied()
    }

    /// Pin a pane's status until its window produces output past `window_activity`.
    pub fn set_override(&mut self, target: &str, status: PaneStatus, window_activity: i64) {
        self.overrides.insert(
            target.to_string(),
            StatusOverride {
                status,
                window_activity,
            },
        );
        self.prev_status.insert(target.to_string(), status);
    }

    /// Flip a pane between `Idle` and `NeedsAttention`; `Unread` clears to
    /// `Idle`. Busy panes are left alone. Returns the new status if it changed.
    pub fn toggle_attention(&mut self, pane: &mut Pane) -> Option<PaneStatus> {
        let next = match pane.status {
            PaneStatus::Idle => PaneStatus::NeedsAttention,
            PaneStatus::NeedsAttention | PaneStatus::Unread => PaneStatus::Idle,
            PaneStatus::Busy => return None,
        };
        pane.status = next;
        self.set_override(&pane.target, next, pane.window_activity);
        Some(next)
    }

    /// The user switched to a pane: an `Unread` pane becomes `Idle`.
    pub fn mark_viewed(&mut self, pane: &mut Pane) -> bool {
        if pane.status != PaneStatus::Unread {
            return false;
        }
        pane.status = PaneStatus::Idle;
        self.set_override(&pane.target, PaneStatus::Idle, pane.window_activity);
        true
    }

    /// Absorb overrides written by another process. Targets that already have
    /// a local override keep it. An override recorded below the activity this
    /// process has already observed was superseded by that output, so a stale
    /// file cannot bring back an override discarded here.
    pub fn merge_overrides(&mut self, state: &State) {
        for cached in &state.panes {
            if self.overrides.contains_key(&cached.target) {
                continue;
            }
            let Some(ov) = cached_override(cached) else {
                continue;
            };
            if self
                .prev_activity
                .get(&cached.target)
                .is_some_and(|&seen| seen > ov.window_activity)
            {
                tracing::debug!(pane = %cached.target, "Skipping superseded override");
                continue;
            }
            tracing::debug!(pane = %cached.target, status = ?ov.status, "Absorbed foreign override");
            self.overrides.insert(cached.target.clone(), ov);
        }
    }

    /// Write this reconciler's view (baselines, statuses, overrides) onto
    /// cached panes for persistence.
    pub fn apply_to_cache(&self, panes: &mut [CachedPane]) {
        for cached in panes.iter_mut() {
            match self.overrides.get(&cached.target) {
                Some(ov) => {
                    cached.status_override = Some(ov.status.code());
                    cached.override_activity = Some(ov.window_activity);
                }
                None => {
                    cached.status_override = None;
                    cached.override_activity = None;
                }
            }
            if let Some(&activity) = self.prev_activity.get(&cached.target) {
                cached.window_activity = Some(activity);
            }
            if let Some(status) = self.prev_status.get(&cached.target) {
                cached.last_status = Some(status.code());
            }
        }
    }

    /// Number of targets with any tracked state.
    pub fn tracked(&self) -> usize {
        let mut targets: HashSet<&str> = self.prev_activity.keys().map(String::as_str).collect();
        targets.extend(self.prev_status.keys().map(String::as_str));
        targets.extend(self.overrides.keys().map(String::as_str));
        targets.len()
    }

    fn cleanup(&mut self, panes: &[Pane]) {
        let alive: HashSet<&str> = panes.iter().map(|p| p.target.as_str()).collect();
        self.prev_activity.retain(|t, _| alive.contains(t.as_str()));
        self.prev_status.retain(|t, _| alive.contains(t.as_str()));
        self.overrides.retain(|t, _| alive.contains(t.as_str()));
    }
}

fn cached_override(cached: &CachedPane) -> Option<StatusOverride> {
    let status = cached.status_override.and_then(PaneStatus::from_code)?;
    let window_activity = cached
        .override_activity
        .or(cached.window_activity)
        .unwrap_or(0);
    Some(StatusOverride {
        status,
        window_activity,
    })
}
