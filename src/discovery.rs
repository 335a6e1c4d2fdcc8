use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::agents::{AgentRegistry, ProcessTable};
use crate::config::Config;
use crate::history::{default_history_path, last_active_by_project};
use crate::tmux::{needs_attention, AttentionStrategy, Pane, PaneStatus, RawPane, TmuxClient};
use crate::workspace::Enricher;

/// One full discovery pass: list panes, resolve agents, detect attention,
/// enrich workspaces.
pub struct Discovery {
    client: TmuxClient,
    registry: AgentRegistry,
    enricher: Enricher,
    strategy: AttentionStrategy,
    capture_lines: usize,
    history_path: PathBuf,
}

impl Discovery {
    pub fn new(client: TmuxClient, registry: AgentRegistry, config: &Config) -> Self {
        Self {
            client,
            registry,
            enricher: Enricher::new(),
            strategy: config.attention,
            capture_lines: config.capture_lines,
            history_path: default_history_path(),
        }
    }

    pub fn client(&self) -> &TmuxClient {
        &self.client
    }

    /// Discover every pane running a registered agent.
    ///
    /// The pane listing, process snapshot and prompt history are fetched
    /// concurrently. Only a failed pane listing fails the pass; the other two
    /// sources degrade to empty results on their own.
    pub async fn discover(&self) -> Result<Vec<Pane>> {
        let (listed, table, history) = tokio::join!(
            self.client.list_panes(self.strategy),
            ProcessTable::load(),
            last_active_by_project(&self.history_path),
        );
        let raw = listed.context("Failed to list tmux panes")?;

        let mut panes = build_panes(raw, &table, &history, &self.registry);
        if self.strategy == AttentionStrategy::Capture {
            self.capture_attention(&mut panes).await;
        }
        self.enricher.enrich(&mut panes).await;

        tracing::debug!(
            panes = panes.len(),
            processes = table.len(),
            "Discovery pass complete"
        );
        Ok(panes)
    }

    /// Run the heuristic over captured content, one pane at a time. tmux
    /// serializes capture requests internally, so running them concurrently
    /// only adds contention.
    async fn capture_attention(&self, panes: &mut [Pane]) {
        for pane in panes.iter_mut() {
            pane.heuristic_attention = match self
                .client
                .capture_pane(&pane.target, self.capture_lines, false)
                .await
            {
                Ok(content) => needs_attention(&content, self.capture_lines),
                Err(e) => {
                    tracing::debug!(pane = %pane.target, error = %e, "capture-pane failed");
                    false
                }
            };
        }
    }
}

/// Turn raw `list-panes` rows into agent panes. Rows that do not resolve to a
/// registered agent are dropped.
pub fn build_panes(
    raw: Vec<RawPane>,
    table: &ProcessTable,
    history: &HashMap<String, DateTime<Utc>>,
    registry: &AgentRegistry,
) -> Vec<Pane> {
    raw.into_iter()
        .filter_map(|row| {
            let agent = registry.resolve(&row.command, row.pid, table)?;
            Some(Pane {
                window_name: row.window_name,
                last_active: history.get(&row.path).copied(),
                path: row.path,
                pid: row.pid,
                agent,
                status: PaneStatus::Idle,
                window_activity: row.window_activity,
                heuristic_attention: row.attention.unwrap_or(false),
                target: row.target,
                ..Pane::default()
            })
        })
        .collect()
}
