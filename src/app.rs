use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};
use std::collections::HashMap;

use crate::actions::Action;
use crate::reconcile::Reconciler;
use crate::state::{LastPosition, StateStore};
use crate::sync::viewer_snapshot;
use crate::tmux::{Pane, PaneStatus};
use crate::workspace::group_by_workspace;

const MIN_SIDEBAR: u16 = 20;

/// Theme colors inspired by Claude Code
pub struct Theme {
    pub highlight: Color,
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            highlight: Color::Rgb(50, 50, 50),
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87), // Claude orange
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

/// Input mode for the viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    ConfirmingKill,
}

/// One line of the pane list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Workspace { label: String },
    StashedHeader,
    Pane(String),
}

/// Viewer state
pub struct App {
    /// Known panes by target
    pub panes: HashMap<String, Pane>,
    /// Display order, rebuilt whenever panes change
    pub rows: Vec<Row>,
    /// Target under the cursor
    pub selected: Option<String>,
    pub list_state: ListState,
    pub reconciler: Reconciler,
    /// Current message to display (info or error)
    pub error_message: Option<String>,
    pub theme: Theme,
    pub input_mode: InputMode,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
    pub sidebar_width: Option<u16>,
    pub preview: Option<(String, String)>,
    store: StateStore,
    seeded_from_state: bool,
    live_loads: u64,
    width: u16,
}

impl App {
    /// Build the viewer from the last persisted state so the first frame
    /// shows cached panes before any discovery has run.
    pub fn new(store: StateStore) -> Self {
        let mut app = Self {
            panes: HashMap::new(),
            rows: Vec::new(),
            selected: None,
            list_state: ListState::default(),
            reconciler: Reconciler::new(),
            error_message: None,
            theme: Theme::default(),
            input_mode: InputMode::Normal,
            pending_actions: Vec::new(),
            sidebar_width: None,
            preview: None,
            store,
            seeded_from_state: false,
            live_loads: 0,
            width: 0,
        };

        if let Some(state) = app.store.load() {
            app.reconciler.seed_from_state(&state);
            for cached in &state.panes {
                let mut pane = cached.to_pane();
                pane.status = app.reconciler.status(&cached.target);
                app.panes.insert(pane.target.clone(), pane);
            }
            app.sidebar_width = state.sidebar_width;
            *app.list_state.offset_mut() = state.last_position.scroll_start;
            if !state.last_position.pane_target.is_empty() {
                app.selected = Some(state.last_position.pane_target.clone());
            }
            app.seeded_from_state = true;
        }

        app.rebuild_rows();
        if let Some(target) = app.first_attention_target() {
            app.selected = Some(target);
        }
        app.clamp_selection();
        app
    }

    /// Get the currently selected pane
    pub fn selected_pane(&self) -> Option<&Pane> {
        self.selected.as_ref().and_then(|t| self.panes.get(t))
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::PanesUpdated(panes) => {
                self.apply_panes(panes);
                Ok(false)
            }
            Action::PreviewLoaded { target, content } => {
                if self.selected.as_deref() == Some(target.as_str()) {
                    self.preview = Some((target, content));
                }
                Ok(false)
            }
            Action::Error(msg) | Action::Status(msg) => {
                self.error_message = Some(msg);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn apply_panes(&mut self, mut fresh: Vec<Pane>) {
        let first_load = self.live_loads == 0;
        self.live_loads += 1;

        if first_load && !self.seeded_from_state {
            self.reconciler.seed(&mut fresh);
        } else {
            self.reconciler.reconcile(&mut fresh);
        }

        let mut next = HashMap::with_capacity(fresh.len());
        for mut pane in fresh {
            pane.stashed = self.panes.get(&pane.target).is_some_and(|p| p.stashed);
            next.insert(pane.target.clone(), pane);
        }
        self.panes = next;
        self.rebuild_rows();

        if first_load {
            if let Some(target) = self.first_attention_target() {
                self.selected = Some(target);
            }
        }
        let before = self.selected.clone();
        self.clamp_selection();
        if self.selected != before || self.preview.is_none() {
            self.request_preview();
        }
    }

    /// Rebuild the display rows: live panes grouped by workspace, then a
    /// stashed section.
    pub fn rebuild_rows(&mut self) {
        let mut ordered: Vec<Pane> = self.panes.values().cloned().collect();
        ordered.sort_by(|a, b| a.target.cmp(&b.target));
        let (stashed, active): (Vec<Pane>, Vec<Pane>) = ordered.into_iter().partition(|p| p.stashed);

        let mut rows = Vec::new();
        for workspace in group_by_workspace(&active) {
            let name = if workspace.short_path.is_empty() {
                workspace.path
            } else {
                workspace.short_path
            };
            let label = if workspace.git_branch.is_empty() {
                name
            } else {
                format!("{} ({})", name, workspace.git_branch)
            };
            rows.push(Row::Workspace { label });
            rows.extend(workspace.panes.into_iter().map(|p| Row::Pane(p.target)));
        }
        if !stashed.is_empty() {
            rows.push(Row::StashedHeader);
            rows.extend(stashed.into_iter().map(|p| Row::Pane(p.target)));
        }
        self.rows = rows;
    }

    fn pane_targets(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|row| match row {
                Row::Pane(target) => Some(target.as_str()),
                _ => None,
            })
            .collect()
    }

    /// First non-stashed pane that needs the user, in display order.
    pub fn first_attention_target(&self) -> Option<String> {
        self.pane_targets()
            .into_iter()
            .filter_map(|t| self.panes.get(t))
            .find(|p| !p.stashed && p.status.wants_attention())
            .map(|p| p.target.clone())
    }

    fn clamp_selection(&mut self) {
        let targets = self.pane_targets();
        let valid = self
            .selected
            .as_deref()
            .is_some_and(|sel| targets.contains(&sel));
        let first = targets.first().map(|t| t.to_string());
        if !valid {
            self.selected = first;
        }
    }

    fn selected_row(&self) -> Option<usize> {
        let selected = self.selected.as_deref()?;
        self.rows
            .iter()
            .position(|row| matches!(row, Row::Pane(t) if t == selected))
    }

    fn move_selection(&mut self, delta: isize) {
        let targets = self.pane_targets();
        if targets.is_empty() {
            return;
        }
        let current = self
            .selected
            .as_deref()
            .and_then(|sel| targets.iter().position(|t| *t == sel))
            .unwrap_or(0);
        let next = current
            .saturating_add_signed(delta)
            .min(targets.len() - 1);
        let target = targets[next].to_string();
        if self.selected.as_deref() != Some(target.as_str()) {
            self.selected = Some(target);
            self.request_preview();
        }
    }

    fn request_preview(&mut self) {
        if let Some(target) = self.selected.clone() {
            self.pending_actions.push(Action::LoadPreview(target));
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Clear message on any key press
        if self.error_message.is_some() && self.input_mode == InputMode::Normal {
            self.error_message = None;
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::ConfirmingKill => self.handle_confirming_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.save_state();
                return Ok(true);
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.save_state();
                return Ok(true);
            }
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char(' ') => self.toggle_attention(),
            KeyCode::Char('s') => self.toggle_stash(),
            KeyCode::Char('d') => {
                if self.selected_pane().is_some() {
                    self.input_mode = InputMode::ConfirmingKill;
                }
            }
            KeyCode::Char('R') => {
                self.pending_actions.push(Action::RestartDaemon);
            }
            KeyCode::Char('H') => self.resize_sidebar(-2),
            KeyCode::Char('L') => self.resize_sidebar(2),
            KeyCode::Enter => {
                if let Some(target) = self.selected.clone() {
                    if let Some(pane) = self.panes.get_mut(&target) {
                        self.reconciler.mark_viewed(pane);
                    }
                    self.save_state();
                    self.pending_actions.push(Action::SwitchToPane(target));
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_confirming_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Some(target) = self.selected.clone() {
                    self.pending_actions.push(Action::KillPane(target));
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
        Ok(false)
    }

    fn toggle_attention(&mut self) {
        let Some(target) = self.selected.clone() else {
            return;
        };
        if let Some(pane) = self.panes.get_mut(&target) {
            if self.reconciler.toggle_attention(pane).is_some() {
                self.save_state();
            }
        }
    }

    fn toggle_stash(&mut self) {
        let Some(target) = self.selected.clone() else {
            return;
        };
        let Some(pane) = self.panes.get_mut(&target) else {
            return;
        };
        pane.stashed = !pane.stashed;
        self.rebuild_rows();
        self.save_state();
    }

    fn resize_sidebar(&mut self, delta: i32) {
        let current = i32::from(self.list_width());
        let max = i32::from(self.width.saturating_sub(MIN_SIDEBAR).max(MIN_SIDEBAR));
        let next = (current + delta).clamp(i32::from(MIN_SIDEBAR), max);
        self.sidebar_width = u16::try_from(next).ok();
    }

    fn list_width(&self) -> u16 {
        self.sidebar_width
            .unwrap_or_else(|| (self.width * 2 / 5).max(MIN_SIDEBAR))
    }

    /// Persist viewer-owned fields and this viewer's overrides.
    pub fn save_state(&mut self) {
        let fresh = self.store.load().unwrap_or_default();
        let mut panes: Vec<Pane> = self.panes.values().cloned().collect();
        panes.sort_by(|a, b| a.target.cmp(&b.target));

        let position = LastPosition {
            pane_target: self.selected.clone().unwrap_or_default(),
            cursor: self.selected_row().unwrap_or(0),
            scroll_start: self.list_state.offset(),
        };
        let next = viewer_snapshot(fresh, &self.reconciler, &panes, position, self.sidebar_width);
        if let Err(e) = self.store.save(&next) {
            tracing::warn!(error = %e, "Failed to save viewer state");
            self.error_message = Some(format!("Failed to save state: {}", e));
        }
    }

    pub fn render(&mut self, frame: &mut Frame) {
        self.width = frame.area().width;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);

        if self.input_mode == InputMode::ConfirmingKill {
            self.render_confirm_dialog(frame);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let waiting = self
            .panes
            .values()
            .filter(|p| !p.stashed && p.status.wants_attention())
            .count();
        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " agent-mux ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("│ {} agents, {} waiting on you", self.panes.len(), waiting),
                Style::default().fg(self.theme.dim),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(self.list_width()), Constraint::Min(0)])
            .split(area);

        self.render_pane_list(frame, chunks[0]);
        self.render_preview(frame, chunks[1]);
    }

    fn status_span(&self, status: PaneStatus) -> Span<'static> {
        match status {
            PaneStatus::Busy => Span::styled("● ", Style::default().fg(self.theme.warning)),
            PaneStatus::Idle => Span::styled("○ ", Style::default().fg(self.theme.dim)),
            PaneStatus::NeedsAttention => Span::styled("? ", Style::default().fg(self.theme.accent)),
            PaneStatus::Unread => Span::styled("● ", Style::default().fg(self.theme.success)),
        }
    }

    fn render_pane_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.rows.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No agent panes found.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.rows
                .iter()
                .map(|row| match row {
                    Row::Workspace { label } => ListItem::new(Line::from(Span::styled(
                        label.clone(),
                        Style::default()
                            .fg(self.theme.fg)
                            .add_modifier(Modifier::BOLD),
                    ))),
                    Row::StashedHeader => ListItem::new(Line::from(Span::styled(
                        "stashed",
                        Style::default().fg(self.theme.dim),
                    ))),
                    Row::Pane(target) => {
                        let Some(pane) = self.panes.get(target) else {
                            return ListItem::new(Line::from(target.clone()));
                        };
                        let name = if pane.window_name.is_empty() {
                            pane.agent.clone()
                        } else {
                            format!("{} · {}", pane.window_name, pane.agent)
                        };
                        ListItem::new(Line::from(vec![
                            Span::raw("  "),
                            self.status_span(pane.status),
                            Span::styled(name, Style::default().fg(self.theme.fg)),
                            Span::styled(
                                format!(" {}", pane.target),
                                Style::default().fg(self.theme.dim),
                            ),
                        ]))
                    }
                })
                .collect()
        };

        self.list_state.select(self.selected_row());
        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Agents ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(self.theme.highlight)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_preview(&self, frame: &mut Frame, area: Rect) {
        let height = usize::from(area.height.saturating_sub(2));
        let content: Vec<Line> = match (&self.preview, self.selected_pane()) {
            (Some((target, text)), Some(pane)) if *target == pane.target => {
                let lines: Vec<&str> = text.trim_end().lines().collect();
                let start = lines.len().saturating_sub(height);
                lines[start..]
                    .iter()
                    .map(|l| Line::from(l.to_string()))
                    .collect()
            }
            (_, Some(_)) => vec![Line::from(Span::styled(
                "Loading…",
                Style::default().fg(self.theme.dim),
            ))],
            (_, None) => vec![Line::from(Span::styled(
                "No pane selected",
                Style::default().fg(self.theme.dim),
            ))],
        };

        let title = self
            .selected_pane()
            .map(|p| {
                if p.pid > 0 {
                    format!(" {} · pid {} ", p.path, p.pid)
                } else {
                    format!(" {} ", p.path)
                }
            })
            .unwrap_or_else(|| " Preview ".to_string());
        let preview = Paragraph::new(content).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(preview, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = " q: Quit │ j/k: Navigate │ Enter: Switch │ Space: Attention │ s: Stash │ d: Kill │ R: Restart watcher │ H/L: Resize ";

        let content = if let Some(ref msg) = self.error_message {
            Line::from(Span::styled(
                format!(" {} ", msg),
                Style::default().fg(self.theme.error),
            ))
        } else {
            Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim)))
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }

    fn render_confirm_dialog(&self, frame: &mut Frame) {
        let area = centered_rect(50, 20, frame.area());

        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(" Confirm Kill ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.error));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let target = self.selected.as_deref().unwrap_or("unknown");

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("Kill pane '{}'?", target),
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "The agent running in it will be terminated.",
                Style::default().fg(self.theme.warning),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press 'y' to confirm, 'n' or Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];

        let paragraph = Paragraph::new(text);
        frame.render_widget(paragraph, inner);
    }
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CachedPane, State};

    fn key(code: KeyCode) -> Action {
        Action::KeyPress(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn pane(target: &str, path: &str, activity: i64) -> Pane {
        Pane {
            target: target.to_string(),
            path: path.to_string(),
            short_path: path.rsplit('/').next().unwrap_or_default().to_string(),
            agent: "claude".to_string(),
            window_activity: activity,
            ..Pane::default()
        }
    }

    fn app() -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        (dir, App::new(store))
    }

    #[test]
    fn test_rows_group_by_workspace_with_stashed_last() {
        let (_dir, mut app) = app();
        app.handle_action(Action::PanesUpdated(vec![
            pane("b:0.0", "/work/web", 1),
            pane("a:0.0", "/work/api", 1),
            pane("a:1.0", "/work/api", 1),
        ]))
        .unwrap();
        app.panes.get_mut("b:0.0").unwrap().stashed = true;
        app.rebuild_rows();

        assert_eq!(
            app.rows,
            vec![
                Row::Workspace {
                    label: "api".to_string()
                },
                Row::Pane("a:0.0".to_string()),
                Row::Pane("a:1.0".to_string()),
                Row::StashedHeader,
                Row::Pane("b:0.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_navigation_skips_headers_and_stops_at_ends() {
        let (_dir, mut app) = app();
        app.handle_action(Action::PanesUpdated(vec![
            pane("a:0.0", "/work/api", 1),
            pane("b:0.0", "/work/web", 1),
        ]))
        .unwrap();
        assert_eq!(app.selected.as_deref(), Some("a:0.0"));

        app.handle_action(key(KeyCode::Char('j'))).unwrap();
        assert_eq!(app.selected.as_deref(), Some("b:0.0"));
        app.handle_action(key(KeyCode::Char('j'))).unwrap();
        assert_eq!(app.selected.as_deref(), Some("b:0.0"));
        app.handle_action(key(KeyCode::Char('k'))).unwrap();
        app.handle_action(key(KeyCode::Char('k'))).unwrap();
        assert_eq!(app.selected.as_deref(), Some("a:0.0"));
    }

    #[test]
    fn test_toggle_attention_persists_override() {
        let (dir, mut app) = app();
        app.handle_action(Action::PanesUpdated(vec![pane("a:0.0", "/work/api", 9)]))
            .unwrap();
        app.handle_action(key(KeyCode::Char(' '))).unwrap();
        assert_eq!(app.panes["a:0.0"].status, PaneStatus::NeedsAttention);

        let saved = StateStore::new(dir.path().join("state.json")).load().unwrap();
        assert_eq!(saved.panes[0].status_override, Some(2));
        assert_eq!(saved.panes[0].override_activity, Some(9));
    }

    #[test]
    fn test_enter_clears_unread_and_requests_switch() {
        let (_dir, mut app) = app();
        app.handle_action(Action::PanesUpdated(vec![pane("a:0.0", "/work/api", 1)]))
            .unwrap();
        app.handle_action(Action::PanesUpdated(vec![pane("a:0.0", "/work/api", 2)]))
            .unwrap();
        app.handle_action(Action::PanesUpdated(vec![pane("a:0.0", "/work/api", 2)]))
            .unwrap();
        assert_eq!(app.panes["a:0.0"].status, PaneStatus::Unread);
        app.take_pending_actions();

        let quit = app.handle_action(key(KeyCode::Enter)).unwrap();
        assert!(!quit);
        assert_eq!(app.panes["a:0.0"].status, PaneStatus::Idle);
        let pending = app.take_pending_actions();
        assert!(matches!(pending.as_slice(), [Action::SwitchToPane(t)] if t == "a:0.0"));
    }

    #[test]
    fn test_kill_requires_confirmation() {
        let (_dir, mut app) = app();
        app.handle_action(Action::PanesUpdated(vec![pane("a:0.0", "/work/api", 1)]))
            .unwrap();
        app.take_pending_actions();

        app.handle_action(key(KeyCode::Char('d'))).unwrap();
        assert_eq!(app.input_mode, InputMode::ConfirmingKill);
        app.handle_action(key(KeyCode::Char('n'))).unwrap();
        assert!(app.take_pending_actions().is_empty());

        app.handle_action(key(KeyCode::Char('d'))).unwrap();
        app.handle_action(key(KeyCode::Char('y'))).unwrap();
        let pending = app.take_pending_actions();
        assert!(matches!(pending.as_slice(), [Action::KillPane(t)] if t == "a:0.0"));
    }

    #[test]
    fn test_startup_prefers_attention_pane_from_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store
            .save(&State {
                panes: vec![
                    CachedPane {
                        target: "a:0.0".to_string(),
                        path: "/work/api".to_string(),
                        last_status: Some(PaneStatus::Idle.code()),
                        ..CachedPane::default()
                    },
                    CachedPane {
                        target: "b:0.0".to_string(),
                        path: "/work/web".to_string(),
                        last_status: Some(PaneStatus::Unread.code()),
                        ..CachedPane::default()
                    },
                ],
                last_position: LastPosition {
                    pane_target: "a:0.0".to_string(),
                    ..LastPosition::default()
                },
                sidebar_width: Some(33),
                ..State::default()
            })
            .unwrap();

        let app = App::new(store);
        assert_eq!(app.selected.as_deref(), Some("b:0.0"));
        assert_eq!(app.panes["b:0.0"].status, PaneStatus::Unread);
        assert_eq!(app.sidebar_width, Some(33));
    }

    #[test]
    fn test_quit_saves_position_and_stash() {
        let (dir, mut app) = app();
        app.width = 100;
        app.handle_action(Action::PanesUpdated(vec![
            pane("a:0.0", "/work/api", 1),
            pane("b:0.0", "/work/web", 1),
        ]))
        .unwrap();
        app.handle_action(key(KeyCode::Char('s'))).unwrap();
        app.handle_action(key(KeyCode::Char('L'))).unwrap();
        assert!(app.handle_action(key(KeyCode::Char('q'))).unwrap());

        let saved = StateStore::new(dir.path().join("state.json")).load().unwrap();
        let stashed: Vec<&str> = saved.stashed_targets().collect();
        assert_eq!(stashed, vec!["a:0.0"]);
        assert_eq!(saved.last_position.pane_target, "a:0.0");
        assert_eq!(saved.sidebar_width, Some(42));
    }
}
