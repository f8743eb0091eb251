//! `#{var}` format-string expansion (spec.md §4.1.5).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ids::{PaneId, SessionId, WindowId};
use crate::manager::{Graph, SessionManager};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\{([a-zA-Z_]+)\}").unwrap());

/// Everything a format string's `#{var}` placeholders can reference. `None`
/// fields/absence of a pane yields the domain defaults noted per-variable
/// below, matching "nil pane yields empty/zero" (spec.md §4.1.5).
#[derive(Debug, Clone, Default)]
pub struct FormatSource {
    pub pane: Option<PaneFields>,
    pub window: Option<WindowFields>,
    pub session: Option<SessionFields>,
}

#[derive(Debug, Clone)]
pub struct PaneFields {
    pub id: PaneId,
    pub index: usize,
    pub width: u16,
    pub height: u16,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct WindowFields {
    pub id: WindowId,
    pub name: String,
    pub pane_count: usize,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct SessionFields {
    pub id: SessionId,
    pub name: String,
    pub window_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Expands every `#{var}` placeholder in `format` against `source`.
/// Nested placeholders are unsupported; the inner one resolves to empty
/// (spec.md §1 Non-goals, §4.1.5).
pub fn expand_format(format: &str, source: &FormatSource) -> String {
    PLACEHOLDER
        .replace_all(format, |caps: &regex::Captures| resolve_var(&caps[1], source))
        .into_owned()
}

fn resolve_var(name: &str, source: &FormatSource) -> String {
    match name {
        "pane_id" => source.pane.as_ref().map(|p| p.id.as_text()).unwrap_or_default(),
        "pane_index" => source.pane.as_ref().map(|p| p.index.to_string()).unwrap_or_else(|| "0".into()),
        "pane_width" => source.pane.as_ref().map(|p| p.width.to_string()).unwrap_or_else(|| "0".into()),
        "pane_height" => source.pane.as_ref().map(|p| p.height.to_string()).unwrap_or_else(|| "0".into()),
        "pane_active" => source
            .pane
            .as_ref()
            .map(|p| if p.active { "1" } else { "0" }.to_string())
            .unwrap_or_else(|| "0".into()),
        "pane_active_suffix" => source
            .pane
            .as_ref()
            .map(|p| if p.active { " (active)" } else { "" }.to_string())
            .unwrap_or_default(),
        "pane_tty" => String::new(),
        // Deliberate deviation from tmux: returns the stable window ID,
        // not a positional index (spec.md §4.1.5).
        "window_index" => source.window.as_ref().map(|w| w.id.to_string()).unwrap_or_else(|| "0".into()),
        "window_name" => source.window.as_ref().map(|w| w.name.clone()).unwrap_or_default(),
        "window_panes" => source.window.as_ref().map(|w| w.pane_count.to_string()).unwrap_or_else(|| "0".into()),
        "window_active" => source
            .window
            .as_ref()
            .map(|w| if w.active { "1" } else { "0" }.to_string())
            .unwrap_or_else(|| "0".into()),
        "session_name" => source.session.as_ref().map(|s| s.name.clone()).unwrap_or_default(),
        "session_windows" => source.session.as_ref().map(|s| s.window_count.to_string()).unwrap_or_else(|| "0".into()),
        "session_created" => source
            .session
            .as_ref()
            .map(|s| s.created_at.timestamp().to_string())
            .unwrap_or_else(|| "0".into()),
        "session_created_human" => source
            .session
            .as_ref()
            .map(|s| s.created_at.format("%a %b %e %H:%M:%S %Y").to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

impl Graph {
    /// Builds a [`FormatSource`] for `pane_id`, or an empty source if the
    /// pane/window/session cannot be located (spec.md §4.1.5: "any
    /// intermediate failure falls back to expansion against a nil pane").
    pub fn format_source_for(&self, pane_id: PaneId) -> FormatSource {
        let Some((sid, wid)) = self.pane_index.get(&pane_id).copied() else {
            return FormatSource::default();
        };
        let Some(session) = self.sessions.get(&sid) else {
            return FormatSource::default();
        };
        let Some(window) = session.windows.iter().find(|w| w.id == wid) else {
            return FormatSource::default();
        };
        let Some(pane) = window.panes.iter().find(|p| p.id == pane_id) else {
            return FormatSource::default();
        };
        FormatSource {
            pane: Some(PaneFields {
                id: pane.id,
                index: pane.index,
                width: pane.width,
                height: pane.height,
                active: pane.active,
            }),
            window: Some(WindowFields {
                id: window.id,
                name: window.name.clone(),
                pane_count: window.panes.len(),
                active: window.id == session.active_window_id,
            }),
            session: Some(SessionFields {
                id: session.id,
                name: session.name.clone(),
                window_count: session.windows.len(),
                created_at: session.created_at,
            }),
        }
    }
}

impl SessionManager {
    /// TOCTOU-safe format expansion (spec.md §4.1.5): snapshots via
    /// `get_pane_context_snapshot` then a fresh `get_session` clone,
    /// expanding against the clone rather than holding the graph lock for
    /// the whole expansion.
    pub fn expand_format_safe(&self, format: &str, pane_id: PaneId) -> String {
        let graph = self.graph.read().unwrap();
        let source = graph.format_source_for(pane_id);
        drop(graph);
        expand_format(format, &source)
    }
}
