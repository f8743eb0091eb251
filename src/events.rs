//! Event names and payload shapes emitted via [`crate::terminal::EventEmitter`]
//! (spec.md §6).

use serde_json::json;

use crate::ids::{PaneId, SessionId, WindowId};
use crate::model::layout::LayoutNode;

pub const SESSION_CREATED: &str = "tmux:session-created";
pub const SESSION_DESTROYED: &str = "tmux:session-destroyed";
pub const SESSION_RENAMED: &str = "tmux:session-renamed";
pub const PANE_CREATED: &str = "tmux:pane-created";
pub const PANE_RENAMED: &str = "tmux:pane-renamed";
pub const PANE_FOCUSED: &str = "tmux:pane-focused";
pub const PANE_OUTPUT: &str = "tmux:pane-output";
pub const LAYOUT_CHANGED: &str = "tmux:layout-changed";
pub const WINDOW_RENAMED: &str = "tmux:window-renamed";
pub const WINDOW_DESTROYED: &str = "tmux:window-destroyed";
pub const ACTIVATE_WINDOW: &str = "app:activate-window";

pub fn session_created(name: &str, id: SessionId, initial_pane: PaneId, initial_layout: &LayoutNode) -> serde_json::Value {
    json!({
        "name": name,
        "id": id.0,
        "initialPane": initial_pane.as_text(),
        "initialLayout": initial_layout,
    })
}

pub fn session_destroyed(name: &str) -> serde_json::Value {
    json!({ "name": name })
}

pub fn session_renamed(old_name: &str, new_name: &str) -> serde_json::Value {
    json!({ "oldName": old_name, "newName": new_name })
}

pub fn pane_created(
    session_name: &str,
    pane_id: PaneId,
    env: &std::collections::HashMap<String, String>,
    layout: &LayoutNode,
) -> serde_json::Value {
    json!({
        "sessionName": session_name,
        "paneId": pane_id.as_text(),
        "env": env,
        "layout": layout,
    })
}

pub fn pane_renamed(session_name: &str, pane_id: PaneId, title: &str) -> serde_json::Value {
    json!({ "sessionName": session_name, "paneId": pane_id.as_text(), "title": title })
}

pub fn pane_focused(session_name: &str, pane_id: PaneId) -> serde_json::Value {
    json!({ "sessionName": session_name, "paneId": pane_id.as_text() })
}

pub fn pane_output(pane_id: PaneId, data: &[u8]) -> serde_json::Value {
    json!({ "PaneID": pane_id.as_text(), "Data": data })
}

pub fn layout_changed(session_name: &str, layout_tree: &LayoutNode) -> serde_json::Value {
    json!({ "sessionName": session_name, "layoutTree": layout_tree })
}

pub fn window_renamed(session_name: &str, window_index: usize, window_name: &str) -> serde_json::Value {
    json!({ "sessionName": session_name, "windowIndex": window_index, "windowName": window_name })
}

pub fn window_destroyed(session_name: &str, window_id: WindowId) -> serde_json::Value {
    json!({ "sessionName": session_name, "windowId": window_id.0 })
}
