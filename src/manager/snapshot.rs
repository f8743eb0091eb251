//! Frontend-safe deep-cloned snapshots and the generation-tagged cache
//! that avoids rebuilding them on every read (spec.md §4.1.6).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::ids::{PaneId, SessionId, WindowId};
use crate::model::layout::LayoutNode;
use crate::model::session::{Session, TriState, WorktreeInfo};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PaneSnapshot {
    pub id: PaneId,
    pub index: usize,
    pub title: String,
    pub active: bool,
    pub width: u16,
    pub height: u16,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WindowSnapshot {
    pub id: WindowId,
    pub name: String,
    pub panes: Vec<PaneSnapshot>,
    pub active_pane_index: usize,
    pub layout: LayoutNode,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_idle: bool,
    pub env: HashMap<String, String>,
    pub agent_team: bool,
    pub worktree: Option<WorktreeInfo>,
    pub root_path: Option<String>,
    pub use_claude_env: TriState,
    pub use_pane_env: TriState,
    pub windows: Vec<WindowSnapshot>,
    pub active_window_id: WindowId,
}

impl From<&Session> for SessionSnapshot {
    fn from(s: &Session) -> Self {
        SessionSnapshot {
            id: s.id,
            name: s.name.clone(),
            created_at: s.created_at,
            last_activity: s.last_activity,
            is_idle: s.is_idle,
            env: s.env.clone(),
            agent_team: s.agent_team,
            worktree: s.worktree.clone(),
            root_path: s.root_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            use_claude_env: s.use_claude_env,
            use_pane_env: s.use_pane_env,
            windows: s
                .windows
                .iter()
                .map(|w| WindowSnapshot {
                    id: w.id,
                    name: w.name.clone(),
                    panes: w
                        .panes
                        .iter()
                        .map(|p| PaneSnapshot {
                            id: p.id,
                            index: p.index,
                            title: p.title.clone(),
                            active: p.active,
                            width: p.width,
                            height: p.height,
                            env: p.env.clone(),
                        })
                        .collect(),
                    active_pane_index: w.active_pane_index,
                    layout: w.layout.clone(),
                })
                .collect(),
            active_window_id: s.active_window_id,
        }
    }
}

/// Cache keyed by the `generation` counter at which the slice was built
/// (spec.md §4.1.6): a read-lock fast path returns a clone of the cache
/// when the generation hasn't moved; otherwise the caller upgrades to the
/// write lock, rebuilds, and stores the new slice.
#[derive(Default)]
pub struct SnapshotCache {
    inner: Mutex<Option<(u64, Vec<SessionSnapshot>)>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the cached slice if it was built at `generation`.
    pub fn get_if_current(&self, generation: u64) -> Option<Vec<SessionSnapshot>> {
        let guard = self.inner.lock().unwrap();
        match &*guard {
            Some((gen, snaps)) if *gen == generation => Some(snaps.clone()),
            _ => None,
        }
    }

    pub fn store(&self, generation: u64, snaps: Vec<SessionSnapshot>) {
        *self.inner.lock().unwrap() = Some((generation, snaps));
    }
}
