//! Target-resolution grammar (spec.md §4.1.3).

use crate::error::CoreError;
use crate::ids::{PaneId, WindowId};
use crate::manager::Graph;
use crate::model::pane::PaneHandle;

/// Outcome of a read-lock resolve attempt: either a resolved pane, or a
/// signal that the caller must upgrade to the write lock to repair a
/// stale `active_window_id` before retrying (spec.md §4.1.1, §4.1.3).
pub enum ResolveOutcome {
    Resolved(PaneHandle),
    NeedsRepair,
}

impl Graph {
    /// Resolves `target` against the graph, following the eight-case
    /// grammar in spec.md §4.1.3. Read-only: never mutates, but reports
    /// `NeedsRepair` when resolution depended on a stale
    /// `active_window_id` so the caller can upgrade locks and retry.
    pub fn resolve_target(
        &self,
        target: &str,
        caller_pane_id: Option<PaneId>,
    ) -> Result<ResolveOutcome, CoreError> {
        let target = target.trim();

        // 1: empty with caller -> that pane.
        if target.is_empty() {
            if let Some(pid) = caller_pane_id {
                let pane = self.find_pane(pid).ok_or(CoreError::CallerPaneNotFound(pid.as_text()))?;
                return Ok(ResolveOutcome::Resolved(pane.to_handle()));
            }
            // 2: empty with no caller -> lowest-ID session's active window's active pane.
            let session = self
                .sessions
                .values()
                .min_by_key(|s| s.id.value())
                .ok_or_else(|| CoreError::SessionNotFound(String::new()))?;
            return self.resolve_active_pane_of(session.name.clone(), session.active_window_id);
        }

        // 3: %<digits> -> direct pane lookup.
        if let Some(pid) = PaneId::parse_text(target) {
            let pane = self.find_pane(pid).ok_or(CoreError::PaneNotFound(target.to_string()))?;
            return Ok(ResolveOutcome::Resolved(pane.to_handle()));
        }

        // Split "name[:rest]"
        let (name, rest) = match target.split_once(':') {
            Some((n, r)) => (n, Some(r)),
            None => (target, None),
        };
        let session = self
            .sessions
            .get(self.name_index.get(name).ok_or_else(|| CoreError::SessionNotFound(name.to_string()))?)
            .ok_or_else(|| CoreError::SessionNotFound(name.to_string()))?;

        let rest = match rest {
            None | Some("") => {
                // 4/5: "name" or "name:" -> active window's active pane.
                return self.resolve_active_pane_of(session.name.clone(), session.active_window_id);
            }
            Some(r) => r,
        };

        // "idx[.paneIdx]" or "@id[.paneIdx]"
        let (window_part, pane_part) = match rest.split_once('.') {
            Some((w, p)) => (w, Some(p)),
            None => (rest, None),
        };

        let window = if let Some(id_str) = window_part.strip_prefix('@') {
            let wid = id_str
                .parse::<u64>()
                .map_err(|_| CoreError::InvalidTarget(target.to_string()))?;
            session
                .windows
                .iter()
                .find(|w| w.id == WindowId(wid))
                .ok_or_else(|| CoreError::WindowNotFound(target.to_string()))?
        } else {
            let idx = window_part
                .parse::<usize>()
                .map_err(|_| CoreError::InvalidTarget(target.to_string()))?;
            session
                .windows
                .get(idx)
                .ok_or_else(|| CoreError::WindowNotFound(target.to_string()))?
        };

        match pane_part {
            None => {
                let pane = window
                    .active_pane()
                    .ok_or(CoreError::NoActivePane)?;
                Ok(ResolveOutcome::Resolved(pane.to_handle()))
            }
            Some(p) => {
                let pidx = p
                    .parse::<usize>()
                    .map_err(|_| CoreError::InvalidTarget(target.to_string()))?;
                let pane = window
                    .panes
                    .get(pidx)
                    .ok_or_else(|| CoreError::PaneNotFound(target.to_string()))?;
                Ok(ResolveOutcome::Resolved(pane.to_handle()))
            }
        }
    }

    fn resolve_active_pane_of(
        &self,
        session_name: String,
        active_window_id: WindowId,
    ) -> Result<ResolveOutcome, CoreError> {
        let session = self
            .sessions
            .get(self.name_index.get(&session_name).unwrap())
            .unwrap();
        match session.find_window_index(active_window_id) {
            Some(idx) => {
                let window = &session.windows[idx];
                let pane = window.active_pane().ok_or(CoreError::NoActivePane)?;
                Ok(ResolveOutcome::Resolved(pane.to_handle()))
            }
            None => Ok(ResolveOutcome::NeedsRepair),
        }
    }

    pub fn find_pane(&self, id: PaneId) -> Option<&crate::model::pane::Pane> {
        let (sid, wid) = self.pane_index.get(&id)?;
        let session = self.sessions.get(sid)?;
        let window = session.windows.iter().find(|w| w.id == *wid)?;
        window.panes.iter().find(|p| p.id == id)
    }

    pub fn find_pane_mut(&mut self, id: PaneId) -> Option<&mut crate::model::pane::Pane> {
        let (sid, wid) = *self.pane_index.get(&id)?;
        let session = self.sessions.get_mut(&sid)?;
        let window = session.windows.iter_mut().find(|w| w.id == wid)?;
        window.panes.iter_mut().find(|p| p.id == id)
    }

    pub fn owning_window_id(&self, id: PaneId) -> Option<WindowId> {
        self.pane_index.get(&id).map(|(_, wid)| *wid)
    }

    pub fn owning_session_name(&self, id: PaneId) -> Option<String> {
        let (sid, _) = self.pane_index.get(&id)?;
        self.sessions.get(sid).map(|s| s.name.clone())
    }

    /// Neighbour within the same window's pane slice, clamped at
    /// boundaries — no wraparound (spec.md §4.1.2, §8, Non-goals).
    pub fn resolve_directional_pane(
        &self,
        caller_pane_id: PaneId,
        dir: Direction,
    ) -> Result<PaneHandle, CoreError> {
        let (sid, wid) = self
            .pane_index
            .get(&caller_pane_id)
            .ok_or(CoreError::CallerPaneNotFound(caller_pane_id.as_text()))?;
        let session = self.sessions.get(sid).ok_or(CoreError::CallerPaneNotFound(caller_pane_id.as_text()))?;
        let window = session
            .windows
            .iter()
            .find(|w| w.id == *wid)
            .ok_or(CoreError::NoParentWindow(caller_pane_id.as_text()))?;
        let idx = window
            .find_pane_index(caller_pane_id)
            .ok_or(CoreError::CallerPaneNotFound(caller_pane_id.as_text()))?;
        let target_idx = match dir {
            Direction::None => idx,
            Direction::Prev => idx.saturating_sub(1),
            Direction::Next => (idx + 1).min(window.panes.len().saturating_sub(1)),
        };
        Ok(window.panes[target_idx].to_handle())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None,
    Prev,
    Next,
}
