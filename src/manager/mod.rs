//! The in-memory session/window/pane graph and its lock-safe mutations
//! (spec.md §4.1).
//!
//! Locking discipline (spec.md §4.1.1): a single [`std::sync::RwLock`]
//! (`graph`) protects the whole tree. Methods named `*_locked` on
//! [`Graph`] assume the caller already holds the write lock; public
//! methods on [`SessionManager`] acquire/release `graph` themselves and
//! never call each other while holding it, so no method here may be
//! called recursively from within another's lock scope.

pub mod format;
pub mod snapshot;
pub mod target;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::ids::{IdAllocator, PaneId, SessionId, WindowId};
use crate::model::layout::{LayoutNode, LayoutPreset, SplitDirection};
use crate::model::pane::{Pane, PaneHandle};
use crate::model::session::{Session, TriState, WorktreeInfo};
use crate::model::window::Window;
use crate::terminal::Terminal;

pub use snapshot::{PaneSnapshot, SessionSnapshot, SnapshotCache, WindowSnapshot};
pub use target::Direction;

const DEFAULT_WIDTH: u16 = 120;
const DEFAULT_HEIGHT: u16 = 40;

/// The graph itself: sessions plus the indexes that make global pane
/// lookup and name lookup O(1) (spec.md §9, ownership-tree + external
/// index).
pub struct Graph {
    pub(crate) sessions: HashMap<SessionId, Session>,
    pub(crate) name_index: HashMap<String, SessionId>,
    pub(crate) pane_index: HashMap<PaneId, (SessionId, WindowId)>,
}

impl Graph {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            name_index: HashMap::new(),
            pane_index: HashMap::new(),
        }
    }

    fn register_pane(&mut self, pane_id: PaneId, session_id: SessionId, window_id: WindowId) {
        self.pane_index.insert(pane_id, (session_id, window_id));
    }

    fn session_by_name(&self, name: &str) -> Option<&Session> {
        self.name_index.get(name).and_then(|id| self.sessions.get(id))
    }

    fn session_by_name_mut(&mut self, name: &str) -> Option<&mut Session> {
        let id = *self.name_index.get(name)?;
        self.sessions.get_mut(&id)
    }

    /// Smallest non-colliding decimal string, used when `name` is empty
    /// on session creation (spec.md §4.1.2 `CreateSession`).
    fn smallest_free_name(&self) -> String {
        let mut n: u64 = 0;
        loop {
            let candidate = n.to_string();
            if !self.name_index.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Owns the session/window/pane graph behind a single read-write lock and
/// the generation counters used for snapshot caching and change detection
/// (spec.md §3 "Generation counters", §4.1.6).
pub struct SessionManager {
    ids: IdAllocator,
    graph: RwLock<Graph>,
    generation: AtomicU64,
    topology_generation: AtomicU64,
    session_map_generation: AtomicU64,
    snapshot_cache: SnapshotCache,
    idle_threshold: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`SessionManager::kill_pane`].
pub struct KillPaneOutcome {
    pub session_name: String,
    pub terminal: Option<Arc<dyn Terminal>>,
    pub window_destroyed: Option<WindowId>,
    pub session_destroyed: bool,
    /// Surviving window's layout, present unless the session was destroyed.
    pub layout: Option<LayoutNode>,
}

/// Outcome of [`SessionManager::remove_window_by_id`].
pub struct RemoveWindowOutcome {
    pub terminals: Vec<Arc<dyn Terminal>>,
    pub session_destroyed: bool,
    pub repaired_active_window: Option<WindowId>,
}

/// Lock-safe bundle handlers use after releasing locks (spec.md §4.1.2
/// `GetPaneContextSnapshot`).
pub struct PaneContextSnapshot {
    pub session_id: SessionId,
    pub session_name: String,
    pub window_id: WindowId,
    pub layout: LayoutNode,
    pub env: HashMap<String, String>,
    pub title: String,
    pub session_work_dir: Option<std::path::PathBuf>,
    pub pane_width: u16,
    pub pane_height: u16,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_idle_threshold(Duration::from_secs(300))
    }

    pub fn with_idle_threshold(idle_threshold: Duration) -> Self {
        Self {
            ids: IdAllocator::new(),
            graph: RwLock::new(Graph::new()),
            generation: AtomicU64::new(0),
            topology_generation: AtomicU64::new(0),
            session_map_generation: AtomicU64::new(0),
            snapshot_cache: SnapshotCache::new(),
            idle_threshold,
        }
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn bump_topology(&self) {
        self.topology_generation.fetch_add(1, Ordering::SeqCst);
        self.bump_generation();
    }

    fn bump_session_map(&self) {
        self.session_map_generation.fetch_add(1, Ordering::SeqCst);
        self.bump_topology();
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn topology_generation(&self) -> u64 {
        self.topology_generation.load(Ordering::SeqCst)
    }

    pub fn session_map_generation(&self) -> u64 {
        self.session_map_generation.load(Ordering::SeqCst)
    }

    // -- session lifecycle --------------------------------------------------

    pub fn create_session(
        &self,
        name: &str,
        window_name: &str,
        w: i32,
        h: i32,
    ) -> CoreResult<(String, SessionId, WindowId, PaneId)> {
        let name = name.trim().to_string();
        let window_name = if window_name.trim().is_empty() {
            "0".to_string()
        } else {
            window_name.trim().to_string()
        };
        let (width, height) = normalise_dims(w, h);

        let mut graph = self.graph.write().unwrap();
        let name = if name.is_empty() { graph.smallest_free_name() } else { name };
        if graph.name_index.contains_key(&name) {
            return Err(CoreError::SessionAlreadyExists(name));
        }

        let session_id = self.ids.next_session_id();
        let window_id = self.ids.next_window_id();
        let pane_id = self.ids.next_pane_id();

        let mut pane = Pane::new(pane_id, 0, width, height);
        pane.active = true;
        let window = Window::new(window_id, window_name, pane);

        let now = Utc::now();
        let session = Session {
            id: session_id,
            name: name.clone(),
            created_at: now,
            last_activity: now,
            is_idle: false,
            env: HashMap::new(),
            agent_team: false,
            worktree: None,
            root_path: None,
            use_claude_env: TriState::Unset,
            use_pane_env: TriState::Unset,
            windows: vec![window],
            active_window_id: window_id,
        };

        graph.sessions.insert(session_id, session);
        graph.name_index.insert(name.clone(), session_id);
        graph.register_pane(pane_id, session_id, window_id);
        drop(graph);

        self.bump_session_map();
        self.invalidate_snapshot_if_needed();
        info!(session = %name, %session_id, %window_id, %pane_id, "session created");
        Ok((name, session_id, window_id, pane_id))
    }

    pub fn remove_session(&self, name: &str) -> CoreResult<(SessionSnapshot, Vec<Arc<dyn Terminal>>)> {
        let name = name.trim_start_matches(':').to_string();
        let mut graph = self.graph.write().unwrap();
        let session_id = *graph
            .name_index
            .get(&name)
            .ok_or_else(|| CoreError::SessionNotFound(name.clone()))?;
        let mut session = graph.sessions.remove(&session_id).expect("indexed session must exist");
        graph.name_index.remove(&name);

        let mut terminals = Vec::new();
        for window in &mut session.windows {
            for pane in &mut window.panes {
                graph.pane_index.remove(&pane.id);
                if let Some(t) = pane.terminal.take() {
                    terminals.push(t);
                }
            }
        }
        let snapshot = SessionSnapshot::from(&session);
        drop(graph);

        self.bump_session_map();
        self.invalidate_snapshot_if_needed();
        info!(session = %name, "session removed");
        Ok((snapshot, terminals))
    }

    pub fn rename_session(&self, old: &str, new: &str) -> CoreResult<()> {
        let old = old.trim();
        let new = new.trim();
        if new.is_empty() {
            return Err(CoreError::EmptyName);
        }
        let mut graph = self.graph.write().unwrap();
        if old == new {
            if !graph.name_index.contains_key(old) {
                return Err(CoreError::SessionNotFound(old.to_string()));
            }
            return Ok(());
        }
        let session_id = *graph
            .name_index
            .get(old)
            .ok_or_else(|| CoreError::SessionNotFound(old.to_string()))?;
        if graph.name_index.contains_key(new) {
            return Err(CoreError::SessionAlreadyExists(new.to_string()));
        }
        graph.name_index.remove(old);
        graph.name_index.insert(new.to_string(), session_id);
        graph.sessions.get_mut(&session_id).unwrap().name = new.to_string();
        drop(graph);

        self.bump_generation();
        self.invalidate_snapshot_if_needed();
        Ok(())
    }

    pub fn get_session(&self, name: &str) -> Option<SessionSnapshot> {
        let graph = self.graph.read().unwrap();
        graph.session_by_name(name).map(SessionSnapshot::from)
    }

    pub fn list_sessions(&self) -> Vec<SessionSnapshot> {
        let graph = self.graph.read().unwrap();
        let mut sessions: Vec<&Session> = graph.sessions.values().collect();
        sessions.sort_by_key(|s| s.id.value());
        sessions.into_iter().map(SessionSnapshot::from).collect()
    }

    pub fn has_session(&self, name: &str) -> bool {
        let name = name.trim_start_matches(':');
        self.graph.read().unwrap().name_index.contains_key(name)
    }

    /// Generation-cached deep clone (spec.md §4.1.6).
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let generation = self.generation();
        if let Some(cached) = self.snapshot_cache.get_if_current(generation) {
            return cached;
        }
        let snaps = self.list_sessions();
        self.snapshot_cache.store(generation, snaps.clone());
        snaps
    }

    fn invalidate_snapshot_if_needed(&self) {
        // The cache is keyed on `generation`; nothing to do eagerly here,
        // the next `snapshot()` call will see the bumped generation and
        // rebuild. Kept as a named hook so callers reading the code see
        // where invalidation conceptually happens.
    }

    // -- target resolution ----------------------------------------------

    pub fn resolve_target(&self, target: &str, caller_pane_id: Option<PaneId>) -> CoreResult<PaneHandle> {
        {
            let graph = self.graph.read().unwrap();
            match graph.resolve_target(target, caller_pane_id)? {
                target::ResolveOutcome::Resolved(handle) => return Ok(handle),
                target::ResolveOutcome::NeedsRepair => {}
            }
        }
        // Double-checked upgrade: repair the stale active_window_id under
        // the write lock, then re-resolve from scratch (spec.md §4.1.1).
        let mut graph = self.graph.write().unwrap();
        let repaired = graph
            .sessions
            .values_mut()
            .fold(false, |acc, s| s.repair_active_window() || acc);
        if repaired {
            self.bump_generation();
        }
        match graph.resolve_target(target, caller_pane_id)? {
            target::ResolveOutcome::Resolved(handle) => Ok(handle),
            target::ResolveOutcome::NeedsRepair => Err(CoreError::Internal(format!(
                "active window repair did not converge for target {target}"
            ))),
        }
    }

    pub fn resolve_directional_pane(&self, caller_pane_id: PaneId, dir: Direction) -> CoreResult<PaneHandle> {
        let graph = self.graph.read().unwrap();
        graph.resolve_directional_pane(caller_pane_id, dir)
    }

    // -- pane/window mutation ---------------------------------------------

    pub fn split_pane(&self, target_id: PaneId, direction: SplitDirection) -> CoreResult<PaneId> {
        let mut graph = self.graph.write().unwrap();
        let (session_id, window_id) = *graph
            .pane_index
            .get(&target_id)
            .ok_or_else(|| CoreError::PaneNotFound(target_id.as_text()))?;
        let new_pane_id = self.ids.next_pane_id();
        let session = graph.sessions.get_mut(&session_id).unwrap();
        let window = session
            .windows
            .iter_mut()
            .find(|w| w.id == window_id)
            .ok_or_else(|| CoreError::NoParentWindow(target_id.as_text()))?;

        let (width, height) = window
            .find_pane_index(target_id)
            .map(|i| (window.panes[i].width, window.panes[i].height))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
        let new_pane = Pane::new(new_pane_id, window.panes.len(), width, height);
        window.panes.push(new_pane);
        window.set_active_by_id(new_pane_id);

        if !window.layout.split_leaf(target_id, new_pane_id, direction) {
            warn!(pane = %target_id, "split target missing from layout tree, rebuilding");
            window.layout = LayoutNode::rebuild_chain(&window.pane_ids())
                .ok_or_else(|| CoreError::Internal("layout rebuild failed".into()))?;
        }
        graph.register_pane(new_pane_id, session_id, window_id);
        drop(graph);

        self.bump_topology();
        Ok(new_pane_id)
    }

    pub fn kill_pane(&self, pane_id: PaneId) -> CoreResult<KillPaneOutcome> {
        let mut graph = self.graph.write().unwrap();
        let (session_id, window_id) = *graph
            .pane_index
            .get(&pane_id)
            .ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
        graph.pane_index.remove(&pane_id);

        let session = graph.sessions.get_mut(&session_id).unwrap();
        let session_name = session.name.clone();
        let window_idx = session.find_window_index(window_id).unwrap();
        let window = &mut session.windows[window_idx];
        let pane_slot = window.find_pane_index(pane_id).ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
        let removed = window.panes.remove(pane_slot);

        let outcome_terminal = removed.terminal;

        if window.panes.is_empty() {
            session.windows.remove(window_idx);
            if let Some(r) = session.repair_active_window() {
                let _ = r;
            }
            let window_destroyed = Some(window_id);
            let session_destroyed = session.windows.is_empty();
            let session_name_out = session_name.clone();

            if session_destroyed {
                graph.sessions.remove(&session_id);
                graph.name_index.remove(&session_name);
            }
            drop(graph);
            self.bump_session_map();
            info!(pane = %pane_id, session = %session_name_out, "last pane of window killed");
            return Ok(KillPaneOutcome {
                session_name: session_name_out,
                terminal: outcome_terminal,
                window_destroyed,
                session_destroyed,
                layout: None,
            });
        }

        if !window.layout.remove_leaf(pane_id) || !window.layout.leaf_set_matches(&window.pane_ids()) {
            warn!(pane = %pane_id, "layout remove inconsistent, rebuilding from pane order");
            window.layout = LayoutNode::rebuild_chain(&window.pane_ids())
                .ok_or_else(|| CoreError::Internal("layout rebuild failed".into()))?;
        }
        window.reindex();
        let layout = window.layout.clone();
        drop(graph);

        self.bump_topology();
        Ok(KillPaneOutcome {
            session_name,
            terminal: outcome_terminal,
            window_destroyed: None,
            session_destroyed: false,
            layout: Some(layout),
        })
    }

    pub fn swap_panes(&self, src: PaneId, dst: PaneId) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let (sid_a, wid_a) = *graph.pane_index.get(&src).ok_or_else(|| CoreError::PaneNotFound(src.as_text()))?;
        let (sid_b, wid_b) = *graph.pane_index.get(&dst).ok_or_else(|| CoreError::PaneNotFound(dst.as_text()))?;
        if sid_a != sid_b || wid_a != wid_b {
            return Err(CoreError::NotSameWindow(src.as_text(), dst.as_text()));
        }
        let session = graph.sessions.get_mut(&sid_a).unwrap();
        let window = session.windows.iter_mut().find(|w| w.id == wid_a).unwrap();
        let ia = window.find_pane_index(src).unwrap();
        let ib = window.find_pane_index(dst).unwrap();
        let active_id = window.active_pane().map(|p| p.id);
        window.panes.swap(ia, ib);
        window.reindex();
        if let Some(id) = active_id {
            window.set_active_by_id(id);
        }
        if !window.layout.leaf_set_matches(&window.pane_ids()) {
            window.layout = LayoutNode::rebuild_chain(&window.pane_ids())
                .ok_or_else(|| CoreError::Internal("layout rebuild failed".into()))?;
        } else {
            window.layout.swap_leaves(src, dst);
        }
        drop(graph);
        self.bump_topology();
        Ok(())
    }

    pub fn set_active_pane(&self, pane_id: PaneId) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let (sid, wid) = *graph.pane_index.get(&pane_id).ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
        let session = graph.sessions.get_mut(&sid).unwrap();
        let window = session
            .windows
            .iter_mut()
            .find(|w| w.id == wid)
            .ok_or_else(|| CoreError::NoParentWindow(pane_id.as_text()))?;
        if !window.set_active_by_id(pane_id) {
            return Err(CoreError::PaneNotFound(pane_id.as_text()));
        }
        session.active_window_id = wid;
        drop(graph);
        self.bump_topology();
        Ok(())
    }

    pub fn remove_window_by_id(&self, session_name: &str, window_id: WindowId) -> CoreResult<RemoveWindowOutcome> {
        let mut graph = self.graph.write().unwrap();
        let session_id = *graph
            .name_index
            .get(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let session = graph.sessions.get_mut(&session_id).unwrap();
        let idx = session
            .find_window_index(window_id)
            .ok_or_else(|| CoreError::WindowNotFound(window_id.to_string()))?;
        let mut window = session.windows.remove(idx);
        let mut terminals = Vec::new();
        for pane in &mut window.panes {
            graph.pane_index.remove(&pane.id);
            if let Some(t) = pane.terminal.take() {
                terminals.push(t);
            }
        }

        let repaired = session.repair_active_window().then_some(session.active_window_id);
        let session_destroyed = session.windows.is_empty();
        if session_destroyed {
            graph.sessions.remove(&session_id);
            graph.name_index.remove(session_name);
        }
        drop(graph);

        self.bump_session_map();
        Ok(RemoveWindowOutcome {
            terminals,
            session_destroyed,
            repaired_active_window: repaired,
        })
    }

    pub fn rename_window_by_id(&self, session_name: &str, window_id: WindowId, name: &str) -> CoreResult<usize> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::EmptyName);
        }
        let mut graph = self.graph.write().unwrap();
        let session = graph
            .session_by_name_mut(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let idx = session
            .find_window_index(window_id)
            .ok_or_else(|| CoreError::WindowNotFound(window_id.to_string()))?;
        session.windows[idx].name = name.to_string();
        drop(graph);
        self.bump_topology();
        Ok(idx)
    }

    /// Clones the pane's `Terminal` handle, releases the lock, then calls
    /// `resize` outside it; reacquires briefly to persist the new
    /// dimensions on success (spec.md §4.1.1 two-phase I/O,
    /// `ResizePane`).
    pub fn resize_pane(&self, pane_id: PaneId, cols: u16, rows: u16) -> CoreResult<()> {
        let terminal = {
            let graph = self.graph.read().unwrap();
            let pane = graph.find_pane(pane_id).ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
            pane.terminal.clone()
        };
        if let Some(terminal) = terminal {
            terminal.resize(cols, rows).map_err(|e| CoreError::Terminal(pane_id.as_text(), e.to_string()))?;
        }
        let mut graph = self.graph.write().unwrap();
        let pane = graph
            .find_pane_mut(pane_id)
            .ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
        pane.width = cols;
        pane.height = rows;
        drop(graph);
        self.bump_generation();
        Ok(())
    }

    pub fn rename_pane(&self, pane_id: PaneId, title: &str) -> CoreResult<String> {
        let title = title.trim().to_string();
        let mut graph = self.graph.write().unwrap();
        let session_name = graph
            .owning_session_name(pane_id)
            .ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
        let pane = graph.find_pane_mut(pane_id).unwrap();
        pane.title = title;
        drop(graph);
        self.bump_generation();
        Ok(session_name)
    }

    pub fn apply_layout_preset(&self, session_name: &str, window_id: WindowId, preset: LayoutPreset) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let session = graph
            .session_by_name_mut(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let idx = session
            .find_window_index(window_id)
            .ok_or_else(|| CoreError::WindowNotFound(window_id.to_string()))?;
        let window = &mut session.windows[idx];
        if window.panes.is_empty() {
            return Err(CoreError::NoPanes);
        }
        let ids = window.pane_ids();
        let layout = preset.build(&ids).ok_or(CoreError::NoValidPanes)?;
        window.layout = layout;
        drop(graph);
        self.bump_topology();
        Ok(())
    }

    /// Binds a freshly attached `Terminal` to `pane_id` (spec.md §4.2.4
    /// step 8, `SetPaneRuntime`). Assigned exactly once; a second call on
    /// the same pane is a logic error in the caller and is rejected.
    pub fn set_pane_runtime(&self, pane_id: PaneId, terminal: Arc<dyn Terminal>) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let pane = graph.find_pane_mut(pane_id).ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
        if pane.terminal.is_some() {
            return Err(CoreError::Internal(format!("pane {pane_id} already has a terminal")));
        }
        pane.terminal = Some(terminal);
        Ok(())
    }

    /// Records the environment resolved for a pane at creation time so a
    /// later split sees it as `inheritedEnv` (spec.md §4.2.3 step 2, "from
    /// the source pane").
    pub fn set_pane_env(&self, pane_id: PaneId, env: HashMap<String, String>) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let pane = graph.find_pane_mut(pane_id).ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
        pane.env = env;
        drop(graph);
        self.bump_generation();
        Ok(())
    }

    /// Two-phase write: clones the `Terminal` handle under a read lock,
    /// releases it, then writes (spec.md §4.1.1, §4.1.2 `WriteToPane`).
    pub fn write_to_pane(&self, pane_id: PaneId, data: &[u8]) -> CoreResult<()> {
        let terminal = {
            let graph = self.graph.read().unwrap();
            let pane = graph.find_pane(pane_id).ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
            pane.terminal.clone()
        };
        match terminal {
            Some(terminal) => terminal
                .write(data)
                .map_err(|e| CoreError::Terminal(pane_id.as_text(), e.to_string())),
            None => Err(CoreError::Terminal(pane_id.as_text(), "no terminal attached".into())),
        }
    }

    /// Clones the pane's `Terminal` handle for use outside the lock, e.g.
    /// to spawn a supervised read loop (spec.md §4.2.5).
    pub fn pane_terminal(&self, pane_id: PaneId) -> CoreResult<Arc<dyn Terminal>> {
        let graph = self.graph.read().unwrap();
        let pane = graph.find_pane(pane_id).ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
        pane.terminal.clone().ok_or_else(|| CoreError::Terminal(pane_id.as_text(), "no terminal attached".into()))
    }

    /// Writes to every pane in the window owning `any_pane_id`; returns the
    /// first error encountered but continues writing to the rest, logging
    /// subsequent errors (spec.md §4.1.2 `WriteToPanesInWindow`).
    pub fn write_to_panes_in_window(&self, any_pane_id: PaneId, data: &[u8]) -> CoreResult<()> {
        let pane_ids: Vec<PaneId> = {
            let graph = self.graph.read().unwrap();
            let (sid, wid) = *graph.pane_index.get(&any_pane_id).ok_or_else(|| CoreError::PaneNotFound(any_pane_id.as_text()))?;
            graph.sessions[&sid].windows.iter().find(|w| w.id == wid).unwrap().pane_ids()
        };
        let mut first_err = None;
        for id in pane_ids {
            if let Err(e) = self.write_to_pane(id, data) {
                warn!(pane = %id, error = %e, "write_to_panes_in_window: pane write failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // -- session metadata setters ----------------------------------------

    pub fn set_session_env(&self, session_name: &str, key: &str, value: &str) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let session = graph
            .session_by_name_mut(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let changed = session.env.get(key) != Some(&value.to_string());
        session.env.insert(key.to_string(), value.to_string());
        drop(graph);
        if changed {
            self.bump_generation();
        }
        Ok(())
    }

    pub fn unset_session_env(&self, session_name: &str, key: &str) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let session = graph
            .session_by_name_mut(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let changed = session.env.remove(key).is_some();
        drop(graph);
        if changed {
            self.bump_generation();
        }
        Ok(())
    }

    pub fn set_worktree_info(&self, session_name: &str, info: Option<WorktreeInfo>) -> CoreResult<()> {
        let normalised = info.and_then(|i| i.normalised());
        let mut graph = self.graph.write().unwrap();
        let session = graph
            .session_by_name_mut(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let changed = session.worktree != normalised;
        session.worktree = normalised;
        drop(graph);
        if changed {
            self.bump_generation();
        }
        Ok(())
    }

    pub fn set_root_path(&self, session_name: &str, path: Option<std::path::PathBuf>) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let session = graph
            .session_by_name_mut(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let changed = session.root_path != path;
        session.root_path = path;
        drop(graph);
        if changed {
            self.bump_generation();
        }
        Ok(())
    }

    pub fn set_agent_team(&self, session_name: &str, value: bool) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let session = graph
            .session_by_name_mut(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let changed = session.agent_team != value;
        session.agent_team = value;
        drop(graph);
        if changed {
            self.bump_generation();
        }
        Ok(())
    }

    pub fn set_use_claude_env(&self, session_name: &str, value: TriState) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let session = graph
            .session_by_name_mut(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let changed = session.use_claude_env != value;
        session.use_claude_env = value;
        drop(graph);
        if changed {
            self.bump_generation();
        }
        Ok(())
    }

    pub fn set_use_pane_env(&self, session_name: &str, value: TriState) -> CoreResult<()> {
        let mut graph = self.graph.write().unwrap();
        let session = graph
            .session_by_name_mut(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let changed = session.use_pane_env != value;
        session.use_pane_env = value;
        drop(graph);
        if changed {
            self.bump_generation();
        }
        Ok(())
    }

    pub fn get_pane_context_snapshot(&self, pane_id: PaneId) -> CoreResult<PaneContextSnapshot> {
        let graph = self.graph.read().unwrap();
        let (sid, wid) = *graph.pane_index.get(&pane_id).ok_or_else(|| CoreError::PaneNotFound(pane_id.as_text()))?;
        let session = &graph.sessions[&sid];
        let window = session.windows.iter().find(|w| w.id == wid).unwrap();
        let pane = window.panes.iter().find(|p| p.id == pane_id).unwrap();
        Ok(PaneContextSnapshot {
            session_id: sid,
            session_name: session.name.clone(),
            window_id: wid,
            layout: window.layout.clone(),
            env: pane.env.clone(),
            title: pane.title.clone(),
            session_work_dir: session.effective_work_dir(),
            pane_width: pane.width,
            pane_height: pane.height,
        })
    }

    // -- idle tracking (spec.md §4.1.7) ------------------------------------

    pub fn update_activity_by_pane_id(&self, pane_id: PaneId) -> bool {
        let mut graph = self.graph.write().unwrap();
        let Some((sid, _)) = graph.pane_index.get(&pane_id).copied() else {
            return false;
        };
        let session = graph.sessions.get_mut(&sid).unwrap();
        session.last_activity = Utc::now();
        let transitioned = session.is_idle;
        session.is_idle = false;
        drop(graph);
        if transitioned {
            self.bump_generation();
        }
        transitioned
    }

    pub fn check_idle_state(&self) {
        let now = Utc::now();
        let mut graph = self.graph.write().unwrap();
        let mut any_changed = false;
        for session in graph.sessions.values_mut() {
            if !session.is_idle {
                let elapsed = now.signed_duration_since(session.last_activity);
                if elapsed.to_std().unwrap_or_default() >= self.idle_threshold {
                    session.is_idle = true;
                    any_changed = true;
                }
            }
        }
        drop(graph);
        if any_changed {
            self.bump_generation();
        }
    }

    pub fn recommended_idle_check_interval(&self) -> Duration {
        let graph = self.graph.read().unwrap();
        let any_active = graph.sessions.values().any(|s| !s.is_idle);
        drop(graph);
        if any_active {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(5)
        }
    }

    // -- shutdown -----------------------------------------------------------

    /// Collects all terminals under the lock, clears the graph, then
    /// closes terminals outside it; close errors are aggregated and
    /// logged, never propagated (spec.md §4.1.2 `Close`).
    pub fn close(&self) {
        let terminals: Vec<Arc<dyn Terminal>> = {
            let mut graph = self.graph.write().unwrap();
            let mut terminals = Vec::new();
            for session in graph.sessions.values_mut() {
                for window in &mut session.windows {
                    for pane in &mut window.panes {
                        if let Some(t) = pane.terminal.take() {
                            terminals.push(t);
                        }
                    }
                }
            }
            graph.sessions.clear();
            graph.name_index.clear();
            graph.pane_index.clear();
            terminals
        };
        self.bump_session_map();
        let mut errors = 0;
        for terminal in terminals {
            if let Err(e) = terminal.close() {
                errors += 1;
                warn!(error = %e, "terminal close failed during shutdown");
            }
        }
        if errors > 0 {
            warn!(errors, "SessionManager::close: some terminals failed to close");
        }
    }
}

fn normalise_dims(w: i32, h: i32) -> (u16, u16) {
    let width = if w <= 0 { DEFAULT_WIDTH } else { w.min(u16::MAX as i32) as u16 };
    let height = if h <= 0 { DEFAULT_HEIGHT } else { h.min(u16::MAX as i32) as u16 };
    (width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layout::SplitDirection;

    #[test]
    fn create_session_defaults() {
        let mgr = SessionManager::new();
        let (name, _sid, _wid, pane_id) = mgr.create_session("", "", 0, 0).unwrap();
        assert_eq!(name, "0");
        let session = mgr.get_session(&name).unwrap();
        assert_eq!(session.windows.len(), 1);
        assert_eq!(session.windows[0].panes.len(), 1);
        assert_eq!(session.windows[0].panes[0].id, pane_id);
        assert_eq!(session.windows[0].panes[0].width, DEFAULT_WIDTH);
    }

    #[test]
    fn duplicate_session_name_rejected() {
        let mgr = SessionManager::new();
        mgr.create_session("s", "0", 80, 24).unwrap();
        let err = mgr.create_session("s", "0", 80, 24).unwrap_err();
        assert!(matches!(err, CoreError::SessionAlreadyExists(_)));
    }

    #[test]
    fn split_promotes_new_pane_to_active() {
        let mgr = SessionManager::new();
        let (_name, _sid, _wid, pane0) = mgr.create_session("s", "0", 80, 24).unwrap();
        let pane1 = mgr.split_pane(pane0, SplitDirection::Horizontal).unwrap();

        let session = mgr.get_session("s").unwrap();
        let window = &session.windows[0];
        assert_eq!(window.panes.len(), 2);
        let p0 = window.panes.iter().find(|p| p.id == pane0).unwrap();
        let p1 = window.panes.iter().find(|p| p.id == pane1).unwrap();
        assert!(p1.active);
        assert!(!p0.active);
        match &window.layout {
            LayoutNode::Split { direction, ratio, .. } => {
                assert_eq!(*direction, SplitDirection::Horizontal);
                assert_eq!(*ratio, 0.5);
            }
            _ => panic!("expected split layout"),
        }
    }

    #[test]
    fn kill_last_pane_removes_session() {
        let mgr = SessionManager::new();
        let (_name, _sid, _wid, pane0) = mgr.create_session("s", "0", 80, 24).unwrap();
        let outcome = mgr.kill_pane(pane0).unwrap();
        assert!(outcome.session_destroyed);
        assert!(!mgr.has_session("s"));
    }

    #[test]
    fn kill_one_of_many_preserves_session() {
        let mgr = SessionManager::new();
        let (_name, _sid, _wid, pane0) = mgr.create_session("s", "0", 80, 24).unwrap();
        let pane1 = mgr.split_pane(pane0, SplitDirection::Horizontal).unwrap();
        let pane2 = mgr.split_pane(pane1, SplitDirection::Vertical).unwrap();
        let outcome = mgr.kill_pane(pane1).unwrap();
        assert!(!outcome.session_destroyed);
        let session = mgr.get_session("s").unwrap();
        let ids: Vec<_> = session.windows[0].panes.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![pane0, pane2]);
    }

    #[test]
    fn generation_advances_on_mutation_not_on_idempotent_read() {
        let mgr = SessionManager::new();
        let before = mgr.generation();
        mgr.create_session("s", "0", 80, 24).unwrap();
        assert!(mgr.generation() > before);
        let after_create = mgr.generation();
        let _ = mgr.list_sessions();
        assert_eq!(mgr.generation(), after_create);
    }

    #[test]
    fn env_set_unset_roundtrip() {
        let mgr = SessionManager::new();
        mgr.create_session("s", "0", 80, 24).unwrap();
        mgr.set_session_env("s", "FOO", "bar").unwrap();
        assert_eq!(mgr.get_session("s").unwrap().env.get("FOO"), Some(&"bar".to_string()));
        mgr.unset_session_env("s", "FOO").unwrap();
        assert!(mgr.get_session("s").unwrap().env.get("FOO").is_none());
        // unset of an absent key is a no-op, not an error
        mgr.unset_session_env("s", "FOO").unwrap();
    }

    #[test]
    fn rename_session_noop_and_restore() {
        let mgr = SessionManager::new();
        mgr.create_session("a", "0", 80, 24).unwrap();
        mgr.rename_session("a", "a").unwrap();
        assert!(mgr.has_session("a"));
        mgr.rename_session("a", "b").unwrap();
        mgr.rename_session("b", "a").unwrap();
        assert!(mgr.has_session("a"));
    }

    #[test]
    fn effective_work_dir_prefers_worktree_over_root_path() {
        let mgr = SessionManager::new();
        mgr.create_session("s", "0", 80, 24).unwrap();

        let root = tempfile::TempDir::new().unwrap();
        mgr.set_root_path("s", Some(root.path().to_path_buf())).unwrap();

        let pane_id = mgr.get_session("s").unwrap().windows[0].panes[0].id;
        let ctx = mgr.get_pane_context_snapshot(pane_id).unwrap();
        assert_eq!(ctx.session_work_dir, Some(root.path().to_path_buf()));

        let worktree_dir = tempfile::TempDir::new().unwrap();
        mgr.set_worktree_info(
            "s",
            Some(WorktreeInfo {
                path: worktree_dir.path().to_string_lossy().into_owned(),
                repo_path: String::new(),
                branch: "feature".to_string(),
                base_branch: "main".to_string(),
                detached: false,
            }),
        )
        .unwrap();

        let ctx = mgr.get_pane_context_snapshot(pane_id).unwrap();
        assert_eq!(ctx.session_work_dir, Some(worktree_dir.path().to_path_buf()));
    }

    /// Exercises the multi-window scaffolding retained under the 1-window
    /// model (spec.md §9): no public command reaches a second window, so
    /// this injects one directly to prove `window_index` formats against
    /// the stable window ID rather than a position that shifts on removal.
    #[test]
    fn window_index_format_uses_stable_id_after_killing_first_window() {
        let mgr = SessionManager::new();
        let (_name, sid, wid0, _pane0) = mgr.create_session("s", "0", 80, 24).unwrap();

        let pane1_id = mgr.ids.next_pane_id();
        let window1_id = mgr.ids.next_window_id();
        let pane1 = Pane::new(pane1_id, 0, 80, 24);
        let window1 = Window::new(window1_id, "1".to_string(), pane1);
        {
            let mut graph = mgr.graph.write().unwrap();
            let session = graph.sessions.get_mut(&sid).unwrap();
            session.windows.push(window1);
            graph.register_pane(pane1_id, sid, window1_id);
        }

        let outcome = mgr.remove_window_by_id("s", wid0).unwrap();
        assert!(!outcome.session_destroyed);

        let expanded = mgr.expand_format_safe("#{window_index}", pane1_id);
        assert_eq!(expanded, window1_id.to_string());
        assert_eq!(expanded, "1");
    }
}
