//! Command dispatch surface on top of [`crate::manager::SessionManager`]
//! (spec.md §4.2).

pub mod env;
pub mod handlers;
pub mod readloop;
pub mod sendkeys;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::error::CoreResult;
use crate::ids::PaneId;
use crate::ipc::{Request, Response};
use crate::manager::{SessionManager, SessionSnapshot};
use crate::terminal::{EventEmitter, NullEventEmitter, Terminal};

/// Everything [`CommandRouter::default_attach_terminal`] and the pane
/// creation archetype need to bring a new pane's `Terminal` to life.
pub struct AttachContext {
    pub pane_id: PaneId,
    pub work_dir: Option<PathBuf>,
    pub width: u16,
    pub height: u16,
    pub env: std::collections::HashMap<String, String>,
}

pub type AttachTerminalFn = Box<dyn Fn(&AttachContext) -> std::io::Result<Arc<dyn Terminal>> + Send + Sync>;
pub type RenamePaneFn = Box<dyn Fn(&SessionManager, PaneId, &str) -> CoreResult<()> + Send + Sync>;
pub type GetSessionForNewWindowFn = Box<dyn Fn(&SessionManager, &str) -> Option<SessionSnapshot> + Send + Sync>;

fn default_rename_pane_fn() -> RenamePaneFn {
    Box::new(|mgr, pane_id, title| mgr.rename_pane(pane_id, title).map(|_| ()))
}

fn default_get_session_for_new_window_fn() -> GetSessionForNewWindowFn {
    Box::new(|mgr, name| mgr.get_session(name))
}

/// Dispatches the fixed command catalogue (spec.md §4.2.2) against a
/// [`SessionManager`], translating graph mutations into IPC
/// [`Request`]/[`Response`] pairs and emitting UI-facing events.
///
/// Three independent locks guard the three option fields that can be
/// updated after construction (`shim_available`, `pane_env`,
/// `claude_env`'s internal lock) — they are never held together (spec.md
/// §5).
pub struct CommandRouter {
    pub(crate) manager: Arc<SessionManager>,
    pub(crate) emitter: Arc<dyn EventEmitter>,
    pub(crate) pipe_name: String,
    pub(crate) host_pid: u32,
    shim_mu: RwLock<bool>,
    pub(crate) pane_env: env::CowEnvMap,
    pub(crate) claude_env: env::CowEnvMap,
    on_session_destroyed: RwLock<Option<Box<dyn Fn(&str) + Send + Sync>>>,
    on_session_renamed: RwLock<Option<Box<dyn Fn(&str, &str) + Send + Sync>>>,
    rename_pane_fn: RwLock<RenamePaneFn>,
    attach_terminal_fn: RwLock<AttachTerminalFn>,
    get_session_for_new_window_fn: RwLock<GetSessionForNewWindowFn>,
}

impl CommandRouter {
    /// Construction defaults (spec.md §4.2.1): `None` manager gets a fresh
    /// empty one, `None` emitter becomes a no-op sink, an empty pipe name
    /// falls back to a platform default, and a non-positive `host_pid`
    /// becomes the current process ID.
    pub fn new(
        manager: Option<Arc<SessionManager>>,
        emitter: Option<Arc<dyn EventEmitter>>,
        pipe_name: impl Into<String>,
        host_pid: i64,
        attach_terminal_fn: AttachTerminalFn,
    ) -> Self {
        let pipe_name = pipe_name.into();
        let pipe_name = if pipe_name.is_empty() { default_pipe_name() } else { pipe_name };
        let host_pid = if host_pid <= 0 { std::process::id() } else { host_pid as u32 };

        CommandRouter {
            manager: manager.unwrap_or_else(|| Arc::new(SessionManager::new())),
            emitter: emitter.unwrap_or_else(|| Arc::new(NullEventEmitter)),
            pipe_name,
            host_pid,
            shim_mu: RwLock::new(false),
            pane_env: env::CowEnvMap::new(),
            claude_env: env::CowEnvMap::new(),
            on_session_destroyed: RwLock::new(None),
            on_session_renamed: RwLock::new(None),
            rename_pane_fn: RwLock::new(default_rename_pane_fn()),
            attach_terminal_fn: RwLock::new(attach_terminal_fn),
            get_session_for_new_window_fn: RwLock::new(default_get_session_for_new_window_fn()),
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn set_shim_available(&self, available: bool) {
        *self.shim_mu.write().unwrap() = available;
    }

    pub fn shim_available(&self) -> bool {
        *self.shim_mu.read().unwrap()
    }

    pub fn update_pane_env(&self, entries: &std::collections::HashMap<String, String>) {
        self.pane_env.update(entries);
    }

    pub fn update_claude_env(&self, entries: &std::collections::HashMap<String, String>) {
        self.claude_env.update(entries);
    }

    pub fn on_session_destroyed(&self, cb: Box<dyn Fn(&str) + Send + Sync>) {
        *self.on_session_destroyed.write().unwrap() = Some(cb);
    }

    pub fn on_session_renamed(&self, cb: Box<dyn Fn(&str, &str) + Send + Sync>) {
        *self.on_session_renamed.write().unwrap() = Some(cb);
    }

    pub fn set_rename_pane_fn(&self, f: RenamePaneFn) {
        *self.rename_pane_fn.write().unwrap() = f;
    }

    pub fn set_attach_terminal_fn(&self, f: AttachTerminalFn) {
        *self.attach_terminal_fn.write().unwrap() = f;
    }

    pub fn set_get_session_for_new_window_fn(&self, f: GetSessionForNewWindowFn) {
        *self.get_session_for_new_window_fn.write().unwrap() = f;
    }

    fn rename_pane(&self, pane_id: PaneId, title: &str) -> CoreResult<()> {
        (self.rename_pane_fn.read().unwrap())(&self.manager, pane_id, title)
    }

    fn attach_terminal(&self, ctx: &AttachContext) -> std::io::Result<Arc<dyn Terminal>> {
        (self.attach_terminal_fn.read().unwrap())(ctx)
    }

    fn get_session_for_new_window(&self, name: &str) -> Option<SessionSnapshot> {
        (self.get_session_for_new_window_fn.read().unwrap())(&self.manager, name)
    }

    fn notify_session_destroyed(&self, name: &str) {
        if let Some(cb) = self.on_session_destroyed.read().unwrap().as_ref() {
            cb(name);
        }
    }

    fn notify_session_renamed(&self, old: &str, new: &str) {
        if let Some(cb) = self.on_session_renamed.read().unwrap().as_ref() {
            cb(old, new);
        }
    }

    fn emit(&self, name: &str, payload: serde_json::Value) {
        self.emitter.emit(name, payload);
    }

    /// Dispatches `req` to its handler (spec.md §4.2.2). An unrecognised
    /// command yields exit code 1 with `unknown command: <name>`.
    pub fn handle(&self, req: &Request) -> Response {
        match req.command.as_str() {
            "new-session" => handlers::new_session(self, req),
            "has-session" => handlers::has_session(self, req),
            "split-window" => handlers::split_window(self, req),
            "send-keys" => handlers::send_keys(self, req),
            "select-pane" => handlers::select_pane(self, req),
            "list-sessions" => handlers::list_sessions(self, req),
            "kill-session" => handlers::kill_session(self, req),
            "list-panes" => handlers::list_panes(self, req),
            "display-message" => handlers::display_message(self, req),
            "activate-window" => handlers::activate_window(self, req),
            "attach-session" => handlers::attach_session(self, req),
            "kill-pane" => handlers::kill_pane(self, req),
            "rename-session" => handlers::rename_session(self, req),
            "resize-pane" => handlers::resize_pane(self, req),
            "show-environment" => handlers::show_environment(self, req),
            "set-environment" => handlers::set_environment(self, req),
            "list-windows" => handlers::list_windows(self, req),
            "rename-window" => handlers::rename_window(self, req),
            "new-window" => handlers::new_window(self, req),
            "kill-window" => handlers::kill_window(self, req),
            "select-window" => handlers::select_window(self, req),
            other => {
                warn!(command = other, "unknown command");
                Response::err(format!("unknown command: {other}"))
            }
        }
    }
}

fn default_pipe_name() -> String {
    if cfg!(windows) {
        r"\\.\pipe\tmux-core-default".to_string()
    } else {
        "/tmp/tmux-core-default.sock".to_string()
    }
}

fn caller_pane(req: &Request) -> Option<PaneId> {
    if req.caller_pane.is_empty() {
        None
    } else {
        PaneId::parse_text(&req.caller_pane)
    }
}
