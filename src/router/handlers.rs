//! Per-command handlers (spec.md §4.2.2) and the shared pane-creation
//! archetype (spec.md §4.2.4) used by `split-window` and `new-window`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use super::env as env_mod;
use super::{caller_pane, sendkeys, AttachContext, CommandRouter};
use crate::error::{CoreError, CoreResult};
use crate::events;
use crate::ids::PaneId;
use crate::ipc::{Request, Response};
use crate::manager::format::{expand_format, FormatSource, PaneFields, SessionFields, WindowFields};
use crate::model::layout::SplitDirection;
use crate::terminal::Terminal;

const DEFAULT_SESSION_FORMAT: &str = "#{session_name}";
const DEFAULT_WINDOW_FORMAT: &str = "#{window_index}: #{window_name}";
const DEFAULT_PANE_FORMAT: &str = "#{pane_index}: #{pane_id}#{pane_active_suffix}";
const DEFAULT_DISPLAY_MESSAGE_FORMAT: &str = "#{session_name}:#{window_index}.#{pane_index}";

fn run(f: impl FnOnce() -> CoreResult<Response>) -> Response {
    match f() {
        Ok(r) => r,
        Err(e) => Response::err(e.to_string()),
    }
}

fn require_flag<'a>(req: &'a Request, name: &'static str) -> CoreResult<&'a str> {
    req.flag_str(name).filter(|s| !s.is_empty()).ok_or(CoreError::MissingFlag(name))
}

fn join_lines(lines: Vec<String>) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        lines.join("\n") + "\n"
    }
}

fn close_terminals(terminals: Vec<Arc<dyn Terminal>>) {
    let mut errors = 0;
    for t in terminals {
        if let Err(e) = t.close() {
            errors += 1;
            warn!(error = %e, "terminal close failed");
        }
    }
    if errors > 0 {
        warn!(errors, "some terminals failed to close during this operation");
    }
}

/// Step 8 of the pane-creation archetype: invokes the attach hook, binds
/// the terminal to the pane, and spawns its supervised read loop
/// (spec.md §4.2.4, §4.2.5).
fn attach_and_spawn(
    router: &CommandRouter,
    pane_id: PaneId,
    work_dir: Option<PathBuf>,
    width: u16,
    height: u16,
    env: HashMap<String, String>,
) -> CoreResult<()> {
    let ctx = AttachContext { pane_id, work_dir, width, height, env };
    let terminal = router
        .attach_terminal(&ctx)
        .map_err(|e| CoreError::Terminal(pane_id.as_text(), e.to_string()))?;
    router.manager.set_pane_runtime(pane_id, terminal.clone())?;
    super::readloop::spawn_supervised_read_loop(pane_id, terminal, router.emitter.clone());
    Ok(())
}

// -- session commands -----------------------------------------------------

pub fn new_session(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let name = req.flag_str("-s").unwrap_or("");
        let window_name = req.flag_str("-n").unwrap_or("");
        let width = req.flag_int("-x").unwrap_or(0) as i32;
        let height = req.flag_int("-y").unwrap_or(0) as i32;
        let (name, sid, _wid, pane_id) = router.manager.create_session(name, window_name, width, height)?;
        let ctx = router.manager.get_pane_context_snapshot(pane_id)?;
        router.emit(events::SESSION_CREATED, events::session_created(&name, sid, pane_id, &ctx.layout));

        let stdout = if req.flag_bool("-P") {
            let format = req.flag_str("-F").unwrap_or(DEFAULT_SESSION_FORMAT);
            format!("{}\n", router.manager.expand_format_safe(format, pane_id))
        } else {
            format!("{name}\n")
        };
        Ok(Response::ok(stdout))
    })
}

pub fn has_session(router: &CommandRouter, req: &Request) -> Response {
    let name = match require_flag(req, "-t") {
        Ok(n) => n,
        Err(e) => return Response::err(e.to_string()),
    };
    if router.manager.has_session(name) {
        Response::ok_empty()
    } else {
        Response { exit_code: 1, stdout: String::new(), stderr: String::new() }
    }
}

pub fn kill_session(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let name = require_flag(req, "-t")?;
        let (snapshot, terminals) = router.manager.remove_session(name)?;
        router.emit(events::SESSION_DESTROYED, events::session_destroyed(&snapshot.name));
        router.notify_session_destroyed(&snapshot.name);
        close_terminals(terminals);
        Ok(Response::ok_empty())
    })
}

pub fn rename_session(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let old = require_flag(req, "-t")?;
        let new = req.args.first().map(|s| s.as_str()).ok_or(CoreError::EmptyName)?;
        router.manager.rename_session(old, new)?;
        router.emit(events::SESSION_RENAMED, events::session_renamed(old, new));
        router.notify_session_renamed(old, new);
        Ok(Response::ok_empty())
    })
}

pub fn attach_session(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let name = require_flag(req, "-t")?;
        if !router.manager.has_session(name) {
            return Err(CoreError::SessionNotFound(name.to_string()));
        }
        router.emit(events::ACTIVATE_WINDOW, serde_json::Value::Null);
        Ok(Response::ok_empty())
    })
}

pub fn list_sessions(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let format = req.flag_str("-F").unwrap_or(DEFAULT_SESSION_FORMAT);
        let sessions = router.manager.list_sessions();
        let lines: Vec<String> = sessions
            .iter()
            .map(|s| {
                let source = FormatSource {
                    session: Some(SessionFields {
                        id: s.id,
                        name: s.name.clone(),
                        window_count: s.windows.len(),
                        created_at: s.created_at,
                    }),
                    window: None,
                    pane: None,
                };
                expand_format(format, &source)
            })
            .collect();
        Ok(Response::ok(join_lines(lines)))
    })
}

pub fn show_environment(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let session_name = require_flag(req, "-t")?;
        let session = router
            .manager
            .get_session(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        match req.args.first() {
            Some(key) => match session.env.get(key) {
                Some(v) => Ok(Response::ok(format!("{key}={v}\n"))),
                None => Err(CoreError::UnknownVariable(key.clone())),
            },
            None => {
                let mut keys: Vec<&String> = session.env.keys().collect();
                keys.sort();
                let lines: Vec<String> = keys.iter().map(|k| format!("{k}={}", session.env[*k])).collect();
                Ok(Response::ok(join_lines(lines)))
            }
        }
    })
}

pub fn set_environment(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let session_name = require_flag(req, "-t")?;
        let key = req.args.first().ok_or(CoreError::MissingFlag("key"))?;
        if req.flag_bool("-u") {
            router.manager.unset_session_env(session_name, key)?;
        } else {
            let value = req.args.get(1).ok_or_else(|| CoreError::ValueRequired(key.clone()))?;
            router.manager.set_session_env(session_name, key, value)?;
        }
        Ok(Response::ok_empty())
    })
}

// -- window commands --------------------------------------------------------

pub fn list_windows(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let session_name = require_flag(req, "-t")?;
        let session = router
            .manager
            .get_session(session_name)
            .ok_or_else(|| CoreError::SessionNotFound(session_name.to_string()))?;
        let format = req.flag_str("-F").unwrap_or(DEFAULT_WINDOW_FORMAT);
        let lines: Vec<String> = session
            .windows
            .iter()
            .map(|w| {
                let source = FormatSource {
                    session: Some(SessionFields {
                        id: session.id,
                        name: session.name.clone(),
                        window_count: session.windows.len(),
                        created_at: session.created_at,
                    }),
                    window: Some(WindowFields {
                        id: w.id,
                        name: w.name.clone(),
                        pane_count: w.panes.len(),
                        active: w.id == session.active_window_id,
                    }),
                    pane: None,
                };
                expand_format(format, &source)
            })
            .collect();
        Ok(Response::ok(join_lines(lines)))
    })
}

pub fn rename_window(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let pane = router.manager.resolve_target(target, caller_pane(req))?;
        let ctx = router.manager.get_pane_context_snapshot(pane.id)?;
        let new_name = req.args.first().map(|s| s.as_str()).ok_or(CoreError::EmptyName)?;
        let idx = router.manager.rename_window_by_id(&ctx.session_name, ctx.window_id, new_name)?;
        router.emit(events::WINDOW_RENAMED, events::window_renamed(&ctx.session_name, idx, new_name));
        Ok(Response::ok_empty())
    })
}

pub fn kill_window(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let pane = router.manager.resolve_target(target, caller_pane(req))?;
        let ctx = router.manager.get_pane_context_snapshot(pane.id)?;
        let outcome = router.manager.remove_window_by_id(&ctx.session_name, ctx.window_id)?;
        if outcome.session_destroyed {
            router.emit(events::SESSION_DESTROYED, events::session_destroyed(&ctx.session_name));
            router.notify_session_destroyed(&ctx.session_name);
        } else {
            router.emit(events::WINDOW_DESTROYED, events::window_destroyed(&ctx.session_name, ctx.window_id));
        }
        close_terminals(outcome.terminals);
        Ok(Response::ok_empty())
    })
}

pub fn select_window(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let pane = router.manager.resolve_target(target, caller_pane(req))?;
        router.manager.set_active_pane(pane.id)?;
        Ok(Response::ok_empty())
    })
}

pub fn activate_window(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let _pane = router.manager.resolve_target(target, caller_pane(req))?;
        router.emit(events::ACTIVATE_WINDOW, serde_json::Value::Null);
        Ok(Response { exit_code: 0, stdout: "ok\n".to_string(), stderr: String::new() })
    })
}

// -- pane commands ----------------------------------------------------------

pub fn select_pane(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let pane = router.manager.resolve_target(target, caller_pane(req))?;
        router.manager.set_active_pane(pane.id)?;
        let ctx = router.manager.get_pane_context_snapshot(pane.id)?;
        router.emit(events::PANE_FOCUSED, events::pane_focused(&ctx.session_name, pane.id));
        Ok(Response::ok_empty())
    })
}

pub fn resize_pane(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let pane = router.manager.resolve_target(target, caller_pane(req))?;
        let cols = req.flag_int("-x").map(|v| v as u16).unwrap_or(pane.width);
        let rows = req.flag_int("-y").map(|v| v as u16).unwrap_or(pane.height);
        router.manager.resize_pane(pane.id, cols, rows)?;
        Ok(Response::ok_empty())
    })
}

pub fn kill_pane(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let pane = router.manager.resolve_target(target, caller_pane(req))?;
        let outcome = router.manager.kill_pane(pane.id)?;
        if outcome.session_destroyed {
            router.emit(events::SESSION_DESTROYED, events::session_destroyed(&outcome.session_name));
            router.notify_session_destroyed(&outcome.session_name);
        } else if let Some(wid) = outcome.window_destroyed {
            router.emit(events::WINDOW_DESTROYED, events::window_destroyed(&outcome.session_name, wid));
        } else if let Some(layout) = &outcome.layout {
            router.emit(events::LAYOUT_CHANGED, events::layout_changed(&outcome.session_name, layout));
        }
        if let Some(terminal) = outcome.terminal {
            if let Err(e) = terminal.close() {
                warn!(error = %e, "terminal close failed during kill-pane");
            }
        }
        Ok(Response::ok_empty())
    })
}

pub fn send_keys(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let pane = router.manager.resolve_target(target, caller_pane(req))?;
        let bytes = sendkeys::translate_send_keys(&req.args);
        router.manager.write_to_pane(pane.id, &bytes)?;
        Ok(Response::ok_empty())
    })
}

pub fn list_panes(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let pane = router.manager.resolve_target(target, caller_pane(req))?;
        let ctx = router.manager.get_pane_context_snapshot(pane.id)?;
        let session = router
            .manager
            .get_session(&ctx.session_name)
            .ok_or_else(|| CoreError::SessionNotFound(ctx.session_name.clone()))?;
        let window = session
            .windows
            .iter()
            .find(|w| w.id == ctx.window_id)
            .ok_or_else(|| CoreError::WindowNotFound(ctx.window_id.to_string()))?;
        let format = req.flag_str("-F").unwrap_or(DEFAULT_PANE_FORMAT);
        let lines: Vec<String> = window
            .panes
            .iter()
            .map(|p| {
                let source = FormatSource {
                    session: Some(SessionFields {
                        id: session.id,
                        name: session.name.clone(),
                        window_count: session.windows.len(),
                        created_at: session.created_at,
                    }),
                    window: Some(WindowFields {
                        id: window.id,
                        name: window.name.clone(),
                        pane_count: window.panes.len(),
                        active: window.id == session.active_window_id,
                    }),
                    pane: Some(PaneFields { id: p.id, index: p.index, width: p.width, height: p.height, active: p.active }),
                };
                expand_format(format, &source)
            })
            .collect();
        Ok(Response::ok(join_lines(lines)))
    })
}

pub fn display_message(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let pane = router.manager.resolve_target(target, caller_pane(req))?;
        let format = req.args.first().map(|s| s.as_str()).unwrap_or(DEFAULT_DISPLAY_MESSAGE_FORMAT);
        let expanded = router.manager.expand_format_safe(format, pane.id);
        Ok(Response::ok(format!("{expanded}\n")))
    })
}

// -- pane creation archetype (spec.md §4.2.4) --------------------------------

pub fn split_window(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let target = req.flag_str("-t").unwrap_or("");
        let source_pane = router.manager.resolve_target(target, caller_pane(req))?;
        let src_ctx = router.manager.get_pane_context_snapshot(source_pane.id)?;
        let direction = if req.flag_bool("-h") { SplitDirection::Horizontal } else { SplitDirection::Vertical };

        let new_pane_id = router.manager.split_pane(source_pane.id, direction)?;

        let layout = match router.manager.get_pane_context_snapshot(new_pane_id) {
            Ok(c) => c.layout,
            Err(e) => {
                let _ = router.manager.kill_pane(new_pane_id);
                return Err(e);
            }
        };

        if req.flag_bool("-d") {
            // `SplitPane` made the new pane active; `-d` restores focus to
            // the pane the split was issued from.
            router.manager.set_active_pane(source_pane.id)?;
        }

        let session = router
            .manager
            .get_session(&src_ctx.session_name)
            .ok_or_else(|| CoreError::SessionNotFound(src_ctx.session_name.clone()))?;

        let host_env: HashMap<String, String> = std::env::vars().collect();
        let pane_env_snapshot = router.pane_env.snapshot();
        let claude_env_snapshot = router.claude_env.snapshot();
        let tmux_internal = env_mod::tmux_internal_keys(
            &router.pipe_name,
            router.host_pid,
            session.id.value(),
            &new_pane_id.as_text(),
            std::env::var("USER").ok().as_deref(),
        );
        let pane_ctx = env_mod::PaneEnvContext {
            use_claude_env: session.use_claude_env,
            use_pane_env: session.use_pane_env,
            claude_env: &claude_env_snapshot,
            pane_env: &pane_env_snapshot,
            inherited_env: &src_ctx.env,
            shim_env: &req.env,
            tmux_internal: &tmux_internal,
        };
        let resolved_env = env_mod::resolve_env_for_pane_creation(&host_env, &pane_ctx);
        if let Err(e) = router.manager.set_pane_env(new_pane_id, resolved_env.clone()) {
            let _ = router.manager.kill_pane(new_pane_id);
            return Err(e);
        }

        let work_dir = req.flag_str("-c").map(PathBuf::from).or_else(|| src_ctx.session_work_dir.clone());

        if let Err(e) = attach_and_spawn(router, new_pane_id, work_dir, src_ctx.pane_width, src_ctx.pane_height, resolved_env.clone()) {
            let _ = router.manager.kill_pane(new_pane_id);
            return Err(e);
        }

        match router.rename_pane(new_pane_id, &src_ctx.title) {
            Ok(()) => router.emit(events::PANE_RENAMED, events::pane_renamed(&src_ctx.session_name, new_pane_id, &src_ctx.title)),
            Err(e) => warn!(pane = %new_pane_id, error = %e, "split-window: best-effort title copy failed"),
        }

        if !req.args.is_empty() {
            let mut tokens = req.args.clone();
            tokens.push("Enter".to_string());
            let bytes = sendkeys::translate_send_keys(&tokens);
            if let Err(e) = router.manager.write_to_pane(new_pane_id, &bytes) {
                warn!(pane = %new_pane_id, error = %e, "split-window: best-effort send-keys bootstrap failed");
            }
        }

        router.emit(events::PANE_CREATED, events::pane_created(&src_ctx.session_name, new_pane_id, &resolved_env, &layout));
        router.emit(events::LAYOUT_CHANGED, events::layout_changed(&src_ctx.session_name, &layout));

        let stdout = if req.flag_bool("-P") {
            let format = req.flag_str("-F").unwrap_or("#{pane_id}");
            format!("{}\n", router.manager.expand_format_safe(format, new_pane_id))
        } else {
            format!("{}\n", new_pane_id.as_text())
        };
        Ok(Response::ok(stdout))
    })
}

pub fn new_window(router: &CommandRouter, req: &Request) -> Response {
    run(|| {
        let parent_target = req.flag_str("-t").unwrap_or("");
        let parent_pane = router.manager.resolve_target(parent_target, caller_pane(req))?;
        let parent_ctx = router.manager.get_pane_context_snapshot(parent_pane.id)?;

        let child_name = require_flag(req, "-n")?;
        if router.manager.has_session(child_name) {
            return Err(CoreError::SessionAlreadyExists(child_name.to_string()));
        }

        let (child_name, child_sid, _child_wid, child_pane_id) = router.manager.create_session(
            child_name,
            "0",
            parent_ctx.pane_width as i32,
            parent_ctx.pane_height as i32,
        )?;

        let layout = match router.manager.get_pane_context_snapshot(child_pane_id) {
            Ok(c) => c.layout,
            Err(e) => {
                let _ = router.manager.remove_session(&child_name);
                return Err(e);
            }
        };

        // Step 5: copy session flags from parent via a single helper so no
        // flag is ever forgotten.
        if let Some(parent_session) = router.get_session_for_new_window(&parent_ctx.session_name) {
            let _ = router.manager.set_agent_team(&child_name, parent_session.agent_team);
            let _ = router.manager.set_use_claude_env(&child_name, parent_session.use_claude_env);
            let _ = router.manager.set_use_pane_env(&child_name, parent_session.use_pane_env);
        }

        let child_session = router
            .manager
            .get_session(&child_name)
            .ok_or_else(|| CoreError::SessionNotFound(child_name.clone()))?;

        let host_env: HashMap<String, String> = std::env::vars().collect();
        let pane_env_snapshot = router.pane_env.snapshot();
        let claude_env_snapshot = router.claude_env.snapshot();
        let tmux_internal = env_mod::tmux_internal_keys(
            &router.pipe_name,
            router.host_pid,
            child_sid.value(),
            &child_pane_id.as_text(),
            std::env::var("USER").ok().as_deref(),
        );
        let pane_ctx = env_mod::PaneEnvContext {
            use_claude_env: child_session.use_claude_env,
            use_pane_env: child_session.use_pane_env,
            claude_env: &claude_env_snapshot,
            pane_env: &pane_env_snapshot,
            inherited_env: &parent_ctx.env,
            shim_env: &req.env,
            tmux_internal: &tmux_internal,
        };
        let resolved_env = env_mod::resolve_env_for_pane_creation(&host_env, &pane_ctx);
        if let Err(e) = router.manager.set_pane_env(child_pane_id, resolved_env.clone()) {
            let _ = router.manager.remove_session(&child_name);
            return Err(e);
        }

        // Only `-c` seeds a working directory; step 5 does not copy
        // root-path/worktree state onto the new session.
        let work_dir = req.flag_str("-c").map(PathBuf::from);

        if let Err(e) = attach_and_spawn(router, child_pane_id, work_dir, parent_ctx.pane_width, parent_ctx.pane_height, resolved_env.clone()) {
            let _ = router.manager.remove_session(&child_name);
            return Err(e);
        }

        match router.rename_pane(child_pane_id, &parent_ctx.title) {
            Ok(()) => router.emit(events::PANE_RENAMED, events::pane_renamed(&child_name, child_pane_id, &parent_ctx.title)),
            Err(e) => warn!(pane = %child_pane_id, error = %e, "new-window: best-effort title copy failed"),
        }

        if !req.args.is_empty() {
            let mut tokens = req.args.clone();
            tokens.push("Enter".to_string());
            let bytes = sendkeys::translate_send_keys(&tokens);
            if let Err(e) = router.manager.write_to_pane(child_pane_id, &bytes) {
                warn!(pane = %child_pane_id, error = %e, "new-window: best-effort send-keys bootstrap failed");
            }
        }

        router.emit(events::SESSION_CREATED, events::session_created(&child_name, child_sid, child_pane_id, &layout));
        router.emit(events::PANE_FOCUSED, events::pane_focused(&child_name, child_pane_id));

        let stdout = if req.flag_bool("-P") {
            let format = req.flag_str("-F").unwrap_or(DEFAULT_SESSION_FORMAT);
            format!("{}\n", router.manager.expand_format_safe(format, child_pane_id))
        } else {
            String::new()
        };
        Ok(Response::ok(stdout))
    })
}
