//! End-to-end scenarios run through `CommandRouter::handle` with a mock
//! `Terminal` and a recording event emitter (spec.md §8 "Concrete
//! scenarios").

use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tmux_core::ipc::{FlagValue, Request};
use tmux_core::router::{AttachContext, CommandRouter};
use tmux_core::terminal::mock::{MockTerminal, RecordingEventEmitter};
use tmux_core::terminal::{EventEmitter, Terminal};

fn make_router() -> (CommandRouter, Arc<RecordingEventEmitter>) {
    let emitter = RecordingEventEmitter::new();
    let attach_fn: Box<dyn Fn(&AttachContext) -> std::io::Result<Arc<dyn Terminal>> + Send + Sync> =
        Box::new(|_ctx| Ok(MockTerminal::new() as Arc<dyn Terminal>));
    let router = CommandRouter::new(
        None,
        Some(emitter.clone() as Arc<dyn EventEmitter>),
        "",
        0,
        attach_fn,
    );
    (router, emitter)
}

fn req(command: &str, flags: &[(&str, FlagValue)], args: &[&str]) -> Request {
    Request {
        command: command.to_string(),
        flags: flags.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        args: args.iter().map(|s| s.to_string()).collect(),
        env: HashMap::new(),
        caller_pane: String::new(),
    }
}

fn req_with_env(command: &str, flags: &[(&str, FlagValue)], args: &[&str], env: HashMap<String, String>) -> Request {
    let mut r = req(command, flags, args);
    r.env = env;
    r
}

#[test]
fn split_promotes_new_pane_to_active() {
    let (router, _emitter) = make_router();
    router.handle(&req("new-session", &[("-s", FlagValue::Str("s".into()))], &[]));

    let resp = router.handle(&req("split-window", &[("-t", FlagValue::Str("s".into())), ("-h", FlagValue::Bool(true))], &[]));
    assert_eq!(resp.exit_code, 0);
    assert_eq!(resp.stdout, "%1\n");

    let session = router.manager().get_session("s").unwrap();
    let window = &session.windows[0];
    assert_eq!(window.panes.len(), 2);
    assert!(window.panes[1].active);
    assert!(!window.panes[0].active);
    match &window.layout {
        tmux_core::model::layout::LayoutNode::Split { direction, ratio, .. } => {
            assert_eq!(*direction, tmux_core::model::layout::SplitDirection::Horizontal);
            assert_eq!(*ratio, 0.5);
        }
        other => panic!("expected split layout, got {other:?}"),
    }
}

#[test]
fn dash_d_preserves_focus() {
    let (router, _emitter) = make_router();
    router.handle(&req("new-session", &[("-s", FlagValue::Str("s".into()))], &[]));

    let resp = router.handle(&req(
        "split-window",
        &[("-t", FlagValue::Str("s".into())), ("-h", FlagValue::Bool(true)), ("-d", FlagValue::Bool(true))],
        &[],
    ));
    assert_eq!(resp.stdout, "%1\n");

    let session = router.manager().get_session("s").unwrap();
    let window = &session.windows[0];
    assert!(window.panes[0].active);
    assert!(!window.panes[1].active);
}

#[test]
fn kill_last_pane_removes_session() {
    let (router, emitter) = make_router();
    router.handle(&req("new-session", &[("-s", FlagValue::Str("s".into()))], &[]));

    let resp = router.handle(&req("kill-pane", &[("-t", FlagValue::Str("s".into()))], &[]));
    assert_eq!(resp.exit_code, 0);
    assert!(emitter.names().contains(&"tmux:session-destroyed".to_string()));
    assert!(!router.manager().has_session("s"));
}

#[test]
fn kill_one_of_many_preserves_session_and_layout_direction() {
    let (router, emitter) = make_router();
    router.handle(&req("new-session", &[("-s", FlagValue::Str("s".into()))], &[]));
    router.handle(&req("split-window", &[("-t", FlagValue::Str("%0".into())), ("-h", FlagValue::Bool(true))], &[]));
    router.handle(&req("split-window", &[("-t", FlagValue::Str("%1".into()))], &[]));

    let resp = router.handle(&req("kill-pane", &[("-t", FlagValue::Str("%1".into()))], &[]));
    assert_eq!(resp.exit_code, 0);
    assert!(!router.manager().get_session("s").is_none());

    let session = router.manager().get_session("s").unwrap();
    let ids: Vec<_> = session.windows[0].panes.iter().map(|p| p.id.as_text()).collect();
    assert_eq!(ids, vec!["%0".to_string(), "%2".to_string()]);

    let events = emitter.events.lock().unwrap();
    let (_, payload) = events.iter().find(|(n, _)| n == "tmux:layout-changed").expect("layout-changed emitted");
    // %1 was split vertically off pane0's horizontal split; killing %1
    // collapses that inner split, leaving the outer horizontal direction
    // intact between the two survivors.
    assert_eq!(payload["layoutTree"]["Split"]["direction"], "Horizontal");
}

#[test]
fn blocked_keys_filtered_custom_var_passes_through() {
    let (router, emitter) = make_router();
    router.handle(&req("new-session", &[("-s", FlagValue::Str("s".into()))], &[]));
    // Flip the session into the flag-driven path so the blocked-key guard
    // in `resolveEnvForPaneCreation`'s shim layer is exercised.
    router.manager().set_use_pane_env("s", tmux_core::model::session::TriState::True).unwrap();

    let host_path = std::env::var("PATH").unwrap_or_default();
    let mut shim_env = HashMap::new();
    shim_env.insert("PATH".to_string(), "C:\\attacker".to_string());
    shim_env.insert("MY_VAR".to_string(), "ok".to_string());

    let resp = router.handle(&req_with_env(
        "split-window",
        &[("-t", FlagValue::Str("s".into()))],
        &[],
        shim_env,
    ));
    assert_eq!(resp.exit_code, 0);

    let events = emitter.events.lock().unwrap();
    let (_, payload) = events.iter().find(|(n, _)| n == "tmux:pane-created").expect("pane-created emitted");
    assert_eq!(payload["env"]["PATH"], host_path);
    assert_eq!(payload["env"]["MY_VAR"], "ok");
}

#[test]
fn new_window_inherits_flags_and_returns_empty_stdout() {
    let (router, emitter) = make_router();
    router.handle(&req("new-session", &[("-s", FlagValue::Str("p".into()))], &[]));
    router.manager().set_agent_team("p", true).unwrap();
    router
        .manager()
        .set_use_claude_env("p", tmux_core::model::session::TriState::True)
        .unwrap();
    router
        .manager()
        .set_use_pane_env("p", tmux_core::model::session::TriState::False)
        .unwrap();

    let resp = router.handle(&req(
        "new-window",
        &[("-t", FlagValue::Str("p".into())), ("-n", FlagValue::Str("c".into()))],
        &[],
    ));
    assert_eq!(resp.exit_code, 0);
    assert_eq!(resp.stdout, "");
    assert!(emitter.names().contains(&"tmux:session-created".to_string()));

    let child = router.manager().get_session("c").unwrap();
    assert!(child.agent_team);
    assert_eq!(child.use_claude_env, tmux_core::model::session::TriState::True);
    assert_eq!(child.use_pane_env, tmux_core::model::session::TriState::False);
}

#[test]
fn send_keys_translates_bootstrap_sequence_through_the_router() {
    // `new-session`'s initial pane never gets a terminal attached (only
    // `split-window`/`new-window` run the attach archetype), so capture the
    // terminal handed out for the split's new pane instead.
    let captured: Arc<std::sync::Mutex<Option<Arc<MockTerminal>>>> = Arc::new(std::sync::Mutex::new(None));
    let captured_for_closure = captured.clone();
    let emitter = RecordingEventEmitter::new();
    let attach_fn: Box<dyn Fn(&AttachContext) -> std::io::Result<Arc<dyn Terminal>> + Send + Sync> =
        Box::new(move |_ctx| {
            let term = MockTerminal::new();
            *captured_for_closure.lock().unwrap() = Some(term.clone());
            Ok(term as Arc<dyn Terminal>)
        });
    let router = CommandRouter::new(None, Some(emitter.clone() as Arc<dyn EventEmitter>), "", 0, attach_fn);
    router.handle(&req("new-session", &[("-s", FlagValue::Str("s".into()))], &[]));
    let split = router.handle(&req("split-window", &[("-t", FlagValue::Str("s".into()))], &[]));
    assert_eq!(split.stdout, "%1\n");

    let resp = router.handle(&req(
        "send-keys",
        &[("-t", FlagValue::Str("%1".into()))],
        &["echo", "Space", "ok", "Enter"],
    ));
    assert_eq!(resp.exit_code, 0);

    let term = captured.lock().unwrap().clone().unwrap();
    assert_eq!(term.writes.lock().unwrap().last().unwrap(), b"echo ok\r");
}

#[test]
fn split_window_emits_pane_renamed_for_title_copy() {
    let (router, emitter) = make_router();
    router.handle(&req("new-session", &[("-s", FlagValue::Str("s".into()))], &[]));
    router.manager().rename_pane(tmux_core::PaneId(0), "parent-title").unwrap();

    let resp = router.handle(&req("split-window", &[("-t", FlagValue::Str("s".into()))], &[]));
    assert_eq!(resp.exit_code, 0);

    let events = emitter.events.lock().unwrap();
    let (_, payload) = events.iter().find(|(n, _)| n == "tmux:pane-renamed").expect("pane-renamed emitted");
    assert_eq!(payload["paneId"], "%1");
    assert_eq!(payload["title"], "parent-title");
    assert_eq!(payload["sessionName"], "s");
}

#[test]
fn has_session_reports_hit_and_miss() {
    let (router, _emitter) = make_router();
    router.handle(&req("new-session", &[("-s", FlagValue::Str("s".into()))], &[]));

    let hit = router.handle(&req("has-session", &[("-t", FlagValue::Str("s".into()))], &[]));
    assert_eq!(hit.exit_code, 0);
    assert_eq!(hit.stdout, "");
    assert_eq!(hit.stderr, "");

    let miss = router.handle(&req("has-session", &[("-t", FlagValue::Str("nope".into()))], &[]));
    assert_eq!(miss.exit_code, 1);
    assert_eq!(miss.stderr, "");
}

#[test]
fn unknown_command_yields_exit_1() {
    let (router, _emitter) = make_router();
    let resp = router.handle(&req("bogus-command", &[], &[]));
    assert_eq!(resp.exit_code, 1);
    assert_eq!(resp.stderr, "unknown command: bogus-command\n");
}

#[test]
fn rollback_on_attach_failure_leaves_no_partial_pane() {
    let emitter = RecordingEventEmitter::new();
    let attach_fn: Box<dyn Fn(&AttachContext) -> std::io::Result<Arc<dyn Terminal>> + Send + Sync> =
        Box::new(|ctx| {
            if ctx.pane_id == tmux_core::PaneId(1) {
                Err(std::io::Error::other("spawn failed"))
            } else {
                Ok(MockTerminal::new() as Arc<dyn Terminal>)
            }
        });
    let router = CommandRouter::new(None, Some(emitter.clone() as Arc<dyn EventEmitter>), "", 0, attach_fn);
    router.handle(&req("new-session", &[("-s", FlagValue::Str("s".into()))], &[]));

    let resp = router.handle(&req("split-window", &[("-t", FlagValue::Str("s".into()))], &[]));
    assert_eq!(resp.exit_code, 1);

    let session = router.manager().get_session("s").unwrap();
    assert_eq!(session.windows[0].panes.len(), 1, "the failed split's pane must have been rolled back");
}
