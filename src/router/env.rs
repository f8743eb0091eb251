//! Pane-creation environment resolution pipeline (spec.md §4.2.3).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::model::session::TriState;

/// Case-insensitive set of environment keys never allowed to flow from
/// untrusted sources into a pane (spec.md §4.2.3). Kept as a function
/// rather than a `static` so a guard test can assert it against a second,
/// independently transcribed copy without risking them silently drifting
/// apart via shared state.
pub fn blocked_keys() -> &'static [&'static str] {
    &[
        "PATH",
        "PATHEXT",
        "COMSPEC",
        "SYSTEMROOT",
        "WINDIR",
        "SYSTEMDRIVE",
        "APPDATA",
        "LOCALAPPDATA",
        "PSMODULEPATH",
        "TEMP",
        "TMP",
        "USERPROFILE",
    ]
}

fn is_blocked(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    blocked_keys().iter().any(|b| *b == upper)
}

/// Drops blocked keys from `env` (case-insensitive), in place.
pub fn filter_blocked(env: &mut HashMap<String, String>) {
    env.retain(|k, _| !is_blocked(k));
}

const MAX_VALUE_LEN: usize = 8192;

/// Defence-in-depth entry sanitiser (spec.md §4.2.3): rejects keys with
/// `=`, a null byte, or that are empty/whitespace-only; strips null bytes
/// from values; truncates values at 8192 bytes. Returns `None` when the
/// entry must be dropped entirely.
pub fn sanitize_custom_environment_entry(key: &str, value: &str) -> Option<(String, String)> {
    if key.trim().is_empty() || key.contains('=') || key.contains('\0') {
        return None;
    }
    let mut cleaned: String = value.chars().filter(|&c| c != '\0').collect();
    if cleaned.len() > MAX_VALUE_LEN {
        cleaned.truncate(MAX_VALUE_LEN);
    }
    Some((key.to_string(), cleaned))
}

fn sanitize_map(env: &HashMap<String, String>) -> HashMap<String, String> {
    env.iter()
        .filter_map(|(k, v)| sanitize_custom_environment_entry(k, v))
        .collect()
}

/// Tmux-internal keys overlaid unconditionally on every pane (spec.md §6).
pub fn tmux_internal_keys(
    pipe_name: &str,
    host_pid: u32,
    session_id: u64,
    pane_id: &str,
    host_user: Option<&str>,
) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let go_tmux = format!("{pipe_name},{host_pid},{session_id}");
    out.insert("GO_TMUX".to_string(), go_tmux.clone());
    out.insert("GO_TMUX_PANE".to_string(), pane_id.to_string());
    out.insert("TMUX".to_string(), go_tmux);
    out.insert("TMUX_PANE".to_string(), pane_id.to_string());
    if let Some(user) = host_user {
        out.insert("GO_TMUX_USER".to_string(), user.to_string());
    }
    out
}

/// Copy-on-write map: `update` swaps in a freshly built map under a
/// dedicated lock; `view`/`snapshot` read the current pointer (spec.md
/// §4.2.3, §9).
#[derive(Default)]
pub struct CowEnvMap {
    inner: RwLock<Arc<HashMap<String, String>>>,
}

impl CowEnvMap {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Arc::new(HashMap::new())) }
    }

    /// Replaces the whole map with a deep copy of `entries`.
    pub fn update(&self, entries: &HashMap<String, String>) {
        let mut guard = self.inner.write().unwrap();
        *guard = Arc::new(entries.clone());
    }

    /// Current pointer; callers must not mutate through it.
    pub fn view(&self) -> Arc<HashMap<String, String>> {
        self.inner.read().unwrap().clone()
    }

    /// Deep copy for callers that intend to mutate their own copy.
    pub fn snapshot(&self) -> HashMap<String, String> {
        (*self.inner.read().unwrap()).clone()
    }
}

/// Parameters the router has on hand when funnelling a pane creation
/// through `resolveEnvForPaneCreation` (spec.md §4.2.3).
pub struct PaneEnvContext<'a> {
    pub use_claude_env: TriState,
    pub use_pane_env: TriState,
    pub claude_env: &'a HashMap<String, String>,
    pub pane_env: &'a HashMap<String, String>,
    pub inherited_env: &'a HashMap<String, String>,
    pub shim_env: &'a HashMap<String, String>,
    pub tmux_internal: &'a HashMap<String, String>,
}

/// Resolves the final environment map for a freshly created pane
/// (spec.md §4.2.3). `host_env` is the base; every layer merges on top.
pub fn resolve_env_for_pane_creation(
    host_env: &HashMap<String, String>,
    ctx: &PaneEnvContext,
) -> HashMap<String, String> {
    let mut merged = host_env.clone();

    if !ctx.use_claude_env.is_set() && !ctx.use_pane_env.is_set() {
        // Legacy mode.
        let mut combined = ctx.inherited_env.clone();
        for (k, v) in ctx.shim_env {
            combined.insert(k.clone(), v.clone());
        }
        filter_blocked(&mut combined);
        for (k, v) in sanitize_map(&combined) {
            merged.insert(k, v);
        }
        for (k, v) in ctx.pane_env {
            merged.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in ctx.tmux_internal {
            merged.insert(k.clone(), v.clone());
        }
        return merged;
    }

    let use_claude_env = ctx.use_claude_env.as_bool(false);
    let use_pane_env = ctx.use_pane_env.as_bool(true);

    if use_claude_env {
        for (k, v) in ctx.claude_env {
            merged.insert(k.clone(), v.clone());
        }
    }

    let inherited = sanitize_map(&{
        let mut m = ctx.inherited_env.clone();
        filter_blocked(&mut m);
        m
    });
    for (k, v) in inherited {
        merged.insert(k, v);
    }

    if use_pane_env {
        if use_claude_env {
            for (k, v) in ctx.pane_env {
                merged.insert(k.clone(), v.clone());
            }
        } else {
            for (k, v) in ctx.pane_env {
                merged.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
    }

    let shim = sanitize_map(&{
        let mut m = ctx.shim_env.clone();
        filter_blocked(&mut m);
        m
    });
    for (k, v) in shim {
        merged.insert(k, v);
    }

    for (k, v) in ctx.tmux_internal {
        merged.insert(k.clone(), v.clone());
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_key_guard_matches_transcribed_list() {
        let transcribed = [
            "PATH",
            "PATHEXT",
            "COMSPEC",
            "SYSTEMROOT",
            "WINDIR",
            "SYSTEMDRIVE",
            "APPDATA",
            "LOCALAPPDATA",
            "PSMODULEPATH",
            "TEMP",
            "TMP",
            "USERPROFILE",
        ];
        assert_eq!(blocked_keys(), &transcribed);
    }

    #[test]
    fn sanitize_rejects_equals_and_null_keys() {
        assert!(sanitize_custom_environment_entry("A=B", "x").is_none());
        assert!(sanitize_custom_environment_entry("A\0B", "x").is_none());
        assert!(sanitize_custom_environment_entry("  ", "x").is_none());
        assert!(sanitize_custom_environment_entry("", "x").is_none());
    }

    #[test]
    fn sanitize_strips_null_bytes_and_truncates() {
        let (_, v) = sanitize_custom_environment_entry("K", "a\0b").unwrap();
        assert_eq!(v, "ab");
        let long = "x".repeat(9000);
        let (_, v) = sanitize_custom_environment_entry("K", &long).unwrap();
        assert_eq!(v.len(), MAX_VALUE_LEN);
    }

    #[test]
    fn blocked_key_never_overridden_by_caller_supplied_value() {
        let host_env: HashMap<String, String> = [("PATH".to_string(), "/usr/bin".to_string())].into();
        let mut shim = HashMap::new();
        shim.insert("PATH".to_string(), "C:\\attacker".to_string());
        shim.insert("MY_VAR".to_string(), "ok".to_string());
        let ctx = PaneEnvContext {
            use_claude_env: TriState::Unset,
            use_pane_env: TriState::Unset,
            claude_env: &HashMap::new(),
            pane_env: &HashMap::new(),
            inherited_env: &HashMap::new(),
            shim_env: &shim,
            tmux_internal: &HashMap::new(),
        };
        let resolved = resolve_env_for_pane_creation(&host_env, &ctx);
        assert_eq!(resolved.get("PATH"), Some(&"/usr/bin".to_string()));
        assert_eq!(resolved.get("MY_VAR"), Some(&"ok".to_string()));
    }

    #[test]
    fn cow_env_map_snapshot_is_independent() {
        let map = CowEnvMap::new();
        let mut entries = HashMap::new();
        entries.insert("K".to_string(), "v1".to_string());
        map.update(&entries);
        let mut snap = map.snapshot();
        snap.insert("K".to_string(), "mutated".to_string());
        assert_eq!(map.view().get("K"), Some(&"v1".to_string()));
    }
}
