use std::collections::HashMap;
use std::sync::Arc;

use crate::ids::PaneId;
use crate::terminal::Terminal;

/// A single terminal view backed by a pseudo-terminal (spec.md §3).
///
/// `terminal` is assigned exactly once, at pane creation, and never
/// reassigned. It is held behind an `Arc` rather than a `Box` so callers
/// can clone a handle out under the graph's read lock and release the
/// lock before calling `write`/`resize`/spawning a read loop, without any
/// risk of the handle being invalidated by a concurrent `Vec` reallocation
/// elsewhere in the graph (spec.md §4.1.1, §9 "Two-phase I/O").
pub struct Pane {
    pub id: PaneId,
    pub index: usize,
    pub title: String,
    pub active: bool,
    pub width: u16,
    pub height: u16,
    pub env: HashMap<String, String>,
    pub terminal: Option<Arc<dyn Terminal>>,
}

impl Pane {
    pub fn new(id: PaneId, index: usize, width: u16, height: u16) -> Self {
        Self {
            id,
            index,
            title: String::new(),
            active: false,
            width,
            height,
            env: HashMap::new(),
            terminal: None,
        }
    }

    /// A value-copy view of this pane with the `terminal` handle forcibly
    /// cleared, safe to hand to callers outside the graph lock (spec.md §5
    /// "Cloned session/window/pane structures ... forced to nil").
    pub fn to_handle(&self) -> PaneHandle {
        PaneHandle {
            id: self.id,
            index: self.index,
            title: self.title.clone(),
            active: self.active,
            width: self.width,
            height: self.height,
            env: self.env.clone(),
        }
    }
}

/// Owned, `Terminal`-free snapshot of a [`Pane`] (spec.md §9, Rust
/// deviation: `ResolveTarget` returns a value copy instead of a live
/// pointer).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PaneHandle {
    pub id: PaneId,
    pub index: usize,
    pub title: String,
    pub active: bool,
    pub width: u16,
    pub height: u16,
    pub env: HashMap<String, String>,
}
