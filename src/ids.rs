//! Process-lifetime-unique identifiers for sessions, windows and panes.
//!
//! IDs are monotonically assigned integers, never reused within a process,
//! per the data model invariants (spec.md §3, invariant 2).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[derive(serde::Serialize, serde::Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(SessionId, "Stable per-process session identifier.");
id_type!(WindowId, "Stable per-process window identifier.");
id_type!(PaneId, "Stable per-process pane identifier.");

impl PaneId {
    /// Textual form used in targets and responses: `%<int>`.
    pub fn as_text(&self) -> String {
        format!("%{}", self.0)
    }

    /// Parses the textual form `%<int>`, rejecting anything else.
    pub fn parse_text(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('%')?;
        digits.parse::<u64>().ok().map(PaneId)
    }
}

/// Monotonic counter generator shared by a [`crate::manager::SessionManager`].
///
/// One counter per ID kind so that sessions, windows and panes each get
/// their own never-reused numbering, as required by invariant 2.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_session: AtomicU64,
    next_window: AtomicU64,
    next_pane: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_window_id(&self) -> WindowId {
        WindowId(self.next_window.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_pane_id(&self) -> PaneId {
        PaneId(self.next_pane.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_never_recur() {
        let alloc = IdAllocator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(alloc.next_pane_id()));
        }
    }

    #[test]
    fn pane_id_text_round_trips() {
        let id = PaneId(7);
        assert_eq!(id.as_text(), "%7");
        assert_eq!(PaneId::parse_text("%7"), Some(id));
        assert_eq!(PaneId::parse_text("7"), None);
        assert_eq!(PaneId::parse_text("%x"), None);
    }
}
