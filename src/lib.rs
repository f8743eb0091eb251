//! Concurrency-safe tmux-compatible session/window/pane graph and
//! command router.
//!
//! [`manager::SessionManager`] owns the session/window/pane tree behind a
//! single read-write lock and exposes the graph operations;
//! [`router::CommandRouter`] translates the fixed tmux-style command
//! catalogue into graph mutations, environment resolution, and terminal
//! lifecycle management on top of it.

pub mod error;
pub mod events;
pub mod ids;
pub mod ipc;
pub mod manager;
pub mod model;
pub mod router;
pub mod terminal;

pub use error::{CoreError, CoreResult};
pub use ids::{PaneId, SessionId, WindowId};
pub use manager::SessionManager;
pub use router::CommandRouter;

/// Installs a `tracing` subscriber reading its filter from `RUST_LOG`
/// (default `info`). Intended for binaries embedding this crate; library
/// consumers that already have a subscriber installed should not call
/// this.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
