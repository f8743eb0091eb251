//! Error taxonomy shared by [`crate::manager::SessionManager`] and
//! [`crate::router::CommandRouter`] (spec.md §7).
//!
//! Every variant carries the concrete subject that failed (a session name,
//! a pane ID, a target string) so the message is actionable without
//! leaking internal diagnostic detail.

use thiserror::Error;

/// Unified error type returned from the core's public API.
#[derive(Debug, Error)]
pub enum CoreError {
    // -- parse errors --------------------------------------------------
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("invalid pane id: {0}")]
    InvalidPaneId(String),

    // -- not-found errors -------------------------------------------------
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("session already exists: {0}")]
    SessionAlreadyExists(String),
    #[error("window not found: {0}")]
    WindowNotFound(String),
    #[error("pane not found: {0}")]
    PaneNotFound(String),
    #[error("no parent window for pane: {0}")]
    NoParentWindow(String),
    #[error("no active pane")]
    NoActivePane,
    #[error("caller pane not found: {0}")]
    CallerPaneNotFound(String),
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    // -- constraint errors ------------------------------------------------
    #[error("panes not in same window: {0}, {1}")]
    NotSameWindow(String, String),
    #[error("new name empty")]
    EmptyName,
    #[error("missing required flag: {0}")]
    MissingFlag(&'static str),
    #[error("value required (use -u to unset): {0}")]
    ValueRequired(String),
    #[error("no panes")]
    NoPanes,
    #[error("no valid panes")]
    NoValidPanes,

    // -- I/O errors ---------------------------------------------------
    #[error("terminal error on pane {0}: {1}")]
    Terminal(String, String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- internal inconsistencies (logged, rarely surfaced) --------------
    #[error("internal inconsistency: {0}")]
    Internal(String),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
