//! The session/window/pane graph (spec.md §3).

pub mod layout;
pub mod pane;
pub mod session;
pub mod window;

pub use layout::{LayoutNode, SplitDirection};
pub use pane::{Pane, PaneHandle};
pub use session::{Session, TriState, WorktreeInfo};
pub use window::Window;
