//! Panic-recovery supervisor around a pane's `Terminal::read_loop`
//! (spec.md §4.2.5).

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};

use crate::ids::PaneId;
use crate::terminal::{EventEmitter, Terminal};

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Spawns an OS thread that drives `terminal.read_loop`, restarting it
/// after a panic with exponentially backed-off delay, until the terminal
/// reports closed. Each output callback invocation is independently
/// wrapped in `catch_unwind` so one bad payload can't take the loop down.
pub fn spawn_supervised_read_loop(
    pane_id: PaneId,
    terminal: Arc<dyn Terminal>,
    emitter: Arc<dyn EventEmitter>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if terminal.is_closed() {
                return;
            }
            let terminal_for_cb = terminal.clone();
            let emitter_for_cb = emitter.clone();
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                terminal_for_cb.read_loop(Box::new(move |data: &[u8]| {
                    let payload = crate::events::pane_output(pane_id, data);
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        emitter_for_cb.emit(crate::events::PANE_OUTPUT, payload);
                    }));
                    if outcome.is_err() {
                        error!(pane = %pane_id, "pane-output callback panicked");
                    }
                }));
            }));

            if terminal.is_closed() {
                return;
            }
            match result {
                Ok(()) => {
                    // `read_loop` returned normally without the terminal
                    // reporting closed; treat as a transient condition and
                    // retry at the current backoff.
                }
                Err(_) => {
                    warn!(pane = %pane_id, backoff_ms = backoff.as_millis(), "read loop panicked, restarting");
                }
            }
            thread::sleep(backoff);
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    })
}
