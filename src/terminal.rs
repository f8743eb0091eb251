//! Shapes of the external collaborators the core consumes but does not
//! implement (spec.md §1): the real pseudo-terminal backend and the
//! host-side event sink.

use std::fmt;

/// A pseudo-terminal attached to a pane. The concrete implementation
/// (spawning a real PTY, wiring it to a process) lives outside the core;
/// this trait documents exactly the surface the core calls.
///
/// `write`/`resize`/`close` are invoked only after the graph lock has been
/// released (spec.md §4.1.1, §5): the core snapshots a pane's `Terminal`
/// under a read lock, releases the lock, then calls these methods.
pub trait Terminal: Send + Sync {
    /// Writes bytes to the terminal's input.
    fn write(&self, data: &[u8]) -> std::io::Result<()>;

    /// Resizes the terminal to `cols` x `rows`.
    fn resize(&self, cols: u16, rows: u16) -> std::io::Result<()>;

    /// Closes the terminal. Idempotent.
    fn close(&self) -> std::io::Result<()>;

    /// Starts (or continues) delivering output to `callback` on whatever
    /// thread the implementation chooses. The core's read-loop supervisor
    /// (spec.md §4.2.5) calls this once per attach and relies on `close`
    /// eventually making `is_closed` true so the supervisor can exit.
    fn read_loop(&self, callback: Box<dyn Fn(&[u8]) + Send + Sync>);

    /// Whether the terminal has been closed (by either side).
    fn is_closed(&self) -> bool;
}

impl fmt::Debug for dyn Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<terminal closed={}>", self.is_closed())
    }
}

/// Host-side event delivery sink (spec.md §1, §6).
pub trait EventEmitter: Send + Sync {
    fn emit(&self, name: &str, payload: serde_json::Value);
}

/// Default emitter used when no host sink is wired up; drops every event.
#[derive(Debug, Default)]
pub struct NullEventEmitter;

impl EventEmitter for NullEventEmitter {
    fn emit(&self, _name: &str, _payload: serde_json::Value) {}
}

#[cfg(any(test, feature = "testing"))]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Terminal test double recording writes/resizes and optionally
    /// replaying output through `read_loop`'s callback.
    #[derive(Default)]
    pub struct MockTerminal {
        pub writes: Mutex<Vec<Vec<u8>>>,
        pub resizes: Mutex<Vec<(u16, u16)>>,
        pub closed: std::sync::atomic::AtomicBool,
        pub fail_writes: std::sync::atomic::AtomicBool,
    }

    impl MockTerminal {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }
    }

    impl Terminal for MockTerminal {
        fn write(&self, data: &[u8]) -> std::io::Result<()> {
            if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(std::io::Error::other("mock write failure"));
            }
            self.writes.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        fn resize(&self, cols: u16, rows: u16) -> std::io::Result<()> {
            self.resizes.lock().unwrap().push((cols, rows));
            Ok(())
        }

        fn close(&self) -> std::io::Result<()> {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn read_loop(&self, _callback: Box<dyn Fn(&[u8]) + Send + Sync>) {}

        fn is_closed(&self) -> bool {
            self.closed.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    /// Event emitter test double recording every emitted `(name, payload)`.
    #[derive(Default)]
    pub struct RecordingEventEmitter {
        pub events: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl RecordingEventEmitter {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn names(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(n, _)| n.clone())
                .collect()
        }
    }

    impl EventEmitter for RecordingEventEmitter {
        fn emit(&self, name: &str, payload: serde_json::Value) {
            self.events
                .lock()
                .unwrap()
                .push((name.to_string(), payload));
        }
    }
}
