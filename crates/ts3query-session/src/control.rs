use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Command sent by [`crate::Session::close`] before the carrier is dropped.
pub const QUIT_COMMAND: &str = "quit";
/// Keepalive payload: a bare delimiter, which the server answers with nothing.
pub const KEEPALIVE_LINE: &[u8] = b"";
/// Every event name starts with this prefix.
pub const EVENT_PREFIX: &[u8] = b"notify";

/// Cooperative stop flag for long-running event loops.
///
/// Clones share the flag, so one can be handed to another thread (or a
/// signal handler) while the loop holds the other.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every loop observing this signal to return.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Re-arm the signal.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        assert!(!signal.is_stopped());

        remote.request_stop();
        assert!(signal.is_stopped());

        signal.reset();
        assert!(!remote.is_stopped());
    }

    #[test]
    fn stop_is_visible_across_threads() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        std::thread::spawn(move || remote.request_stop())
            .join()
            .unwrap();
        assert!(signal.is_stopped());
    }
}
