//! Cooperative shutdown shared by the accept loop, connection workers and the client loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Set from the signal handler. Monotonic: once true, never reset.
static SIGNALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SIGNALLED.store(true, Ordering::Relaxed);
}

/// Register SIGINT/SIGTERM handlers that raise every [`ShutdownFlag`].
///
/// The handler only performs an atomic store, which is async-signal-safe.
pub fn install_signal_handlers() {
    let handler = signal_handler as extern "C" fn(libc::c_int);
    // SAFETY: the handler touches nothing but a static atomic.
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
    debug!("Signal handlers installed");
}

/// Stop flag checked at every blocking-call timeout boundary.
///
/// Clones share state. A flag is also considered raised once a termination
/// signal has been received by the process.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed) || SIGNALLED.load(Ordering::Relaxed)
    }
}
