//! Contains [SignalHost], a [HostRuntime] backed by process stop signals
//! (e.g. `SIGINT`).

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::{consts, flag};

use pipeline::HostRuntime;

/// Flags shutdown once the process receives any stop signal. A headless
/// process is always "foreground", so only the shutdown half does anything
/// interesting.
pub struct SignalHost {
    stop_requested: Arc<AtomicBool>,
}

impl SignalHost {
    /// Registers a handler for every stop signal the platform has. Setting
    /// an atomic is one of the few things a signal handler can safely do, so
    /// that's all the handler does.
    pub fn register() -> Result<Self, io::Error> {
        let stop_requested = Arc::new(AtomicBool::new(false));
        for signal in consts::TERM_SIGNALS {
            flag::register(*signal, Arc::clone(&stop_requested))?;
        }

        Ok(Self { stop_requested })
    }
}

impl HostRuntime for SignalHost {
    fn is_shutting_down(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}
