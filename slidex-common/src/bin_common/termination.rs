use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use signal_hook::{consts::signal::*, low_level};

/// Counts received termination requests. Long running loops poll it at chunk or frame
/// granularity and wind down when it is set.
#[derive(Clone, Debug)]
pub struct Cookie {
    count: Arc<AtomicUsize>,
}

impl Cookie {
    /// Registers handlers for SIGINT and SIGTERM. The first signal only sets the cookie,
    /// the second one falls back to the default handler, i.e., kills the process.
    pub fn new() -> Result<Self, std::io::Error> {
        let cookie = Self::detached();

        for flag in [SIGINT, SIGTERM] {
            let count = Arc::clone(&cookie.count);
            // SAFETY: this only uses atomic stuff and functions the crate itself is using
            // in signal handlers
            unsafe {
                low_level::register(flag, move || {
                    let prev = count.fetch_add(1, Ordering::SeqCst);
                    if is_forced(prev) {
                        let _ = low_level::emulate_default_handler(flag);
                    }
                })?;
            };
        }

        Ok(cookie)
    }

    /// A cookie not connected to any signal, only `terminate` can set it.
    pub fn detached() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Requests termination as if a signal had been received.
    pub fn terminate(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_terminating(&self) -> bool {
        self.count.load(Ordering::SeqCst) >= 1
    }
}

/// Whether a signal arriving after `prev` earlier ones should kill the process.
fn is_forced(prev: usize) -> bool {
    prev >= 1
}
