//! A lightweight cancellation handle threaded through every public async
//! entry point (spec §5: "callers pass a cancellation context into every
//! public entry point, and propagation to all outbound calls is required").
//!
//! The core has no HTTP client of its own to hang a `reqwest`-level timeout
//! off of, so this is the local stand-in: a clone-cheap atomic flag callers
//! can wire to whatever timeout or interrupt mechanism they actually have
//! (a `tokio::select!` against a signal, a `reqwest` request's own
//! cancellation, a UI "stop" button).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// A cancellation flag, cheap to clone and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Cancellation {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return at the next suspension point with `Error::Cancelled` if
    /// cancellation has been requested; a no-op otherwise.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}
