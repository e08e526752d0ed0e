//! Cooperative cancellation, shared by every long-running loop (chain
//! traversal, directory scan, allocation-table scan).
//!
//! Replaces the reference implementation's global abort flag with a flag
//! scoped to one `Volume`, polled the same way: between iterations, never
//! preemptively.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::{self, Result};

#[derive(Default)]
pub struct AbortFlag(AtomicBool);

impl AbortFlag {
    pub const fn new() -> Self {
        AbortFlag(AtomicBool::new(false))
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Call at each loop suspension point; turns a set flag into the
    /// "abort requested" error the caller's in-flight call returns.
    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            Err(error::Error::abort_requested())
        } else {
            Ok(())
        }
    }
}
