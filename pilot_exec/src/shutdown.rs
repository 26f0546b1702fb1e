//! # Shutdown signal
//!
//! A flag shared by every background thread of the executable. Threads poll it at least once per
//! [`POLL_PERIOD`] and exit once it has been raised.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest time a background thread may block before checking the shutdown flag.
pub const POLL_PERIOD: Duration = Duration::from_millis(100);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Cloneable handle on the shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every thread holding this flag to stop.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shutdown_shared() {
        let a = Shutdown::new();
        let b = a.clone();

        assert!(!b.is_requested());
        a.request();
        assert!(b.is_requested());
    }
}
