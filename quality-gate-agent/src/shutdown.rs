// quality-gate-agent/src/shutdown.rs
// ============================================================================
// Module: Shutdown Signal
// Description: Process-wide cooperative shutdown notification.
// Purpose: Let every background loop stop, flush once, and exit.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! A single [`Shutdown`] owner broadcasts over a watch channel to any number
//! of [`ShutdownSignal`] observers. Observers either await [`ShutdownSignal::
//! triggered`] inside a select arm or poll [`ShutdownSignal::is_triggered`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use tokio::sync::watch;

// ============================================================================
// SECTION: Shutdown Handle
// ============================================================================

/// Owner side of the shutdown signal.
pub struct Shutdown {
    /// Broadcast sender flipped exactly once.
    tx: watch::Sender<bool>,
}

/// Observer side of the shutdown signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    /// Receiver tracking the current shutdown state.
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Creates the owner and the first observer.
    #[must_use]
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                tx,
            },
            ShutdownSignal {
                rx,
            },
        )
    }

    /// Triggers shutdown for every observer.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    /// Completes once shutdown has been triggered.
    ///
    /// Also completes when the owner is dropped, which only happens while the
    /// process is tearing down.
    pub async fn triggered(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Returns true when shutdown has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_every_observer() {
        let (shutdown, signal) = Shutdown::new();
        let mut second = signal.clone();
        assert!(!signal.is_triggered());
        shutdown.trigger();
        second.triggered().await;
        assert!(second.is_triggered());
    }

    #[tokio::test]
    async fn dropped_owner_releases_observers() {
        let (shutdown, mut signal) = Shutdown::new();
        drop(shutdown);
        signal.triggered().await;
    }
}
