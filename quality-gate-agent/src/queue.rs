// quality-gate-agent/src/queue.rs
// ============================================================================
// Module: Message Queue
// Description: Bounded multi-producer single-consumer message channel.
// Purpose: Decouple request admission from validation throughput.
// Dependencies: tokio, quality-gate-core
// ============================================================================

//! ## Overview
//! The queue is a bounded FIFO of [`Message`]. Producers never block: a full
//! queue rejects the message and the caller counts the drop. The channel
//! closes when the last [`QueueManager`] handle is dropped, at which point
//! the worker drains the remaining messages and exits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quality_gate_core::Message;
use tokio::sync::mpsc;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default queue capacity.
pub const QUEUE_CAPACITY: usize = 1000;

// ============================================================================
// SECTION: Queue Manager
// ============================================================================

/// Producer handle for the message queue.
#[derive(Clone)]
pub struct QueueManager {
    /// Bounded sender shared by the request handlers.
    tx: mpsc::Sender<Message>,
}

impl QueueManager {
    /// Creates a queue with the default capacity.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<Message>) {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    /// Creates a queue with an explicit capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
            },
            rx,
        )
    }

    /// Enqueues a message without blocking.
    ///
    /// Returns false when the queue is full or already sealed; the message is
    /// dropped in that case.
    #[must_use]
    pub fn try_enqueue(&self, message: Message) -> bool {
        self.tx.try_send(message).is_ok()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
