//! Execution contexts on which results are delivered.
//!
//! The engine hands every completion, classification and decoding included,
//! to the endpoint's `Delivery` once the transport settles. A host with its
//! own main loop uses a `DeliveryQueue` and drains it on that thread.

use std::fmt;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// A unit of work to run on a delivery context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where a request's completion runs.
#[derive(Clone, Default)]
pub enum Delivery {
    /// On the transport worker that observed the outcome.
    #[default]
    Inline,
    /// As a task spawned on the given runtime.
    Runtime(Handle),
    /// Queued for a host loop that drains a `DeliveryReceiver`.
    Queue(DeliveryQueue),
}

impl Delivery {
    /// Run `job` on this context. If a queue's receiver is gone the job is
    /// run inline so the completion is never lost.
    pub fn dispatch(&self, job: Job) {
        match self {
            Delivery::Inline => job(),
            Delivery::Runtime(handle) => {
                handle.spawn(async move { job() });
            }
            Delivery::Queue(queue) => {
                if let Err(mpsc::error::SendError(job)) = queue.sender.send(job) {
                    tracing::warn!("delivery queue closed, completing inline");
                    job();
                }
            }
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Inline => f.write_str("Inline"),
            Delivery::Runtime(_) => f.write_str("Runtime"),
            Delivery::Queue(_) => f.write_str("Queue"),
        }
    }
}

/// Sending half of a host-drained delivery queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl DeliveryQueue {
    pub fn new() -> (Self, DeliveryReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, DeliveryReceiver { receiver })
    }
}

/// Receiving half; the host runs jobs from it on its own thread.
pub struct DeliveryReceiver {
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl DeliveryReceiver {
    /// Run every job queued so far without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it. Returns false once every
    /// `DeliveryQueue` has been dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}
