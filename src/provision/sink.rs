// src/provision/sink.rs

//! Where provisioning progress goes.

use std::fmt;

use tokio::sync::mpsc;

use crate::session::StatusUpdate;

use super::outcome::ProvisioningOutcome;

/// Receives progress for one provisioning job.
///
/// `report` is called in emission order while the job runs. `finish` is
/// called exactly once with the final outcome.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: &StatusUpdate);

    fn finish(&self, _outcome: &ProvisioningOutcome) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _update: &StatusUpdate) {}
}

/// Prints one line per update to stdout (logs go to stderr).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn report(&self, update: &StatusUpdate) {
        println!("[{:>3}%] {}", update.percent_complete, update.message);
    }
}

/// Event sent by [`ChannelSink`].
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Status(StatusUpdate),
    Finished(Box<ProvisioningOutcome>),
}

/// Forwards progress over an unbounded channel, e.g. to a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, update: &StatusUpdate) {
        let _ = self.tx.send(ProgressEvent::Status(update.clone()));
    }

    fn finish(&self, outcome: &ProvisioningOutcome) {
        let _ = self.tx.send(ProgressEvent::Finished(Box::new(outcome.clone())));
    }
}

/// Adapts a closure taking `(percent, message)`.
pub struct FnSink<F>(pub F);

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, update: &StatusUpdate) {
        (self.0)(update.percent_complete, &update.message);
    }
}
