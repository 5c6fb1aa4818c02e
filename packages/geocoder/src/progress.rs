//! Progress reporting for batch geocoding and aggregation.
//!
//! Library code reports through [`ProgressCallback`] and never draws
//! anything itself; the CLI plugs in an `indicatif` bar, tests plug in
//! [`NullProgress`].

/// Receives progress updates from a long-running stage.
///
/// Implementations must be `Send + Sync` because updates arrive from
/// `rayon` worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the indicator.
    fn set_message(&self, msg: String);

    /// Mark the stage as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

