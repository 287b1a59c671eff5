//! Progress reporting for long-running operations.
//!
//! Events are delivered synchronously on the calling thread, in the
//! order the work happens, one event per report. A sink that wants to
//! render from another thread has to do its own queueing.

/// What a progress event is reporting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Waiting for the device to finish internal housekeeping.
    TestDevice,
    /// Streaming an image to the device.
    DownloadImage,
    /// Streaming device contents back to the host.
    CheckImage,
    /// Erasing flash contents.
    EraseFlash,
}

/// Position of an event within one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStep {
    /// First report of the operation.
    First,
    /// Intermediate report.
    Middle,
    /// Final report; `current` equals `total`.
    Last,
}

/// One progress report.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    /// Port identity of the device doing the work.
    pub location_id: u32,
    /// Operation being reported on.
    pub kind: ProgressKind,
    /// Total work in the operation's own unit (bytes, sectors or
    /// blocks).
    pub total: u64,
    /// Work done so far, same unit as `total`.
    pub current: u64,
    /// Where in the operation this event falls.
    pub step: CallStep,
}

/// Receives progress events from [`Flasher`](super::Flasher) operations.
pub trait Progress {
    /// Called once per event, in order.
    fn update(&mut self, event: ProgressEvent);
}

/// Progress sink that discards every event.
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _event: ProgressEvent) {}
}
