//! Progress events sent from the extraction worker to whoever is watching.

pub type ProgressSender = crossbeam_channel::Sender<ProgressEvent>;
pub type ProgressReceiver = crossbeam_channel::Receiver<ProgressEvent>;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Percent of the current phase, 0-100, with its label
    /// ("Depth", "Color", "IR", "TimeStamp").
    Update { percent: u8, phase: &'static str },
    Completed { frames: usize },
    Cancelled { frames: usize },
    Failed { message: String },
}

pub fn channel() -> (ProgressSender, ProgressReceiver) {
    crossbeam_channel::unbounded()
}

/// Progress is advisory; a dropped receiver must not stop the run.
pub fn send(tx: &ProgressSender, event: ProgressEvent) {
    let _ = tx.send(event);
}
