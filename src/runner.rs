//! Background Task Runner (spec §4.4): fire-and-forget worker execution
//! plus a completion callback, wrapping `std::thread::spawn` behind a
//! small owned type the way `wkmp-ap::playback::decoder_pool` wraps its
//! worker threads behind `DecoderPool`.

/// Runs nullary closures on unjoined OS threads.
///
/// No bounded pool is required (spec §4.4): ordering between tasks for
/// the same stem is resolved entirely by the waveform ordinal, never by
/// task scheduling order.
pub trait TaskRunner: Send + Sync {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Default [`TaskRunner`] spawning one OS thread per task.
pub struct BackgroundTaskRunner;

impl TaskRunner for BackgroundTaskRunner {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        std::thread::spawn(task);
    }
}
