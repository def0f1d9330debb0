use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, trace};

use crate::capture::frame::OwnedYuvFrame;
use crate::diagnostics::PipelineStats;
use crate::error::{PipelineError, Result};
use crate::pipeline::FrameProcessor;

/// What happened to a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The mailbox was empty; the frame is next in line.
    Queued,
    /// An unprocessed frame was waiting and has been dropped for this one.
    ReplacedPending,
    /// The session is stopped; the frame was discarded.
    Stopped,
}

/// Single-slot mailbox between the capture driver and the worker.
struct Mailbox {
    pending: Mutex<Option<OwnedYuvFrame>>,
    ready: Condvar,
    // Shared with the processor so a frame mid-flight is abandoned on stop.
    shutdown: Arc<AtomicBool>,
}

/// Background processing for one capture stream.
///
/// The capture driver hands frames to [`submit`], which never blocks: a
/// frame arriving while the worker is busy waits in a one-frame mailbox,
/// and a newer arrival replaces it.
///
/// [`submit`]: ProcessingSession::submit
pub struct ProcessingSession {
    mailbox: Arc<Mailbox>,
    stats: Arc<Mutex<PipelineStats>>,
    thread: Option<JoinHandle<()>>,
}

impl ProcessingSession {
    /// Spawn the worker thread that owns `processor`.
    pub fn start(processor: FrameProcessor) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mailbox = Arc::new(Mailbox {
            pending: Mutex::new(None),
            ready: Condvar::new(),
            shutdown: Arc::clone(&shutdown),
        });
        let stats = Arc::clone(processor.stats());
        let processor = processor.with_cancel_flag(shutdown);

        let thread = {
            let mailbox = Arc::clone(&mailbox);
            std::thread::Builder::new()
                .name("frame-processing".into())
                .spawn(move || Self::run_worker(processor, &mailbox))
                .map_err(|e| {
                    PipelineError::AllocationFailure(format!(
                        "failed to spawn processing thread: {e}"
                    ))
                })?
        };

        Ok(Self {
            mailbox,
            stats,
            thread: Some(thread),
        })
    }

    /// Hand a frame to the worker.
    pub fn submit(&self, frame: OwnedYuvFrame) -> SubmitOutcome {
        let mut pending = self.mailbox.pending.lock();
        if self.mailbox.shutdown.load(Ordering::Acquire) {
            return SubmitOutcome::Stopped;
        }
        let replaced = pending.replace(frame).is_some();
        drop(pending);
        self.mailbox.ready.notify_one();

        if replaced {
            trace!("pending frame replaced before processing");
            self.stats.lock().record_discarded();
            SubmitOutcome::ReplacedPending
        } else {
            SubmitOutcome::Queued
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some() && !self.mailbox.shutdown.load(Ordering::Acquire)
    }

    /// Stop the worker. Idempotent.
    ///
    /// A frame waiting in the mailbox is discarded, and so is one the
    /// worker is processing: nothing is published once this returns.
    pub fn stop(&mut self) {
        {
            let mut pending = self.mailbox.pending.lock();
            self.mailbox.shutdown.store(true, Ordering::Release);
            if pending.take().is_some() {
                debug!("discarded pending frame on stop");
            }
        }
        self.mailbox.ready.notify_all();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            info!("processing session stopped");
        }
    }

    fn run_worker(mut processor: FrameProcessor, mailbox: &Mailbox) {
        info!("processing thread started");
        loop {
            let frame = {
                let mut pending = mailbox.pending.lock();
                loop {
                    if mailbox.shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(frame) = pending.take() {
                        break frame;
                    }
                    mailbox.ready.wait(&mut pending);
                }
            };

            // Per-frame errors are already logged and counted by the processor.
            if let Err(PipelineError::Shutdown) = processor.process_owned(&frame) {
                info!("processing stopped, worker exiting");
                mailbox.shutdown.store(true, Ordering::Release);
                return;
            }
        }
    }
}

impl Drop for ProcessingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticSource;
    use crate::config::{ConfigStore, ProcessingMode};
    use crate::frame::{FrameBufferManager, FrameHandle, FrameUpdate};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        frames: Arc<FrameBufferManager>,
        stats: Arc<Mutex<PipelineStats>>,
        config: Arc<ConfigStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let stats = Arc::new(Mutex::new(PipelineStats::new()));
            let config = Arc::new(ConfigStore::default());
            config.update(|c| c.mode = ProcessingMode::Normal).unwrap();
            Self {
                frames: Arc::new(FrameBufferManager::new(Arc::clone(&stats))),
                stats,
                config,
            }
        }

        fn start(&self) -> ProcessingSession {
            ProcessingSession::start(FrameProcessor::new(
                Arc::clone(&self.frames),
                Arc::clone(&self.config),
                Arc::clone(&self.stats),
            ))
            .unwrap()
        }

        fn notify(&self) -> mpsc::Receiver<FrameHandle> {
            let (tx, rx) = mpsc::channel();
            self.frames.set_frame_ready_callback(Arc::new(move |handle| {
                let _ = tx.send(handle);
            }));
            rx
        }

        fn latest_red(&self) -> u8 {
            match self.frames.take_latest() {
                Some(FrameUpdate::Frame(lease)) => lease.buffer().as_bytes()[0],
                _ => panic!("no frame published"),
            }
        }
    }

    #[test]
    fn submitted_frame_is_published() {
        let fx = Fixture::new();
        let ready = fx.notify();
        let session = fx.start();

        assert_eq!(
            session.submit(SyntheticSource::new(8, 8).marker(90)),
            SubmitOutcome::Queued
        );
        let handle = ready.recv_timeout(WAIT).unwrap();
        assert_eq!((handle.width, handle.height), (8, 8));
        assert_eq!(fx.latest_red(), 90);
    }

    #[test]
    fn newer_frame_replaces_pending_one() {
        let fx = Fixture::new();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        let blocked_once = AtomicBool::new(false);
        let (done_tx, done_rx) = mpsc::channel();

        // Hold the worker inside the first publish so later frames pile up.
        fx.frames.set_frame_ready_callback(Arc::new(move |handle| {
            if !blocked_once.swap(true, Ordering::AcqRel) {
                let _ = entered_tx.send(());
                let _ = gate_rx.lock().recv_timeout(WAIT);
            }
            let _ = done_tx.send(handle);
        }));
        let mut session = fx.start();
        let source = SyntheticSource::new(4, 4);

        assert_eq!(session.submit(source.marker(1)), SubmitOutcome::Queued);
        entered_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(session.submit(source.marker(2)), SubmitOutcome::Queued);
        assert_eq!(
            session.submit(source.marker(3)),
            SubmitOutcome::ReplacedPending
        );
        gate_tx.send(()).unwrap();

        let first = done_rx.recv_timeout(WAIT).unwrap();
        let second = done_rx.recv_timeout(WAIT).unwrap();
        assert_eq!((first.sequence, second.sequence), (1, 2));
        assert_eq!(fx.latest_red(), 3);

        session.stop();
        let snap = fx.stats.lock().snapshot();
        assert_eq!(snap.processed_frames, 2);
        // One replaced in the mailbox, one superseded in the handoff slot.
        assert_eq!(snap.dropped_frames, 2);
    }

    #[test]
    fn stop_is_idempotent_and_rejects_new_frames() {
        let fx = Fixture::new();
        let mut session = fx.start();
        assert!(session.is_running());

        session.stop();
        session.stop();
        assert!(!session.is_running());
        assert_eq!(
            session.submit(SyntheticSource::new(4, 4).marker(1)),
            SubmitOutcome::Stopped
        );
        assert_eq!(fx.frames.last_sequence(), 0);
    }

    #[test]
    fn stop_discards_frame_in_flight() {
        let fx = Fixture::new();
        fx.config
            .update(|c| c.mode = ProcessingMode::EdgeDetection)
            .unwrap();
        let mut session = fx.start();

        session.submit(SyntheticSource::new(3000, 3000).vertical_split(1500));
        std::thread::sleep(Duration::from_millis(20));
        session.stop();

        assert_eq!(fx.frames.last_sequence(), 0);
        assert!(fx.frames.take_latest().is_none());
        let snap = fx.stats.lock().snapshot();
        assert_eq!((snap.processed_frames, snap.rejected_frames), (0, 0));
    }

    #[test]
    fn closed_manager_ends_the_worker() {
        let fx = Fixture::new();
        let session = fx.start();
        fx.frames.close();

        session.submit(SyntheticSource::new(4, 4).marker(1));
        let deadline = std::time::Instant::now() + WAIT;
        while session.is_running() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!session.is_running());
        assert_eq!(fx.stats.lock().snapshot().rejected_frames, 0);
    }

    #[test]
    fn dropping_session_joins_worker() {
        let fx = Fixture::new();
        let ready = fx.notify();
        {
            let session = fx.start();
            session.submit(SyntheticSource::new(4, 4).marker(5));
            ready.recv_timeout(WAIT).unwrap();
        }
        assert_eq!(fx.frames.last_sequence(), 1);
    }
}
