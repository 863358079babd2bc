//! Progress hand-off from a run thread to its consumer.
//!
//! A notification carries only the step and read-mode tag. The corrected frame is
//! placed in a per-read-mode slot *before* the notification is queued, so a consumer
//! that looks up the slot after receiving a notification always finds a complete
//! frame. Slots hold `Arc<PublishedFrame>` and publication swaps in a freshly
//! allocated frame; a frame the consumer is still holding is never written again.
//!
//! Notifications are delivered in emission order over an unbounded channel that
//! closes when the run terminates. A slow consumer may find that a slot has already
//! moved on to a later step: compare [`PublishedFrame::seq`] with [`Progress::seq`].

use crate::run::RunId;
use chrono::{DateTime, Utc};
use optodaq_core::{FrameBuffer, ReadMode, StepTag};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

pub use tokio::sync::mpsc::error::TryRecvError;

/// "A new frame is ready" for one capture of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Run that produced the frame
    pub run_id: RunId,
    /// Position in the run's notification stream, from zero
    pub seq: u64,
    /// Which capture produced the frame
    pub step: StepTag,
    /// Slot holding the frame
    pub read_mode: ReadMode,
}

/// A corrected frame as seen by consumers.
#[derive(Debug)]
pub struct PublishedFrame {
    /// Matches [`Progress::seq`] of the notification announcing it
    pub seq: u64,
    /// Which capture produced it
    pub step: StepTag,
    /// Corrected intensities
    pub buffer: FrameBuffer,
    /// When the capture finished
    pub captured_at: DateTime<Utc>,
}

/// Latest published frame per read mode.
#[derive(Debug, Default)]
pub struct FrameSlots {
    spectral: RwLock<Option<Arc<PublishedFrame>>>,
    image: RwLock<Option<Arc<PublishedFrame>>>,
}

impl FrameSlots {
    fn slot(&self, read_mode: ReadMode) -> &RwLock<Option<Arc<PublishedFrame>>> {
        match read_mode {
            ReadMode::Spectral => &self.spectral,
            ReadMode::Image => &self.image,
        }
    }

    fn publish(&self, read_mode: ReadMode, frame: Arc<PublishedFrame>) {
        *self.slot(read_mode).write() = Some(frame);
    }

    /// Most recent frame in `read_mode`.
    pub fn latest(&self, read_mode: ReadMode) -> Option<Arc<PublishedFrame>> {
        self.slot(read_mode).read().clone()
    }
}

/// Create a connected sender/receiver pair sharing one set of frame slots.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let slots = Arc::new(FrameSlots::default());
    (
        ProgressSender {
            tx,
            slots: slots.clone(),
            next_seq: 0,
        },
        ProgressReceiver { rx, slots },
    )
}

/// Run-side half of the channel.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<Progress>,
    slots: Arc<FrameSlots>,
    next_seq: u64,
}

impl ProgressSender {
    /// Store `buffer` in the `read_mode` slot, then queue its notification.
    ///
    /// A consumer that has gone away does not stop the run; the notification is
    /// dropped.
    pub fn publish(
        &mut self,
        run_id: RunId,
        step: StepTag,
        read_mode: ReadMode,
        buffer: FrameBuffer,
    ) -> Progress {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.slots.publish(
            read_mode,
            Arc::new(PublishedFrame {
                seq,
                step,
                buffer,
                captured_at: Utc::now(),
            }),
        );

        let progress = Progress {
            run_id,
            seq,
            step,
            read_mode,
        };
        if self.tx.send(progress).is_err() {
            debug!(seq, "Progress receiver dropped, notification discarded");
        }
        progress
    }

    /// Notifications sent so far.
    pub fn sent(&self) -> u64 {
        self.next_seq
    }
}

/// Consumer-side half of the channel.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<Progress>,
    slots: Arc<FrameSlots>,
}

impl ProgressReceiver {
    /// Next notification; `None` once the run has ended and the queue is drained.
    pub async fn recv(&mut self) -> Option<Progress> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for consumers outside a runtime.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<Progress> {
        self.rx.blocking_recv()
    }

    /// Next notification if one is already queued.
    pub fn try_recv(&mut self) -> Result<Progress, TryRecvError> {
        self.rx.try_recv()
    }

    /// The frame currently in the slot `progress` refers to.
    pub fn frame(&self, progress: &Progress) -> Option<Arc<PublishedFrame>> {
        self.slots.latest(progress.read_mode)
    }

    /// Most recent frame in `read_mode`.
    pub fn latest(&self, read_mode: ReadMode) -> Option<Arc<PublishedFrame>> {
        self.slots.latest(read_mode)
    }
}
