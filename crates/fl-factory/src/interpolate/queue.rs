use super::types::QueueItem;
use crossbeam_channel::{bounded, Receiver, Sender};
use fl_core::{Frame, PipelineError};

/// Creates the bounded FIFO between the orchestrator and the encoder thread.
///
/// `push` blocks while `capacity` items are waiting, which is what throttles
/// inference when encoding falls behind.
pub fn frame_queue(capacity: usize) -> Result<(FrameSender, FrameReceiver), PipelineError> {
    if capacity == 0 {
        return Err(PipelineError::InvalidConfig(
            "queue capacity must be positive".into(),
        ));
    }
    let (tx, rx) = bounded(capacity);
    Ok((
        FrameSender { tx, closed: false },
        FrameReceiver { rx },
    ))
}

/// Producer half. Exactly one end marker may be pushed, and it must be last.
pub struct FrameSender {
    tx: Sender<QueueItem>,
    closed: bool,
}

impl FrameSender {
    pub fn push(&mut self, frame: Frame) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::QueueProtocolViolation(
                "frame pushed after end marker",
            ));
        }
        self.send(QueueItem::Frame(frame))
    }

    /// Pushes the end marker.
    pub fn close(&mut self) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::QueueProtocolViolation(
                "end marker pushed twice",
            ));
        }
        self.closed = true;
        self.send(QueueItem::End)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    fn send(&self, item: QueueItem) -> Result<(), PipelineError> {
        // Only fails once the receiver is gone, i.e. the encoder thread has bailed out.
        self.tx
            .send(item)
            .map_err(|_| PipelineError::EncoderFailure("encoder stopped accepting frames".into()))
    }
}

/// Consumer half, owned by the encoder thread.
pub struct FrameReceiver {
    rx: Receiver<QueueItem>,
}

impl FrameReceiver {
    /// Blocks until an item is available. A producer that hangs up without
    /// the end marker yields [`PipelineError::ProducerAborted`].
    pub fn pop(&self) -> Result<QueueItem, PipelineError> {
        self.rx.recv().map_err(|_| PipelineError::ProducerAborted)
    }
}
