use super::queue::FrameReceiver;
use super::types::{FrameEncoder, InterpolateStatus, QueueItem};
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::{
    thread::{self, JoinHandle},
    time::Instant,
};

/// Background writer: drains the queue into the encoder until the end marker.
pub struct EncodeConsumer {
    handle: JoinHandle<Result<u64>>,
}

impl EncodeConsumer {
    pub fn spawn<F>(
        receiver: FrameReceiver,
        encoder: Box<dyn FrameEncoder>,
        total_frames: u64,
        callback: F,
    ) -> Result<Self>
    where
        F: Fn(InterpolateStatus) + Send + Clone + 'static,
    {
        let handle = thread::Builder::new()
            .name("fl-encoder".into())
            .spawn(move || drain(receiver, encoder, total_frames, callback))
            .context("Failed to spawn encoder thread")?;
        Ok(Self { handle })
    }

    /// Waits for the encoder to finalize. Returns the number of frames written.
    pub fn join(self) -> Result<u64> {
        self.handle
            .join()
            .map_err(|_| anyhow!("encoder thread panicked"))?
    }
}

fn drain<F>(
    receiver: FrameReceiver,
    mut encoder: Box<dyn FrameEncoder>,
    total_frames: u64,
    callback: F,
) -> Result<u64>
where
    F: Fn(InterpolateStatus),
{
    let mut written = 0u64;
    let mut last_report = Instant::now();

    loop {
        let frame = match receiver.pop() {
            Ok(QueueItem::Frame(frame)) => frame,
            Ok(QueueItem::End) => break,
            Err(e) => {
                warn!("Aborting encoder after {} frames: {}", written, e);
                encoder.abort();
                return Err(e.into());
            }
        };

        if let Err(e) = encoder.write_frame(&frame) {
            encoder.abort();
            return Err(e.context(format!("writing frame {}", written)));
        }
        written += 1;

        // Report Progress (throttled to ~10 times/sec)
        if written % 30 == 0 || last_report.elapsed().as_millis() > 100 {
            callback(InterpolateStatus::Encoding {
                current_frame: written,
                total_frames,
            });
            last_report = Instant::now();
        }
    }

    // The receiver goes away with this thread; nothing more can be queued.
    drop(receiver);
    debug!("End marker received after {} frames, finalizing", written);
    encoder.finish().context("Failed to finalize output")?;
    callback(InterpolateStatus::Encoding {
        current_frame: written,
        total_frames,
    });
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolate::queue::frame_queue;
    use fl_core::{Frame, FrameGeometry, PipelineError};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        frames: Vec<u8>,
        finished: usize,
        aborted: usize,
    }

    struct RecordingEncoder {
        log: Arc<Mutex<Log>>,
        fail_at: Option<usize>,
    }

    impl FrameEncoder for RecordingEncoder {
        fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            let mut log = self.log.lock().unwrap();
            if self.fail_at == Some(log.frames.len()) {
                return Err(PipelineError::EncoderFailure("disk full".into()).into());
            }
            log.frames.push(frame.as_bytes()[0]);
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            self.log.lock().unwrap().finished += 1;
            Ok(())
        }

        fn abort(self: Box<Self>) {
            self.log.lock().unwrap().aborted += 1;
        }
    }

    fn frame(value: u8) -> Frame {
        Frame::filled(FrameGeometry::new(1, 1).unwrap(), value)
    }

    fn start(fail_at: Option<usize>) -> (Arc<Mutex<Log>>, crate::interpolate::FrameSender, EncodeConsumer) {
        let log = Arc::new(Mutex::new(Log::default()));
        let (tx, rx) = frame_queue(4).unwrap();
        let encoder = Box::new(RecordingEncoder {
            log: log.clone(),
            fail_at,
        });
        let consumer = EncodeConsumer::spawn(rx, encoder, 3, |_| {}).unwrap();
        (log, tx, consumer)
    }

    #[test]
    fn writes_in_order_and_finalizes_once() {
        let (log, mut tx, consumer) = start(None);
        for v in [10, 20, 30] {
            tx.push(frame(v)).unwrap();
        }
        tx.close().unwrap();

        assert_eq!(consumer.join().unwrap(), 3);
        let log = log.lock().unwrap();
        assert_eq!(log.frames, vec![10, 20, 30]);
        assert_eq!(log.finished, 1);
        assert_eq!(log.aborted, 0);
    }

    #[test]
    fn nothing_is_written_after_end_marker() {
        let (log, mut tx, consumer) = start(None);
        tx.push(frame(1)).unwrap();
        tx.close().unwrap();
        assert_eq!(consumer.join().unwrap(), 1);
        // The consumer hung up, so later pushes cannot reach the encoder.
        assert!(tx.push(frame(2)).is_err());
        assert_eq!(log.lock().unwrap().frames, vec![1]);
    }

    #[test]
    fn producer_hangup_aborts_without_finalizing() {
        let (log, mut tx, consumer) = start(None);
        tx.push(frame(1)).unwrap();
        drop(tx);

        let err = consumer.join().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ProducerAborted)
        ));
        let log = log.lock().unwrap();
        assert_eq!(log.frames, vec![1]);
        assert_eq!((log.finished, log.aborted), (0, 1));
    }

    #[test]
    fn write_failure_stops_consumer() {
        let (log, mut tx, consumer) = start(Some(1));
        tx.push(frame(1)).unwrap();
        tx.push(frame(2)).unwrap();

        let err = consumer.join().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EncoderFailure(_))
        ));
        let log = log.lock().unwrap();
        assert_eq!(log.frames, vec![1]);
        assert_eq!((log.finished, log.aborted), (0, 1));
    }
}
