use super::encode::EncodeConsumer;
use super::ffmpeg::{FfmpegEncoder, FfmpegSource};
use super::model::load_model;
use super::queue::{frame_queue, FrameSender};
use super::scheduler::InterpolationScheduler;
use super::types::*;
use super::utils::{check_dependencies, default_output_path, probe_video, total_output_frames};
use anyhow::Result;
use fl_core::{AlignmentSpec, PipelineError};
use log::{debug, info, warn};
use std::{path::PathBuf, time::Instant};

/// Frame counts of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub input_frames: u64,
    pub output_frames: u64,
}

/// Drives decode -> align -> interpolate -> crop -> queue on the calling
/// thread while an [`EncodeConsumer`] drains the queue.
pub struct PipelineOrchestrator {
    scheduler: InterpolationScheduler,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(scheduler: InterpolationScheduler, config: PipelineConfig) -> Self {
        Self { scheduler, config }
    }

    /// Runs the whole stream. `total_input` only feeds progress reporting.
    pub fn run<S, F>(
        mut self,
        mut source: S,
        encoder: Box<dyn FrameEncoder>,
        total_input: u64,
        callback: F,
    ) -> Result<PipelineReport>
    where
        S: FrameSource,
        F: Fn(InterpolateStatus) + Send + Clone + 'static,
    {
        // 1. Init: alignment is fixed for the whole run
        let geometry = source.geometry();
        let alignment = AlignmentSpec::new(geometry, self.config.scale);
        info!(
            "Aligning {} to {}x{} (tile {}, scale {}), {} model, {} inserts per pair",
            geometry,
            alignment.padded_width,
            alignment.padded_height,
            alignment.tile,
            self.config.scale,
            self.scheduler.capability().name(),
            self.config.inserts_per_pair()
        );

        let (mut tx, rx) = frame_queue(self.config.queue_capacity)?;
        let expected_output = total_output_frames(total_input, self.config.multiplier);
        let consumer = EncodeConsumer::spawn(rx, encoder, expected_output, callback.clone())?;

        // 2. Streaming
        let streamed = self
            .stream(&mut source, &alignment, &mut tx, total_input, &callback)
            .and_then(|consumed| {
                // 3. Draining
                tx.close()?;
                Ok(consumed)
            });
        // Without the marker this hang-up tells the consumer to abort.
        drop(tx);
        let encoded = consumer.join();

        // 4. Done
        drop(source);
        match (streamed, encoded) {
            (Ok(input_frames), Ok(output_frames)) => Ok(PipelineReport {
                input_frames,
                output_frames,
            }),
            // A push only fails once the encoder thread is gone; its error is the cause.
            (Err(produce), Err(consume)) if encoder_hung_up(&produce) => Err(consume),
            (Err(produce), _) => Err(produce),
            (Ok(_), Err(consume)) => Err(consume),
        }
    }

    fn stream<S, F>(
        &mut self,
        source: &mut S,
        alignment: &AlignmentSpec,
        tx: &mut FrameSender,
        total_input: u64,
        callback: &F,
    ) -> Result<u64>
    where
        S: FrameSource,
        F: Fn(InterpolateStatus),
    {
        let Some(first) = source.next_frame()? else {
            warn!("Source yielded no frames");
            return Ok(0);
        };
        let mut previous = alignment.align(&first)?;
        tx.push(first)?;

        let inserts = self.config.inserts_per_pair();
        let mut consumed = 1u64;
        let mut last_report = Instant::now();

        while let Some(frame) = source.next_frame()? {
            let current = alignment.align(&frame)?;

            for mid in self.scheduler.schedule(&previous, &current, inserts)? {
                if tx.is_full() {
                    debug!("Queue full at source frame {}, waiting on encoder", consumed);
                }
                tx.push(alignment.crop(&mid)?)?;
            }
            tx.push(frame)?;

            previous = current;
            consumed += 1;

            if consumed % 30 == 0 || last_report.elapsed().as_millis() > 100 {
                callback(InterpolateStatus::Interpolating {
                    current_frame: consumed,
                    total_frames: total_input,
                });
                last_report = Instant::now();
            }
        }

        callback(InterpolateStatus::Interpolating {
            current_frame: consumed,
            total_frames: total_input,
        });
        Ok(consumed)
    }
}

fn encoder_hung_up(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::EncoderFailure(_))
    )
}

/// Probes the input, loads the model, and runs the ffmpeg-backed pipeline.
/// Returns the output path.
pub fn process_interpolation<F>(job: InterpolateJob, callback: F) -> Result<PathBuf>
where
    F: Fn(InterpolateStatus) + Send + Clone + 'static,
{
    let result = run_job(&job, callback.clone());
    if let Err(e) = &result {
        callback(InterpolateStatus::Error(format!("{:#}", e)));
    }
    result
}

fn run_job<F>(job: &InterpolateJob, callback: F) -> Result<PathBuf>
where
    F: Fn(InterpolateStatus) + Send + Clone + 'static,
{
    callback(InterpolateStatus::Starting);
    let config = job.pipeline_config()?;
    check_dependencies()?;

    // 1. Analyze Video
    callback(InterpolateStatus::Probing);
    let video = probe_video(&job.input_path)?;
    let fps_target = video.fps * job.multiplier as f64;
    let output_path = job
        .output_path
        .clone()
        .unwrap_or_else(|| default_output_path(&job.input_path, job.multiplier, fps_target));
    info!(
        "{} -> {} ({:.3} -> {:.3} fps, {} frames)",
        job.input_path.display(),
        output_path.display(),
        video.fps,
        fps_target,
        video.total_frames
    );

    // 2. Model
    callback(InterpolateStatus::LoadingModel);
    let capability = load_model(&job.model_dir, job.fp16)?;
    let orchestrator = PipelineOrchestrator::new(InterpolationScheduler::new(capability), config);

    // 3. FFmpeg Setup
    let source = FfmpegSource::spawn(&job.input_path, video.geometry)?;
    let encoder = FfmpegEncoder::spawn(
        &job.input_path,
        &output_path,
        video.geometry,
        fps_target,
        &job.encoder,
    )?;

    // 4. Stream
    let started = Instant::now();
    let report = orchestrator.run(source, Box::new(encoder), video.total_frames, callback.clone())?;
    info!(
        "Wrote {} frames from {} source frames in {:.1}s",
        report.output_frames,
        report.input_frames,
        started.elapsed().as_secs_f64()
    );

    callback(InterpolateStatus::Finished(output_path.clone()));
    Ok(output_path)
}
