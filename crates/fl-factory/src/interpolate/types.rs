use anyhow::Result;
use fl_core::{Frame, FrameGeometry, PipelineError, Scale};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_QUEUE_CAPACITY: usize = 2000;
pub const DEFAULT_MODEL_DIR: &str = "train_log";

/// Raw options as they come from the command line. Missing values are
/// resolved (prompted or derived) by the CLI driver.
#[derive(Debug, Clone)]
pub struct InterpolateArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub model_dir: PathBuf,
    pub fp16: bool,
    pub uhd: bool,
    pub scale: Scale,
    pub multiplier: Option<u32>,
    pub queue_capacity: usize,
    pub encoder: EncoderSettings,
}

/// A fully resolved interpolation task (one video in, one video out).
#[derive(Debug, Clone)]
pub struct InterpolateJob {
    pub input_path: PathBuf,
    /// Derived from the input name and target rate when `None`.
    pub output_path: Option<PathBuf>,
    pub model_dir: PathBuf,
    pub fp16: bool,
    pub uhd: bool,
    pub scale: Scale,
    pub multiplier: u32,
    pub queue_capacity: usize,
    pub encoder: EncoderSettings,
}

impl InterpolateJob {
    pub fn pipeline_config(&self) -> Result<PipelineConfig, PipelineError> {
        PipelineConfig::new(
            self.multiplier,
            self.scale.for_uhd(self.uhd),
            self.queue_capacity,
        )
    }
}

/// Output codec settings handed to ffmpeg.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub codec: String,
    pub preset: String,
    pub crf: u8,
    pub pix_fmt: String,
    /// Only passed when the codec is `libx265`.
    pub x265_params: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: "libx265".into(),
            preset: "medium".into(),
            crf: 23,
            pix_fmt: "yuv420p10le".into(),
            x265_params: "limit-sao=1:bframes=8:psy-rd=1.5:psy-rdoq=2:aq-mode=3".into(),
        }
    }
}

/// The subset of the job the streaming core cares about.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PipelineConfig {
    pub multiplier: u32,
    pub scale: Scale,
    pub queue_capacity: usize,
}

impl PipelineConfig {
    pub fn new(multiplier: u32, scale: Scale, queue_capacity: usize) -> Result<Self, PipelineError> {
        if multiplier < 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "multiplier must be at least 2, got {}",
                multiplier
            )));
        }
        if queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue capacity must be positive".into(),
            ));
        }
        Ok(Self {
            multiplier,
            scale,
            queue_capacity,
        })
    }

    /// Frames synthesized between each pair of source frames.
    #[inline]
    pub fn inserts_per_pair(&self) -> usize {
        self.multiplier as usize - 1
    }
}

/// Status updates sent from the core logic to the CLI.
#[derive(Debug, Clone)]
pub enum InterpolateStatus {
    Starting,
    Probing,
    LoadingModel,
    Interpolating {
        current_frame: u64, // source frames consumed
        total_frames: u64,
    },
    Encoding {
        current_frame: u64, // frames handed to the encoder
        total_frames: u64,
    },
    Finished(PathBuf),
    Error(String),
}

/// One slot of the frame queue.
#[derive(Debug)]
pub enum QueueItem {
    Frame(Frame),
    End,
}

/// Metadata discovered before the pipeline starts.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub geometry: FrameGeometry,
    pub fps: f64,
    pub total_frames: u64,
}

/// Where decoded frames come from.
pub trait FrameSource {
    fn geometry(&self) -> FrameGeometry;

    /// `Ok(None)` marks a clean end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Where output frames go. Lives on the encoder thread.
pub trait FrameEncoder: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flushes and closes the sink, waiting for the container to be written.
    fn finish(self: Box<Self>) -> Result<()>;

    /// Tears the sink down without finalizing.
    fn abort(self: Box<Self>);
}

#[derive(Deserialize)]
pub struct FFProbeOutput {
    pub streams: Vec<FFProbeStream>,
}

#[derive(Deserialize)]
pub struct FFProbeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default)]
    pub r_frame_rate: String,
    pub nb_frames: Option<String>,
}
