use super::types::{EncoderSettings, FrameEncoder, FrameSource};
use anyhow::Result;
use fl_core::{Frame, FrameGeometry, PipelineError};
use log::debug;
use std::{
    ffi::{OsStr, OsString},
    io::{BufWriter, ErrorKind, Read, Write},
    path::Path,
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
};

const PIPE_BUFFER: usize = 1 << 20;

/// Decodes the input to rgb24 through an `ffmpeg` child process.
pub struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    geometry: FrameGeometry,
    exhausted: bool,
}

impl FfmpegSource {
    pub fn spawn(input: &Path, geometry: FrameGeometry) -> Result<Self> {
        Self::with_program(OsStr::new("ffmpeg"), input, geometry)
    }

    fn with_program(program: &OsStr, input: &Path, geometry: FrameGeometry) -> Result<Self> {
        let mut child = Command::new(program)
            .arg("-i")
            .arg(input)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                PipelineError::SourceUnavailable(format!("failed to spawn ffmpeg decoder: {}", e))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            PipelineError::SourceUnavailable("ffmpeg decoder has no stdout".into())
        })?;

        debug!("Decoding {} as {} rgb24", input.display(), geometry);
        Ok(Self {
            child,
            stdout,
            geometry,
            exhausted: false,
        })
    }
}

impl FrameSource for FfmpegSource {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(frame) = read_frame(&mut self.stdout, self.geometry)? {
            return Ok(Some(frame));
        }

        // End of pipe is only end of stream if the decoder exited cleanly.
        self.exhausted = true;
        let status = self.child.wait().map_err(|e| {
            PipelineError::SourceUnavailable(format!("waiting on ffmpeg decoder failed: {}", e))
        })?;
        if !status.success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "ffmpeg decoder exited with {}",
                status
            ))
            .into());
        }
        Ok(None)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Reads one whole frame. Zero bytes means end of stream; anything between
/// zero and a full frame is corruption.
pub fn read_frame<R: Read>(
    reader: &mut R,
    geometry: FrameGeometry,
) -> Result<Option<Frame>, PipelineError> {
    let expected = geometry.frame_len();
    let mut buf = vec![0u8; expected];
    let mut filled = 0;

    while filled < expected {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(PipelineError::SourceUnavailable(format!(
                    "decoder read failed: {}",
                    e
                )))
            }
        }
    }

    match filled {
        0 => Ok(None),
        n if n == expected => Frame::from_bytes(geometry, buf).map(Some),
        got => Err(PipelineError::TruncatedFrame { expected, got }),
    }
}

/// Muxes rgb24 frames from stdin into the output, copying every non-video
/// stream of the input alongside.
///
/// Dropped without [`FrameEncoder::finish`], the child is killed and reaped.
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
}

impl FfmpegEncoder {
    pub fn spawn(
        input: &Path,
        output: &Path,
        geometry: FrameGeometry,
        fps_target: f64,
        settings: &EncoderSettings,
    ) -> Result<Self> {
        let encoder = Self::with_program(
            OsStr::new("ffmpeg"),
            encoder_args(input, output, geometry, fps_target, settings),
        )?;
        debug!(
            "Encoding {} at {:.3} fps with {}",
            output.display(),
            fps_target,
            settings.codec
        );
        Ok(encoder)
    }

    fn with_program(program: &OsStr, args: Vec<OsString>) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                PipelineError::EncoderFailure(format!("failed to spawn ffmpeg encoder: {}", e))
            })?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::EncoderFailure("ffmpeg encoder has no stdin".into()).into());
            }
        };

        Ok(Self {
            child,
            stdin: Some(BufWriter::with_capacity(PIPE_BUFFER, stdin)),
        })
    }

    fn kill_and_reap(&mut self) {
        // Kill first so dropping the writer cannot block on a full pipe.
        let _ = self.child.kill();
        self.stdin.take();
        let _ = self.child.wait();
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PipelineError::EncoderFailure("encoder input already closed".into()))?;
        stdin
            .write_all(frame.as_bytes())
            .map_err(|e| PipelineError::EncoderFailure(format!("write to ffmpeg failed: {}", e)))?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        if let Some(stdin) = self.stdin.as_mut() {
            // On failure the writer stays in place and Drop kills the child.
            stdin
                .flush()
                .map_err(|e| PipelineError::EncoderFailure(format!("flush to ffmpeg failed: {}", e)))?;
        }
        self.stdin.take();
        let status = self
            .child
            .wait()
            .map_err(|e| PipelineError::EncoderFailure(format!("waiting on ffmpeg failed: {}", e)))?;
        if !status.success() {
            return Err(PipelineError::EncoderFailure(format!("ffmpeg exited with {}", status)).into());
        }
        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        self.kill_and_reap();
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            self.kill_and_reap();
        }
    }
}

pub fn encoder_args(
    input: &Path,
    output: &Path,
    geometry: FrameGeometry,
    fps_target: f64,
    settings: &EncoderSettings,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
    args.extend(
        [
            "-f".to_string(),
            "rawvideo".into(),
            "-s".into(),
            geometry.to_string(),
            "-pixel_format".into(),
            "rgb24".into(),
            "-r".into(),
            fps_target.to_string(),
            "-i".into(),
            "pipe:".into(),
            "-map".into(),
            "0".into(),
            "-map".into(),
            "-0:v".into(),
            "-map".into(),
            "1:v".into(),
            "-c:v".into(),
            settings.codec.clone(),
        ]
        .into_iter()
        .map(OsString::from),
    );
    if settings.codec == "libx265" && !settings.x265_params.is_empty() {
        args.push("-x265-params".into());
        args.push(settings.x265_params.clone().into());
    }
    args.extend(
        [
            "-preset".to_string(),
            settings.preset.clone(),
            "-pix_fmt".into(),
            settings.pix_fmt.clone(),
            "-crf".into(),
            settings.crf.to_string(),
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(2, 2).unwrap()
    }

    /// Hands out at most `step` bytes per read, like a pipe under load.
    struct Trickle<R> {
        inner: R,
        step: usize,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.step);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn reads_whole_frames_then_end() {
        let mut reader = Cursor::new((0u8..24).collect::<Vec<_>>());
        let first = read_frame(&mut reader, geometry()).unwrap().unwrap();
        assert_eq!(first.as_bytes(), &(0u8..12).collect::<Vec<_>>()[..]);
        assert!(read_frame(&mut reader, geometry()).unwrap().is_some());
        assert!(read_frame(&mut reader, geometry()).unwrap().is_none());
    }

    #[test]
    fn reassembles_short_reads() {
        let mut reader = Trickle {
            inner: Cursor::new(vec![7u8; 12]),
            step: 5,
        };
        let frame = read_frame(&mut reader, geometry()).unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &[7u8; 12][..]);
    }

    #[test]
    fn partial_frame_is_truncation() {
        let mut reader = Cursor::new(vec![0u8; 17]);
        assert!(read_frame(&mut reader, geometry()).unwrap().is_some());
        assert_eq!(
            read_frame(&mut reader, geometry()),
            Err(PipelineError::TruncatedFrame {
                expected: 12,
                got: 5
            })
        );
    }

    #[test]
    fn encoder_args_keep_side_streams_and_codec_params() {
        let args = encoder_args(
            Path::new("in.mkv"),
            Path::new("out.mkv"),
            FrameGeometry::new(1920, 1080).unwrap(),
            48.0,
            &EncoderSettings::default(),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -i in.mkv -f rawvideo -s 1920x1080 -pixel_format rgb24 -r 48 -i pipe:"));
        assert!(joined.contains("-map 0 -map -0:v -map 1:v"));
        assert!(joined.contains("-c:v libx265 -x265-params limit-sao=1"));
        assert!(joined.ends_with("-preset medium -pix_fmt yuv420p10le -crf 23 out.mkv"));

        let x264 = EncoderSettings {
            codec: "libx264".into(),
            ..EncoderSettings::default()
        };
        let args = encoder_args(Path::new("a"), Path::new("b"), geometry(), 60.0, &x264);
        assert!(!args.iter().any(|a| a == "-x265-params"));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::{
            fs,
            os::unix::fs::PermissionsExt,
            path::PathBuf,
            sync::{Mutex, MutexGuard},
        };
        use tempfile::{tempdir, TempDir};

        // A fork in another test can inherit the script's write handle and
        // make exec fail with ETXTBSY, so writing and spawning are serialized.
        static SPAWN: Mutex<()> = Mutex::new(());

        fn fake_ffmpeg(dir: &TempDir, body: &str) -> (PathBuf, MutexGuard<'static, ()>) {
            let guard = SPAWN.lock().unwrap_or_else(|e| e.into_inner());
            let path = dir.path().join("ffmpeg");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            (path, guard)
        }

        fn source(dir: &TempDir, body: &str) -> FfmpegSource {
            let (program, _guard) = fake_ffmpeg(dir, body);
            FfmpegSource::with_program(program.as_os_str(), Path::new("in.mkv"), geometry()).unwrap()
        }

        #[test]
        fn decoder_crash_after_whole_frame_fails_the_source() {
            // One 2x2 rgb24 frame, then a non-zero exit.
            let dir = tempdir().unwrap();
            let mut source = source(&dir, "printf 'aaaaaaaaaaaa'\nexit 1");

            let first = source.next_frame().unwrap().unwrap();
            assert_eq!(first.as_bytes(), &[b'a'; 12][..]);

            let err = source.next_frame().unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::SourceUnavailable(_))
            ));
            assert!(format!("{:#}", err).contains("exited with"));
            assert!(source.next_frame().unwrap().is_none());
        }

        #[test]
        fn clean_decoder_exit_ends_the_stream() {
            let dir = tempdir().unwrap();
            let mut source = source(&dir, "printf 'aaaaaaaaaaaa'");
            assert!(source.next_frame().unwrap().is_some());
            assert!(source.next_frame().unwrap().is_none());
            assert!(source.next_frame().unwrap().is_none());
        }

        #[cfg(target_os = "linux")]
        #[test]
        fn dropped_encoder_kills_and_reaps_child() {
            let dir = tempdir().unwrap();
            let encoder = {
                let (program, _guard) = fake_ffmpeg(&dir, "exec sleep 30");
                FfmpegEncoder::with_program(program.as_os_str(), Vec::new()).unwrap()
            };
            let pid = encoder.child.id();
            assert!(Path::new(&format!("/proc/{}", pid)).exists());

            drop(encoder);
            // A killed but unreaped child would linger as a zombie entry.
            assert!(!Path::new(&format!("/proc/{}", pid)).exists());
        }
    }
}
