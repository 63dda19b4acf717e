use crate::{Frame, FrameGeometry, PipelineError, Scale, CHANNELS};
use rayon::prelude::*;

/// Smallest tile the model accepts, reached at scale 1.0 and above.
pub const MIN_TILE: u32 = 128;

/// Padding required before frames can be fed to the model.
///
/// Computed once per run from the source geometry and scale. Padding only
/// grows the right and bottom edges, so pixel (0, 0) stays put and cropping
/// is plain truncation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AlignmentSpec {
    pub geometry: FrameGeometry,
    pub tile: u32,
    pub padded_width: u32,
    pub padded_height: u32,
}

impl AlignmentSpec {
    pub fn new(geometry: FrameGeometry, scale: Scale) -> Self {
        let tile = MIN_TILE.max((MIN_TILE as f32 / scale.value()).round() as u32);
        Self {
            geometry,
            tile,
            padded_width: geometry.width.div_ceil(tile) * tile,
            padded_height: geometry.height.div_ceil(tile) * tile,
        }
    }

    #[inline]
    pub fn pad_right(&self) -> u32 {
        self.padded_width - self.geometry.width
    }

    #[inline]
    pub fn pad_bottom(&self) -> u32 {
        self.padded_height - self.geometry.height
    }

    /// Zero-fills the right/bottom margins and normalises samples to `[0, 1]`.
    pub fn align(&self, frame: &Frame) -> Result<AlignedFrame, PipelineError> {
        let expected = self.geometry.frame_len();
        if frame.len() != expected {
            return Err(PipelineError::FrameSizeMismatch {
                expected,
                got: frame.len(),
            });
        }

        let src_row = self.geometry.row_len();
        let dst_row = self.padded_width as usize * CHANNELS;
        let rows = self.geometry.height as usize;
        let mut data = vec![0.0f32; dst_row * self.padded_height as usize];

        data[..dst_row * rows]
            .par_chunks_mut(dst_row)
            .zip(frame.as_bytes().par_chunks(src_row))
            .for_each(|(dst, src)| {
                for (d, &s) in dst[..src_row].iter_mut().zip(src) {
                    *d = to_unit(s);
                }
            });

        Ok(AlignedFrame {
            width: self.padded_width,
            height: self.padded_height,
            data,
        })
    }

    /// Keeps the first `height` rows and `width` columns, quantised back to bytes.
    pub fn crop(&self, aligned: &AlignedFrame) -> Result<Frame, PipelineError> {
        if aligned.width != self.padded_width || aligned.height != self.padded_height {
            return Err(PipelineError::FrameSizeMismatch {
                expected: self.padded_width as usize * self.padded_height as usize * CHANNELS,
                got: aligned.data.len(),
            });
        }

        let dst_row = self.geometry.row_len();
        let src_row = self.padded_width as usize * CHANNELS;
        let mut data = vec![0u8; self.geometry.frame_len()];

        data.par_chunks_mut(dst_row)
            .zip(aligned.data.par_chunks(src_row))
            .for_each(|(dst, src)| {
                for (d, &s) in dst.iter_mut().zip(&src[..dst_row]) {
                    *d = to_byte(s);
                }
            });

        Frame::from_bytes(self.geometry, data)
    }
}

#[inline]
fn to_unit(b: u8) -> f32 {
    b as f32 / 255.0
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// A padded frame in model space: interleaved rgb samples in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFrame {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl AlignedFrame {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, PipelineError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(PipelineError::FrameSizeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize * CHANNELS],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn same_shape(&self, other: &AlignedFrame) -> bool {
        self.width == other.width && self.height == other.height
    }
}
