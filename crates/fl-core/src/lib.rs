pub mod error;
pub mod padding;

pub use error::PipelineError;
pub use padding::{AlignedFrame, AlignmentSpec};

use std::{fmt, str::FromStr};

/// Bytes per pixel of an rgb24 frame.
pub const CHANNELS: usize = 3;

/// Dimensions shared by every frame of one run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "frame geometry must be non-zero, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    #[inline]
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    #[inline]
    pub fn row_len(&self) -> usize {
        self.width as usize * CHANNELS
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One decoded picture: row-major, channel-interleaved rgb24 bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
}

impl Frame {
    pub fn from_bytes(geometry: FrameGeometry, data: Vec<u8>) -> Result<Self, PipelineError> {
        if data.len() != geometry.frame_len() {
            return Err(PipelineError::FrameSizeMismatch {
                expected: geometry.frame_len(),
                got: data.len(),
            });
        }
        Ok(Self { data })
    }

    pub fn filled(geometry: FrameGeometry, value: u8) -> Self {
        Self {
            data: vec![value; geometry.frame_len()],
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("len", &self.data.len()).finish()
    }
}

/// Model input scale. Only the power-of-two steps the model was trained for are valid.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Scale(f32);

impl Scale {
    pub const ALLOWED: [f32; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];
    pub const HALF: Self = Self(0.5);
    pub const ONE: Self = Self(1.0);

    #[inline]
    pub fn value(self) -> f32 {
        self.0
    }

    /// 4K sources are run at half scale unless the caller already picked one.
    pub fn for_uhd(self, uhd: bool) -> Self {
        if uhd && self == Self::ONE {
            Self::HALF
        } else {
            self
        }
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<f32> for Scale {
    type Error = PipelineError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        if Self::ALLOWED.contains(&value) {
            Ok(Self(value))
        } else {
            Err(PipelineError::InvalidConfig(format!(
                "scale must be one of {:?}, got {}",
                Self::ALLOWED,
                value
            )))
        }
    }
}

impl FromStr for Scale {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s
            .trim()
            .parse()
            .map_err(|_| PipelineError::InvalidConfig(format!("'{}' is not a number", s)))?;
        Self::try_from(value)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_rejects_zero_sides() {
        assert!(FrameGeometry::new(0, 10).is_err());
        assert!(FrameGeometry::new(10, 0).is_err());
        assert_eq!(FrameGeometry::new(4, 2).unwrap().frame_len(), 24);
    }

    #[test]
    fn frame_length_is_checked() {
        let geometry = FrameGeometry::new(2, 2).unwrap();
        assert!(Frame::from_bytes(geometry, vec![0; 12]).is_ok());
        assert_eq!(
            Frame::from_bytes(geometry, vec![0; 11]),
            Err(PipelineError::FrameSizeMismatch {
                expected: 12,
                got: 11
            })
        );
    }

    #[test]
    fn scale_accepts_only_known_steps() {
        for s in ["0.25", "0.5", "1.0", "2", "4.0"] {
            assert!(s.parse::<Scale>().is_ok(), "{} should parse", s);
        }
        assert!("0.75".parse::<Scale>().is_err());
        assert!("fast".parse::<Scale>().is_err());
        assert!(Scale::try_from(8.0).is_err());
    }

    #[test]
    fn uhd_halves_default_scale_only() {
        assert_eq!(Scale::ONE.for_uhd(true), Scale::HALF);
        assert_eq!(Scale::ONE.for_uhd(false), Scale::ONE);
        let quarter = Scale::try_from(0.25).unwrap();
        assert_eq!(quarter.for_uhd(true), quarter);
    }
}
