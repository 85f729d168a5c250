use std::fmt;
use std::str::FromStr;

use crate::error::GlError;

pub const AUDIO_RATE: u32 = 44_100;
pub const AUDIO_CHANNELS: u32 = 2;
/// Front left | front right.
pub const STEREO_CHANNEL_MASK: u64 = 0x3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    /// Signed 16-bit, native endian.
    S16,
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioLayout {
    Interleaved,
    NonInterleaved,
}

/// Negotiated audio input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub format: AudioFormat,
    pub layout: AudioLayout,
    pub rate: u32,
    pub channels: u32,
    pub channel_mask: u64,
}

impl Default for AudioInfo {
    fn default() -> Self {
        Self {
            format: AudioFormat::S16,
            layout: AudioLayout::Interleaved,
            rate: AUDIO_RATE,
            channels: AUDIO_CHANNELS,
            channel_mask: STEREO_CHANNEL_MASK,
        }
    }
}

impl AudioInfo {
    pub fn bytes_per_frame(&self) -> usize {
        let sample = match self.format {
            AudioFormat::S16 => 2,
            AudioFormat::F32 => 4,
        };
        sample * self.channels as usize
    }

    /// Checks the format against the only one the sink pad accepts.
    pub fn validate(&self) -> Result<(), GlError> {
        if self.format != AudioFormat::S16 || self.layout != AudioLayout::Interleaved {
            return Err(GlError::Negotiation(format!(
                "audio must be interleaved S16, got {:?} {:?}",
                self.format, self.layout
            )));
        }
        if self.channels != AUDIO_CHANNELS || self.channel_mask != STEREO_CHANNEL_MASK {
            return Err(GlError::Negotiation(format!(
                "audio must be stereo (mask 0x3), got {} channels mask {:#x}",
                self.channels, self.channel_mask
            )));
        }
        if self.rate != AUDIO_RATE {
            return Err(GlError::Negotiation(format!(
                "audio rate must be {AUDIO_RATE} Hz, got {}",
                self.rate
            )));
        }
        Ok(())
    }
}

/// A byte of a packed 32-bit pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    R,
    G,
    B,
    A,
    /// Padding; written as opaque.
    X,
}

/// Packed 32-bit RGB formats accepted on the source pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    Rgba,
    Bgra,
    Argb,
    Abgr,
    Rgbx,
    Bgrx,
    Xrgb,
    Xbgr,
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 8] = [
        VideoFormat::Rgba,
        VideoFormat::Bgra,
        VideoFormat::Argb,
        VideoFormat::Abgr,
        VideoFormat::Rgbx,
        VideoFormat::Bgrx,
        VideoFormat::Xrgb,
        VideoFormat::Xbgr,
    ];

    /// Memory order of the four bytes of a pixel.
    pub fn layout(self) -> [Component; 4] {
        use Component::*;
        match self {
            VideoFormat::Rgba => [R, G, B, A],
            VideoFormat::Bgra => [B, G, R, A],
            VideoFormat::Argb => [A, R, G, B],
            VideoFormat::Abgr => [A, B, G, R],
            VideoFormat::Rgbx => [R, G, B, X],
            VideoFormat::Bgrx => [B, G, R, X],
            VideoFormat::Xrgb => [X, R, G, B],
            VideoFormat::Xbgr => [X, B, G, R],
        }
    }

    pub fn has_alpha(self) -> bool {
        self.layout().contains(&Component::A)
    }

    pub fn name(self) -> &'static str {
        match self {
            VideoFormat::Rgba => "RGBA",
            VideoFormat::Bgra => "BGRA",
            VideoFormat::Argb => "ARGB",
            VideoFormat::Abgr => "ABGR",
            VideoFormat::Rgbx => "RGBx",
            VideoFormat::Bgrx => "BGRx",
            VideoFormat::Xrgb => "xRGB",
            VideoFormat::Xbgr => "xBGR",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VideoFormat {
    type Err = GlError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        VideoFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| GlError::Negotiation(format!("unsupported video format '{trimmed}'")))
    }
}

/// Negotiated video output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub fps_n: u32,
    pub fps_d: u32,
}

impl VideoInfo {
    pub fn new(format: VideoFormat, width: u32, height: u32, fps_n: u32, fps_d: u32) -> Self {
        Self {
            format,
            width,
            height,
            fps_n,
            fps_d,
        }
    }

    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    /// Bytes of one frame.
    pub fn size(&self) -> usize {
        self.stride() * self.height as usize
    }

    pub fn fps(&self) -> f64 {
        f64::from(self.fps_n) / f64::from(self.fps_d)
    }

    /// Audio samples per channel consumed by one video frame.
    pub fn samples_per_frame(&self, audio: &AudioInfo) -> u32 {
        let samples = u64::from(audio.rate) * u64::from(self.fps_d) / u64::from(self.fps_n.max(1));
        samples as u32
    }

    pub fn validate(&self) -> Result<(), GlError> {
        if self.width == 0 || self.height == 0 {
            return Err(GlError::Negotiation(format!(
                "video size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.fps_n == 0 || self.fps_d == 0 {
            return Err(GlError::Negotiation(format!(
                "framerate {}/{} is not supported",
                self.fps_n, self.fps_d
            )));
        }
        Ok(())
    }
}
