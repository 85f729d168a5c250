use std::borrow::Cow;
use std::mem;
use std::sync::Arc;

use crate::caps::VideoInfo;

/// One buffer of interleaved S16 audio as it arrives on the sink pad.
///
/// The bytes are reference counted; clones share them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioBuffer {
    data: Arc<Vec<u8>>,
}

impl AudioBuffer {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn from_samples(samples: &[i16]) -> Self {
        Self::from_bytes(bytemuck::cast_slice(samples).to_vec())
    }

    /// `frames` stereo frames of digital silence.
    pub fn silence(frames: usize) -> Self {
        Self::from_bytes(vec![0; frames * 4])
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Samples per channel, assuming 16-bit stereo.
    pub fn samples_per_channel(&self) -> usize {
        self.data.len() / 4
    }

    /// The buffer viewed as interleaved samples. Borrows when the mapping is
    /// suitably aligned and copies otherwise; a trailing odd byte is ignored.
    pub fn samples(&self) -> Cow<'_, [i16]> {
        let even = &self.data[..self.data.len() & !1];
        match bytemuck::try_cast_slice(even) {
            Ok(samples) => Cow::Borrowed(samples),
            Err(_) => Cow::Owned(bytemuck::pod_collect_to_vec(even)),
        }
    }
}

/// A mapped output video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    info: VideoInfo,
    data: Vec<u8>,
}

impl VideoFrame {
    /// A zero-filled frame for `info`.
    pub fn new(info: VideoInfo) -> Self {
        Self {
            data: vec![0; info.size()],
            info,
        }
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.info.width || y >= self.info.height {
            return None;
        }
        let offset = y as usize * self.info.stride() + x as usize * 4;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.data[offset..offset + 4]);
        Some(pixel)
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Moves the pixels out, leaving an empty frame with the same info.
    pub(crate) fn take(&mut self) -> VideoFrame {
        VideoFrame {
            info: self.info,
            data: mem::take(&mut self.data),
        }
    }
}
