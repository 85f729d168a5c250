use visualizer::{Component, GlError, VideoFormat};

/// Converts RGBA rows read back from the GL surface into the byte order of a
/// negotiated video format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOrder {
    format: VideoFormat,
    /// Index into an RGBA pixel for each output byte, `None` for padding.
    sources: [Option<usize>; 4],
}

impl ChannelOrder {
    pub fn new(format: VideoFormat) -> Self {
        let sources = format.layout().map(|component| match component {
            Component::R => Some(0),
            Component::G => Some(1),
            Component::B => Some(2),
            Component::A => Some(3),
            Component::X => None,
        });
        Self { format, sources }
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    /// True when the readback can be copied as is.
    pub fn is_identity(&self) -> bool {
        self.sources == [Some(0), Some(1), Some(2), Some(3)]
    }

    pub fn apply(&self, rgba: &[u8], out: &mut [u8]) -> Result<(), GlError> {
        if rgba.len() % 4 != 0 || out.len() < rgba.len() {
            return Err(GlError::Negotiation(format!(
                "cannot convert {} RGBA bytes into a {}-byte {} frame",
                rgba.len(),
                out.len(),
                self.format
            )));
        }
        if self.is_identity() {
            out[..rgba.len()].copy_from_slice(rgba);
            return Ok(());
        }
        for (source, target) in rgba.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
            for (byte, index) in target.iter_mut().zip(self.sources) {
                *byte = index.map_or(0xff, |index| source[index]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

    fn convert(format: VideoFormat) -> [u8; 4] {
        let mut out = [0u8; 4];
        ChannelOrder::new(format).apply(&PIXEL, &mut out).unwrap();
        out
    }

    #[test]
    fn swizzles_every_format() {
        assert_eq!(convert(VideoFormat::Rgba), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(convert(VideoFormat::Bgra), [0x33, 0x22, 0x11, 0x44]);
        assert_eq!(convert(VideoFormat::Argb), [0x44, 0x11, 0x22, 0x33]);
        assert_eq!(convert(VideoFormat::Abgr), [0x44, 0x33, 0x22, 0x11]);
        assert_eq!(convert(VideoFormat::Rgbx), [0x11, 0x22, 0x33, 0xff]);
        assert_eq!(convert(VideoFormat::Bgrx), [0x33, 0x22, 0x11, 0xff]);
        assert_eq!(convert(VideoFormat::Xrgb), [0xff, 0x11, 0x22, 0x33]);
        assert_eq!(convert(VideoFormat::Xbgr), [0xff, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn only_rgba_is_identity() {
        for format in VideoFormat::ALL {
            assert_eq!(
                ChannelOrder::new(format).is_identity(),
                format == VideoFormat::Rgba
            );
        }
    }

    #[test]
    fn short_output_is_rejected() {
        let mut out = [0u8; 4];
        assert!(ChannelOrder::new(VideoFormat::Bgra)
            .apply(&[0u8; 8], &mut out)
            .is_err());
    }
}
