use crate::api::{GlApi, GlVersion};
use crate::error::GlErrorCode;

/// The subset of the GL function table the visualizer protocol relies on.
///
/// A backend is created on, and only ever touched from, the GL thread of the
/// context that owns it.
pub trait GlBackend: Send {
    /// The single API this context was created for.
    fn api(&self) -> GlApi;
    fn version(&self) -> GlVersion;
    /// Binds the context to the calling thread.
    fn make_current(&mut self) -> bool;
    fn resize_surface(&mut self, width: u32, height: u32);
    fn surface_size(&self) -> (u32, u32);
    fn clear(&mut self, rgba: [f32; 4]);
    fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: [u8; 4]);
    /// Copies a rectangle of the framebuffer into `out` as tightly packed
    /// RGBA8, top row first.
    fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32, out: &mut [u8]) -> bool;
    fn framebuffer_complete(&self) -> bool;
    /// Returns and clears the pending error flag, like `glGetError`.
    fn get_error(&mut self) -> GlErrorCode;
}

/// Parameters handed to a factory when a context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextRequest {
    pub display_id: u64,
    /// APIs the display allows; the created context must pick one of them.
    pub api_filter: GlApi,
    /// Id of the context this one shares objects with, if any.
    pub share_with: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFailure {
    pub message: String,
    /// Raw `glGetError` value observed while creating, `0` if none.
    pub gl_error: u32,
}

impl CreateFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            gl_error: GlErrorCode::GL_NO_ERROR,
        }
    }
}

/// Creates backends for a display. Called on the freshly spawned GL thread.
pub trait BackendFactory: Send + Sync {
    fn name(&self) -> &str;
    fn create(&self, request: &ContextRequest) -> Result<Box<dyn GlBackend>, CreateFailure>;
}

const API_PREFERENCE: [GlApi; 4] = [GlApi::OPENGL3, GlApi::OPENGL, GlApi::GLES2, GlApi::GLES1];

/// Headless backend rendering into a CPU-side RGBA framebuffer.
#[derive(Debug)]
pub struct SoftwareBackend {
    api: GlApi,
    version: GlVersion,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    error: GlErrorCode,
}

impl SoftwareBackend {
    pub fn new(api: GlApi, version: GlVersion) -> Self {
        Self {
            api,
            version,
            width: 1,
            height: 1,
            pixels: vec![0; 4],
            error: GlErrorCode::NoError,
        }
    }

    fn flag(&mut self, code: GlErrorCode) {
        // Like GL, the first error sticks until it is queried.
        if !self.error.is_error() {
            self.error = code;
        }
    }

    fn in_bounds(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        x.checked_add(width).map_or(false, |end| end <= self.width)
            && y.checked_add(height).map_or(false, |end| end <= self.height)
    }
}

impl GlBackend for SoftwareBackend {
    fn api(&self) -> GlApi {
        self.api
    }

    fn version(&self) -> GlVersion {
        self.version
    }

    fn make_current(&mut self) -> bool {
        true
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.flag(GlErrorCode::InvalidValue);
            return;
        }
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize * 4];
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        let texel = rgba.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8);
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&texel);
        }
    }

    fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: [u8; 4]) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        let stride = self.width as usize * 4;
        for row in y.min(y_end)..y_end {
            let start = row as usize * stride + x.min(x_end) as usize * 4;
            let end = row as usize * stride + x_end as usize * 4;
            for pixel in self.pixels[start..end].chunks_exact_mut(4) {
                pixel.copy_from_slice(&rgba);
            }
        }
    }

    fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32, out: &mut [u8]) -> bool {
        let row_bytes = width as usize * 4;
        if width == 0
            || height == 0
            || !self.in_bounds(x, y, width, height)
            || out.len() < row_bytes * height as usize
        {
            self.flag(GlErrorCode::InvalidValue);
            return false;
        }
        let stride = self.width as usize * 4;
        for (row, target) in out.chunks_exact_mut(row_bytes).take(height as usize).enumerate() {
            let start = (y as usize + row) * stride + x as usize * 4;
            target.copy_from_slice(&self.pixels[start..start + row_bytes]);
        }
        true
    }

    fn framebuffer_complete(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    fn get_error(&mut self) -> GlErrorCode {
        std::mem::replace(&mut self.error, GlErrorCode::NoError)
    }
}

/// Factory for [`SoftwareBackend`]s. Picks the preferred API among those it
/// offers and the display allows.
#[derive(Debug, Clone)]
pub struct SoftwareFactory {
    apis: GlApi,
    version: GlVersion,
    failure: Option<CreateFailure>,
}

impl Default for SoftwareFactory {
    fn default() -> Self {
        Self::new(GlApi::OPENGL3 | GlApi::OPENGL | GlApi::GLES2, GlVersion::new(3, 3))
    }
}

impl SoftwareFactory {
    pub fn new(apis: GlApi, version: GlVersion) -> Self {
        Self {
            apis,
            version,
            failure: None,
        }
    }

    /// A factory whose every context creation fails.
    pub fn failing(failure: CreateFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn apis(&self) -> GlApi {
        self.apis
    }
}

impl BackendFactory for SoftwareFactory {
    fn name(&self) -> &str {
        "software"
    }

    fn create(&self, request: &ContextRequest) -> Result<Box<dyn GlBackend>, CreateFailure> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let available = self.apis & request.api_filter;
        let api = API_PREFERENCE
            .into_iter()
            .find(|candidate| available.contains(*candidate))
            .ok_or_else(|| {
                CreateFailure::new(format!(
                    "no usable GL API: backend offers {} but display allows {}",
                    self.apis, request.api_filter
                ))
            })?;
        tracing::debug!(
            display = request.display_id,
            share_with = ?request.share_with,
            api = %api,
            "creating software GL backend"
        );
        Ok(Box::new(SoftwareBackend::new(api, self.version)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(api_filter: GlApi) -> ContextRequest {
        ContextRequest {
            display_id: 1,
            api_filter,
            share_with: None,
        }
    }

    #[test]
    fn factory_prefers_core_profile() {
        let backend = SoftwareFactory::default().create(&request(GlApi::ANY)).unwrap();
        assert_eq!(backend.api(), GlApi::OPENGL3);

        let backend = SoftwareFactory::default()
            .create(&request(GlApi::GLES2))
            .unwrap();
        assert_eq!(backend.api(), GlApi::GLES2);
    }

    #[test]
    fn factory_rejects_disjoint_filter() {
        let factory = SoftwareFactory::new(GlApi::OPENGL, GlVersion::new(2, 1));
        let err = factory.create(&request(GlApi::GLES2)).err().unwrap();
        assert!(err.message.contains("opengl"), "{}", err.message);
    }

    #[test]
    fn fill_and_read_back() {
        let mut backend = SoftwareBackend::new(GlApi::OPENGL3, GlVersion::new(3, 3));
        backend.resize_surface(4, 2);
        backend.clear([0.0, 0.0, 0.0, 1.0]);
        backend.fill_rect(1, 1, 2, 1, [255, 0, 0, 255]);

        let mut out = vec![0u8; 4 * 2 * 4];
        assert!(backend.read_pixels(0, 0, 4, 2, &mut out));
        assert_eq!(&out[0..4], &[0, 0, 0, 255]);
        assert_eq!(&out[(4 + 1) * 4..(4 + 2) * 4], &[255, 0, 0, 255]);
        assert_eq!(backend.get_error(), GlErrorCode::NoError);
    }

    #[test]
    fn out_of_bounds_read_sets_sticky_error() {
        let mut backend = SoftwareBackend::new(GlApi::OPENGL3, GlVersion::new(3, 3));
        backend.resize_surface(2, 2);
        let mut out = vec![0u8; 64];
        assert!(!backend.read_pixels(0, 0, 4, 4, &mut out));
        backend.resize_surface(0, 1);
        assert_eq!(backend.get_error(), GlErrorCode::InvalidValue);
        assert_eq!(backend.get_error(), GlErrorCode::NoError);
    }

    #[test]
    fn empty_read_is_an_invalid_value() {
        let mut backend = SoftwareBackend::new(GlApi::OPENGL3, GlVersion::new(3, 3));
        backend.resize_surface(2, 2);
        let mut out = vec![0u8; 16];
        assert!(!backend.read_pixels(0, 0, 0, 2, &mut out));
        assert!(!backend.read_pixels(0, 0, 2, 0, &mut out));
        assert_eq!(backend.get_error(), GlErrorCode::InvalidValue);
    }
}
