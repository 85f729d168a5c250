use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use glcontext::{ActiveContext, GlApi};
use rand::Rng;
use tracing::{debug, info, warn};
use visconfig::{PropertyError, PropertyValue, Settings};
use visualizer::{AudioBuffer, AudioInfo, GlAudioVisualizer, GlVisualizer, VideoFrame, VideoInfo};

use crate::engine::{ChannelLayout, EngineFactory, EngineSettings, VisualizationEngine};
use crate::pixels::ChannelOrder;
use crate::playlist::{Playlist, PlaylistMode};
use crate::reference::ScopeFactory;

/// The projectM visualizer: drives a [`VisualizationEngine`] from the GL
/// audio visualizer base and copies its output into negotiated frames.
pub struct ProjectM {
    factory: Arc<dyn EngineFactory>,
    settings: Settings,
    seed: u64,
    engine: Option<Box<dyn VisualizationEngine>>,
    playlist: Option<Playlist>,
    current_preset: Option<PathBuf>,
    video: Option<VideoInfo>,
    order: Option<ChannelOrder>,
    staging: Vec<u8>,
}

impl Default for ProjectM {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectM {
    pub fn new() -> Self {
        Self::with_factory(Arc::new(ScopeFactory))
    }

    pub fn with_factory(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            settings: Settings::default(),
            seed: rand::thread_rng().gen(),
            engine: None,
            playlist: None,
            current_preset: None,
            video: None,
            order: None,
            staging: Vec::new(),
        }
    }

    /// Fixes the playlist shuffle seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn current_preset(&self) -> Option<&Path> {
        self.current_preset.as_deref()
    }

    pub fn playlist(&self) -> Option<&Playlist> {
        self.playlist.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_some()
    }

    /// Bytes held for GL readback; empty while stopped.
    pub fn staging_len(&self) -> usize {
        self.staging.len()
    }

    fn engine_settings(&self, window_size: (u32, u32)) -> EngineSettings {
        let fps = self
            .video
            .map_or(0, |video| video.fps().round().max(0.0) as u32);
        EngineSettings::from_settings(&self.settings, fps, window_size)
    }

    fn load_presets(&mut self, engine: &mut dyn VisualizationEngine) {
        let Some(preset) = self.settings.preset.clone() else {
            return;
        };

        if preset.is_dir() {
            if !self.settings.enable_playlist {
                warn!(path = %preset.display(), "preset is a directory but the playlist is disabled");
                return;
            }
            let mode = if self.settings.shuffle_presets {
                PlaylistMode::Shuffle
            } else {
                PlaylistMode::Sequential
            };
            let duration = Duration::from_secs_f64(self.settings.preset_duration.max(0.0));
            match Playlist::from_directory(&preset, mode, duration, self.seed) {
                Ok(playlist) => {
                    info!(path = %preset.display(), presets = playlist.len(), ?mode, "preset playlist loaded");
                    if let Some(first) = playlist.current() {
                        self.current_preset = load_preset(engine, first, false);
                    }
                    self.playlist = Some(playlist);
                }
                Err(err) => warn!("{err}"),
            }
        } else {
            self.current_preset = load_preset(engine, &preset, false);
        }
    }
}

/// Loads `path`, logging failures. Returns the path on success.
fn load_preset(engine: &mut dyn VisualizationEngine, path: &Path, smooth: bool) -> Option<PathBuf> {
    match engine.load_preset(path, smooth) {
        Ok(()) => {
            debug!(path = %path.display(), smooth, "preset loaded");
            Some(path.to_path_buf())
        }
        Err(err) => {
            warn!("{err}");
            None
        }
    }
}

impl GlVisualizer for ProjectM {
    fn supported_gl_api(&self) -> GlApi {
        GlApi::OPENGL3 | GlApi::GLES2
    }

    fn setup(&mut self, _audio: &AudioInfo, video: &VideoInfo) -> anyhow::Result<()> {
        let order = ChannelOrder::new(video.format);
        debug!(
            format = %video.format,
            identity = order.is_identity(),
            "output channel order"
        );
        self.order = Some(order);
        self.video = Some(*video);
        Ok(())
    }

    fn gl_start(&mut self, gl: &mut ActiveContext) -> anyhow::Result<()> {
        let mut engine = self.factory.create_instance().ok_or_else(|| {
            anyhow!(
                "could not create a {} visualization engine instance",
                self.factory.name()
            )
        })?;
        info!("Using Properties: {}", self.settings.describe());

        let window_size = self
            .video
            .map_or_else(|| gl.window().size(), |video| (video.width, video.height));
        engine.configure(&self.engine_settings(window_size));
        if let Some(dir) = &self.settings.texture_dir {
            engine.set_texture_search_paths(std::slice::from_ref(dir));
        }
        self.load_presets(&mut *engine);

        self.staging = vec![0; window_size.0 as usize * window_size.1 as usize * 4];
        info!(
            context = gl.context_id(),
            engine = self.factory.name(),
            width = window_size.0,
            height = window_size.1,
            "visualization engine initialized"
        );
        self.engine = Some(engine);
        Ok(())
    }

    fn gl_stop(&mut self, gl: &mut ActiveContext) {
        if self.engine.take().is_some() {
            info!(context = gl.context_id(), "visualization engine destroyed");
        }
        self.playlist = None;
        self.current_preset = None;
        self.staging = Vec::new();
    }

    fn gl_render(
        &mut self,
        gl: &mut ActiveContext,
        audio: &AudioBuffer,
        video: &mut VideoFrame,
    ) -> anyhow::Result<bool> {
        let info = *video.info();
        let (width, height) = (info.width, info.height);
        if width == 0 || height == 0 {
            bail!("output frame is {width}x{height}");
        }
        if info.fps_n == 0 || info.fps_d == 0 {
            bail!("invalid framerate {}/{}", info.fps_n, info.fps_d);
        }
        let order = match self.order {
            Some(order) if order.format() == info.format => order,
            _ => ChannelOrder::new(info.format),
        };

        if gl.window().size() != (width, height) {
            gl.configure_window(width, height);
            let settings = self.engine_settings((width, height));
            if let Some(engine) = self.engine.as_mut() {
                engine.configure(&settings);
            }
        }

        let Some(engine) = self.engine.as_mut() else {
            bail!("visualization engine is not running");
        };
        let samples = audio.samples();
        engine.feed_pcm(&samples, ChannelLayout::Stereo);
        engine.render_frame(gl)?;

        let needed = width as usize * height as usize * 4;
        if self.staging.len() != needed {
            self.staging.resize(needed, 0);
        }
        if !gl.gl().read_pixels(0, 0, width, height, &mut self.staging) {
            return Ok(false);
        }
        order.apply(&self.staging, video.data_mut())?;

        let dt = Duration::from_secs_f64(f64::from(info.fps_d) / f64::from(info.fps_n));
        let locked = self.settings.preset_locked;
        if let Some(next) = self.playlist.as_mut().and_then(|playlist| playlist.tick(dt, locked)) {
            let next = next.to_path_buf();
            if let Some(loaded) = load_preset(&mut **engine, &next, true) {
                self.current_preset = Some(loaded);
            }
        }
        Ok(true)
    }
}

/// A [`GlAudioVisualizer`] running [`ProjectM`], with named property access.
#[derive(Debug, Clone)]
pub struct ProjectMElement(Arc<GlAudioVisualizer<ProjectM>>);

impl ProjectMElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_visualizer(GlAudioVisualizer::new(name, ProjectM::new()))
    }

    pub fn from_visualizer(visualizer: GlAudioVisualizer<ProjectM>) -> Self {
        Self(Arc::new(visualizer))
    }

    /// Takes effect the next time the engine starts.
    pub fn set_property(&self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        self.0.with_subclass(|projectm| projectm.settings.set(name, value))
    }

    pub fn set_property_from_str(&self, name: &str, raw: &str) -> Result<(), PropertyError> {
        self.0
            .with_subclass(|projectm| projectm.settings.set_from_str(name, raw))
    }

    pub fn property(&self, name: &str) -> Result<PropertyValue, PropertyError> {
        self.0.with_subclass(|projectm| projectm.settings.get(name))
    }

    pub fn settings(&self) -> Settings {
        self.0.with_subclass(|projectm| projectm.settings.clone())
    }

    pub fn replace_settings(&self, settings: Settings) {
        self.0.with_subclass(|projectm| projectm.settings = settings);
    }

    pub fn current_preset(&self) -> Option<PathBuf> {
        self.0
            .with_subclass(|projectm| projectm.current_preset().map(Path::to_path_buf))
    }

    pub fn as_arc(&self) -> &Arc<GlAudioVisualizer<ProjectM>> {
        &self.0
    }
}

impl Deref for ProjectMElement {
    type Target = GlAudioVisualizer<ProjectM>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
