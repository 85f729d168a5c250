use std::path::{Path, PathBuf};

use glcontext::ActiveContext;
use visconfig::{MeshSize, Settings, MAX_DURATION};

/// Preset duration handed to the engine when presets should never expire.
pub const INDEFINITE_PRESET_DURATION: f64 = MAX_DURATION;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to load preset {}: {reason}", path.display())]
    Preset { path: PathBuf, reason: String },
    #[error("failed to scan preset directory {}: {source}", path.display())]
    PresetDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine render failed: {0}")]
    Render(String),
}

/// Interleaving of the PCM fed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Everything the engine is configured with at start.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub fps: u32,
    pub window_size: (u32, u32),
    pub beat_sensitivity: f32,
    pub hard_cut_duration: f64,
    pub hard_cut_enabled: bool,
    pub hard_cut_sensitivity: f32,
    pub soft_cut_duration: f64,
    pub preset_duration: f64,
    pub mesh_size: MeshSize,
    pub aspect_correction: bool,
    pub easter_egg: f32,
    pub preset_locked: bool,
}

impl EngineSettings {
    /// Maps element properties onto engine settings. A preset duration of
    /// zero becomes [`INDEFINITE_PRESET_DURATION`].
    pub fn from_settings(settings: &Settings, fps: u32, window_size: (u32, u32)) -> Self {
        let preset_duration = if settings.preset_duration <= 0.0 {
            INDEFINITE_PRESET_DURATION
        } else {
            settings.preset_duration
        };
        Self {
            fps,
            window_size,
            beat_sensitivity: settings.beat_sensitivity,
            hard_cut_duration: settings.hard_cut_duration,
            hard_cut_enabled: settings.hard_cut_enabled,
            hard_cut_sensitivity: settings.hard_cut_sensitivity,
            soft_cut_duration: settings.soft_cut_duration,
            preset_duration,
            mesh_size: settings.mesh_size,
            aspect_correction: settings.aspect_correction,
            easter_egg: settings.easter_egg,
            preset_locked: settings.preset_locked,
        }
    }
}

/// A visualization engine instance. All methods run on the GL thread of the
/// context the instance was created on; destroying the instance is dropping it.
pub trait VisualizationEngine: Send {
    fn configure(&mut self, settings: &EngineSettings);

    fn set_texture_search_paths(&mut self, paths: &[PathBuf]);

    fn load_preset(&mut self, path: &Path, smooth: bool) -> Result<(), EngineError>;

    fn feed_pcm(&mut self, samples: &[i16], layout: ChannelLayout);

    /// Draws one frame into the context's current surface.
    fn render_frame(&mut self, gl: &mut ActiveContext) -> Result<(), EngineError>;

    fn output_size(&self) -> (u32, u32);
}

pub trait EngineFactory: Send + Sync {
    fn name(&self) -> &str;

    /// `None` when the engine library cannot produce an instance.
    fn create_instance(&self) -> Option<Box<dyn VisualizationEngine>>;
}
