use std::path::{Path, PathBuf};

use glcontext::ActiveContext;
use tracing::debug;

use crate::engine::{ChannelLayout, EngineError, EngineFactory, EngineSettings, VisualizationEngine};

const BASE_TINT: [f32; 3] = [0.15, 0.35, 0.85];
const WAVE_COLOR: [u8; 4] = [255, 255, 255, 255];

/// Built-in engine drawing an oscilloscope over a level-tinted background.
///
/// The background brightness follows the RMS level of the last PCM block
/// (scaled by beat sensitivity); a loaded preset only changes the tint.
#[derive(Debug)]
pub struct ScopeEngine {
    settings: Option<EngineSettings>,
    texture_paths: Vec<PathBuf>,
    preset: Option<PathBuf>,
    tint: [f32; 3],
    /// Left channel of the last block, or the mono samples.
    wave: Vec<i16>,
    level: f32,
    frames: u64,
}

impl Default for ScopeEngine {
    fn default() -> Self {
        Self {
            settings: None,
            texture_paths: Vec::new(),
            preset: None,
            tint: BASE_TINT,
            wave: Vec::new(),
            level: 0.0,
            frames: 0,
        }
    }
}

impl ScopeEngine {
    pub fn preset(&self) -> Option<&Path> {
        self.preset.as_deref()
    }

    pub fn texture_paths(&self) -> &[PathBuf] {
        &self.texture_paths
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

fn tint_for(path: &Path) -> [f32; 3] {
    let seed = path.file_stem().map_or(0, |stem| {
        stem.to_string_lossy()
            .bytes()
            .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)))
    });
    [0, 8, 16].map(|shift| 0.25 + f32::from((seed >> shift) as u8) / 255.0 * 0.75)
}

impl VisualizationEngine for ScopeEngine {
    fn configure(&mut self, settings: &EngineSettings) {
        debug!(
            fps = settings.fps,
            width = settings.window_size.0,
            height = settings.window_size.1,
            mesh = %settings.mesh_size,
            "scope engine configured"
        );
        self.settings = Some(settings.clone());
    }

    fn set_texture_search_paths(&mut self, paths: &[PathBuf]) {
        self.texture_paths = paths.to_vec();
    }

    fn load_preset(&mut self, path: &Path, _smooth: bool) -> Result<(), EngineError> {
        if !path.is_file() {
            return Err(EngineError::Preset {
                path: path.to_path_buf(),
                reason: "not a readable file".into(),
            });
        }
        self.tint = tint_for(path);
        self.preset = Some(path.to_path_buf());
        Ok(())
    }

    fn feed_pcm(&mut self, samples: &[i16], layout: ChannelLayout) {
        let channels = layout.channels();
        self.wave.clear();
        self.wave
            .extend(samples.chunks_exact(channels).map(|frame| frame[0]));
        if samples.is_empty() {
            self.level = 0.0;
            return;
        }
        let sum: f64 = samples
            .iter()
            .map(|&sample| {
                let normalized = f64::from(sample) / f64::from(i16::MAX);
                normalized * normalized
            })
            .sum();
        self.level = (sum / samples.len() as f64).sqrt() as f32;
    }

    fn render_frame(&mut self, gl: &mut ActiveContext) -> Result<(), EngineError> {
        let (width, height) = gl.window().size();
        if width == 0 || height == 0 {
            return Err(EngineError::Render("surface has no area".into()));
        }
        let sensitivity = self
            .settings
            .as_ref()
            .map_or(1.0, |settings| settings.beat_sensitivity);
        let brightness = (0.2 + self.level * sensitivity).clamp(0.0, 1.0);
        let [r, g, b] = self.tint.map(|channel| channel * brightness);
        gl.gl().clear([r, g, b, 1.0]);

        if !self.wave.is_empty() {
            let middle = i64::from(height / 2);
            let amplitude = i64::from(height / 2).max(1);
            for x in 0..width {
                let index = x as usize * self.wave.len() / width as usize;
                let sample = i64::from(self.wave[index]);
                let y = (middle - sample * amplitude / 32_768).clamp(0, i64::from(height) - 1);
                gl.gl().fill_rect(x, y as u32, 1, 1, WAVE_COLOR);
            }
        }
        self.frames += 1;
        Ok(())
    }

    fn output_size(&self) -> (u32, u32) {
        self.settings
            .as_ref()
            .map_or((0, 0), |settings| settings.window_size)
    }
}

/// Factory for [`ScopeEngine`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeFactory;

impl EngineFactory for ScopeFactory {
    fn name(&self) -> &str {
        "scope"
    }

    fn create_instance(&self) -> Option<Box<dyn VisualizationEngine>> {
        Some(Box::new(ScopeEngine::default()))
    }
}
