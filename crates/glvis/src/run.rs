use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glcontext::DisplayType;
use image::{ImageFormat, RgbaImage};
use projectm::{ProjectM, ProjectMElement};
use tracing_subscriber::EnvFilter;
use visconfig::{PropertyValue, VisualizerConfig};
use visualizer::{
    AudioInfo, Component, ElementMessage, ElementState, GlAudioVisualizer, VideoFormat,
    VideoFrame, VideoInfo,
};

use crate::cli::Cli;
use crate::paths::AppPaths;
use crate::signal::SignalGenerator;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let output = &config.output;

    let display: DisplayType = output.display.parse().map_err(|err: String| anyhow!(err))?;
    let format: VideoFormat = output.format.parse()?;
    let video = VideoInfo::new(format, output.width, output.height, output.fps, 1);
    let audio = AudioInfo::default();
    let seed = cli.seed.unwrap_or(0);

    let visualizer = GlAudioVisualizer::new("projectm", ProjectM::new().with_seed(seed))
        .with_display_type(display);
    let element = ProjectMElement::from_visualizer(visualizer);
    element.replace_settings(config.settings.clone());

    if let Some(dir) = &cli.output {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }

    element.set_state(ElementState::Playing)?;
    if let Err(err) = element.set_caps(audio, video) {
        report_bus(&element);
        return Err(err).context("caps negotiation failed");
    }

    let samples = video.samples_per_frame(&audio) as usize;
    let mut generator = SignalGenerator::new(cli.signal, audio.rate, seed);
    tracing::info!(
        frames = output.frames,
        width = video.width,
        height = video.height,
        fps = output.fps,
        format = %format,
        samples_per_frame = samples,
        "rendering"
    );

    for index in 0..output.frames {
        let buffer = generator.next_buffer(samples);
        let frame = match element.process(&buffer) {
            Ok(frame) => frame,
            Err(err) => {
                report_bus(&element);
                return Err(err).with_context(|| format!("failed to render frame {index}"));
            }
        };
        if let Some(dir) = &cli.output {
            let path = dir.join(format!("frame-{index:05}.png"));
            write_png(&frame, &path)?;
            tracing::debug!(path = %path.display(), "frame written");
        }
    }

    let rendered = element.frame_count();
    element.set_state(ElementState::Null)?;
    report_bus(&element);
    tracing::info!(frames = rendered, "done");
    Ok(())
}

/// Config file (explicit or default), then flags, then `--set` assignments.
fn resolve_config(cli: &Cli) -> Result<VisualizerConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => default_config_path()?,
    };
    let mut config = match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading configuration");
            VisualizerConfig::load(&path)?
        }
        None => VisualizerConfig::default(),
    };

    let settings = &mut config.settings;
    let path_value = |path: &PathBuf| PropertyValue::String(Some(path.display().to_string()));
    if let Some(preset) = &cli.preset {
        settings.set("preset", path_value(preset))?;
    }
    if let Some(dir) = &cli.texture_dir {
        settings.set("texture-dir", path_value(dir))?;
    }
    if let Some(mesh) = &cli.mesh_size {
        settings.set_from_str("mesh-size", mesh)?;
    }
    for (name, raw) in &cli.set {
        settings
            .set_from_str(name, raw)
            .with_context(|| format!("invalid --set {name}={raw}"))?;
    }

    let output = &mut config.output;
    if let Some(frames) = cli.frames {
        output.frames = frames;
    }
    if let Some((width, height)) = cli.size {
        output.width = width;
        output.height = height;
    }
    if let Some(fps) = cli.fps {
        output.fps = fps;
    }
    if let Some(format) = cli.format {
        output.format = format.name().to_string();
    }
    if let Some(display) = &cli.display {
        output.display = display.clone();
    }
    config.validate()?;
    Ok(config)
}

/// The default config file, if one exists.
fn default_config_path() -> Result<Option<PathBuf>> {
    let paths = AppPaths::discover()?;
    let file = paths.config_file();
    tracing::debug!(config = %paths.config_dir().display(), "resolved glvis paths");
    Ok(file.is_file().then_some(file))
}

/// Converts a frame in any supported layout back to RGBA.
fn frame_to_rgba(frame: &VideoFrame) -> Vec<u8> {
    let layout = frame.info().format.layout();
    let mut rgba = Vec::with_capacity(frame.data().len());
    for pixel in frame.data().chunks_exact(4) {
        let mut out = [0, 0, 0, 0xff];
        for (byte, component) in pixel.iter().zip(layout) {
            match component {
                Component::R => out[0] = *byte,
                Component::G => out[1] = *byte,
                Component::B => out[2] = *byte,
                Component::A => out[3] = *byte,
                Component::X => {}
            }
        }
        rgba.extend_from_slice(&out);
    }
    rgba
}

fn write_png(frame: &VideoFrame, path: &Path) -> Result<()> {
    let image = RgbaImage::from_raw(frame.width(), frame.height(), frame_to_rgba(frame))
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width(), frame.height()))?;
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn report_bus(element: &ProjectMElement) {
    for message in element.bus().drain() {
        match message {
            ElementMessage::Error {
                source,
                domain,
                message,
                debug: detail,
            } => match detail {
                Some(detail) => tracing::error!(%source, %domain, "{message} ({detail})"),
                None => tracing::error!(%source, %domain, "{message}"),
            },
            ElementMessage::Warning { source, message } => {
                tracing::warn!(%source, "{message}")
            }
        }
    }
}
