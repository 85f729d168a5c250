use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use visualizer::VideoFormat;

#[derive(Parser, Debug)]
#[command(
    name = "glvis",
    author,
    version,
    about = "Render a projectM visualization of synthesized audio to PNG frames"
)]
pub struct Cli {
    /// Configuration file; defaults to `glvis.toml` in the user config directory.
    #[arg(long, value_name = "FILE", env = "GLVIS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Preset file, or a directory of presets when the playlist is enabled.
    #[arg(long, value_name = "PATH")]
    pub preset: Option<PathBuf>,

    /// Directory searched for preset textures.
    #[arg(long, value_name = "DIR")]
    pub texture_dir: Option<PathBuf>,

    /// Number of frames to render.
    #[arg(long, value_name = "N")]
    pub frames: Option<u32>,

    /// Output size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Output framerate; also decides how much audio each frame consumes.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<u32>,

    /// Output pixel format (`RGBA`, `BGRx`, `xRGB`, ...).
    #[arg(long, value_name = "FORMAT", value_parser = parse_video_format)]
    pub format: Option<VideoFormat>,

    /// Mesh resolution as `W,H`.
    #[arg(long, value_name = "W,H")]
    pub mesh_size: Option<String>,

    /// Display backend (`any`, `headless`, `x11`, `wayland`, `egl`).
    #[arg(long, value_name = "TYPE")]
    pub display: Option<String>,

    /// Write each frame as `frame-NNNNN.png` into this directory.
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Audio fed to the visualizer.
    #[arg(long, value_enum, default_value_t = Signal::Sine)]
    pub signal: Signal,

    /// Seed for noise and preset shuffling.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Set any element property, e.g. `--set beat-sensitivity=2.5`. Repeatable.
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Signal {
    Silence,
    Sine,
    Noise,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH format, e.g. 1920x1080, got '{trimmed}'"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in size '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in size '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err("output dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_video_format(value: &str) -> Result<VideoFormat, String> {
    value.parse().map_err(|err: visualizer::GlError| err.to_string())
}

pub fn parse_assignment(value: &str) -> Result<(String, String), String> {
    let (name, raw) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{value}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("property name must not be empty".to_string());
    }
    Ok((name.to_string(), raw.trim().to_string()))
}
