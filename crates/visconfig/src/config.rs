use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::properties::{PropertyValue, Settings};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Output geometry and run length for a headless pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: String,
    pub frames: u32,
    pub display: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            fps: 30,
            format: "RGBA".into(),
            frames: 60,
            display: "any".into(),
        }
    }
}

/// A whole configuration file: element properties plus output settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisualizerConfig {
    pub settings: Settings,
    pub output: OutputConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    visualizer: RawSettings,
    #[serde(default)]
    output: OutputConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct RawSettings {
    preset: Option<PathBuf>,
    texture_dir: Option<PathBuf>,
    beat_sensitivity: Option<f32>,
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    hard_cut_duration: Option<Duration>,
    hard_cut_enabled: Option<bool>,
    hard_cut_sensitivity: Option<f32>,
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    soft_cut_duration: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    preset_duration: Option<Duration>,
    mesh_size: Option<String>,
    aspect_correction: Option<bool>,
    easter_egg: Option<f32>,
    preset_locked: Option<bool>,
    shuffle_presets: Option<bool>,
    enable_playlist: Option<bool>,
}

impl RawSettings {
    fn assignments(self) -> Vec<(&'static str, PropertyValue)> {
        let path = |path: PathBuf| PropertyValue::String(Some(path.display().to_string()));
        let seconds = |duration: Duration| PropertyValue::Double(duration.as_secs_f64());
        let mut values = Vec::new();
        let mut push = |name: &'static str, value: Option<PropertyValue>| {
            if let Some(value) = value {
                values.push((name, value));
            }
        };
        push("preset", self.preset.map(path));
        push("texture-dir", self.texture_dir.map(path));
        push("beat-sensitivity", self.beat_sensitivity.map(PropertyValue::Float));
        push("hard-cut-duration", self.hard_cut_duration.map(seconds));
        push("hard-cut-enabled", self.hard_cut_enabled.map(PropertyValue::Bool));
        push("hard-cut-sensitivity", self.hard_cut_sensitivity.map(PropertyValue::Float));
        push("soft-cut-duration", self.soft_cut_duration.map(seconds));
        push("preset-duration", self.preset_duration.map(seconds));
        push("mesh-size", self.mesh_size.map(|raw| PropertyValue::String(Some(raw))));
        push("aspect-correction", self.aspect_correction.map(PropertyValue::Bool));
        push("easter-egg", self.easter_egg.map(PropertyValue::Float));
        push("preset-locked", self.preset_locked.map(PropertyValue::Bool));
        push("shuffle-presets", self.shuffle_presets.map(PropertyValue::Bool));
        push("enable-playlist", self.enable_playlist.map(PropertyValue::Bool));
        values
    }
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || !v.is_finite() {
                return Err(E::custom("duration must be a non-negative number"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl VisualizerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(input)?;
        let mut settings = Settings::default();
        for (name, value) in raw.visualizer.assignments() {
            settings
                .set(name, value)
                .map_err(|err| ConfigError::Invalid(format!("visualizer.{name}: {err}")))?;
        }
        let config = Self {
            settings,
            output: raw.output,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded visualizer configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let output = &self.output;
        if output.width == 0 || output.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "output size {}x{} must be non-zero",
                output.width, output.height
            )));
        }
        if output.fps == 0 {
            return Err(ConfigError::Invalid("output.fps must be greater than zero".into()));
        }
        if output.format.trim().is_empty() {
            return Err(ConfigError::Invalid("output.format may not be empty".into()));
        }
        Ok(())
    }
}
