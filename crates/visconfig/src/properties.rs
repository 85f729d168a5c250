use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Mesh resolution, written as `"W,H"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshSize {
    pub width: u32,
    pub height: u32,
}

impl MeshSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for MeshSize {
    fn default() -> Self {
        Self::new(48, 32)
    }
}

impl fmt::Display for MeshSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.width, self.height)
    }
}

impl FromStr for MeshSize {
    type Err = PropertyError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || PropertyError::InvalidMeshSize(input.to_string());
        let (width, height) = input.split_once(',').ok_or_else(invalid)?;
        let width: u32 = width.trim().parse().map_err(|_| invalid())?;
        let height: u32 = height.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PropertyError {
    #[error("unknown property '{0}'")]
    Unknown(String),
    #[error("property '{name}' expects a {expected} value")]
    TypeMismatch { name: &'static str, expected: &'static str },
    #[error("value {value} for property '{name}' is outside [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("invalid mesh size '{0}'; expected 'width,height' with positive integers")]
    InvalidMeshSize(String),
}

/// A dynamically typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(Option<String>),
    Float(f32),
    Double(f64),
    Bool(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(Some(value)) => f.write_str(value),
            PropertyValue::String(None) => f.write_str("(none)"),
            PropertyValue::Float(value) => write!(f, "{value}"),
            PropertyValue::Double(value) => write!(f, "{value}"),
            PropertyValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyKind {
    Path,
    Float { min: f32, max: f32, default: f32 },
    Double { min: f64, max: f64, default: f64 },
    Bool { default: bool },
    MeshSize,
}

impl PropertyKind {
    fn type_name(&self) -> &'static str {
        match self {
            PropertyKind::Path | PropertyKind::MeshSize => "string",
            PropertyKind::Float { .. } => "float",
            PropertyKind::Double { .. } => "double",
            PropertyKind::Bool { .. } => "boolean",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PropertySpec {
    pub name: &'static str,
    pub nick: &'static str,
    pub blurb: &'static str,
    pub kind: PropertyKind,
}

pub const MAX_DURATION: f64 = 999_999.0;

pub const PROPERTIES: &[PropertySpec] = &[
    PropertySpec {
        name: "preset",
        nick: "Preset",
        blurb: "Path to a preset file, or a directory of presets to play through.",
        kind: PropertyKind::Path,
    },
    PropertySpec {
        name: "texture-dir",
        nick: "Texture Directory",
        blurb: "Directory containing textures used by presets.",
        kind: PropertyKind::Path,
    },
    PropertySpec {
        name: "beat-sensitivity",
        nick: "Beat Sensitivity",
        blurb: "Sensitivity to audio beats. Higher values respond more strongly.",
        kind: PropertyKind::Float { min: 0.0, max: 5.0, default: 1.0 },
    },
    PropertySpec {
        name: "hard-cut-duration",
        nick: "Hard Cut Duration",
        blurb: "Minimum time in seconds between hard cuts.",
        kind: PropertyKind::Double { min: 0.0, max: MAX_DURATION, default: 3.0 },
    },
    PropertySpec {
        name: "hard-cut-enabled",
        nick: "Hard Cut Enabled",
        blurb: "Allow abrupt preset transitions triggered by the audio.",
        kind: PropertyKind::Bool { default: false },
    },
    PropertySpec {
        name: "hard-cut-sensitivity",
        nick: "Hard Cut Sensitivity",
        blurb: "Sensitivity of hard cuts to abrupt changes in the audio.",
        kind: PropertyKind::Float { min: 0.0, max: 1.0, default: 1.0 },
    },
    PropertySpec {
        name: "soft-cut-duration",
        nick: "Soft Cut Duration",
        blurb: "Duration in seconds of smooth preset transitions.",
        kind: PropertyKind::Double { min: 0.0, max: MAX_DURATION, default: 3.0 },
    },
    PropertySpec {
        name: "preset-duration",
        nick: "Preset Duration",
        blurb: "Seconds each preset is shown. Zero plays the preset indefinitely.",
        kind: PropertyKind::Double { min: 0.0, max: MAX_DURATION, default: 0.0 },
    },
    PropertySpec {
        name: "mesh-size",
        nick: "Mesh Size",
        blurb: "Size of the rendering mesh, as 'width,height'.",
        kind: PropertyKind::MeshSize,
    },
    PropertySpec {
        name: "aspect-correction",
        nick: "Aspect Correction",
        blurb: "Correct preset rendering for the output aspect ratio.",
        kind: PropertyKind::Bool { default: true },
    },
    PropertySpec {
        name: "easter-egg",
        nick: "Easter Egg",
        blurb: "Likelihood of triggering the easter egg.",
        kind: PropertyKind::Float { min: 0.0, max: 1.0, default: 0.0 },
    },
    PropertySpec {
        name: "preset-locked",
        nick: "Preset Locked",
        blurb: "Stay on the current preset instead of switching automatically.",
        kind: PropertyKind::Bool { default: true },
    },
    PropertySpec {
        name: "shuffle-presets",
        nick: "Shuffle Presets",
        blurb: "Play a preset directory in random order.",
        kind: PropertyKind::Bool { default: true },
    },
    PropertySpec {
        name: "enable-playlist",
        nick: "Enable Playlist",
        blurb: "Treat a preset directory as a playlist.",
        kind: PropertyKind::Bool { default: true },
    },
];

pub fn property_spec(name: &str) -> Option<&'static PropertySpec> {
    PROPERTIES.iter().find(|spec| spec.name == name)
}

/// Current values of every element property.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub preset: Option<PathBuf>,
    pub texture_dir: Option<PathBuf>,
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
    pub shuffle_presets: bool,
    pub enable_playlist: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            preset: None,
            texture_dir: None,
            beat_sensitivity: 1.0,
            hard_cut_duration: 3.0,
            hard_cut_enabled: false,
            hard_cut_sensitivity: 1.0,
            soft_cut_duration: 3.0,
            preset_duration: 0.0,
            mesh_size: MeshSize::default(),
            aspect_correction: true,
            easter_egg: 0.0,
            preset_locked: true,
            shuffle_presets: true,
            enable_playlist: true,
        }
    }
}

impl Settings {
    /// Sets a property by name. On error the previous value is kept.
    pub fn set(&mut self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        let spec = property_spec(name).ok_or_else(|| PropertyError::Unknown(name.to_string()))?;
        let mismatch = || PropertyError::TypeMismatch {
            name: spec.name,
            expected: spec.kind.type_name(),
        };

        match (spec.kind, value) {
            (PropertyKind::Path, PropertyValue::String(path)) => {
                let path = path.filter(|path| !path.is_empty()).map(PathBuf::from);
                match spec.name {
                    "preset" => self.preset = path,
                    _ => self.texture_dir = path,
                }
            }
            (PropertyKind::MeshSize, PropertyValue::String(Some(raw))) => {
                self.mesh_size = raw.parse()?;
            }
            (PropertyKind::Float { min, max, .. }, PropertyValue::Float(value)) => {
                check_range(spec.name, f64::from(value), f64::from(min), f64::from(max))?;
                *self.float_mut(spec.name).ok_or_else(mismatch)? = value;
            }
            (PropertyKind::Double { min, max, .. }, PropertyValue::Double(value)) => {
                check_range(spec.name, value, min, max)?;
                *self.double_mut(spec.name).ok_or_else(mismatch)? = value;
            }
            (PropertyKind::Bool { .. }, PropertyValue::Bool(value)) => {
                *self.bool_mut(spec.name).ok_or_else(mismatch)? = value;
            }
            _ => return Err(mismatch()),
        }
        tracing::trace!(property = spec.name, "property updated");
        Ok(())
    }

    /// Parses `raw` according to the property's type and sets it.
    pub fn set_from_str(&mut self, name: &str, raw: &str) -> Result<(), PropertyError> {
        let spec = property_spec(name).ok_or_else(|| PropertyError::Unknown(name.to_string()))?;
        let mismatch = || PropertyError::TypeMismatch {
            name: spec.name,
            expected: spec.kind.type_name(),
        };
        let value = match spec.kind {
            PropertyKind::Path | PropertyKind::MeshSize => PropertyValue::String(Some(raw.to_string())),
            PropertyKind::Float { .. } => {
                PropertyValue::Float(raw.trim().parse().map_err(|_| mismatch())?)
            }
            PropertyKind::Double { .. } => {
                PropertyValue::Double(raw.trim().parse().map_err(|_| mismatch())?)
            }
            PropertyKind::Bool { .. } => PropertyValue::Bool(parse_bool(raw).ok_or_else(mismatch)?),
        };
        self.set(name, value)
    }

    pub fn get(&self, name: &str) -> Result<PropertyValue, PropertyError> {
        let path_value = |path: &Option<PathBuf>| {
            PropertyValue::String(path.as_ref().map(|path| path.display().to_string()))
        };
        let value = match name {
            "preset" => path_value(&self.preset),
            "texture-dir" => path_value(&self.texture_dir),
            "mesh-size" => PropertyValue::String(Some(self.mesh_size.to_string())),
            "beat-sensitivity" => PropertyValue::Float(self.beat_sensitivity),
            "hard-cut-sensitivity" => PropertyValue::Float(self.hard_cut_sensitivity),
            "easter-egg" => PropertyValue::Float(self.easter_egg),
            "hard-cut-duration" => PropertyValue::Double(self.hard_cut_duration),
            "soft-cut-duration" => PropertyValue::Double(self.soft_cut_duration),
            "preset-duration" => PropertyValue::Double(self.preset_duration),
            "hard-cut-enabled" => PropertyValue::Bool(self.hard_cut_enabled),
            "aspect-correction" => PropertyValue::Bool(self.aspect_correction),
            "preset-locked" => PropertyValue::Bool(self.preset_locked),
            "shuffle-presets" => PropertyValue::Bool(self.shuffle_presets),
            "enable-playlist" => PropertyValue::Bool(self.enable_playlist),
            other => return Err(PropertyError::Unknown(other.to_string())),
        };
        Ok(value)
    }

    /// `name=value` pairs in declaration order, for diagnostics.
    pub fn describe(&self) -> String {
        PROPERTIES
            .iter()
            .filter_map(|spec| {
                self.get(spec.name)
                    .ok()
                    .map(|value| format!("{}={value}", spec.name))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn float_mut(&mut self, name: &str) -> Option<&mut f32> {
        match name {
            "beat-sensitivity" => Some(&mut self.beat_sensitivity),
            "hard-cut-sensitivity" => Some(&mut self.hard_cut_sensitivity),
            "easter-egg" => Some(&mut self.easter_egg),
            _ => None,
        }
    }

    fn double_mut(&mut self, name: &str) -> Option<&mut f64> {
        match name {
            "hard-cut-duration" => Some(&mut self.hard_cut_duration),
            "soft-cut-duration" => Some(&mut self.soft_cut_duration),
            "preset-duration" => Some(&mut self.preset_duration),
            _ => None,
        }
    }

    fn bool_mut(&mut self, name: &str) -> Option<&mut bool> {
        match name {
            "hard-cut-enabled" => Some(&mut self.hard_cut_enabled),
            "aspect-correction" => Some(&mut self.aspect_correction),
            "preset-locked" => Some(&mut self.preset_locked),
            "shuffle-presets" => Some(&mut self.shuffle_presets),
            "enable-playlist" => Some(&mut self.enable_playlist),
            _ => None,
        }
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), PropertyError> {
    if value.is_nan() || value < min || value > max {
        return Err(PropertyError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_property_table() {
        let settings = Settings::default();
        for spec in PROPERTIES {
            let value = settings.get(spec.name).unwrap();
            match spec.kind {
                PropertyKind::Float { default, .. } => assert_eq!(value, PropertyValue::Float(default)),
                PropertyKind::Double { default, .. } => {
                    assert_eq!(value, PropertyValue::Double(default))
                }
                PropertyKind::Bool { default } => assert_eq!(value, PropertyValue::Bool(default)),
                PropertyKind::Path => assert_eq!(value, PropertyValue::String(None)),
                PropertyKind::MeshSize => {
                    assert_eq!(value, PropertyValue::String(Some("48,32".into())))
                }
            }
        }
    }

    #[test]
    fn mesh_size_round_trips() {
        let mut settings = Settings::default();
        settings
            .set("mesh-size", PropertyValue::String(Some("64,48".into())))
            .unwrap();
        assert_eq!(settings.mesh_size, MeshSize::new(64, 48));
        assert_eq!(
            settings.get("mesh-size").unwrap(),
            PropertyValue::String(Some("64,48".into()))
        );
    }

    #[test]
    fn malformed_mesh_size_keeps_previous_value() {
        let mut settings = Settings::default();
        for raw in ["64", "64,", "a,b", "0,32", "64,48,2"] {
            let err = settings
                .set("mesh-size", PropertyValue::String(Some(raw.into())))
                .unwrap_err();
            assert!(matches!(err, PropertyError::InvalidMeshSize(_)), "{raw}");
        }
        assert_eq!(settings.mesh_size, MeshSize::default());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut settings = Settings::default();
        let err = settings
            .set("beat-sensitivity", PropertyValue::Float(5.5))
            .unwrap_err();
        assert!(matches!(err, PropertyError::OutOfRange { name: "beat-sensitivity", .. }));
        assert_eq!(settings.beat_sensitivity, 1.0);

        assert!(settings
            .set("preset-duration", PropertyValue::Double(-1.0))
            .is_err());
        settings
            .set("preset-duration", PropertyValue::Double(MAX_DURATION))
            .unwrap();
        assert_eq!(settings.preset_duration, MAX_DURATION);
    }

    #[test]
    fn rejects_wrong_types_and_names() {
        let mut settings = Settings::default();
        assert_eq!(
            settings.set("hard-cut-enabled", PropertyValue::Float(1.0)),
            Err(PropertyError::TypeMismatch {
                name: "hard-cut-enabled",
                expected: "boolean"
            })
        );
        assert!(matches!(
            settings.get("brightness"),
            Err(PropertyError::Unknown(_))
        ));
    }

    #[test]
    fn parses_string_assignments() {
        let mut settings = Settings::default();
        settings.set_from_str("hard-cut-enabled", "yes").unwrap();
        settings.set_from_str("soft-cut-duration", "7.5").unwrap();
        settings.set_from_str("preset", "/usr/share/presets").unwrap();
        assert!(settings.hard_cut_enabled);
        assert_eq!(settings.soft_cut_duration, 7.5);
        assert_eq!(settings.preset, Some(PathBuf::from("/usr/share/presets")));

        settings.set_from_str("preset", "").unwrap();
        assert_eq!(settings.preset, None);
    }

    #[test]
    fn describes_all_properties() {
        let text = Settings::default().describe();
        assert!(text.starts_with("preset=(none), texture-dir=(none), beat-sensitivity=1"));
        assert!(text.contains("mesh-size=48,32"));
        assert!(text.ends_with("enable-playlist=true"));
    }
}
