//! Element properties and configuration files for the visualizer.

mod config;
mod properties;

pub use config::{ConfigError, OutputConfig, VisualizerConfig};
pub use properties::{
    property_spec, MeshSize, PropertyError, PropertyKind, PropertySpec, PropertyValue, Settings,
    MAX_DURATION, PROPERTIES,
};
