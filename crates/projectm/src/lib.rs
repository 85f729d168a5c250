//! projectM visualizer element.
//!
//! [`ProjectM`] implements [`visualizer::GlVisualizer`]: it creates a
//! [`VisualizationEngine`] on the GL thread when the base element starts it,
//! feeds each audio buffer to the engine, reads the rendered surface back and
//! writes it into the output frame in the negotiated channel order. Presets
//! come from a single file or, with the playlist enabled, a directory of
//! `.milk`/`.prjm` files.

mod element;
mod engine;
mod pixels;
mod playlist;
mod reference;

pub use element::{ProjectM, ProjectMElement};
pub use engine::{
    ChannelLayout, EngineError, EngineFactory, EngineSettings, VisualizationEngine,
    INDEFINITE_PRESET_DURATION,
};
pub use pixels::ChannelOrder;
pub use playlist::{scan_presets, Playlist, PlaylistMode, PRESET_EXTENSIONS};
pub use reference::{ScopeEngine, ScopeFactory};
