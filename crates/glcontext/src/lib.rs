//! GL display and context management for the audio visualizer.
//!
//! Every [`Context`] owns a dedicated GL thread; all GL calls are made there
//! through [`Context::run_on_owning_thread`], which hands the closure an
//! [`ActiveContext`]. [`Display`]s are shared between elements and keep a
//! registry of the contexts created from them.

mod api;
mod backend;
mod context;
mod display;
mod error;
mod manager;
mod window;

pub use api::{GlApi, GlVersion, GlslProfile, GlslVersion};
pub use backend::{
    BackendFactory, ContextRequest, CreateFailure, GlBackend, SoftwareBackend, SoftwareFactory,
};
pub use context::{ActiveContext, Context};
pub use display::{Display, DisplayGuard, DisplayType};
pub use error::{ContextError, GlErrorCode};
pub use manager::{Acquisition, DisplayContextManager};
pub use window::{RenderRectangle, Window};
