use glcontext::{ContextError, GlApi};

use crate::base::{ElementState, StateChange};
use crate::bus::ErrorDomain;

/// Failures of the visualizer element.
#[derive(Debug, thiserror::Error)]
pub enum GlError {
    #[error("no GL context available")]
    NoContext,
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("GL API's not compatible context: {found} supported: {required}")]
    UnsupportedApi { found: GlApi, required: GlApi },
    #[error("Subclass failed to initialize: {0}")]
    SubclassInit(String),
    #[error("failed to render audio visualizer")]
    Render,
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error(transparent)]
    Pool(#[from] crate::pool::PoolError),
    #[error("cannot apply {transition:?} in state {state}")]
    InvalidTransition {
        state: ElementState,
        transition: StateChange,
    },
}

impl GlError {
    /// Bus error domain the failure is reported under.
    pub fn domain(&self) -> ErrorDomain {
        match self {
            GlError::UnsupportedApi { .. } => ErrorDomain::ResourceBusy,
            GlError::Context(ContextError::RegistrationContended(_)) => ErrorDomain::ResourceBusy,
            GlError::SubclassInit(_) => ErrorDomain::LibraryInit,
            GlError::Negotiation(_) => ErrorDomain::CoreNegotiation,
            _ => ErrorDomain::ResourceNotFound,
        }
    }
}
