use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::api::GlApi;
use crate::backend::{BackendFactory, ContextRequest, SoftwareFactory};
use crate::context::{Context, ContextInner};
use crate::error::ContextError;

static NEXT_DISPLAY_ID: AtomicU64 = AtomicU64::new(1);

/// Windowing platform a display connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayType {
    /// First backend available in this build.
    #[default]
    Any,
    Headless,
    X11,
    Wayland,
    Egl,
}

impl fmt::Display for DisplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisplayType::Any => "any",
            DisplayType::Headless => "headless",
            DisplayType::X11 => "x11",
            DisplayType::Wayland => "wayland",
            DisplayType::Egl => "egl",
        })
    }
}

impl FromStr for DisplayType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "any" | "auto" => Ok(DisplayType::Any),
            "headless" | "surfaceless" | "software" => Ok(DisplayType::Headless),
            "x11" => Ok(DisplayType::X11),
            "wayland" => Ok(DisplayType::Wayland),
            "egl" => Ok(DisplayType::Egl),
            other => Err(format!("unknown display type '{other}'")),
        }
    }
}

/// Shared connection to a GPU display. Clones refer to the same display;
/// equality is identity.
#[derive(Clone)]
pub struct Display {
    inner: Arc<DisplayInner>,
}

struct DisplayInner {
    id: u64,
    kind: DisplayType,
    factory: Arc<dyn BackendFactory>,
    state: Mutex<DisplayState>,
}

struct DisplayState {
    api_filter: GlApi,
    contexts: Vec<Weak<ContextInner>>,
}

impl Display {
    /// Opens a display of `kind` using the backends compiled into this build.
    pub fn new_with_type(kind: DisplayType) -> Result<Self, ContextError> {
        match kind {
            DisplayType::Any | DisplayType::Headless => {
                Ok(Self::with_backend(DisplayType::Headless, Arc::new(SoftwareFactory::default())))
            }
            other => Err(ContextError::DisplayCreate(format!(
                "no {other} backend is available in this build"
            ))),
        }
    }

    pub fn with_backend(kind: DisplayType, factory: Arc<dyn BackendFactory>) -> Self {
        let id = NEXT_DISPLAY_ID.fetch_add(1, Ordering::Relaxed);
        debug!(display = id, kind = %kind, backend = factory.name(), "opened GL display");
        Self {
            inner: Arc::new(DisplayInner {
                id,
                kind,
                factory,
                state: Mutex::new(DisplayState {
                    api_filter: GlApi::ANY,
                    contexts: Vec::new(),
                }),
            }),
        }
    }

    /// Unique per display instance; a different id means a new generation.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> DisplayType {
        self.inner.kind
    }

    pub fn backend_name(&self) -> &str {
        self.inner.factory.name()
    }

    /// Restricts the APIs of contexts created from now on.
    pub fn filter_gl_api(&self, api: GlApi) {
        let mut state = self.inner.state.lock();
        state.api_filter &= api;
    }

    pub fn gl_api(&self) -> GlApi {
        self.inner.state.lock().api_filter
    }

    /// Takes the display lock for a find/create/register sequence.
    pub fn lock(&self) -> DisplayGuard<'_> {
        DisplayGuard {
            display: self,
            state: self.inner.state.lock(),
        }
    }
}

impl PartialEq for Display {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Display {}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("backend", &self.inner.factory.name())
            .finish()
    }
}

/// Display lock held across context lookup, creation and registration.
pub struct DisplayGuard<'a> {
    display: &'a Display,
    state: MutexGuard<'a, DisplayState>,
}

impl DisplayGuard<'_> {
    fn prune(&mut self) {
        self.state.contexts.retain(|weak| weak.strong_count() > 0);
    }

    /// A registered context owned by `thread`, or any registered context
    /// when `thread` is `None`.
    pub fn context_for_thread(&mut self, thread: Option<ThreadId>) -> Option<Context> {
        self.prune();
        self.state
            .contexts
            .iter()
            .filter_map(Weak::upgrade)
            .find(|inner| thread.map_or(true, |id| Context::inner_thread_id(inner) == id))
            .map(Context::from_inner)
    }

    /// Creates a context on this display, honouring the API filter and
    /// sharing with `other` when given. The context is not registered.
    pub fn create_context(&self, other: Option<&Context>) -> Result<Context, ContextError> {
        let request = ContextRequest {
            display_id: self.display.id(),
            api_filter: self.state.api_filter,
            share_with: other.map(Context::id),
        };
        Context::create(self.display, Arc::clone(&self.display.inner.factory), request)
    }

    /// Registers `context` with the display.
    ///
    /// Fails if the context belongs to another display or if a different live
    /// context is already registered for its thread. Registering the same
    /// context twice succeeds.
    pub fn add_context(&mut self, context: &Context) -> bool {
        if context.display() != self.display {
            return false;
        }
        self.prune();
        let thread = context.thread_id();
        let mut registered = self.state.contexts.iter().filter_map(Weak::upgrade);
        if let Some(existing) = registered.find(|inner| Context::inner_thread_id(inner) == thread) {
            return Context::from_inner(existing) == *context;
        }
        self.state.contexts.push(context.downgrade());
        true
    }

    /// Live registered contexts.
    pub fn contexts(&mut self) -> Vec<Context> {
        self.prune();
        self.state
            .contexts
            .iter()
            .filter_map(Weak::upgrade)
            .map(Context::from_inner)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_platform_fails_to_open() {
        let err = Display::new_with_type(DisplayType::Wayland).unwrap_err();
        assert!(matches!(err, ContextError::DisplayCreate(_)));
    }

    #[test]
    fn filter_narrows_created_contexts() {
        let display = Display::new_with_type(DisplayType::Any).unwrap();
        display.filter_gl_api(GlApi::GLES2 | GlApi::OPENGL3);
        display.filter_gl_api(GlApi::GLES2);
        assert_eq!(display.gl_api(), GlApi::GLES2);

        let guard = display.lock();
        let ctx = guard.create_context(None).unwrap();
        assert_eq!(ctx.api(), GlApi::GLES2);
    }

    #[test]
    fn parses_display_types() {
        assert_eq!("Headless".parse::<DisplayType>().unwrap(), DisplayType::Headless);
        assert_eq!("auto".parse::<DisplayType>().unwrap(), DisplayType::Any);
        assert!("dri".parse::<DisplayType>().is_err());
    }
}
