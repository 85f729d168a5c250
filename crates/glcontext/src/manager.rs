use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::api::{GlApi, GlVersion};
use crate::backend::BackendFactory;
use crate::context::{ActiveContext, Context};
use crate::display::{Display, DisplayGuard, DisplayType};
use crate::error::ContextError;

/// Oldest GL (or GLES) version the renderer can drive.
const MIN_GL_VERSION: GlVersion = GlVersion::new(2, 0);

/// Outcome of [`DisplayContextManager::acquire_or_create_display`].
#[derive(Debug)]
pub enum Acquisition {
    /// The calling thread already runs a context; nothing was created.
    AlreadyPresent(Context),
    Created { display: Display, context: Context },
}

impl Acquisition {
    pub fn display(&self) -> &Display {
        match self {
            Acquisition::AlreadyPresent(context) => context.display(),
            Acquisition::Created { display, .. } => display,
        }
    }

    pub fn context(&self) -> &Context {
        match self {
            Acquisition::AlreadyPresent(context) => context,
            Acquisition::Created { context, .. } => context,
        }
    }
}

/// Opens displays and creates, inspects and registers their first context.
#[derive(Clone, Default)]
pub struct DisplayContextManager {
    backend: Option<Arc<dyn BackendFactory>>,
    geometry: Option<(u32, u32)>,
}

impl DisplayContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `factory` for every display instead of the built-in backends.
    pub fn with_backend(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.backend = Some(factory);
        self
    }

    /// Window geometry applied to newly inspected contexts.
    pub fn with_geometry(mut self, width: u32, height: u32) -> Self {
        self.geometry = Some((width, height));
        self
    }

    pub fn geometry(&self) -> Option<(u32, u32)> {
        self.geometry
    }

    pub fn create_display(&self, kind: DisplayType) -> Result<Display, ContextError> {
        let display = match &self.backend {
            Some(factory) => Display::with_backend(kind, Arc::clone(factory)),
            None => Display::new_with_type(kind)?,
        };
        Ok(display)
    }

    /// Returns the context already current on this thread, or opens a display
    /// of `kind`, restricts it to `api` and creates its first context.
    pub fn acquire_or_create_display(
        &self,
        kind: DisplayType,
        api: GlApi,
    ) -> Result<Acquisition, ContextError> {
        if let Some(context) = Context::current() {
            debug!(context = context.id(), "reusing GL context current on this thread");
            return Ok(Acquisition::AlreadyPresent(context));
        }

        let display = self.create_display(kind).map_err(|err| {
            error!("{err}");
            err
        })?;
        display.filter_gl_api(api);

        let context = {
            let mut guard = display.lock();
            let created = guard.create_context(None).map_err(|err| {
                report_create_failure(&err);
                err
            })?;
            register_or_adopt(&mut guard, created)?
        };

        self.inspect(&context)?;
        Ok(Acquisition::Created { display, context })
    }

    /// Logs what the context offers, configures its window and checks that it
    /// can be activated with a complete framebuffer.
    pub fn inspect(&self, context: &Context) -> Result<(), ContextError> {
        let geometry = self.geometry;
        context.run_on_owning_thread(move |active| inspect_active(active, geometry))?
    }
}

/// Registers `created`, or adopts the context that won the registration.
fn register_or_adopt(guard: &mut DisplayGuard<'_>, created: Context) -> Result<Context, ContextError> {
    if guard.add_context(&created) {
        return Ok(created);
    }
    match guard.context_for_thread(None) {
        Some(winner) => {
            debug!(lost = created.id(), context = winner.id(), "adopting registered GL context");
            Ok(winner)
        }
        None => Err(ContextError::RegistrationContended(1)),
    }
}

fn report_create_failure(err: &ContextError) {
    if let Some(code) = err.gl_error() {
        error!(code = code.raw(), "GL error while creating context: {code}");
    }
    error!("{err}");
}

fn inspect_active(
    active: &mut ActiveContext,
    geometry: Option<(u32, u32)>,
) -> Result<(), ContextError> {
    let api = active.api();
    let version = active.version();
    info!(context = active.context_id(), api = %api, version = %version, "GL context ready");

    if version < MIN_GL_VERSION {
        warn!(%version, minimum = %MIN_GL_VERSION, "GL version is older than supported");
    }

    match active.glsl_version() {
        Some(glsl) => {
            info!(glsl = %glsl, "GLSL version");
            if !glsl.supports_precision() {
                warn!(glsl = %glsl, "GLSL version does not support precision qualifiers");
            } else if !glsl.supports_precision_highp() {
                warn!(glsl = %glsl, "GLSL version does not guarantee highp precision");
            }
        }
        None => warn!(api = %api, %version, "no GLSL version for this context"),
    }

    if let Some((width, height)) = geometry {
        active.configure_window(width, height);
    }

    active.activate()?;
    if !active.gl().framebuffer_complete() {
        error!(context = active.context_id(), "framebuffer is incomplete");
        return Err(ContextError::FramebufferIncomplete);
    }
    active.check_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CreateFailure, SoftwareFactory};
    use crate::error::GlErrorCode;

    #[test]
    fn creates_registered_context() {
        let manager = DisplayContextManager::new().with_geometry(64, 32);
        let acquisition = manager
            .acquire_or_create_display(DisplayType::Any, GlApi::OPENGL3 | GlApi::GLES2)
            .unwrap();
        let Acquisition::Created { display, context } = acquisition else {
            panic!("expected a fresh display");
        };
        assert_eq!(context.display(), &display);
        assert_eq!(display.lock().contexts(), vec![context.clone()]);

        let size = context
            .run_on_owning_thread(|active| active.window().size())
            .unwrap();
        assert_eq!(size, (64, 32));
    }

    #[test]
    fn reports_already_current_context() {
        let manager = DisplayContextManager::new();
        let Acquisition::Created { context, .. } = manager
            .acquire_or_create_display(DisplayType::Headless, GlApi::ANY)
            .unwrap()
        else {
            panic!("expected a fresh display");
        };

        let nested = manager.clone();
        let seen = context
            .run_on_owning_thread(move |_| {
                match nested.acquire_or_create_display(DisplayType::Headless, GlApi::ANY) {
                    Ok(Acquisition::AlreadyPresent(current)) => Some(current.id()),
                    _ => None,
                }
            })
            .unwrap();
        assert_eq!(seen, Some(context.id()));
    }

    #[test]
    fn context_failure_carries_decoded_gl_error() {
        let failure = CreateFailure {
            message: "driver refused".into(),
            gl_error: GlErrorCode::GL_OUT_OF_MEMORY,
        };
        let manager =
            DisplayContextManager::new().with_backend(Arc::new(SoftwareFactory::failing(failure)));
        let err = manager
            .acquire_or_create_display(DisplayType::Any, GlApi::ANY)
            .unwrap_err();
        match err {
            ContextError::Create { message, gl_error } => {
                assert_eq!(message, "driver refused");
                assert_eq!(gl_error, Some(GlErrorCode::OutOfMemory));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn losing_registration_adopts_the_winner() {
        let display = Display::new_with_type(DisplayType::Headless).unwrap();
        let mut guard = display.lock();
        let winner = guard.create_context(None).unwrap();
        assert!(guard.add_context(&winner));

        let elsewhere = Display::new_with_type(DisplayType::Headless).unwrap();
        let stray = elsewhere.lock().create_context(None).unwrap();
        let adopted = register_or_adopt(&mut guard, stray).unwrap();
        assert_eq!(adopted, winner);
    }

    #[test]
    fn losing_registration_without_a_winner_fails() {
        let display = Display::new_with_type(DisplayType::Headless).unwrap();
        let mut guard = display.lock();
        let elsewhere = Display::new_with_type(DisplayType::Headless).unwrap();
        let stray = elsewhere.lock().create_context(None).unwrap();
        assert!(matches!(
            register_or_adopt(&mut guard, stray),
            Err(ContextError::RegistrationContended(1))
        ));
    }

    #[test]
    fn display_failure_is_reported() {
        let err = DisplayContextManager::new()
            .acquire_or_create_display(DisplayType::X11, GlApi::ANY)
            .unwrap_err();
        assert!(err.to_string().contains("failed to create GL display"));
    }
}
