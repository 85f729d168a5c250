use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::api::{GlApi, GlVersion, GlslVersion};
use crate::backend::{BackendFactory, ContextRequest, GlBackend};
use crate::display::Display;
use crate::error::{ContextError, GlErrorCode};
use crate::window::{RenderRectangle, Window};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Weak<ContextInner>> = RefCell::new(Weak::new());
}

type Job = Box<dyn FnOnce(&mut ActiveContext) + Send + 'static>;

enum GlMessage {
    Bind(Weak<ContextInner>),
    Run(Job),
    Shutdown,
}

/// A rendering context bound to a dedicated GL thread.
///
/// Cloning is cheap; the GL thread shuts down when the last clone is dropped.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextInner {
    id: u64,
    display: Display,
    api: GlApi,
    version: GlVersion,
    shared_with: Option<u64>,
    thread_id: ThreadId,
    sender: Sender<GlMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct ThreadReady {
    api: GlApi,
    version: GlVersion,
    thread_id: ThreadId,
}

/// GL-thread-only view of a context: its function table and window.
///
/// Instances never leave the GL thread, so holding a `&mut ActiveContext`
/// proves the caller runs where GL calls are allowed.
pub struct ActiveContext {
    backend: Box<dyn GlBackend>,
    window: Window,
    context_id: u64,
    api: GlApi,
    version: GlVersion,
}

impl ActiveContext {
    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    pub fn api(&self) -> GlApi {
        self.api
    }

    pub fn version(&self) -> GlVersion {
        self.version
    }

    pub fn glsl_version(&self) -> Option<GlslVersion> {
        GlslVersion::for_context(self.api, self.version)
    }

    pub fn gl(&mut self) -> &mut dyn GlBackend {
        self.backend.as_mut()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Sets preferred size and render rectangle to `width`x`height` and
    /// resizes the surface to match.
    pub fn configure_window(&mut self, width: u32, height: u32) {
        self.window.set_preferred_size(width, height);
        self.window.set_render_rectangle(RenderRectangle {
            x: 0,
            y: 0,
            width,
            height,
        });
        self.window.resize(self.backend.as_mut());
    }

    pub fn activate(&mut self) -> Result<(), ContextError> {
        if self.backend.make_current() {
            Ok(())
        } else {
            Err(ContextError::Activate)
        }
    }

    /// Drains the pending GL error, failing if one was set.
    pub fn check_error(&mut self) -> Result<(), ContextError> {
        match self.backend.get_error() {
            GlErrorCode::NoError => Ok(()),
            code => {
                warn!(context = self.context_id, "{code}");
                Err(ContextError::Gl(code))
            }
        }
    }
}

impl Context {
    pub(crate) fn create(
        display: &Display,
        factory: Arc<dyn BackendFactory>,
        request: ContextRequest,
    ) -> Result<Self, ContextError> {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name(format!("glvis-gl-{id}"))
            .spawn(move || run_gl_thread(id, factory, request, receiver, ready_tx))
            .map_err(ContextError::Spawn)?;

        let ready = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(ContextError::ThreadGone);
            }
        };

        let inner = Arc::new(ContextInner {
            id,
            display: display.clone(),
            api: ready.api,
            version: ready.version,
            shared_with: request.share_with,
            thread_id: ready.thread_id,
            sender,
            handle: Mutex::new(Some(handle)),
        });
        ContextInner::bind(&inner)?;
        let display_id = display.id();
        debug!(
            context = id,
            display = display_id,
            api = %ready.api,
            version = %ready.version,
            "created GL context"
        );
        Ok(Self { inner })
    }

    /// The context whose GL thread is the calling thread, if any.
    pub fn current() -> Option<Self> {
        CURRENT
            .with(|current| current.borrow().upgrade())
            .map(|inner| Self { inner })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn display(&self) -> &Display {
        &self.inner.display
    }

    pub fn api(&self) -> GlApi {
        self.inner.api
    }

    pub fn version(&self) -> GlVersion {
        self.inner.version
    }

    pub fn glsl_version(&self) -> Option<GlslVersion> {
        GlslVersion::for_context(self.inner.api, self.inner.version)
    }

    pub fn shared_with(&self) -> Option<u64> {
        self.inner.shared_with
    }

    pub fn thread_id(&self) -> ThreadId {
        self.inner.thread_id
    }

    pub fn is_owning_thread(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Runs `f` on the GL thread and blocks until it has finished.
    ///
    /// `f` owns whatever it works on; results, including moved-in buffers,
    /// come back through the return value. Jobs run in submission order, one
    /// at a time.
    pub fn run_on_owning_thread<F, T>(&self, f: F) -> Result<T, ContextError>
    where
        F: FnOnce(&mut ActiveContext) -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_owning_thread() {
            return Err(ContextError::Reentrant);
        }

        let (reply, result) = bounded(1);
        let job: Job = Box::new(move |active: &mut ActiveContext| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(move || f(active)));
            let _ = reply.send(outcome);
        });

        self.inner
            .sender
            .send(GlMessage::Run(job))
            .map_err(|_| ContextError::ThreadGone)?;

        match result.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(ContextError::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(ContextError::ThreadGone),
        }
    }

    /// Stops the GL thread. Later dispatches fail with
    /// [`ContextError::ThreadGone`].
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner_thread_id(inner: &ContextInner) -> ThreadId {
        inner.thread_id
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("display", &self.inner.display.id())
            .field("api", &self.inner.api)
            .field("version", &self.inner.version)
            .finish()
    }
}

impl ContextInner {
    /// Queues the binding of `Context::current()` ahead of every job.
    fn bind(inner: &Arc<ContextInner>) -> Result<(), ContextError> {
        inner
            .sender
            .send(GlMessage::Bind(Arc::downgrade(inner)))
            .map_err(|_| ContextError::ThreadGone)
    }

    fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let _ = self.sender.send(GlMessage::Shutdown);
        if thread::current().id() == self.thread_id {
            // Dropped from its own GL thread: the loop exits after this job.
            return;
        }
        if handle.join().is_err() {
            warn!(context = self.id, "GL thread panicked during shutdown");
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.shutdown();
        debug!(context = self.id, "GL context released");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn run_gl_thread(
    id: u64,
    factory: Arc<dyn BackendFactory>,
    request: ContextRequest,
    receiver: Receiver<GlMessage>,
    ready_tx: Sender<Result<ThreadReady, ContextError>>,
) {
    let mut backend = match factory.create(&request) {
        Ok(backend) => backend,
        Err(failure) => {
            let gl_error = Some(GlErrorCode::from_raw(failure.gl_error)).filter(|code| code.is_error());
            let _ = ready_tx.send(Err(ContextError::Create {
                message: failure.message,
                gl_error,
            }));
            return;
        }
    };

    if !backend.make_current() {
        let gl_error = Some(backend.get_error()).filter(|code| code.is_error());
        let _ = ready_tx.send(Err(ContextError::Create {
            message: format!("{} backend could not make the context current", factory.name()),
            gl_error,
        }));
        return;
    }

    let mut active = ActiveContext {
        api: backend.api(),
        version: backend.version(),
        backend,
        window: Window::default(),
        context_id: id,
    };
    let ready = ThreadReady {
        api: active.api,
        version: active.version,
        thread_id: thread::current().id(),
    };
    if ready_tx.send(Ok(ready)).is_err() {
        return;
    }
    drop(factory);

    for message in receiver.iter() {
        match message {
            GlMessage::Bind(inner) => CURRENT.with(|current| *current.borrow_mut() = inner),
            GlMessage::Run(job) => job(&mut active),
            GlMessage::Shutdown => break,
        }
    }

    CURRENT.with(|current| *current.borrow_mut() = Weak::new());
    trace!(context = id, "GL thread exiting");
}
