use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use glcontext::{
    Acquisition, ActiveContext, Context, ContextError, Display, DisplayContextManager, DisplayType,
    GlApi,
};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use crate::bus::{Bus, ElementMessage};
use crate::caps::{AudioInfo, VideoInfo};
use crate::error::GlError;
use crate::frame::{AudioBuffer, VideoFrame};
use crate::pool::{negotiate_pool, AllocationQuery, BufferPool};

/// Upper bound on find/create/register rounds under the display lock.
pub const REGISTRATION_ATTEMPTS: usize = 64;

/// Hooks a concrete visualizer implements. GL hooks run on the context's GL
/// thread; the defaults succeed without doing anything.
pub trait GlVisualizer: Send + 'static {
    /// APIs the implementation can render with.
    fn supported_gl_api(&self) -> GlApi {
        GlApi::ANY
    }

    /// Called when caps are negotiated, before any GL resources exist.
    fn setup(&mut self, _audio: &AudioInfo, _video: &VideoInfo) -> anyhow::Result<()> {
        Ok(())
    }

    fn gl_start(&mut self, _gl: &mut ActiveContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn gl_stop(&mut self, _gl: &mut ActiveContext) {}

    /// Renders one frame for `audio` into `video`. `Ok(false)` reports a
    /// failed frame.
    fn gl_render(
        &mut self,
        _gl: &mut ActiveContext,
        _audio: &AudioBuffer,
        _video: &mut VideoFrame,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Something linked to an element that can share its display and context.
pub trait ContextProvider: Send + Sync {
    fn local_display(&self) -> Option<Display>;
    fn local_context(&self) -> Option<Context>;
}

/// Display and shared context pushed by the application.
#[derive(Debug, Clone, Default)]
pub struct HostContext {
    pub display: Option<Display>,
    pub other_context: Option<Context>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementState::Null => "NULL",
            ElementState::Ready => "READY",
            ElementState::Paused => "PAUSED",
            ElementState::Playing => "PLAYING",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    NullToReady,
    ReadyToPaused,
    PausedToPlaying,
    PlayingToPaused,
    PausedToReady,
    ReadyToNull,
}

impl StateChange {
    pub fn current(self) -> ElementState {
        match self {
            StateChange::NullToReady => ElementState::Null,
            StateChange::ReadyToPaused | StateChange::ReadyToNull => ElementState::Ready,
            StateChange::PausedToPlaying | StateChange::PausedToReady => ElementState::Paused,
            StateChange::PlayingToPaused => ElementState::Playing,
        }
    }

    pub fn next(self) -> ElementState {
        match self {
            StateChange::ReadyToNull => ElementState::Null,
            StateChange::NullToReady | StateChange::PausedToReady => ElementState::Ready,
            StateChange::ReadyToPaused | StateChange::PlayingToPaused => ElementState::Paused,
            StateChange::PausedToPlaying => ElementState::Playing,
        }
    }

    /// The single step from `from` towards `to`.
    pub fn step(from: ElementState, to: ElementState) -> Option<Self> {
        use ElementState::*;
        match (from, to) {
            (a, b) if a == b => None,
            (Null, _) => Some(StateChange::NullToReady),
            (Ready, Null) => Some(StateChange::ReadyToNull),
            (Ready, _) => Some(StateChange::ReadyToPaused),
            (Paused, Playing) => Some(StateChange::PausedToPlaying),
            (Paused, _) => Some(StateChange::PausedToReady),
            (Playing, _) => Some(StateChange::PlayingToPaused),
        }
    }
}

/// Where the element is in its GL session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    ContextAcquired,
    Started,
    Stopped,
}

struct Inner<V> {
    /// Shared with jobs running on the GL thread.
    subclass: Arc<Mutex<V>>,
    element_state: ElementState,
    lifecycle: LifecycleState,
    display_type: DisplayType,
    display: Option<Display>,
    context: Option<Context>,
    other_context: Option<Context>,
    /// Context `gl_start` last succeeded on.
    started: Option<Context>,
    audio: Option<AudioInfo>,
    video: Option<VideoInfo>,
    pool: Option<BufferPool>,
}

/// Base audio visualizer element.
///
/// Owns the GL session of a [`GlVisualizer`]: resolves a display and context,
/// starts and stops the implementation on the GL thread, negotiates the output
/// pool and dispatches each frame's render onto the GL thread.
pub struct GlAudioVisualizer<V: GlVisualizer> {
    name: String,
    bus: Bus,
    manager: DisplayContextManager,
    peers: Mutex<Vec<Weak<dyn ContextProvider>>>,
    n_frames: AtomicU64,
    state: Mutex<Inner<V>>,
}

impl<V: GlVisualizer> GlAudioVisualizer<V> {
    pub fn new(name: impl Into<String>, subclass: V) -> Self {
        Self {
            name: name.into(),
            bus: Bus::new(),
            manager: DisplayContextManager::new(),
            peers: Mutex::new(Vec::new()),
            n_frames: AtomicU64::new(0),
            state: Mutex::new(Inner {
                subclass: Arc::new(Mutex::new(subclass)),
                element_state: ElementState::Null,
                lifecycle: LifecycleState::Uninitialized,
                display_type: DisplayType::Any,
                display: None,
                context: None,
                other_context: None,
                started: None,
                audio: None,
                video: None,
                pool: None,
            }),
        }
    }

    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_manager(mut self, manager: DisplayContextManager) -> Self {
        self.manager = manager;
        self
    }

    pub fn with_display_type(mut self, kind: DisplayType) -> Self {
        self.state.get_mut().display_type = kind;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Frames rendered successfully since the last NULL to READY transition.
    pub fn frame_count(&self) -> u64 {
        self.n_frames.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ElementState {
        self.state.lock().element_state
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.lock().lifecycle
    }

    pub fn display(&self) -> Option<Display> {
        self.state.lock().display.clone()
    }

    pub fn context(&self) -> Option<Context> {
        self.state.lock().context.clone()
    }

    pub fn other_context(&self) -> Option<Context> {
        self.state.lock().other_context.clone()
    }

    pub fn pool(&self) -> Option<BufferPool> {
        self.state.lock().pool.clone()
    }

    pub fn video_info(&self) -> Option<VideoInfo> {
        self.state.lock().video
    }

    pub fn audio_info(&self) -> Option<AudioInfo> {
        self.state.lock().audio
    }

    /// Runs `f` with the implementation under the element lock.
    pub fn with_subclass<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        let guard = self.state.lock();
        let mut subclass = guard.subclass.lock();
        f(&mut subclass)
    }

    /// Makes `peer` visible to context resolution as a neighbour.
    pub fn link_peer<P: ContextProvider + 'static>(&self, peer: &Arc<P>) {
        let weak: Weak<P> = Arc::downgrade(peer);
        self.peers.lock().push(weak);
    }

    /// Applies negotiated caps and runs the implementation's `setup`.
    pub fn set_caps(&self, audio: AudioInfo, video: VideoInfo) -> Result<(), GlError> {
        let result = self.apply_caps(audio, video);
        if let Err(err) = &result {
            self.post_error(err, None);
        }
        result
    }

    fn apply_caps(&self, audio: AudioInfo, video: VideoInfo) -> Result<(), GlError> {
        audio.validate()?;
        video.validate()?;
        let mut guard = self.state.lock();
        guard
            .subclass
            .lock()
            .setup(&audio, &video)
            .map_err(|err| GlError::Negotiation(format!("{err:#}")))?;
        debug!(
            element = %self.name,
            rate = audio.rate,
            channels = audio.channels,
            format = %video.format,
            width = video.width,
            height = video.height,
            fps = video.fps(),
            samples_per_frame = video.samples_per_frame(&audio),
            "caps configured"
        );
        guard.audio = Some(audio);
        guard.video = Some(video);
        guard.pool = None;
        Ok(())
    }

    /// Host-pushed display and shared context. A changed display drops the
    /// current context and renegotiates.
    pub fn set_context(&self, host: HostContext) {
        let mut guard = self.state.lock();
        let old_display = guard.display.clone();
        if let Some(display) = host.display {
            guard.display = Some(display);
        }
        if let Some(other) = host.other_context {
            guard.other_context = Some(other);
        }
        let required = guard.subclass.lock().supported_gl_api();
        if let Some(display) = &guard.display {
            display.filter_gl_api(required);
        }

        if let (Some(old), Some(new)) = (old_display, guard.display.clone()) {
            if old != new {
                info!(
                    element = %self.name,
                    old = old.id(),
                    new = new.id(),
                    "display changed, renegotiating GL context"
                );
                guard.context = None;
                guard.pool = None;
                if guard.element_state != ElementState::Null {
                    if let Err(err) = self.resolve_context(&mut guard) {
                        drop(guard);
                        self.post_error(&err, None);
                    }
                }
            }
        }
    }

    /// Takes the element lock and resolves a started context. Failures are
    /// posted on the bus.
    pub fn find_or_create_context_locked(&self) -> bool {
        let mut guard = self.state.lock();
        match self.resolve_context(&mut guard) {
            Ok(_) => true,
            Err(err) => {
                drop(guard);
                self.post_error(&err, None);
                false
            }
        }
    }

    /// Answers a downstream allocation query with a GL-backed pool.
    pub fn decide_allocation(&self, query: &mut AllocationQuery) -> bool {
        match self.allocate(query) {
            Ok(_) => true,
            Err(err) => {
                self.post_error(&err, None);
                false
            }
        }
    }

    fn allocate(&self, query: &mut AllocationQuery) -> Result<BufferPool, GlError> {
        let context = {
            let mut guard = self.state.lock();
            self.resolve_context(&mut guard)?
        };
        let pool = negotiate_pool(query, &context)?;
        self.state.lock().pool = Some(pool.clone());
        Ok(pool)
    }

    /// Renders `audio` into `video` on the GL thread, blocking until done.
    pub fn render(&self, audio: &AudioBuffer, video: &mut VideoFrame) -> bool {
        if video.width() == 0 || video.height() == 0 {
            self.post_error(&GlError::Render, Some("output frame has no pixels".into()));
            return false;
        }
        let mut guard = self.state.lock();
        let context = match self.resolve_context(&mut guard) {
            Ok(context) => context,
            Err(err) => {
                drop(guard);
                self.post_error(&err, None);
                return false;
            }
        };

        let subclass = Arc::clone(&guard.subclass);
        let audio = audio.clone();
        let mut target = video.take();
        let outcome = context.run_on_owning_thread(move |gl| {
            let rendered = subclass.lock().gl_render(gl, &audio, &mut target);
            (rendered, gl.check_error(), target)
        });
        drop(guard);

        let detail = match outcome {
            Ok((rendered, checked, frame)) => {
                *video = frame;
                match (rendered, checked) {
                    (Ok(true), Ok(())) => {
                        let frames = self.n_frames.fetch_add(1, Ordering::SeqCst) + 1;
                        trace!(element = %self.name, frames, "frame rendered");
                        return true;
                    }
                    (Ok(false), Ok(())) => "render hook reported failure".to_string(),
                    (Err(err), _) => format!("{err:#}"),
                    (Ok(_), Err(gl_err)) => gl_err.to_string(),
                }
            }
            Err(dispatch_err) => {
                // The moved-out pixels were dropped with the job.
                let info = *video.info();
                *video = VideoFrame::new(info);
                dispatch_err.to_string()
            }
        };
        self.post_error(&GlError::Render, Some(format!("A GL error occurred: {detail}")));
        false
    }

    /// Produces one output frame for `audio`: acquires a frame from the
    /// negotiated pool and renders into it. Nothing is returned on failure.
    pub fn process(&self, audio: &AudioBuffer) -> Result<VideoFrame, GlError> {
        let (video, pool) = {
            let guard = self.state.lock();
            let video = guard
                .video
                .ok_or_else(|| GlError::Negotiation("caps have not been set".into()))?;
            (video, guard.pool.clone())
        };
        let pool = match pool {
            Some(pool) => pool,
            None => {
                let mut query = AllocationQuery::new(video);
                self.allocate(&mut query).map_err(|err| {
                    self.post_error(&err, None);
                    err
                })?
            }
        };

        let mut frame = pool.acquire_frame()?;
        if self.render(audio, &mut frame) {
            Ok(frame)
        } else {
            Err(GlError::Render)
        }
    }

    pub fn change_state(&self, transition: StateChange) -> Result<(), GlError> {
        let mut guard = self.state.lock();
        if guard.element_state != transition.current() {
            return Err(GlError::InvalidTransition {
                state: guard.element_state,
                transition,
            });
        }
        debug!(
            element = %self.name,
            "changing state: {} => {}",
            transition.current(),
            transition.next()
        );
        match transition {
            StateChange::NullToReady => {
                self.n_frames.store(0, Ordering::SeqCst);
            }
            StateChange::ReadyToNull => {
                release(&self.name, &self.bus, &mut guard);
            }
            _ => {}
        }
        guard.element_state = transition.next();
        Ok(())
    }

    /// Walks the state machine one step at a time up or down to `target`.
    pub fn set_state(&self, target: ElementState) -> Result<(), GlError> {
        while let Some(step) = StateChange::step(self.state(), target) {
            self.change_state(step)?;
        }
        Ok(())
    }

    /// Resolves (and if needed creates and starts) the context for this
    /// element. The caller holds the element lock; it is released only while
    /// peers are queried.
    fn resolve_context(&self, guard: &mut MutexGuard<'_, Inner<V>>) -> Result<Context, GlError> {
        let required = guard.subclass.lock().supported_gl_api();

        let (display, mut context) = loop {
            if guard.element_state == ElementState::Null {
                return Err(GlError::NoContext);
            }

            if guard.display.is_none() {
                let from_peer = MutexGuard::unlocked(guard, || {
                    self.query_peers(|peer| peer.local_display())
                });
                if guard.element_state == ElementState::Null {
                    return Err(GlError::NoContext);
                }
                if guard.display.is_none() {
                    match from_peer {
                        Some(found) => {
                            let display_id = found.id();
                            debug!(element = %self.name, display = display_id, "using display of a linked element");
                            guard.display = Some(found);
                        }
                        None => {
                            let kind = guard.display_type;
                            match self.manager.acquire_or_create_display(kind, required)? {
                                Acquisition::AlreadyPresent(context) => {
                                    guard.display = Some(context.display().clone());
                                    guard.context = Some(context);
                                }
                                Acquisition::Created { display, context } => {
                                    guard.display = Some(display);
                                    guard.context = Some(context);
                                }
                            }
                        }
                    }
                }
            }

            let Some(display) = guard.display.clone() else {
                continue;
            };
            display.filter_gl_api(required);

            let current = guard.context.clone().filter(|ctx| ctx.display() == &display);
            if current.is_some() {
                break (display, current);
            }

            let from_peer = MutexGuard::unlocked(guard, || {
                self.query_peers(|peer| {
                    peer.local_context().filter(|ctx| ctx.display() == &display)
                })
            });
            if guard.display.as_ref() != Some(&display) {
                // Display replaced while unlocked; start over.
                continue;
            }
            let current = guard.context.clone().filter(|ctx| ctx.display() == &display);
            break (display, current.or(from_peer));
        };

        if context.is_none() {
            let other = guard.other_context.clone();
            let (created, fresh) = self.find_or_register(&display, other.as_ref())?;
            if fresh {
                self.manager.inspect(&created)?;
            }
            context = Some(created);
        }
        let context = context.ok_or(GlError::NoContext)?;

        if !context.api().intersects(required) {
            return Err(GlError::UnsupportedApi {
                found: context.api(),
                required,
            });
        }

        if guard.context.as_ref() != Some(&context) {
            debug!(element = %self.name, context = context.id(), "using GL context");
            guard.context = Some(context.clone());
        }
        if matches!(
            guard.lifecycle,
            LifecycleState::Uninitialized | LifecycleState::Stopped
        ) {
            guard.lifecycle = LifecycleState::ContextAcquired;
        }

        if guard.started.as_ref() != Some(&context) {
            stop(&self.name, &self.bus, guard);
            start(&self.name, guard, &context)?;
        }
        Ok(context)
    }

    /// Fetches the display's context or creates one, then registers it,
    /// retrying while another element wins the registration.
    fn find_or_register(
        &self,
        display: &Display,
        other: Option<&Context>,
    ) -> Result<(Context, bool), GlError> {
        let mut display_guard = display.lock();
        for attempt in 0..REGISTRATION_ATTEMPTS {
            let (candidate, fresh) = match display_guard.context_for_thread(None) {
                Some(existing) => (existing, false),
                None => {
                    let created = display_guard.create_context(other).map_err(|err| {
                        if let Some(code) = err.gl_error() {
                            error!(element = %self.name, "GL error while creating context: {code}");
                        }
                        err
                    })?;
                    (created, true)
                }
            };
            if display_guard.add_context(&candidate) {
                return Ok((candidate, fresh));
            }
            trace!(element = %self.name, attempt, "context registration raced, retrying");
        }
        warn!(
            element = %self.name,
            attempts = REGISTRATION_ATTEMPTS,
            "giving up on context registration"
        );
        Err(ContextError::RegistrationContended(REGISTRATION_ATTEMPTS).into())
    }

    fn query_peers<T>(&self, query: impl Fn(&dyn ContextProvider) -> Option<T>) -> Option<T> {
        let peers: Vec<_> = self.peers.lock().clone();
        peers
            .iter()
            .filter_map(Weak::upgrade)
            .find_map(|peer| query(peer.as_ref()))
    }

    fn post_error(&self, err: &GlError, detail: Option<String>) {
        let domain = err.domain();
        match &detail {
            Some(detail) => error!(element = %self.name, %domain, "{err} ({detail})"),
            None => error!(element = %self.name, %domain, "{err}"),
        }
        self.bus.post(ElementMessage::Error {
            source: self.name.clone(),
            domain,
            message: err.to_string(),
            debug: detail,
        });
    }
}

fn start<V: GlVisualizer>(name: &str, inner: &mut Inner<V>, context: &Context) -> Result<(), GlError> {
    let subclass = Arc::clone(&inner.subclass);
    let element = name.to_string();
    let result = context.run_on_owning_thread(move |gl| {
        info!(%element, context = gl.context_id(), "starting");
        subclass.lock().gl_start(gl)
    })?;
    match result {
        Ok(()) => {
            inner.started = Some(context.clone());
            inner.lifecycle = LifecycleState::Started;
            Ok(())
        }
        Err(err) => Err(GlError::SubclassInit(format!("{err:#}"))),
    }
}

fn stop<V: GlVisualizer>(name: &str, bus: &Bus, inner: &mut Inner<V>) {
    let Some(context) = inner.started.take() else {
        return;
    };
    let subclass = Arc::clone(&inner.subclass);
    let element = name.to_string();
    let stopped = context.run_on_owning_thread(move |gl| {
        info!(%element, context = gl.context_id(), "stopping");
        subclass.lock().gl_stop(gl);
    });
    if let Err(err) = stopped {
        warn!(element = %name, "gl_stop could not run: {err}");
        bus.post(ElementMessage::Warning {
            source: name.to_string(),
            message: format!("failed to stop GL resources: {err}"),
        });
    }
    inner.lifecycle = LifecycleState::Stopped;
}

/// Stops the session and drops every GL reference.
fn release<V: GlVisualizer>(name: &str, bus: &Bus, inner: &mut Inner<V>) {
    stop(name, bus, inner);
    inner.pool = None;
    inner.context = None;
    inner.other_context = None;
    inner.display = None;
    inner.lifecycle = LifecycleState::Uninitialized;
}

impl<V: GlVisualizer> ContextProvider for GlAudioVisualizer<V> {
    fn local_display(&self) -> Option<Display> {
        self.display()
    }

    fn local_context(&self) -> Option<Context> {
        self.context()
    }
}

impl<V: GlVisualizer> Drop for GlAudioVisualizer<V> {
    fn drop(&mut self) {
        release(&self.name, &self.bus, self.state.get_mut());
    }
}

impl<V: GlVisualizer> fmt::Debug for GlAudioVisualizer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlAudioVisualizer")
            .field("name", &self.name)
            .field("frames", &self.frame_count())
            .finish_non_exhaustive()
    }
}
