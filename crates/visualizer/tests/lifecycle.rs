use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::bail;
use glcontext::{
    ActiveContext, Display, DisplayContextManager, DisplayType, GlApi, GlVersion, SoftwareFactory,
};
use visualizer::{
    AllocationProposal, AllocationQuery, AudioBuffer, AudioInfo, BufferPool, ElementMessage,
    ElementState, ErrorDomain, GlAudioVisualizer, GlError, GlVisualizer, HostContext,
    LifecycleState, VideoFormat, VideoFrame, VideoInfo,
};

#[derive(Default)]
struct Counters {
    starts: AtomicUsize,
    stops: AtomicUsize,
    renders: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Counters {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        thread::yield_now();
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Probe {
    counters: Arc<Counters>,
    fail_render: Arc<AtomicBool>,
    fail_start: bool,
    required: GlApi,
}

impl Probe {
    fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            fail_render: Arc::new(AtomicBool::new(false)),
            fail_start: false,
            required: GlApi::OPENGL3 | GlApi::GLES2,
        }
    }
}

impl GlVisualizer for Probe {
    fn supported_gl_api(&self) -> GlApi {
        self.required
    }

    fn gl_start(&mut self, _gl: &mut ActiveContext) -> anyhow::Result<()> {
        if self.fail_start {
            bail!("shader compilation failed");
        }
        self.counters.enter();
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        self.counters.exit();
        Ok(())
    }

    fn gl_stop(&mut self, _gl: &mut ActiveContext) {
        self.counters.enter();
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.counters.exit();
    }

    fn gl_render(
        &mut self,
        gl: &mut ActiveContext,
        _audio: &AudioBuffer,
        video: &mut VideoFrame,
    ) -> anyhow::Result<bool> {
        self.counters.enter();
        let (width, height) = (video.width(), video.height());
        if gl.window().size() != (width, height) {
            gl.configure_window(width, height);
        }
        gl.gl().clear([0.0, 0.0, 1.0, 1.0]);
        let ok = !self.fail_render.load(Ordering::SeqCst)
            && gl.gl().read_pixels(0, 0, width, height, video.data_mut());
        self.counters.renders.fetch_add(1, Ordering::SeqCst);
        self.counters.exit();
        Ok(ok)
    }
}

fn video() -> VideoInfo {
    VideoInfo::new(VideoFormat::Rgba, 8, 4, 50, 1)
}

fn playing(probe: Probe) -> Arc<GlAudioVisualizer<Probe>> {
    let element = Arc::new(GlAudioVisualizer::new("probe", probe));
    element.set_state(ElementState::Playing).unwrap();
    element.set_caps(AudioInfo::default(), video()).unwrap();
    element
}

fn render_once(element: &GlAudioVisualizer<Probe>) -> bool {
    let mut frame = VideoFrame::new(video());
    element.render(&AudioBuffer::silence(882), &mut frame)
}

#[test]
fn starts_once_per_display_generation() {
    let counters = Arc::new(Counters::default());
    let element = playing(Probe::new(counters.clone()));

    for _ in 0..3 {
        assert!(render_once(&element));
    }
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 0);
    assert_eq!(element.lifecycle(), LifecycleState::Started);
    let first = element.context().unwrap();

    let replacement = Display::new_with_type(DisplayType::Headless).unwrap();
    element.set_context(HostContext {
        display: Some(replacement.clone()),
        other_context: None,
    });
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    assert_eq!(counters.starts.load(Ordering::SeqCst), 2);

    let second = element.context().unwrap();
    assert_ne!(first, second);
    assert_eq!(second.display(), &replacement);

    assert!(render_once(&element));
    assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
}

#[test]
fn explicit_resolution_is_idempotent() {
    let counters = Arc::new(Counters::default());
    let element = playing(Probe::new(counters.clone()));

    assert!(element.find_or_create_context_locked());
    let context = element.context().unwrap();
    assert!(element.find_or_create_context_locked());
    assert_eq!(element.context().unwrap(), context);
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);

    element.set_state(ElementState::Null).unwrap();
    assert!(!element.find_or_create_context_locked());
    assert!(element.bus().pop().is_some_and(|message| message.is_error()));
}

#[test]
fn renders_never_overlap_with_each_other_or_replacement() {
    let counters = Arc::new(Counters::default());
    let element = playing(Probe::new(counters.clone()));

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..20 {
                    assert!(render_once(&element));
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..5 {
                let display = Display::new_with_type(DisplayType::Headless).unwrap();
                element.set_context(HostContext {
                    display: Some(display),
                    other_context: None,
                });
            }
        });
    });

    assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(element.frame_count(), 80);
    assert_eq!(
        counters.starts.load(Ordering::SeqCst),
        counters.stops.load(Ordering::SeqCst) + 1
    );
}

#[test]
fn counter_advances_only_on_success() {
    let counters = Arc::new(Counters::default());
    let probe = Probe::new(counters.clone());
    let fail = probe.fail_render.clone();
    let element = playing(probe);

    assert!(render_once(&element));
    assert_eq!(element.frame_count(), 1);

    fail.store(true, Ordering::SeqCst);
    assert!(!render_once(&element));
    assert_eq!(element.frame_count(), 1);
    match element.bus().pop() {
        Some(ElementMessage::Error {
            domain,
            message,
            debug,
            ..
        }) => {
            assert_eq!(domain, ErrorDomain::ResourceNotFound);
            assert_eq!(message, "failed to render audio visualizer");
            assert!(debug.unwrap().starts_with("A GL error occurred"));
        }
        other => panic!("expected a render error, got {other:?}"),
    }

    fail.store(false, Ordering::SeqCst);
    assert!(render_once(&element));
    assert_eq!(element.frame_count(), 2);
    assert_eq!(counters.renders.load(Ordering::SeqCst), 3);
}

#[test]
fn non_gl_pool_is_replaced() {
    let element = playing(Probe::new(Arc::default()));
    let mut query = AllocationQuery::new(video());
    query.add_allocation_pool(AllocationProposal {
        pool: Some(BufferPool::system()),
        size: 16,
        min_buffers: 1,
        max_buffers: 4,
    });

    assert!(element.decide_allocation(&mut query));
    let chosen = query.allocation_pools()[0].pool.clone().unwrap();
    assert!(chosen.is_gl());
    assert_eq!(chosen.gl_context(), element.context().as_ref());
    assert!(element.pool().unwrap().ptr_eq(&chosen));
}

#[test]
fn process_returns_frames_only_on_success() {
    let counters = Arc::new(Counters::default());
    let probe = Probe::new(counters);
    let fail = probe.fail_render.clone();
    let element = playing(probe);

    let frame = element.process(&AudioBuffer::silence(882)).unwrap();
    assert_eq!(frame.pixel(7, 3), Some([0, 0, 255, 255]));

    fail.store(true, Ordering::SeqCst);
    assert!(matches!(
        element.process(&AudioBuffer::silence(882)),
        Err(GlError::Render)
    ));
    assert_eq!(element.pool().unwrap().allocated(), 2);
}

#[test]
fn teardown_releases_everything() {
    let counters = Arc::new(Counters::default());
    let element = playing(Probe::new(counters.clone()));
    assert!(render_once(&element));

    element.set_state(ElementState::Null).unwrap();
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    assert!(element.display().is_none());
    assert!(element.context().is_none());
    assert!(element.other_context().is_none());
    assert_eq!(element.lifecycle(), LifecycleState::Uninitialized);

    let _ = element.bus().drain();
    assert!(!render_once(&element));
    assert_eq!(element.frame_count(), 1);
    assert!(element.context().is_none());
    assert!(element.bus().drain().iter().any(ElementMessage::is_error));
}

#[test]
fn incompatible_registered_context_is_rejected() {
    let legacy = Display::with_backend(
        DisplayType::Headless,
        Arc::new(SoftwareFactory::new(GlApi::OPENGL, GlVersion::new(2, 1))),
    );
    let legacy_context = {
        let mut guard = legacy.lock();
        let context = guard.create_context(None).unwrap();
        assert!(guard.add_context(&context));
        context
    };

    let element = GlAudioVisualizer::new("probe", Probe::new(Arc::default()));
    element.set_context(HostContext {
        display: Some(legacy.clone()),
        other_context: None,
    });
    element.set_state(ElementState::Playing).unwrap();
    element.set_caps(AudioInfo::default(), video()).unwrap();

    assert!(!render_once(&element));
    match element.bus().pop() {
        Some(ElementMessage::Error {
            domain, message, ..
        }) => {
            assert_eq!(domain, ErrorDomain::ResourceBusy);
            assert!(message.contains("context: opengl "), "{message}");
            assert!(message.contains("supported: opengl3"), "{message}");
        }
        other => panic!("expected an API error, got {other:?}"),
    }
    assert_eq!(element.frame_count(), 0);
    drop(legacy_context);
}

#[test]
fn start_failure_is_a_library_error() {
    let mut probe = Probe::new(Arc::default());
    probe.fail_start = true;
    let element = playing(probe);

    assert!(!render_once(&element));
    match element.bus().pop() {
        Some(ElementMessage::Error { domain, message, .. }) => {
            assert_eq!(domain, ErrorDomain::LibraryInit);
            assert!(message.contains("Subclass failed to initialize"), "{message}");
        }
        other => panic!("expected an init error, got {other:?}"),
    }
    assert_eq!(element.lifecycle(), LifecycleState::ContextAcquired);
}

#[test]
fn linked_elements_share_display_and_context() {
    let first = playing(Probe::new(Arc::default()));
    let second = playing(Probe::new(Arc::default()));
    second.link_peer(&first);

    assert!(render_once(&first));
    assert!(render_once(&second));
    assert_eq!(second.display(), first.display());
    assert_eq!(second.context(), first.context());
}

#[test]
fn host_other_context_is_shared_with() {
    let display = Display::new_with_type(DisplayType::Headless).unwrap();
    let application = display.lock().create_context(None).unwrap();

    let element = GlAudioVisualizer::new("probe", Probe::new(Arc::default()));
    element.set_context(HostContext {
        display: Some(display.clone()),
        other_context: Some(application.clone()),
    });
    element.set_state(ElementState::Playing).unwrap();
    element.set_caps(AudioInfo::default(), video()).unwrap();

    assert!(render_once(&element));
    let context = element.context().unwrap();
    assert_eq!(context.display(), &display);
    assert_eq!(context.shared_with(), Some(application.id()));
    assert_eq!(element.other_context(), Some(application));
}

#[test]
fn display_creation_failure_is_reported() {
    let element = GlAudioVisualizer::new("probe", Probe::new(Arc::default()))
        .with_display_type(DisplayType::Wayland);
    element.set_state(ElementState::Playing).unwrap();
    element.set_caps(AudioInfo::default(), video()).unwrap();

    assert!(!render_once(&element));
    match element.bus().pop() {
        Some(ElementMessage::Error { domain, message, .. }) => {
            assert_eq!(domain, ErrorDomain::ResourceNotFound);
            assert!(message.contains("failed to create GL display"), "{message}");
        }
        other => panic!("expected a display error, got {other:?}"),
    }
}

#[test]
fn manager_geometry_sizes_new_windows() {
    let manager = DisplayContextManager::new().with_geometry(8, 4);
    let element =
        GlAudioVisualizer::new("probe", Probe::new(Arc::default())).with_manager(manager);
    element.set_state(ElementState::Playing).unwrap();
    element.set_caps(AudioInfo::default(), video()).unwrap();
    assert!(render_once(&element));

    let size = element
        .context()
        .unwrap()
        .run_on_owning_thread(|gl| gl.window().size())
        .unwrap();
    assert_eq!(size, (8, 4));
}

#[test]
fn renegotiation_rebinds_the_output_pool() {
    let counters = Arc::new(Counters::default());
    let element = playing(Probe::new(counters.clone()));
    element.process(&AudioBuffer::silence(882)).unwrap();
    let first = element.context().unwrap();
    assert_eq!(element.pool().unwrap().gl_context(), Some(&first));

    element.set_context(HostContext {
        display: Some(Display::new_with_type(DisplayType::Headless).unwrap()),
        other_context: None,
    });
    assert!(element.pool().is_none());

    let frame = element.process(&AudioBuffer::silence(882)).unwrap();
    assert_eq!(frame.pixel(0, 0), Some([0, 0, 255, 255]));
    let second = element.context().unwrap();
    assert_ne!(first, second);
    assert_eq!(element.pool().unwrap().gl_context(), Some(&second));
    assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_inspection_leaves_no_context() {
    // A zero-sized window is rejected by the backend with GL_INVALID_VALUE.
    let manager = DisplayContextManager::new().with_geometry(0, 0);
    let counters = Arc::new(Counters::default());
    let element =
        GlAudioVisualizer::new("probe", Probe::new(counters.clone())).with_manager(manager);
    element.set_state(ElementState::Playing).unwrap();
    element.set_caps(AudioInfo::default(), video()).unwrap();

    assert!(!render_once(&element));
    match element.bus().pop() {
        Some(ElementMessage::Error { domain, message, .. }) => {
            assert_eq!(domain, ErrorDomain::ResourceNotFound);
            assert!(message.starts_with("GL error"), "{message}");
        }
        other => panic!("expected an inspection error, got {other:?}"),
    }
    assert!(element.context().is_none());
    assert!(element.display().is_none());
    assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
    assert_eq!(element.frame_count(), 0);
}

#[test]
fn host_display_set_in_null_is_used_once_playing() {
    let counters = Arc::new(Counters::default());
    let element = Arc::new(GlAudioVisualizer::new("probe", Probe::new(counters.clone())));
    let first = Display::new_with_type(DisplayType::Headless).unwrap();
    let host = Display::new_with_type(DisplayType::Headless).unwrap();

    element.set_context(HostContext {
        display: Some(first),
        other_context: None,
    });
    element.set_context(HostContext {
        display: Some(host.clone()),
        other_context: None,
    });
    assert!(element.context().is_none());
    assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
    assert!(element.bus().pop().is_none());

    element.set_state(ElementState::Playing).unwrap();
    element.set_caps(AudioInfo::default(), video()).unwrap();
    assert!(render_once(&element));
    assert_eq!(element.display().as_ref(), Some(&host));
    assert_eq!(element.context().unwrap().display(), &host);
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
}
