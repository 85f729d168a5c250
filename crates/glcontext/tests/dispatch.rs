use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use glcontext::{ContextError, Display, DisplayType, GlApi, GlVersion, SoftwareFactory};

fn headless() -> Display {
    Display::new_with_type(DisplayType::Headless).expect("headless display")
}

#[test]
fn add_context_is_compare_and_set() {
    let display = headless();
    let other = headless();

    let mut guard = display.lock();
    assert!(guard.context_for_thread(None).is_none());
    let ctx = guard.create_context(None).unwrap();
    assert!(guard.add_context(&ctx));
    assert!(guard.add_context(&ctx), "re-adding the same context succeeds");
    assert_eq!(guard.context_for_thread(None), Some(ctx.clone()));
    assert_eq!(guard.context_for_thread(Some(ctx.thread_id())), Some(ctx.clone()));
    assert_eq!(guard.context_for_thread(Some(thread::current().id())), None);
    drop(guard);

    let foreign = other.lock().create_context(None).unwrap();
    assert!(!display.lock().add_context(&foreign));
}

#[test]
fn dropped_contexts_leave_the_registry() {
    let display = headless();
    {
        let mut guard = display.lock();
        let ctx = guard.create_context(None).unwrap();
        assert!(guard.add_context(&ctx));
    }
    assert!(display.lock().contexts().is_empty());
}

#[test]
fn shared_context_records_its_origin() {
    let display = headless();
    let guard = display.lock();
    let first = guard.create_context(None).unwrap();
    let second = guard.create_context(Some(&first)).unwrap();
    assert_eq!(second.shared_with(), Some(first.id()));
    assert_ne!(first.thread_id(), second.thread_id());
}

#[test]
fn legacy_backend_reports_its_api() {
    let display = Display::with_backend(
        DisplayType::Headless,
        Arc::new(SoftwareFactory::new(GlApi::OPENGL, GlVersion::new(2, 1))),
    );
    let ctx = display.lock().create_context(None).unwrap();
    assert_eq!(ctx.api(), GlApi::OPENGL);
    assert_eq!(ctx.glsl_version().map(|glsl| glsl.version), Some(120));
}

#[test]
fn concurrent_dispatches_are_serialised() {
    let display = headless();
    let ctx = display.lock().create_context(None).unwrap();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..25 {
                    let in_flight = Arc::clone(&in_flight);
                    let max_seen = Arc::clone(&max_seen);
                    ctx.run_on_owning_thread(move |_| {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            });
        }
    });

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}

#[test]
fn every_dispatch_after_thread_exit_fails() {
    let display = headless();
    let ctx = display.lock().create_context(None).unwrap();
    let clone = ctx.clone();
    ctx.shutdown();
    for _ in 0..3 {
        assert!(matches!(
            clone.run_on_owning_thread(|active| active.context_id()),
            Err(ContextError::ThreadGone)
        ));
    }
}
