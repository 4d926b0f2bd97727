//! The six concrete end-to-end scenarios the resolution core is built
//! around, each exercised as a whole-crate black-box test against
//! `corewire::Container` rather than any single module's internals.

use corewire::{Container, ScopeKind};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
struct ConsoleLogger {
    level: &'static str,
}

#[tokio::test]
async fn sync_register_sync_resolve() {
    let container = Container::new();
    container.singleton(|| ConsoleLogger { level: "info" });

    let logger = container.resolve::<ConsoleLogger>().unwrap();
    assert_eq!(*logger, ConsoleLogger { level: "info" });

    container.await_pending_work().await;
    let type_name = std::any::type_name::<ConsoleLogger>();
    assert_eq!(container.stats().get(type_name).copied(), Some(1));
}

#[derive(Clone, Debug, PartialEq)]
struct Db {
    id: u32,
}

#[tokio::test]
async fn async_once_joins_concurrent_callers() {
    static INVOCATIONS: AtomicU32 = AtomicU32::new(0);

    let container = Container::new();
    container.register_once::<Db, _, _>(|| async {
        INVOCATIONS.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Db { id: 1 }
    });

    let mut joins = Vec::new();
    for _ in 0..100 {
        let container = container.clone();
        joins.push(tokio::spawn(async move { container.resolve_async::<Db>().await.unwrap() }));
    }
    for join in joins {
        let db = join.await.unwrap();
        assert_eq!(*db, Db { id: 1 });
    }
    assert_eq!(INVOCATIONS.load(Ordering::SeqCst), 1);
}

#[derive(Clone, Debug, PartialEq)]
struct RequestContext {
    tag: &'static str,
}

#[tokio::test]
async fn scoped_request_isolation_and_teardown() {
    static NEXT_TAG: AtomicU32 = AtomicU32::new(0);
    static TAGS: [&str; 2] = ["first", "second"];

    let container = Container::new();
    container.register_scoped(ScopeKind::Request, || {
        let tag = TAGS[NEXT_TAG.fetch_add(1, Ordering::SeqCst) as usize % TAGS.len()];
        RequestContext { tag }
    });

    let c1 = container.clone();
    let task_a = tokio::spawn(async move {
        c1.enter_scope(ScopeKind::Request, "r1");
        let first = c1.resolve::<RequestContext>().unwrap();
        let second = c1.resolve::<RequestContext>().unwrap();
        c1.leave_scope(ScopeKind::Request, "r1");
        assert!(Arc::ptr_eq(&first, &second));
        first
    });

    let c2 = container.clone();
    let task_b = tokio::spawn(async move {
        c2.enter_scope(ScopeKind::Request, "r2");
        let first = c2.resolve::<RequestContext>().unwrap();
        let second = c2.resolve::<RequestContext>().unwrap();
        c2.leave_scope(ScopeKind::Request, "r2");
        assert!(Arc::ptr_eq(&first, &second));
        first
    });

    let a = task_a.await.unwrap();
    let b = task_b.await.unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    container.release_scope(ScopeKind::Request, "r1");
    let fresh = tokio::spawn({
        let container = container.clone();
        async move {
            container.enter_scope(ScopeKind::Request, "r1");
            let value = container.resolve::<RequestContext>().unwrap();
            container.leave_scope(ScopeKind::Request, "r1");
            value
        }
    })
    .await
    .unwrap();
    assert!(!Arc::ptr_eq(&a, &fresh));
}

#[derive(Clone, Debug)]
struct UserService;

#[tokio::test]
async fn miss_diagnostics_suggests_close_name() {
    let container = Container::new();
    container.singleton(|| UserService);

    let real_name = std::any::type_name::<UserService>();
    let typo = real_name.replace("UserService", "UsreService");
    let detail = container.miss_detail(Box::leak(typo.into_boxed_str()));
    assert!(
        detail.similar.contains(&real_name),
        "expected a close-name suggestion, got {:?}",
        detail.similar
    );
}

struct A;
struct B;

#[tokio::test]
async fn cycle_detection_reports_a_to_b_to_a() {
    let container = Container::new();
    let inner = container.clone();
    container.singleton(move || {
        let _ = inner.resolve::<B>();
        A
    });
    let inner = container.clone();
    container.singleton(move || {
        let _ = inner.resolve::<A>();
        B
    });

    let _ = container.resolve::<A>();
    container.await_pending_work().await;

    let cycles = container.detected_cycles();
    assert!(
        cycles.iter().any(|c| c.contains("->")),
        "expected a recorded cycle, got {:?}",
        cycles
    );
}

#[derive(Clone)]
struct Widget {
    value: i32,
}

#[tokio::test]
async fn optimization_on_and_off_agree_on_output() {
    let off = Container::new();
    off.singleton(|| Widget { value: 7 });

    let on = Container::new();
    on.singleton(|| Widget { value: 7 });
    on.enable_optimization();

    for _ in 0..10_000 {
        let off_value = off.resolve::<Widget>().unwrap();
        let on_value = on.resolve::<Widget>().unwrap();
        assert_eq!(off_value.value, on_value.value);
    }
}
