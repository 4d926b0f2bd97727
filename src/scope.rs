//! Scope tracking and the scoped-instance cache.
//!
//! A [`ScopeId`] pairs a [`ScopeKind`] with an opaque instance id chosen by
//! the scope's owner (a request UUID, a session token, ...). Scope stacks
//! are task-local on the async path and thread-local on the sync path, so
//! two concurrently active logical callers never see each other's current
//! scope.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;

use crate::key::TypeKey;

/// The kind of scope a `Scoped*` factory is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// The reserved kind used to model the classic "one instance for the
    /// whole process" lifetime; entered once by the container facade and
    /// never released except by `reset()`.
    Singleton,
    Session,
    Request,
    Custom(&'static str),
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Singleton => write!(f, "singleton"),
            Self::Session => write!(f, "session"),
            Self::Request => write!(f, "request"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Reserved instance id under which the single process-wide singleton scope
/// lives.
pub const SINGLETON_INSTANCE_ID: &str = "";

/// A `(kind, instance-id)` pair identifying one active scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeId {
    pub kind: ScopeKind,
    pub instance_id: String,
}

impl ScopeId {
    pub fn new(kind: ScopeKind, instance_id: impl Into<String>) -> Self {
        Self {
            kind,
            instance_id: instance_id.into(),
        }
    }

    pub fn singleton() -> Self {
        Self::new(ScopeKind::Singleton, SINGLETON_INSTANCE_ID)
    }
}

thread_local! {
    static SYNC_STACK: RefCell<Vec<ScopeId>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static TASK_STACK: RefCell<Vec<ScopeId>>;
}

/// Pushes `id` as the current scope for its kind on the calling logical
/// task. Outside of a task running under [`with_task_scope_stack`], this
/// falls back to the OS-thread-local stack.
fn push(id: ScopeId) {
    let pushed_in_task = TASK_STACK.try_with(|stack| stack.borrow_mut().push(id.clone())).is_ok();
    if !pushed_in_task {
        SYNC_STACK.with(|stack| stack.borrow_mut().push(id));
    }
}

fn pop(kind: &ScopeKind, instance_id: &str) {
    let popped_in_task = TASK_STACK
        .try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack
                .last()
                .is_some_and(|top| &top.kind == kind && top.instance_id == instance_id)
            {
                stack.pop();
            }
        })
        .is_ok();
    if !popped_in_task {
        SYNC_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack
                .last()
                .is_some_and(|top| &top.kind == kind && top.instance_id == instance_id)
            {
                stack.pop();
            }
        });
    }
}

fn current(kind: &ScopeKind) -> Option<String> {
    // The singleton scope is entered once by the container facade for its
    // whole lifetime; modeling it as always-active (rather than pushed onto
    // a per-task stack) is what makes it visible from every caller, not just
    // the task that constructed the container.
    if matches!(kind, ScopeKind::Singleton) {
        return Some(SINGLETON_INSTANCE_ID.to_string());
    }
    let from_task = TASK_STACK.try_with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|s| &s.kind == kind)
            .map(|s| s.instance_id.clone())
    });
    if let Ok(Some(id)) = from_task {
        return Some(id);
    }
    SYNC_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|s| &s.kind == kind)
            .map(|s| s.instance_id.clone())
    })
}

/// Runs `fut` with a fresh task-local resolution/scope stack, so a spawned
/// task does not inherit its spawner's active scopes unless it re-enters
/// them explicitly.
pub async fn with_task_scope_stack<F: std::future::Future>(fut: F) -> F::Output {
    TASK_STACK.scope(RefCell::new(Vec::new()), fut).await
}

/// Tracks active scope identifiers and the `(TypeKey, ScopeId)` cache of
/// constructed values.
pub struct ScopeManager {
    cache: DashMap<(TypeKey, ScopeId), Arc<dyn Any + Send + Sync>, RandomState>,
}

impl ScopeManager {
    pub fn new() -> Self {
        Self {
            cache: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn enter(&self, id: ScopeId) {
        push(id);
    }

    pub fn leave(&self, kind: &ScopeKind, instance_id: &str) {
        pop(kind, instance_id);
    }

    pub fn current_id(&self, kind: &ScopeKind) -> Option<String> {
        current(kind)
    }

    pub fn get(&self, key: &TypeKey, scope: &ScopeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.cache.get(&(*key, scope.clone())).map(|v| v.clone())
    }

    pub fn put(&self, key: TypeKey, scope: ScopeId, value: Arc<dyn Any + Send + Sync>) {
        self.cache.insert((key, scope), value);
    }

    /// Drops every cached entry under `(kind, instance_id)`, returning the
    /// number of entries removed.
    pub fn release_scope(&self, kind: &ScopeKind, instance_id: &str) -> usize {
        let victims: Vec<_> = self
            .cache
            .iter()
            .filter(|entry| {
                let (_, scope) = entry.key();
                &scope.kind == kind && scope.instance_id == instance_id
            })
            .map(|entry| entry.key().clone())
            .collect();
        for key in &victims {
            self.cache.remove(key);
        }
        victims.len()
    }

    /// Drops one specific `(T, scope)` entry, returning whether anything was
    /// removed.
    pub fn release_scoped(&self, key: &TypeKey, scope: &ScopeId) -> bool {
        self.cache.remove(&(*key, scope.clone())).is_some()
    }

    /// Drops every cached entry for `key`, regardless of which scope it was
    /// cached under. Used when a factory is released entirely.
    pub fn release_for_key(&self, key: &TypeKey) {
        self.cache.retain(|(k, _), _| k != key);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScopeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeManager")
            .field("cached_entries", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RequestContext(u32);

    #[test]
    fn scope_isolation_between_kinds_and_ids() {
        let manager = ScopeManager::new();
        let key = TypeKey::of::<RequestContext>();
        let a = ScopeId::new(ScopeKind::Request, "r1");
        let b = ScopeId::new(ScopeKind::Request, "r2");

        manager.put(key, a.clone(), Arc::new(RequestContext(1)));
        manager.put(key, b.clone(), Arc::new(RequestContext(2)));

        let va = manager.get(&key, &a).unwrap();
        let vb = manager.get(&key, &b).unwrap();
        assert_eq!(va.downcast_ref::<RequestContext>().unwrap().0, 1);
        assert_eq!(vb.downcast_ref::<RequestContext>().unwrap().0, 2);
    }

    #[test]
    fn release_scope_drops_only_matching_entries() {
        let manager = ScopeManager::new();
        let key = TypeKey::of::<RequestContext>();
        let r1 = ScopeId::new(ScopeKind::Request, "r1");
        let r2 = ScopeId::new(ScopeKind::Request, "r2");
        manager.put(key, r1.clone(), Arc::new(RequestContext(1)));
        manager.put(key, r2.clone(), Arc::new(RequestContext(2)));

        let dropped = manager.release_scope(&ScopeKind::Request, "r1");
        assert_eq!(dropped, 1);
        assert!(manager.get(&key, &r1).is_none());
        assert!(manager.get(&key, &r2).is_some());
    }

    #[test]
    fn sync_stack_tracks_current_id() {
        let manager = ScopeManager::new();
        assert!(manager.current_id(&ScopeKind::Request).is_none());
        manager.enter(ScopeId::new(ScopeKind::Request, "r1"));
        assert_eq!(manager.current_id(&ScopeKind::Request).as_deref(), Some("r1"));
        manager.leave(&ScopeKind::Request, "r1");
        assert!(manager.current_id(&ScopeKind::Request).is_none());
    }

    #[tokio::test]
    async fn task_local_stacks_do_not_cross_tasks() {
        let manager = Arc::new(ScopeManager::new());
        let m1 = manager.clone();
        let t1 = tokio::spawn(with_task_scope_stack(async move {
            m1.enter(ScopeId::new(ScopeKind::Request, "r1"));
            assert_eq!(m1.current_id(&ScopeKind::Request).as_deref(), Some("r1"));
        }));
        let m2 = manager.clone();
        let t2 = tokio::spawn(with_task_scope_stack(async move {
            assert!(m2.current_id(&ScopeKind::Request).is_none());
        }));
        t1.await.unwrap();
        t2.await.unwrap();
    }
}
