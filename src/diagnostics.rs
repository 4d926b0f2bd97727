//! Auto-diagnostics: usage tracking, dependency-graph/cycle detection, and
//! the batched event pipeline.
//!
//! Producers (the registry's `register`/`resolve` paths) enqueue events
//! without blocking. A single consumer drains the queue on a cadence
//! (`batch_interval`, or immediately once `max_batch_size` is reached) and
//! folds it into derived state that the read-only query methods expose.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::key::TypeKey;
use crate::scope::ScopeKind;

/// A diagnostics event, emitted fire-and-forget from the resolution hot
/// path.
#[derive(Debug, Clone)]
pub enum Event {
    Registered { key: TypeKey, variant: &'static str },
    Resolved { key: TypeKey },
    Released { key: TypeKey },
    NestedResolve { parent: TypeKey, child: TypeKey },
    Miss { type_name: &'static str },
    ScopeFallback { key: TypeKey, kind: ScopeKind },
    HealthCheckTick,
    OptimizationTick,
}

/// Aggregate health score plus the specific conditions that penalized it.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub score: i64,
    pub duplicate_registrations: Vec<&'static str>,
    pub scope_inconsistencies: Vec<&'static str>,
}

struct State {
    usage_count: DashMap<TypeKey, u64, RandomState>,
    graph: DashMap<TypeKey, DashSet<TypeKey, RandomState>, RandomState>,
    cycles: DashSet<String, RandomState>,
    optimized: DashSet<TypeKey, RandomState>,
    last_scope_kind: DashMap<TypeKey, ScopeKind, RandomState>,
    scope_inconsistencies: DashSet<TypeKey, RandomState>,
    registrations_since_tick: DashMap<TypeKey, u32, RandomState>,
    duplicate_registrations: DashSet<TypeKey, RandomState>,
    resolved_count: AtomicU64,
    miss_count: AtomicU64,
    registered_total: AtomicU64,
}

impl State {
    fn new() -> Self {
        Self {
            usage_count: DashMap::with_hasher(RandomState::new()),
            graph: DashMap::with_hasher(RandomState::new()),
            cycles: DashSet::with_hasher(RandomState::new()),
            optimized: DashSet::with_hasher(RandomState::new()),
            last_scope_kind: DashMap::with_hasher(RandomState::new()),
            scope_inconsistencies: DashSet::with_hasher(RandomState::new()),
            registrations_since_tick: DashMap::with_hasher(RandomState::new()),
            duplicate_registrations: DashSet::with_hasher(RandomState::new()),
            resolved_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            registered_total: AtomicU64::new(0),
        }
    }

    fn apply(&self, event: Event, threshold: u64) {
        match event {
            Event::Registered { key, .. } => {
                self.registered_total.fetch_add(1, Ordering::Relaxed);
                let count = self
                    .registrations_since_tick
                    .entry(key)
                    .and_modify(|c| *c += 1)
                    .or_insert(1);
                if *count > 1 {
                    self.duplicate_registrations.insert(key);
                }
            }
            Event::Resolved { key } => {
                self.resolved_count.fetch_add(1, Ordering::Relaxed);
                let mut entry = self.usage_count.entry(key).or_insert(0);
                *entry += 1;
                if *entry >= threshold {
                    self.optimized.insert(key);
                }
            }
            Event::Released { .. } => {}
            Event::NestedResolve { parent, child } => {
                self.graph
                    .entry(parent)
                    .or_insert_with(|| DashSet::with_hasher(RandomState::new()))
                    .insert(child);
                if self.reachable(&child, &parent) {
                    let path = format!("{} -> {}", parent.name(), child.name());
                    self.cycles.insert(path);
                }
            }
            Event::Miss { .. } => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
            }
            Event::ScopeFallback { key, kind } => {
                if let Some(prev) = self.last_scope_kind.get(&key) {
                    if *prev != kind {
                        self.scope_inconsistencies.insert(key);
                    }
                }
                self.last_scope_kind.insert(key, kind);
            }
            Event::HealthCheckTick => {
                self.registrations_since_tick.clear();
            }
            Event::OptimizationTick => {}
        }
    }

    /// DFS reachability check: can `from` reach `to` by following recorded
    /// edges? Used to detect that adding `parent -> child` closes a cycle.
    fn reachable(&self, from: &TypeKey, to: &TypeKey) -> bool {
        let mut visited: Vec<TypeKey> = vec![*from];
        let mut stack = vec![*from];
        while let Some(node) = stack.pop() {
            if node == *to {
                return true;
            }
            if let Some(children) = self.graph.get(&node) {
                for child in children.iter() {
                    if !visited.contains(&*child) {
                        visited.push(*child);
                        stack.push(*child);
                    }
                }
            }
        }
        false
    }
}

/// Owns the event queue and the background drain loop.
pub struct DiagnosticsEngine {
    enabled: AtomicBool,
    sender: mpsc::UnboundedSender<Event>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    started: AtomicBool,
    state: Arc<State>,
    /// Count of events handed to `sender` that `drain_loop` has not yet
    /// applied. Events applied inline (no runtime reachable at emit time)
    /// never touch this counter, since there is no asynchronous drain to
    /// wait for in that case.
    pending: Arc<AtomicU64>,
    batch_interval: Duration,
    max_batch_size: usize,
    health_interval: Duration,
    threshold: u64,
}

impl DiagnosticsEngine {
    pub fn new(config: &Config) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            enabled: AtomicBool::new(config.monitoring_enabled),
            sender,
            receiver: Mutex::new(Some(receiver)),
            started: AtomicBool::new(false),
            state: Arc::new(State::new()),
            pending: Arc::new(AtomicU64::new(0)),
            batch_interval: config.diagnostics_batch_interval,
            max_batch_size: config.diagnostics_max_batch_size,
            health_interval: config.diagnostics_health_interval,
            threshold: config.auto_optimization_threshold,
        })
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Fire-and-forget emission. When monitoring is disabled this is a
    /// no-op: no event emission happens at all, matching the policy that
    /// optimization toggling alone never suppresses tracking, only
    /// `monitoring.enabled` does.
    ///
    /// When no Tokio runtime is reachable from the calling thread, there is
    /// nothing that could ever drain a queued event, so the event is
    /// applied to `state` synchronously right here instead of being
    /// enqueued into a channel no task will service. This is the only path
    /// a pure-sync caller (no runtime anywhere in the process) ever takes.
    pub fn emit(self: &Arc<Self>, event: Event) {
        if !self.is_enabled() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            self.state.apply(event, self.threshold);
            return;
        }
        self.ensure_drain_started();
        self.pending.fetch_add(1, Ordering::AcqRel);
        // Unbounded send only fails if the receiver end was dropped, which
        // only happens if the drain task itself panicked; dropping the
        // event is the documented degradation (counted at the next health
        // tick in a full implementation, best-effort here). In that case
        // `pending` would never be decremented, so undo the increment to
        // keep `await_quiescence` from hanging on a send that nothing will
        // ever drain.
        if self.sender.send(event).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn ensure_drain_started(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // Caller already routed through the inline-apply branch in
            // `emit` above; reaching here with no runtime would mean a
            // caller invoked this directly, which nothing in the crate
            // does. Leave `started` false so a later call with a runtime
            // reachable still spawns the drain task.
            self.started.store(false, Ordering::Release);
            return;
        };
        let mut guard = self.receiver.lock();
        if let Some(receiver) = guard.take() {
            let state = self.state.clone();
            let batch_interval = self.batch_interval;
            let max_batch_size = self.max_batch_size;
            let health_interval = self.health_interval;
            let threshold = self.threshold;
            let pending = self.pending.clone();
            handle.spawn(Self::drain_loop(
                receiver,
                state,
                pending,
                batch_interval,
                max_batch_size,
                health_interval,
                threshold,
            ));
        }
    }

    async fn drain_loop(
        mut receiver: mpsc::UnboundedReceiver<Event>,
        state: Arc<State>,
        pending: Arc<AtomicU64>,
        batch_interval: Duration,
        max_batch_size: usize,
        health_interval: Duration,
        threshold: u64,
    ) {
        let mut batch_tick = tokio::time::interval(batch_interval);
        let mut health_tick = tokio::time::interval(health_interval);
        let mut batch_pending = 0usize;
        loop {
            tokio::select! {
                maybe_event = receiver.recv() => {
                    match maybe_event {
                        Some(event) => {
                            state.apply(event, threshold);
                            pending.fetch_sub(1, Ordering::AcqRel);
                            batch_pending += 1;
                            if batch_pending >= max_batch_size {
                                batch_pending = 0;
                            }
                        }
                        None => break,
                    }
                }
                _ = batch_tick.tick() => {
                    batch_pending = 0;
                }
                _ = health_tick.tick() => {
                    state.apply(Event::HealthCheckTick, threshold);
                }
            }
        }
    }

    /// Waits until every event handed to `emit` has been applied to `state`.
    ///
    /// Events applied inline (no runtime reachable at emit time) are already
    /// applied by the time `emit` returns, so only events that went through
    /// the channel count toward `pending`. Polls rather than blocks: there is
    /// no single task to join, since `drain_loop` runs indefinitely for the
    /// life of the engine.
    pub async fn await_quiescence(&self) {
        while self.pending.load(Ordering::Acquire) > 0 {
            tokio::task::yield_now().await;
        }
    }

    pub fn graph(&self) -> String {
        let mut rendered = String::new();
        for entry in self.state.graph.iter() {
            let parent = entry.key();
            for child in entry.value().iter() {
                let marks_cycle = self.state.reachable(&child, parent);
                rendered.push_str(&format!(
                    "{} -> {}{}\n",
                    parent.name(),
                    child.name(),
                    if marks_cycle { " [cycle]" } else { "" }
                ));
            }
        }
        rendered
    }

    pub fn stats(&self) -> HashMap<&'static str, u64> {
        self.state
            .usage_count
            .iter()
            .map(|e| (e.key().name(), *e.value()))
            .collect()
    }

    pub fn optimized_types(&self) -> HashSet<&'static str> {
        self.state.optimized.iter().map(|k| k.name()).collect()
    }

    pub fn detected_cycles(&self) -> HashSet<String> {
        self.state.cycles.iter().map(|c| c.clone()).collect()
    }

    pub fn health_report(&self) -> HealthReport {
        let mut score: i64 = 100;
        let duplicates: Vec<&'static str> = self
            .state
            .duplicate_registrations
            .iter()
            .map(|k| k.name())
            .collect();
        score -= 5 * duplicates.len() as i64;

        let inconsistencies: Vec<&'static str> = self
            .state
            .scope_inconsistencies
            .iter()
            .map(|k| k.name())
            .collect();
        score -= 5 * inconsistencies.len() as i64;

        HealthReport {
            score: score.max(0),
            duplicate_registrations: duplicates,
            scope_inconsistencies: inconsistencies,
        }
    }

    pub fn resolved_count(&self) -> u64 {
        self.state.resolved_count.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.state.miss_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for DiagnosticsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsEngine")
            .field("enabled", &self.is_enabled())
            .field("resolved", &self.resolved_count())
            .field("misses", &self.miss_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ServiceA;
    struct ServiceB;

    #[test]
    fn cycle_detection_marks_both_directions() {
        let state = State::new();
        let a = TypeKey::of::<ServiceA>();
        let b = TypeKey::of::<ServiceB>();
        state.apply(Event::NestedResolve { parent: a, child: b }, 10);
        assert!(state.cycles.is_empty());
        state.apply(Event::NestedResolve { parent: b, child: a }, 10);
        assert_eq!(state.cycles.len(), 1);
    }

    #[test]
    fn usage_count_crosses_threshold_flags_optimized() {
        let state = State::new();
        let key = TypeKey::of::<ServiceA>();
        for _ in 0..9 {
            state.apply(Event::Resolved { key }, 10);
        }
        assert!(!state.optimized.contains(&key));
        state.apply(Event::Resolved { key }, 10);
        assert!(state.optimized.contains(&key));
    }

    #[test]
    fn emit_applies_inline_with_no_runtime_reachable() {
        // Deliberately a plain #[test], not #[tokio::test]: no runtime
        // exists on this thread, so `emit` must apply synchronously rather
        // than stranding the event in a channel nothing will ever drain.
        let config = Config::builder().monitoring_enabled(true).build();
        let engine = DiagnosticsEngine::new(&config);
        engine.emit(Event::Resolved {
            key: TypeKey::of::<ServiceA>(),
        });
        assert_eq!(engine.resolved_count(), 1);
    }

    #[tokio::test]
    async fn disabled_monitoring_drops_events_silently() {
        let config = Config::builder().monitoring_enabled(false).build();
        let engine = DiagnosticsEngine::new(&config);
        engine.emit(Event::Resolved {
            key: TypeKey::of::<ServiceA>(),
        });
        assert_eq!(engine.resolved_count(), 0);
    }

    #[tokio::test]
    async fn enabled_monitoring_eventually_applies_events() {
        let config = Config::builder()
            .monitoring_enabled(true)
            .diagnostics_batch_interval(Duration::from_millis(10))
            .build();
        let engine = DiagnosticsEngine::new(&config);
        engine.emit(Event::Resolved {
            key: TypeKey::of::<ServiceA>(),
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.resolved_count(), 1);
    }
}
