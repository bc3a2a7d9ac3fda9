//! Deferred widget loading gated on viewport visibility
//!
//! Expensive widgets (charts, heavy tables) register a factory instead of
//! constructing eagerly. The loader watches their container through an
//! injected visibility signal and runs the factory once, the first time the
//! container enters the viewport (plus a lookahead margin). A shared
//! dependency gate — the charting backend that every widget needs — is
//! awaited with a bounded timeout; a widget whose gate never opens is
//! logged and left unloaded, never a crash.
//!
//! `update` and `destroy` against a widget that has not loaded yet are
//! no-ops, so page code can call them unconditionally.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error};

/// One-way "shared dependency is initialized" flag, cheap to clone into
/// whatever code performs the initialization.
#[derive(Clone, Debug, Default)]
pub struct DependencyGate {
    ready: Arc<AtomicBool>,
}

impl DependencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate that is already open; for widgets with no shared dependency.
    pub fn open() -> Self {
        let gate = Self::default();
        gate.mark_ready();
        gate
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

/// Subscription interface to whatever can tell us an element became
/// visible. The driver calls `ViewportLoader::notify_visible` when a
/// watched id intersects the viewport.
pub trait VisibilitySignal {
    /// Begin watching `id`, with `lookahead_px` of margin ahead of the
    /// viewport so loading starts slightly before the widget scrolls in.
    fn observe(&mut self, id: &str, lookahead_px: u32);

    /// Stop watching `id`.
    fn unobserve(&mut self, id: &str);
}

/// Loader tunables.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Margin ahead of the viewport at which loading starts.
    pub lookahead_px: u32,
    /// How long a visible widget may wait for the dependency gate.
    pub ready_timeout: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            lookahead_px: 50,
            ready_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SlotState {
    /// Registered, waiting for first visibility.
    Observed,
    /// Visible, waiting for the dependency gate to open.
    WaitingOnGate { since: Instant },
    Loaded,
    /// Gave up (gate timeout or factory error); a manual retry re-registers.
    Failed,
}

struct Slot<W> {
    factory: Box<dyn Fn() -> anyhow::Result<W>>,
    instance: Option<W>,
    state: SlotState,
}

/// Defers widget construction until first visibility.
pub struct ViewportLoader<W> {
    slots: HashMap<String, Slot<W>>,
    observer: Option<Box<dyn VisibilitySignal>>,
    gate: DependencyGate,
    options: LoaderOptions,
}

impl<W> ViewportLoader<W> {
    /// Create a loader. `observer: None` means no visibility API is
    /// available; factories then run at registration (correctness over
    /// optimization).
    pub fn new(
        observer: Option<Box<dyn VisibilitySignal>>,
        gate: DependencyGate,
        options: LoaderOptions,
    ) -> Self {
        Self {
            slots: HashMap::new(),
            observer,
            gate,
            options,
        }
    }

    /// Record a pending factory for the element with this id and begin
    /// watching it. Registering an id again replaces the previous slot.
    pub fn register(&mut self, id: &str, factory: impl Fn() -> anyhow::Result<W> + 'static) {
        self.slots.insert(
            id.to_string(),
            Slot {
                factory: Box::new(factory),
                instance: None,
                state: SlotState::Observed,
            },
        );

        let lookahead = self.options.lookahead_px;
        let observing = match self.observer.as_mut() {
            Some(observer) => {
                observer.observe(id, lookahead);
                true
            }
            None => false,
        };
        if !observing {
            self.notify_visible(id);
        }
    }

    /// The watched element entered the viewport. One-shot: observation
    /// stops and later notifications for a loaded widget do nothing.
    pub fn notify_visible(&mut self, id: &str) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        if slot.state != SlotState::Observed {
            return;
        }
        slot.state = SlotState::WaitingOnGate {
            since: Instant::now(),
        };
        if let Some(observer) = self.observer.as_mut() {
            observer.unobserve(id);
        }
        self.try_load(id);
    }

    /// Drive gate-waiting widgets forward; call once per tick.
    pub fn poll(&mut self) {
        let waiting: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot.state, SlotState::WaitingOnGate { .. }))
            .map(|(id, _)| id.clone())
            .collect();
        for id in waiting {
            self.try_load(&id);
        }
    }

    /// Apply `f` to the widget instance. No-op if the widget has not been
    /// loaded (or was destroyed).
    pub fn update(&mut self, id: &str, f: impl FnOnce(&mut W)) {
        if let Some(instance) = self.slots.get_mut(id).and_then(|s| s.instance.as_mut()) {
            f(instance);
        }
    }

    /// Drop the widget instance. The factory stays registered, so a later
    /// `notify_visible` rebuilds it. No-op for unloaded widgets.
    pub fn destroy(&mut self, id: &str) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.instance = None;
            slot.state = SlotState::Observed;
        }
    }

    /// Tear everything down: drop all instances and stop all observation.
    pub fn destroy_all(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            for id in self.slots.keys() {
                observer.unobserve(id);
            }
        }
        self.slots.clear();
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.slots
            .get(id)
            .map(|slot| slot.instance.is_some())
            .unwrap_or(false)
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.slots
            .get(id)
            .map(|slot| slot.state == SlotState::Failed)
            .unwrap_or(false)
    }

    fn try_load(&mut self, id: &str) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        let since = match slot.state {
            SlotState::WaitingOnGate { since } => since,
            _ => return,
        };

        if !self.gate.is_ready() {
            if since.elapsed() >= self.options.ready_timeout {
                error!(
                    "widget {}: dependency not ready after {:?}, leaving unloaded",
                    id, self.options.ready_timeout
                );
                slot.state = SlotState::Failed;
            }
            return;
        }

        match (slot.factory)() {
            Ok(instance) => {
                slot.instance = Some(instance);
                slot.state = SlotState::Loaded;
                debug!("lazy loaded widget {}", id);
            }
            Err(err) => {
                error!("failed to load widget {}: {:#}", id, err);
                slot.state = SlotState::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Records observe/unobserve calls for assertions.
    #[derive(Clone, Default)]
    struct RecordingSignal {
        observed: Arc<Mutex<Vec<String>>>,
        unobserved: Arc<Mutex<Vec<String>>>,
    }

    impl VisibilitySignal for RecordingSignal {
        fn observe(&mut self, id: &str, _lookahead_px: u32) {
            self.observed.lock().unwrap().push(id.to_string());
        }

        fn unobserve(&mut self, id: &str) {
            self.unobserved.lock().unwrap().push(id.to_string());
        }
    }

    struct Chart;

    fn counting_factory(counter: &Arc<AtomicUsize>) -> impl Fn() -> anyhow::Result<Chart> + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Chart)
        }
    }

    fn loader_with_signal() -> (ViewportLoader<Chart>, RecordingSignal) {
        let signal = RecordingSignal::default();
        let loader = ViewportLoader::new(
            Some(Box::new(signal.clone())),
            DependencyGate::open(),
            LoaderOptions::default(),
        );
        (loader, signal)
    }

    #[test]
    fn register_begins_observation_without_loading() {
        let (mut loader, signal) = loader_with_signal();
        let builds = Arc::new(AtomicUsize::new(0));
        loader.register("sales-chart", counting_factory(&builds));

        assert_eq!(signal.observed.lock().unwrap().as_slice(), ["sales-chart"]);
        assert_eq!(builds.load(Ordering::SeqCst), 0);
        assert!(!loader.is_loaded("sales-chart"));
    }

    #[test]
    fn first_visibility_loads_exactly_once() {
        let (mut loader, signal) = loader_with_signal();
        let builds = Arc::new(AtomicUsize::new(0));
        loader.register("sales-chart", counting_factory(&builds));

        loader.notify_visible("sales-chart");
        loader.notify_visible("sales-chart");

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded("sales-chart"));
        // One-shot: observation stopped after the first intersection.
        assert_eq!(signal.unobserved.lock().unwrap().as_slice(), ["sales-chart"]);
    }

    #[test]
    fn missing_visibility_api_loads_at_registration() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut loader =
            ViewportLoader::new(None, DependencyGate::open(), LoaderOptions::default());
        loader.register("sales-chart", counting_factory(&builds));

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn visible_widget_waits_for_the_gate() {
        let gate = DependencyGate::new();
        let builds = Arc::new(AtomicUsize::new(0));
        let mut loader: ViewportLoader<Chart> =
            ViewportLoader::new(None, gate.clone(), LoaderOptions::default());
        loader.register("sales-chart", counting_factory(&builds));

        assert_eq!(builds.load(Ordering::SeqCst), 0);
        loader.poll();
        assert_eq!(builds.load(Ordering::SeqCst), 0);

        gate.mark_ready();
        loader.poll();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gate_timeout_marks_failed_without_panicking() {
        let options = LoaderOptions {
            ready_timeout: Duration::ZERO,
            ..LoaderOptions::default()
        };
        let mut loader: ViewportLoader<Chart> =
            ViewportLoader::new(None, DependencyGate::new(), options);
        let builds = Arc::new(AtomicUsize::new(0));
        loader.register("sales-chart", counting_factory(&builds));

        assert!(loader.is_failed("sales-chart"));
        assert_eq!(builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn factory_error_marks_failed() {
        let mut loader: ViewportLoader<Chart> =
            ViewportLoader::new(None, DependencyGate::open(), LoaderOptions::default());
        loader.register("sales-chart", || anyhow::bail!("no canvas"));

        assert!(loader.is_failed("sales-chart"));
        assert!(!loader.is_loaded("sales-chart"));
    }

    #[test]
    fn update_before_load_is_a_noop() {
        let (mut loader, _signal) = loader_with_signal();
        let builds = Arc::new(AtomicUsize::new(0));
        loader.register("sales-chart", counting_factory(&builds));

        let mut applied = false;
        loader.update("sales-chart", |_chart| applied = true);
        assert!(!applied);

        loader.notify_visible("sales-chart");
        loader.update("sales-chart", |_chart| applied = true);
        assert!(applied);
    }

    #[test]
    fn destroy_allows_a_later_reload() {
        let (mut loader, _signal) = loader_with_signal();
        let builds = Arc::new(AtomicUsize::new(0));
        loader.register("sales-chart", counting_factory(&builds));

        loader.notify_visible("sales-chart");
        loader.destroy("sales-chart");
        assert!(!loader.is_loaded("sales-chart"));

        loader.notify_visible("sales-chart");
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn destroy_unknown_widget_is_safe() {
        let (mut loader, _signal) = loader_with_signal();
        loader.destroy("nonexistent");
        loader.update("nonexistent", |_chart| {});
    }

    #[test]
    fn destroy_all_clears_slots_and_observation() {
        let (mut loader, signal) = loader_with_signal();
        let builds = Arc::new(AtomicUsize::new(0));
        loader.register("a", counting_factory(&builds));
        loader.register("b", counting_factory(&builds));

        loader.destroy_all();

        assert!(!loader.is_loaded("a"));
        assert_eq!(signal.unobserved.lock().unwrap().len(), 2);
        loader.notify_visible("a"); // slot gone, must not panic
        assert_eq!(builds.load(Ordering::SeqCst), 0);
    }
}
