//! End-to-end scenarios over the headless backend.

use perch::{
    dynamic_properties, scheduler, App, AppHost, AppStorage, Backend, DynamicProperty, Environment,
    Flexible, Frame, HeadlessBackend, MemoryProvider, ObservableObject, Observed, Published,
    Publisher, Size, State, StorageCache, StorageProvider, View, ViewBody, Window, WindowNode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct CounterView {
    count: State<i32>,
    seen: Arc<Mutex<Vec<i32>>>,
}

dynamic_properties!(CounterView { count });

impl View for CounterView {
    fn body(&self, _environment: &Environment) -> ViewBody {
        let count = self.count.get();
        self.seen.lock().unwrap().push(count);
        ViewBody::View(Arc::new(Frame::new(100 + count, 50)))
    }
}

#[derive(Debug)]
struct CounterApp {
    count: State<i32>,
    seen: Arc<Mutex<Vec<i32>>>,
}

dynamic_properties!(CounterApp);

impl App for CounterApp {
    fn body(&self) -> Window {
        Window::new(
            "counter",
            CounterView {
                count: self.count.clone(),
                seen: Arc::clone(&self.seen),
            },
        )
        .with_default_size(200, 100)
    }
}

#[test]
fn counter_mutations_each_trigger_one_body_evaluation() {
    let backend = HeadlessBackend::new();
    let count = State::new(0);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = AppHost::new(
        CounterApp {
            count: count.clone(),
            seen: Arc::clone(&seen),
        },
        backend.clone(),
        Environment::new(),
    );

    assert_eq!(*seen.lock().unwrap(), vec![0], "one evaluation at startup");

    for step in 1..=3 {
        count.modify(|value| *value += 1);
        assert_eq!(
            seen.lock().unwrap().len() as i32,
            step,
            "nothing re-evaluates until the scheduler runs"
        );
        scheduler::drain();
    }
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);

    // The window was sized once at launch and never fought over afterwards.
    host.with_window_node(|node| {
        node.with_window(|window| {
            assert_eq!(backend.set_size_log(window), vec![Size::new(200, 100)]);
        })
    });
}

#[derive(Debug)]
struct SettingsView {
    flag: AppStorage<bool>,
}

dynamic_properties!(SettingsView { flag });

impl View for SettingsView {
    fn body(&self, _environment: &Environment) -> ViewBody {
        ViewBody::View(Arc::new(Frame::new(if self.flag.get() { 20 } else { 10 }, 10)))
    }
}

#[derive(Debug)]
struct SettingsApp {
    flag: AppStorage<bool>,
}

dynamic_properties!(SettingsApp);

impl App for SettingsApp {
    fn body(&self) -> Window {
        Window::new(
            "settings",
            SettingsView {
                flag: self.flag.clone(),
            },
        )
    }
}

#[test]
fn written_settings_are_persisted_and_shared_by_key() {
    let provider: Arc<MemoryProvider> = Arc::new(MemoryProvider::new());
    let environment = Environment::new()
        .with_storage_provider(Arc::clone(&provider) as Arc<dyn StorageProvider>);

    let cache = Arc::new(StorageCache::new());
    let flag = AppStorage::with_cache(Arc::clone(&cache), "scenario.flag", false);
    let _host = AppHost::new(
        SettingsApp { flag: flag.clone() },
        HeadlessBackend::new(),
        environment.clone(),
    );

    assert!(!flag.get(), "nothing stored yet, so the default applies");

    let fires = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fires);
    let other_handle = AppStorage::with_cache(Arc::clone(&cache), "scenario.flag", false);
    let _obs = other_handle.did_change().observe(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    flag.set(true);
    scheduler::drain();
    assert_eq!(
        fires.load(Ordering::SeqCst),
        1,
        "every container for the key shares one publisher"
    );
    assert!(other_handle.get());

    // A container in a fresh process-equivalent (empty cache) sees the
    // persisted value once the provider is attached.
    let fresh = AppStorage::with_cache(
        Arc::new(StorageCache::new()),
        "scenario.flag",
        false,
    );
    assert!(!fresh.get(), "no provider attached yet");
    fresh.update(None, &environment);
    assert!(fresh.get(), "the provider supplied the persisted value");
}

#[test]
fn layout_negotiation_converges_in_at_most_two_passes() {
    let backend = HeadlessBackend::new();
    let scene = Window::new("converge", Flexible::new().with_minimum(300, 200))
        .with_default_size(50, 50);
    let node = WindowNode::new(scene, backend.clone(), Environment::new());
    let result = node.scene_update(None, &Environment::new());

    assert_eq!(result.size, Size::new(300, 200));
    node.with_window(|window| {
        assert_eq!(backend.window_size(window), Size::new(300, 200));
        assert_eq!(
            backend.set_size_log(window),
            vec![Size::new(300, 200)],
            "the restarted pass committed once and did not loop"
        );
        assert_eq!(backend.window_minimum_size(window), Size::new(300, 200));
    });
}

#[derive(Debug)]
struct ScaleView {
    seen: Arc<Mutex<Vec<f64>>>,
}

dynamic_properties!(ScaleView);

impl View for ScaleView {
    fn body(&self, environment: &Environment) -> ViewBody {
        self.seen.lock().unwrap().push(environment.window_scale());
        ViewBody::View(Arc::new(Frame::new(10, 10)))
    }
}

#[test]
fn scale_changes_trigger_a_pass_with_the_new_scale() {
    let backend = HeadlessBackend::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let scene = Window::new(
        "scale",
        ScaleView {
            seen: Arc::clone(&seen),
        },
    );
    let node = WindowNode::new(scene, backend.clone(), Environment::new());
    node.scene_update(None, &Environment::new());
    assert_eq!(*seen.lock().unwrap(), vec![1.0]);

    let window = node.with_window(|window| *window);
    backend.change_scale(&window, 2.0);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![1.0, 2.0],
        "the environment change re-evaluates with the reported scale"
    );
}

#[derive(Debug)]
struct TitleModel {
    name: Published<String>,
    changed: Publisher,
}

impl TitleModel {
    fn new(name: &str) -> TitleModel {
        let changed = Publisher::new();
        let name = Published::new(name.to_string());
        changed.link_to_upstream(name.publisher()).defuse();
        TitleModel { name, changed }
    }
}

impl ObservableObject for TitleModel {
    fn did_change(&self) -> Publisher {
        self.changed.clone()
    }
}

#[derive(Debug)]
struct TitleApp {
    model: State<Option<Observed<TitleModel>>>,
}

dynamic_properties!(TitleApp { model });

impl App for TitleApp {
    fn body(&self) -> Window {
        let title = self
            .model
            .with(|model| model.as_ref().map(|m| m.name.get()))
            .unwrap_or_else(|| "untitled".to_string());
        Window::new(title, Frame::new(10, 10))
    }
}

#[test]
fn embedded_model_changes_relink_across_replacement() {
    let backend = HeadlessBackend::new();
    let model_cell: State<Option<Observed<TitleModel>>> = State::new(None);
    let host = AppHost::new(
        TitleApp {
            model: model_cell.clone(),
        },
        backend.clone(),
        Environment::new(),
    );
    let window = host.with_window_node(|node| node.with_window(|window| *window));

    assert_eq!(backend.window_title(&window), "untitled");

    let first = Observed::new(TitleModel::new("first"));
    let first_handle = first.clone();
    model_cell.set(Some(first));
    scheduler::drain();
    assert_eq!(backend.window_title(&window), "first");

    first_handle.name.set("renamed".to_string());
    scheduler::drain();
    assert_eq!(
        backend.window_title(&window),
        "renamed",
        "mutations inside the model reach the app"
    );

    let second = Observed::new(TitleModel::new("second"));
    let second_handle = second.clone();
    model_cell.set(Some(second));
    scheduler::drain();
    assert_eq!(backend.window_title(&window), "second");

    first_handle.name.set("stale".to_string());
    scheduler::drain();
    assert_eq!(
        backend.window_title(&window),
        "second",
        "the replaced model is no longer observed"
    );

    second_handle.name.set("final".to_string());
    scheduler::drain();
    assert_eq!(backend.window_title(&window), "final");

    model_cell.set(None);
    scheduler::drain();
    assert_eq!(backend.window_title(&window), "untitled");
    second_handle.name.set("ghost".to_string());
    scheduler::drain();
    assert_eq!(
        backend.window_title(&window),
        "untitled",
        "clearing the value severs the link"
    );
}
