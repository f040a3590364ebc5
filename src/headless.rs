//! A backend without a toolkit, for tests and measurement.

use crate::backend::Backend;
use crate::geometry::{self, Size};
use crate::scheduler::{self, RemoteHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque handle to a headless window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(Uuid);

/// Opaque handle to a headless widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidgetHandle(Uuid);

struct WindowRecord {
    title: String,
    size: Size,
    minimum_size: Size,
    resizable: bool,
    visible: bool,
    closed: bool,
    scale: f64,
    child: Option<WidgetHandle>,
    resize_handler: Option<Arc<dyn Fn(Size) + Send + Sync>>,
    environment_handler: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Every programmatic size change, in order.
    set_size_log: Vec<Size>,
}

#[derive(Debug, Default)]
struct WidgetRecord {
    children: Vec<WidgetHandle>,
    positions: Vec<Size>,
}

#[derive(Default)]
struct HeadlessState {
    windows: HashMap<WindowHandle, WindowRecord>,
    widgets: HashMap<WidgetHandle, WidgetRecord>,
}

/// A [`Backend`] that records everything and draws nothing.
///
/// Construct it on the thread that will drive the scheduler; cross-thread
/// [`run_in_main_thread`](Backend::run_in_main_thread) calls are forwarded to
/// that thread's queue. The extra methods (`resize_window`, `change_scale`,
/// and the inspectors) are the test driver's side of the boundary.
#[derive(Clone)]
pub struct HeadlessBackend {
    state: Arc<Mutex<HeadlessState>>,
    main_thread: RemoteHandle,
    programmatically_resizable: bool,
}

impl HeadlessBackend {
    pub fn new() -> HeadlessBackend {
        HeadlessBackend {
            state: Arc::new(Mutex::new(HeadlessState::default())),
            main_thread: scheduler::handle(),
            programmatically_resizable: true,
        }
    }

    /// A backend that refuses programmatic window resizing, like a tiling
    /// window manager.
    pub fn without_programmatic_resizing() -> HeadlessBackend {
        HeadlessBackend {
            programmatically_resizable: false,
            ..HeadlessBackend::new()
        }
    }

    fn with_window<R>(&self, window: &WindowHandle, f: impl FnOnce(&mut WindowRecord) -> R) -> R {
        let mut state = self.state.lock();
        let record = state
            .windows
            .get_mut(window)
            .unwrap_or_else(|| panic!("unknown window handle {window:?}"));
        f(record)
    }

    fn with_widget<R>(&self, widget: &WidgetHandle, f: impl FnOnce(&mut WidgetRecord) -> R) -> R {
        let mut state = self.state.lock();
        let record = state
            .widgets
            .get_mut(widget)
            .unwrap_or_else(|| panic!("unknown widget handle {widget:?}"));
        f(record)
    }

    /// Simulates the user resizing a window.
    pub fn resize_window(&self, window: &WindowHandle, size: Size) {
        let handler = self.with_window(window, |record| {
            record.size = size;
            record.resize_handler.clone()
        });
        if let Some(handler) = handler {
            handler(size);
        }
    }

    /// Simulates a scale factor change, such as a monitor move.
    pub fn change_scale(&self, window: &WindowHandle, scale: f64) {
        let handler = self.with_window(window, |record| {
            record.scale = scale;
            record.environment_handler.clone()
        });
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn window_title(&self, window: &WindowHandle) -> String {
        self.with_window(window, |record| record.title.clone())
    }

    pub fn window_is_visible(&self, window: &WindowHandle) -> bool {
        self.with_window(window, |record| record.visible)
    }

    pub fn window_minimum_size(&self, window: &WindowHandle) -> Size {
        self.with_window(window, |record| record.minimum_size)
    }

    pub fn window_is_resizable(&self, window: &WindowHandle) -> bool {
        self.with_window(window, |record| record.resizable)
    }

    pub fn window_is_closed(&self, window: &WindowHandle) -> bool {
        self.with_window(window, |record| record.closed)
    }

    /// Every programmatic size change applied to the window, in order.
    pub fn set_size_log(&self, window: &WindowHandle) -> Vec<Size> {
        self.with_window(window, |record| record.set_size_log.clone())
    }

    pub fn child_count(&self, widget: &WidgetHandle) -> usize {
        self.with_widget(widget, |record| record.children.len())
    }

    pub fn child_position(&self, widget: &WidgetHandle, index: usize) -> Size {
        self.with_widget(widget, |record| record.positions[index])
    }

    pub fn window_child(&self, window: &WindowHandle) -> Option<WidgetHandle> {
        self.with_window(window, |record| record.child)
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        HeadlessBackend::new()
    }
}

impl std::fmt::Debug for HeadlessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HeadlessBackend")
            .field("windows", &state.windows.len())
            .field("widgets", &state.widgets.len())
            .finish()
    }
}

impl Backend for HeadlessBackend {
    type Window = WindowHandle;
    type Widget = WidgetHandle;

    fn create_window(&self, default_size: Size) -> WindowHandle {
        let handle = WindowHandle(Uuid::new_v4());
        self.state.lock().windows.insert(
            handle,
            WindowRecord {
                title: String::new(),
                size: default_size,
                minimum_size: geometry::zero(),
                resizable: true,
                visible: false,
                closed: false,
                scale: 1.0,
                child: None,
                resize_handler: None,
                environment_handler: None,
                set_size_log: Vec::new(),
            },
        );
        handle
    }

    fn set_window_title(&self, window: &WindowHandle, title: &str) {
        self.with_window(window, |record| record.title = title.to_string());
    }

    fn set_window_resizable(&self, window: &WindowHandle, resizable: bool) {
        self.with_window(window, |record| record.resizable = resizable);
    }

    fn set_window_child(&self, window: &WindowHandle, child: &WidgetHandle) {
        let child = *child;
        self.with_window(window, |record| record.child = Some(child));
    }

    fn window_size(&self, window: &WindowHandle) -> Size {
        self.with_window(window, |record| record.size)
    }

    fn set_window_size(&self, window: &WindowHandle, size: Size) {
        self.with_window(window, |record| {
            record.size = size;
            record.set_size_log.push(size);
        });
    }

    fn set_window_minimum_size(&self, window: &WindowHandle, size: Size) {
        self.with_window(window, |record| record.minimum_size = size);
    }

    fn window_scale(&self, window: &WindowHandle) -> f64 {
        self.with_window(window, |record| record.scale)
    }

    fn is_window_programmatically_resizable(&self, _window: &WindowHandle) -> bool {
        self.programmatically_resizable
    }

    fn show_window(&self, window: &WindowHandle) {
        self.with_window(window, |record| record.visible = true);
    }

    fn close_window(&self, window: &WindowHandle) {
        self.with_window(window, |record| {
            record.visible = false;
            record.closed = true;
        });
    }

    fn set_resize_handler(&self, window: &WindowHandle, handler: Box<dyn Fn(Size) + Send + Sync>) {
        self.with_window(window, |record| {
            record.resize_handler = Some(Arc::from(handler))
        });
    }

    fn set_environment_change_handler(
        &self,
        window: &WindowHandle,
        handler: Box<dyn Fn() + Send + Sync>,
    ) {
        self.with_window(window, |record| {
            record.environment_handler = Some(Arc::from(handler))
        });
    }

    fn create_container(&self) -> WidgetHandle {
        let handle = WidgetHandle(Uuid::new_v4());
        self.state
            .lock()
            .widgets
            .insert(handle, WidgetRecord::default());
        handle
    }

    fn add_child(&self, container: &WidgetHandle, child: &WidgetHandle) {
        let child = *child;
        self.with_widget(container, |record| {
            record.children.push(child);
            record.positions.push(geometry::zero());
        });
    }

    fn set_child_position(&self, container: &WidgetHandle, index: usize, position: Size) {
        self.with_widget(container, |record| record.positions[index] = position);
    }

    fn remove_child(&self, container: &WidgetHandle, index: usize) {
        self.with_widget(container, |record| {
            record.children.remove(index);
            record.positions.remove(index);
        });
    }

    fn run_in_main_thread(&self, action: Box<dyn FnOnce() + Send>) {
        self.main_thread.post(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::vec2;

    #[test]
    fn windows_record_their_configuration() {
        let backend = HeadlessBackend::new();
        let window = backend.create_window(vec2(640, 480));
        backend.set_window_title(&window, "hello");
        backend.set_window_resizable(&window, false);
        backend.set_window_size(&window, vec2(800, 600));

        assert_eq!(backend.window_title(&window), "hello");
        assert!(!backend.window_is_resizable(&window));
        assert_eq!(backend.window_size(&window), vec2(800, 600));
        assert_eq!(backend.set_size_log(&window), vec![vec2(800, 600)]);
        assert!(!backend.window_is_visible(&window));
        backend.show_window(&window);
        assert!(backend.window_is_visible(&window));
    }

    #[test]
    fn simulated_resize_reaches_the_handler() {
        let backend = HeadlessBackend::new();
        let window = backend.create_window(vec2(100, 100));
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        backend.set_resize_handler(
            &window,
            Box::new(move |size| {
                *sink.lock() = Some(size);
            }),
        );

        backend.resize_window(&window, vec2(300, 200));
        assert_eq!(*seen.lock(), Some(vec2(300, 200)));
        assert_eq!(backend.window_size(&window), vec2(300, 200));
        assert_eq!(
            backend.set_size_log(&window),
            Vec::new(),
            "user resizes are not programmatic size changes"
        );
    }

    #[test]
    fn containers_track_children_by_index() {
        let backend = HeadlessBackend::new();
        let container = backend.create_container();
        let a = backend.create_container();
        let b = backend.create_container();
        backend.add_child(&container, &a);
        backend.add_child(&container, &b);
        backend.set_child_position(&container, 1, vec2(10, 20));

        assert_eq!(backend.child_count(&container), 2);
        assert_eq!(backend.child_position(&container, 1), vec2(10, 20));

        backend.remove_child(&container, 0);
        assert_eq!(backend.child_count(&container), 1);
        assert_eq!(backend.child_position(&container, 0), vec2(10, 20));
    }
}
