//! The native backend boundary.

use crate::geometry::Size;

/// A native windowing toolkit, as seen by the view graph and window nodes.
///
/// Implementations wrap a concrete toolkit; the crate ships
/// [`HeadlessBackend`](crate::HeadlessBackend) for tests. Handles are opaque:
/// `Window` and `Widget` carry whatever the toolkit needs, and the framework
/// only ever hands them back to the backend that created them. Mixing handles
/// between backends is a programming error and panics.
///
/// All operations here are infallible; a toolkit that can fail mid-call has
/// already lost state the framework cannot recover, so backends are expected
/// to abort on their own fatal errors.
pub trait Backend: Clone + Send + 'static {
    type Window: Send + 'static;
    type Widget: Clone + PartialEq + Send + 'static;

    /// Creates a hidden window with the given content size.
    fn create_window(&self, default_size: Size) -> Self::Window;

    fn set_window_title(&self, window: &Self::Window, title: &str);

    /// Controls whether the user may resize the window.
    fn set_window_resizable(&self, window: &Self::Window, resizable: bool);

    /// Installs `child` as the window's sole content widget.
    fn set_window_child(&self, window: &Self::Window, child: &Self::Widget);

    /// The window's current content size in pixels.
    fn window_size(&self, window: &Self::Window) -> Size;

    fn set_window_size(&self, window: &Self::Window, size: Size);

    /// The smallest content size the user may resize the window to.
    fn set_window_minimum_size(&self, window: &Self::Window, size: Size);

    /// The window's device scale factor.
    fn window_scale(&self, window: &Self::Window) -> f64;

    /// Whether the toolkit honors programmatic size changes for this window.
    ///
    /// Tiling window managers and some embedded targets do not; the layout
    /// negotiation then treats the backend-reported size as final.
    fn is_window_programmatically_resizable(&self, window: &Self::Window) -> bool;

    fn show_window(&self, window: &Self::Window);

    fn close_window(&self, window: &Self::Window);

    /// Installs the handler invoked when the user resizes the window.
    ///
    /// Installing a handler replaces any previous one.
    fn set_resize_handler(&self, window: &Self::Window, handler: Box<dyn Fn(Size) + Send + Sync>);

    /// Installs the handler invoked when the window's ambient properties
    /// (such as its scale factor) change.
    fn set_environment_change_handler(
        &self,
        window: &Self::Window,
        handler: Box<dyn Fn() + Send + Sync>,
    );

    /// Creates a bare container widget that positions children at absolute
    /// pixel offsets.
    fn create_container(&self) -> Self::Widget;

    /// Appends `child` to `container`.
    fn add_child(&self, container: &Self::Widget, child: &Self::Widget);

    /// Moves the child at `index` to a pixel offset within its container.
    fn set_child_position(&self, container: &Self::Widget, index: usize, position: Size);

    /// Detaches the child at `index` from `container`.
    fn remove_child(&self, container: &Self::Widget, index: usize);

    /// Runs `action` on the thread that owns the UI.
    ///
    /// Used by cross-thread code to get back onto the main thread before
    /// touching windows or widgets.
    fn run_in_main_thread(&self, action: Box<dyn FnOnce() + Send>);
}
