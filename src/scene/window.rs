//! The window scene description.

use crate::geometry::Size;
use crate::view::View;
use cgmath::vec2;
use std::fmt;
use std::sync::Arc;

/// A declarative description of a top-level window.
///
/// Like a view body, a `Window` is cheap to recreate: the app's `body`
/// returns a fresh one on every app-level change and the corresponding
/// [`WindowNode`](crate::WindowNode) diffs it against the live window.
#[derive(Clone)]
pub struct Window {
    title: String,
    default_size: Size,
    resizable: bool,
    open_on_launch: bool,
    root: Arc<dyn View>,
}

impl Window {
    pub fn new(title: impl Into<String>, root: impl View + 'static) -> Window {
        Window {
            title: title.into(),
            default_size: vec2(900, 450),
            resizable: true,
            open_on_launch: true,
            root: Arc::new(root),
        }
    }

    /// The content size the window opens at. Only honored at creation;
    /// changing it on a live window has no effect.
    pub fn with_default_size(mut self, width: i32, height: i32) -> Window {
        self.default_size = vec2(width, height);
        self
    }

    pub fn with_resizable(mut self, resizable: bool) -> Window {
        self.resizable = resizable;
        self
    }

    /// Whether the window shows itself after its first layout commit.
    pub fn with_open_on_launch(mut self, open: bool) -> Window {
        self.open_on_launch = open;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn default_size(&self) -> Size {
        self.default_size
    }

    pub fn is_resizable(&self) -> bool {
        self.resizable
    }

    pub fn opens_on_launch(&self) -> bool {
        self.open_on_launch
    }

    pub fn root(&self) -> Arc<dyn View> {
        Arc::clone(&self.root)
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Window")
            .field("title", &self.title)
            .field("default_size", &self.default_size)
            .field("resizable", &self.resizable)
            .finish()
    }
}
