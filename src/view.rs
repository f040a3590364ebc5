//! Views and their declared bodies.

use crate::environment::Environment;
use crate::geometry::{self, Size};
use std::fmt;
use std::sync::Arc;

/// How a view reports its size to the layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    /// Always exactly this size, regardless of the proposal.
    Fixed(Size),
    /// Fills the proposal, but never shrinks below `minimum`.
    Expanding { minimum: Size },
}

impl Sizing {
    /// Resolves a proposed size against this policy and the combined minimum
    /// of the content behind it.
    pub fn resolve(&self, proposed: Size, content_minimum: Size) -> LayoutResult {
        match *self {
            // A fixed view clips its content; the content minimum does not
            // leak past it.
            Sizing::Fixed(size) => LayoutResult {
                size,
                minimum: size,
            },
            Sizing::Expanding { minimum } => {
                let minimum = geometry::max_size(minimum, content_minimum);
                LayoutResult {
                    size: geometry::clamp_to_minimum(proposed, minimum),
                    minimum,
                }
            }
        }
    }
}

/// The outcome of sizing a view against a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutResult {
    /// The size the view settled on.
    pub size: Size,
    /// The smallest size the view can be given.
    pub minimum: Size,
}

impl LayoutResult {
    pub fn empty() -> LayoutResult {
        LayoutResult {
            size: geometry::zero(),
            minimum: geometry::zero(),
        }
    }
}

/// What a view's `body` declares.
pub enum ViewBody {
    /// Nothing; the view occupies no space and has no widget.
    Empty,
    /// The view is pure composition and delegates to another view.
    View(Arc<dyn View>),
    /// The view owns a native widget with the given sizing policy. Subviews
    /// are mounted inside that widget.
    Native {
        sizing: Sizing,
        subviews: Vec<Arc<dyn View>>,
    },
}

impl fmt::Debug for ViewBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ViewBody::Empty => f.write_str("Empty"),
            ViewBody::View(view) => f.debug_tuple("View").field(view).finish(),
            ViewBody::Native { sizing, subviews } => f
                .debug_struct("Native")
                .field("sizing", sizing)
                .field("subviews", &subviews.len())
                .finish(),
        }
    }
}

/// A declarative description of part of the interface.
///
/// `body` is re-evaluated whenever observed state changes; the graph diffs
/// the result against the previous evaluation by type, updating matching
/// views in place (which lets their dynamic properties adopt prior state)
/// and rebuilding where the type changed.
pub trait View: crate::DynamicProperties + fmt::Debug + Send + Sync {
    fn body(&self, environment: &Environment) -> ViewBody;
}

crate::dynamic_properties!(());

impl View for () {
    fn body(&self, _environment: &Environment) -> ViewBody {
        ViewBody::Empty
    }
}

/// A native widget with a fixed size, optionally wrapping content.
#[derive(Debug)]
pub struct Frame {
    size: Size,
    child: Option<Arc<dyn View>>,
}

impl Frame {
    pub fn new(width: i32, height: i32) -> Frame {
        Frame {
            size: Size::new(width, height),
            child: None,
        }
    }

    pub fn with_child(mut self, child: impl View + 'static) -> Frame {
        self.child = Some(Arc::new(child));
        self
    }
}

crate::dynamic_properties!(Frame);

impl View for Frame {
    fn body(&self, _environment: &Environment) -> ViewBody {
        ViewBody::Native {
            sizing: Sizing::Fixed(self.size),
            subviews: self.child.iter().map(Arc::clone).collect(),
        }
    }
}

/// A native widget that fills whatever it is offered, down to a minimum.
#[derive(Debug)]
pub struct Flexible {
    minimum: Size,
    child: Option<Arc<dyn View>>,
}

impl Flexible {
    pub fn new() -> Flexible {
        Flexible {
            minimum: geometry::zero(),
            child: None,
        }
    }

    pub fn with_minimum(mut self, width: i32, height: i32) -> Flexible {
        self.minimum = Size::new(width, height);
        self
    }

    pub fn with_child(mut self, child: impl View + 'static) -> Flexible {
        self.child = Some(Arc::new(child));
        self
    }
}

impl Default for Flexible {
    fn default() -> Self {
        Flexible::new()
    }
}

crate::dynamic_properties!(Flexible);

impl View for Flexible {
    fn body(&self, _environment: &Environment) -> ViewBody {
        ViewBody::Native {
            sizing: Sizing::Expanding {
                minimum: self.minimum,
            },
            subviews: self.child.iter().map(Arc::clone).collect(),
        }
    }
}
