//! Scenes: the top-level containers an app declares.

mod window;
mod window_node;

pub use window::Window;
pub use window_node::WindowNode;
