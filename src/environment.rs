//! Ambient values handed down through the view tree.

use crate::state::StorageProvider;
use std::fmt;
use std::sync::Arc;

/// Values available to every view and dynamic property during an update.
///
/// The environment is passed by reference down the tree and extended with
/// builder methods where a subtree needs a different value; cloning is a
/// couple of `Arc` bumps.
#[derive(Clone)]
pub struct Environment {
    storage_provider: Option<Arc<dyn StorageProvider>>,
    window_scale: f64,
}

impl Environment {
    pub fn new() -> Environment {
        Environment {
            storage_provider: None,
            window_scale: 1.0,
        }
    }

    /// Returns a copy with `provider` attached for [`AppStorage`] values.
    ///
    /// [`AppStorage`]: crate::AppStorage
    pub fn with_storage_provider(mut self, provider: Arc<dyn StorageProvider>) -> Environment {
        self.storage_provider = Some(provider);
        self
    }

    pub fn storage_provider(&self) -> Option<Arc<dyn StorageProvider>> {
        self.storage_provider.clone()
    }

    /// Returns a copy carrying the scale factor of the enclosing window.
    pub fn with_window_scale(mut self, scale: f64) -> Environment {
        self.window_scale = scale;
        self
    }

    pub fn window_scale(&self) -> f64 {
        self.window_scale
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Environment")
            .field("window_scale", &self.window_scale)
            .field("has_storage_provider", &self.storage_provider.is_some())
            .finish()
    }
}
