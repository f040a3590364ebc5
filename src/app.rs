//! The app root and its host.

use crate::backend::Backend;
use crate::environment::Environment;
use crate::scene::{Window, WindowNode};
use crate::state::{collect_publishers, Cancellable, UpdaterCache};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The root of an application: app-level state plus a window declaration.
///
/// `body` is re-evaluated whenever one of the app's observed fields changes,
/// and the resulting scene is diffed into the live window.
pub trait App: crate::DynamicProperties + fmt::Debug + Send + Sync + 'static {
    fn body(&self) -> Window;
}

struct HostState<A: App, B: Backend> {
    app: A,
    environment: Environment,
    window: WindowNode<B>,
}

/// Runs an [`App`] against a backend.
///
/// Construction initializes the app's dynamic properties, builds the window
/// from the app body, runs the initial layout pass, and subscribes to the
/// app's field publishers; scene changes flow to the window from then on.
pub struct AppHost<A: App, B: Backend> {
    state: Arc<Mutex<HostState<A, B>>>,
    _observations: Vec<Cancellable>,
}

impl<A: App, B: Backend> AppHost<A, B> {
    pub fn new(app: A, backend: B, environment: Environment) -> AppHost<A, B> {
        UpdaterCache::global().update(&app, None, &environment);
        let scene = app.body();
        let window = WindowNode::new(scene, backend, environment.clone());
        window.scene_update(None, &environment);

        let publishers = collect_publishers(&app);
        let state = Arc::new(Mutex::new(HostState {
            app,
            environment,
            window,
        }));

        let observations = publishers
            .iter()
            .map(|publisher| {
                let weak = Arc::downgrade(&state);
                publisher.observe(move || {
                    if let Some(state) = weak.upgrade() {
                        HostState::redeclare(&mut state.lock());
                    }
                })
            })
            .collect();

        AppHost {
            state,
            _observations: observations,
        }
    }

    /// Runs `f` with the app value.
    pub fn with_app<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.state.lock().app)
    }

    /// Runs `f` with the live window node.
    pub fn with_window_node<R>(&self, f: impl FnOnce(&WindowNode<B>) -> R) -> R {
        f(&self.state.lock().window)
    }

    /// Replaces the ambient environment and redelivers the scene.
    pub fn set_environment(&self, environment: Environment) {
        let mut st = self.state.lock();
        st.environment = environment;
        HostState::redeclare(&mut st);
    }
}

impl<A: App, B: Backend> HostState<A, B> {
    /// Re-evaluates the app body and diffs the declared scene into the live
    /// window.
    fn redeclare(&mut self) {
        debug!("app state changed, redeclaring the scene");
        UpdaterCache::global().update(&self.app, None, &self.environment);
        let scene = self.app.body();
        self.window.scene_update(Some(scene), &self.environment);
    }
}

impl<A: App, B: Backend> fmt::Debug for AppHost<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("AppHost").field("app", &st.app).finish()
    }
}
