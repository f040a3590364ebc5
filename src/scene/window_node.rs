//! The live counterpart of a window scene.

use crate::backend::Backend;
use crate::environment::Environment;
use crate::geometry::{self, Size};
use crate::graph::ViewGraph;
use crate::scene::Window;
use crate::state::Cancellable;
use crate::view::LayoutResult;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, trace};

/// Which bodies to evaluate during an update pass.
#[derive(Clone, Copy)]
enum Refresh {
    /// Layout and commit only; no body runs.
    Skip,
    /// Re-evaluate bodies of the current views.
    Evaluate,
    /// Diff a redelivered scene root into the graph, then evaluate.
    Replace,
}

struct NodeState<B: Backend> {
    scene: Window,
    graph: ViewGraph<B>,
    backend: B,
    /// Type-erased so the node type does not leak the backend's window type
    /// into every signature that touches it.
    window: Box<dyn Any + Send>,
    container: B::Widget,
    /// Widgets currently attached to the window container.
    committed: Vec<B::Widget>,
    first_commit_done: bool,
    environment: Environment,
    _graph_observation: Cancellable,
}

/// The live window behind a [`Window`] scene.
///
/// The node owns the backend window, the content container, and the view
/// graph, and runs the layout negotiation: a pass measures content against
/// a proposed size and either commits or restarts exactly once with the
/// corrected size marked final. Resizable windows are measured against a
/// zero proposal first to learn their minimum; non-resizable windows must
/// match their content exactly.
///
/// State changes anywhere in the graph, user resizes, and backend
/// environment changes each trigger a fresh pass, and each pass re-reads the
/// window's current size from the backend rather than trusting a cached one.
pub struct WindowNode<B: Backend> {
    state: Arc<Mutex<NodeState<B>>>,
}

impl<B: Backend> WindowNode<B> {
    pub fn new(scene: Window, backend: B, environment: Environment) -> WindowNode<B> {
        let window = backend.create_window(scene.default_size());
        backend.set_window_title(&window, scene.title());
        backend.set_window_resizable(&window, scene.is_resizable());
        let container = backend.create_container();
        backend.set_window_child(&window, &container);

        let graph_environment = environment
            .clone()
            .with_window_scale(backend.window_scale(&window));
        let graph = ViewGraph::new(scene.root(), backend.clone(), &graph_environment);

        let state = Arc::new(Mutex::new(NodeState {
            scene,
            graph,
            backend: backend.clone(),
            window: Box::new(window),
            container,
            committed: Vec::new(),
            first_commit_done: false,
            environment,
            _graph_observation: Cancellable::empty(),
        }));

        {
            let weak = Arc::downgrade(&state);
            let mut st = state.lock();
            st._graph_observation = st.graph.did_change().observe(move || {
                if let Some(state) = weak.upgrade() {
                    state.lock().refresh(Refresh::Evaluate);
                }
            });
        }

        {
            let st = state.lock();
            let weak = Arc::downgrade(&state);
            st.backend.set_resize_handler(
                st.backend_window(),
                Box::new(move |new_size| {
                    if let Some(state) = weak.upgrade() {
                        let mut st = state.lock();
                        trace!(size = ?new_size, "window resized by the user");
                        let size_is_final = !st
                            .backend
                            .is_window_programmatically_resizable(st.backend_window());
                        st.update(None, new_size, false, size_is_final, Refresh::Evaluate);
                    }
                }),
            );

            let weak = Arc::downgrade(&state);
            st.backend.set_environment_change_handler(
                st.backend_window(),
                Box::new(move || {
                    if let Some(state) = weak.upgrade() {
                        state.lock().refresh(Refresh::Evaluate);
                    }
                }),
            );
        }

        WindowNode { state }
    }

    /// Applies a scene delivery: the initial one (`None`) right after
    /// construction, or a redeclared scene from the app body.
    pub fn scene_update(&self, new_scene: Option<Window>, environment: &Environment) -> LayoutResult {
        let mut st = self.state.lock();
        st.environment = environment.clone();

        let programmatic = st
            .backend
            .is_window_programmatically_resizable(st.backend_window());
        let (proposed, needs_commit) = if !st.first_commit_done && programmatic {
            (st.scene.default_size(), true)
        } else {
            (st.backend.window_size(st.backend_window()), false)
        };
        let refresh = if new_scene.is_some() {
            Refresh::Replace
        } else {
            // The graph evaluated every body at construction.
            Refresh::Skip
        };
        st.update(new_scene, proposed, needs_commit, !programmatic, refresh)
    }

    /// Runs `f` with the backend window handle.
    pub fn with_window<R>(&self, f: impl FnOnce(&B::Window) -> R) -> R {
        let st = self.state.lock();
        f(st.backend_window())
    }

    /// Closes the backend window.
    pub fn close(&self) {
        let st = self.state.lock();
        st.backend.close_window(st.backend_window());
    }
}

impl<B: Backend> NodeState<B> {
    fn backend_window(&self) -> &B::Window {
        match self.window.downcast_ref::<B::Window>() {
            Some(window) => window,
            None => panic!(
                "window handle does not belong to backend {}",
                std::any::type_name::<B>()
            ),
        }
    }

    /// A state- or environment-triggered pass; re-reads the current window
    /// size from the backend.
    fn refresh(&mut self, refresh: Refresh) {
        let proposed = self.backend.window_size(self.backend_window());
        let size_is_final = !self
            .backend
            .is_window_programmatically_resizable(self.backend_window());
        self.update(None, proposed, false, size_is_final, refresh);
    }

    /// One negotiation pass.
    ///
    /// Restarts recurse at most once: the restarted pass carries
    /// `size_is_final`, so it can only commit.
    fn update(
        &mut self,
        new_scene: Option<Window>,
        proposed: Size,
        needs_commit: bool,
        size_is_final: bool,
        refresh: Refresh,
    ) -> LayoutResult {
        let first = !self.first_commit_done;
        let scale = self.backend.window_scale(self.backend_window());
        let environment = self.environment.clone().with_window_scale(scale);

        if let Some(new_scene) = new_scene {
            // The default size is a creation-time property; everything else
            // on the scene is applied on every delivery.
            self.backend
                .set_window_title(self.backend_window(), new_scene.title());
            self.backend
                .set_window_resizable(self.backend_window(), new_scene.is_resizable());
            self.scene = new_scene;
        }

        match refresh {
            Refresh::Skip => {}
            Refresh::Evaluate => self.graph.update(None, &environment),
            Refresh::Replace => self.graph.update(Some(self.scene.root()), &environment),
        }

        let mut proposed = proposed;
        let result;
        if self.scene.is_resizable() {
            // The content's minimum is whatever it settles on when offered
            // nothing.
            let minimum = self.graph.compute_layout(geometry::zero()).size;
            let clamped = geometry::clamp_to_minimum(proposed, minimum);
            if clamped != proposed && !size_is_final {
                debug!(?proposed, ?clamped, "proposal below minimum, restarting pass");
                return self.update(None, clamped, true, true, Refresh::Skip);
            }
            self.backend
                .set_window_minimum_size(self.backend_window(), minimum);
            proposed = clamped;
            result = self.graph.compute_layout(proposed);
        } else {
            result = self.graph.compute_layout(proposed);
            if result.size != proposed && !size_is_final {
                debug!(?proposed, content = ?result.size, "window must match content, restarting pass");
                return self.update(None, result.size, true, true, Refresh::Skip);
            }
        }

        {
            let NodeState {
                graph,
                container,
                committed,
                ..
            } = self;
            graph.commit(container, committed);
        }
        if !self.committed.is_empty() {
            self.backend.set_child_position(
                &self.container,
                0,
                geometry::centering_offset(proposed, result.size),
            );
        }

        if needs_commit {
            self.backend.set_window_size(self.backend_window(), proposed);
        }

        if first {
            self.first_commit_done = true;
            if self.scene.opens_on_launch() {
                self.backend.show_window(self.backend_window());
            }
        }
        result
    }
}

impl<B: Backend> std::fmt::Debug for WindowNode<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("WindowNode")
            .field("scene", &st.scene)
            .field("committed", &st.first_commit_done)
            .finish()
    }
}
