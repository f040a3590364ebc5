//! The live graph behind a window's content.

use crate::backend::Backend;
use crate::environment::Environment;
use crate::geometry::{self, Size};
use crate::state::{collect_publishers, Cancellable, Publisher, UpdaterCache};
use crate::view::{LayoutResult, Sizing, View, ViewBody};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// What a node contributes beyond composition.
enum NodeContent<B: Backend> {
    Empty,
    /// Pure composition; the node's single child is its body.
    Composite,
    /// The node owns a native widget; its children mount inside it.
    Native {
        sizing: Sizing,
        widget: B::Widget,
        /// Widgets currently attached to `widget`, in order.
        committed: Vec<B::Widget>,
    },
}

struct GraphNode<B: Backend> {
    id: Uuid,
    view: Arc<dyn View>,
    content: NodeContent<B>,
    children: Vec<GraphNode<B>>,
    /// Field publisher links into the graph publisher.
    links: Vec<Cancellable>,
}

impl<B: Backend> Drop for GraphNode<B> {
    /// The graph publisher retains its own clone of every link, so links
    /// must be severed explicitly when the node leaves the graph.
    fn drop(&mut self) {
        for link in self.links.drain(..) {
            link.cancel();
        }
    }
}

/// A tree of views bound to live widgets.
///
/// The graph owns three separable passes: [`update`](ViewGraph::update)
/// re-evaluates bodies and diffs them by type,
/// [`compute_layout`](ViewGraph::compute_layout) sizes the tree against a
/// proposal without touching bodies, and [`commit`](ViewGraph::commit)
/// reconciles the
/// widget hierarchy with the tree. Any observed field of any view firing is
/// surfaced on [`did_change`](ViewGraph::did_change).
pub struct ViewGraph<B: Backend> {
    backend: B,
    root: GraphNode<B>,
    did_change: Publisher,
}

impl<B: Backend> ViewGraph<B> {
    /// Builds the graph and evaluates every body once.
    pub fn new(root: Arc<dyn View>, backend: B, environment: &Environment) -> ViewGraph<B> {
        let did_change = Publisher::new().tagged("view graph");
        let root = build_node(root, environment, &backend, &did_change);
        ViewGraph {
            backend,
            root,
            did_change,
        }
    }

    /// Fires when any observed field of any view in the graph changes.
    pub fn did_change(&self) -> &Publisher {
        &self.did_change
    }

    /// Re-evaluates bodies and diffs the result into the graph.
    ///
    /// With `new_root` present the root view itself is diffed first (same
    /// type updates in place, adopting state; a different type rebuilds the
    /// graph). With `None` only bodies are re-evaluated.
    pub fn update(&mut self, new_root: Option<Arc<dyn View>>, environment: &Environment) {
        update_node(
            &mut self.root,
            new_root,
            environment,
            &self.backend,
            &self.did_change,
        );
    }

    /// Sizes the graph against `proposed` without evaluating any bodies.
    pub fn compute_layout(&mut self, proposed: Size) -> LayoutResult {
        layout_node(&mut self.root, proposed)
    }

    /// Reconciles live widgets with the graph, mounting the outermost native
    /// widgets into `container`.
    pub fn commit(&mut self, container: &B::Widget, committed: &mut Vec<B::Widget>) {
        commit_node(&mut self.root, &self.backend);
        let mut desired = Vec::new();
        collect_native_widgets(&self.root, &mut desired);
        sync_container(&self.backend, container, committed, desired);
    }
}

impl<B: Backend> std::fmt::Debug for ViewGraph<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        fn count<B: Backend>(node: &GraphNode<B>) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        f.debug_struct("ViewGraph")
            .field("nodes", &count(&self.root))
            .finish()
    }
}

/// Builds a node for a freshly introduced view: initializes its dynamic
/// properties, links its field publishers, and evaluates its body.
fn build_node<B: Backend>(
    view: Arc<dyn View>,
    environment: &Environment,
    backend: &B,
    graph_publisher: &Publisher,
) -> GraphNode<B> {
    UpdaterCache::global().update(view.as_ref(), None, environment);
    let links = collect_publishers(view.as_ref())
        .iter()
        .map(|publisher| graph_publisher.link_to_upstream(publisher))
        .collect();

    let mut node = GraphNode {
        id: Uuid::new_v4(),
        view,
        content: NodeContent::Empty,
        children: Vec::new(),
        links,
    };
    trace!(node = %node.id, view = node.view.type_name(), "built view node");
    evaluate_body(&mut node, environment, backend, graph_publisher);
    node
}

/// Diffs `new_view` (if any) into the node, then re-evaluates its body.
fn update_node<B: Backend>(
    node: &mut GraphNode<B>,
    new_view: Option<Arc<dyn View>>,
    environment: &Environment,
    backend: &B,
    graph_publisher: &Publisher,
) {
    if let Some(new_view) = new_view {
        if new_view.as_any().type_id() == node.view.as_any().type_id() {
            // Same kind of view; its dynamic properties adopt the previous
            // instance's storage, so existing publisher links stay valid.
            UpdaterCache::global().update(
                new_view.as_ref(),
                Some(node.view.as_ref()),
                environment,
            );
            node.view = new_view;
        } else {
            trace!(
                node = %node.id,
                old = node.view.type_name(),
                new = new_view.type_name(),
                "view type changed, rebuilding subtree"
            );
            *node = build_node(new_view, environment, backend, graph_publisher);
            return;
        }
    }
    evaluate_body(node, environment, backend, graph_publisher);
}

/// Evaluates the node's body and diffs children positionally by type.
fn evaluate_body<B: Backend>(
    node: &mut GraphNode<B>,
    environment: &Environment,
    backend: &B,
    graph_publisher: &Publisher,
) {
    match node.view.body(environment) {
        ViewBody::Empty => {
            node.content = NodeContent::Empty;
            node.children.clear();
        }
        ViewBody::View(child) => {
            node.content = NodeContent::Composite;
            diff_children(node, vec![child], environment, backend, graph_publisher);
        }
        ViewBody::Native { sizing, subviews } => {
            node.content = match std::mem::replace(&mut node.content, NodeContent::Empty) {
                // The widget is retained across updates; only the sizing
                // policy may change.
                NodeContent::Native {
                    widget, committed, ..
                } => NodeContent::Native {
                    sizing,
                    widget,
                    committed,
                },
                _ => NodeContent::Native {
                    sizing,
                    widget: backend.create_container(),
                    committed: Vec::new(),
                },
            };
            diff_children(node, subviews, environment, backend, graph_publisher);
        }
    }
}

fn diff_children<B: Backend>(
    node: &mut GraphNode<B>,
    subviews: Vec<Arc<dyn View>>,
    environment: &Environment,
    backend: &B,
    graph_publisher: &Publisher,
) {
    let mut index = 0;
    for subview in subviews {
        if index < node.children.len() {
            update_node(
                &mut node.children[index],
                Some(subview),
                environment,
                backend,
                graph_publisher,
            );
        } else {
            node.children
                .push(build_node(subview, environment, backend, graph_publisher));
        }
        index += 1;
    }
    node.children.truncate(index);
}

/// Pure sizing pass; no bodies are evaluated here.
fn layout_node<B: Backend>(node: &mut GraphNode<B>, proposed: Size) -> LayoutResult {
    match &node.content {
        NodeContent::Empty => LayoutResult::empty(),
        NodeContent::Composite => match node.children.first_mut() {
            Some(child) => layout_node(child, proposed),
            None => LayoutResult::empty(),
        },
        NodeContent::Native { sizing, .. } => {
            let sizing = *sizing;
            // Children are proposed the size the parent would settle on with
            // no content; their minima then feed back into the final result.
            let inner_proposal = match sizing {
                Sizing::Fixed(size) => size,
                Sizing::Expanding { .. } => proposed,
            };
            let mut content_minimum = geometry::zero();
            for child in &mut node.children {
                let child_result = layout_node(child, inner_proposal);
                content_minimum = geometry::max_size(content_minimum, child_result.minimum);
            }
            sizing.resolve(proposed, content_minimum)
        }
    }
}

/// Reconciles each native widget's attached children with the graph.
fn commit_node<B: Backend>(node: &mut GraphNode<B>, backend: &B) {
    for child in &mut node.children {
        commit_node(child, backend);
    }

    if let NodeContent::Native {
        widget, committed, ..
    } = &mut node.content
    {
        let mut desired = Vec::new();
        for child in &node.children {
            collect_native_widgets(child, &mut desired);
        }
        sync_container(backend, widget, committed, desired);
    }
}

/// Collects the outermost native widgets of a subtree, in order.
fn collect_native_widgets<B: Backend>(node: &GraphNode<B>, out: &mut Vec<B::Widget>) {
    if let NodeContent::Native { widget, .. } = &node.content {
        out.push(widget.clone());
    } else {
        for child in &node.children {
            collect_native_widgets(child, out);
        }
    }
}

/// Makes `container` hold exactly `desired`, replacing the attached set only
/// when it differs.
fn sync_container<B: Backend>(
    backend: &B,
    container: &B::Widget,
    committed: &mut Vec<B::Widget>,
    desired: Vec<B::Widget>,
) {
    if *committed != desired {
        for index in (0..committed.len()).rev() {
            backend.remove_child(container, index);
        }
        for widget in &desired {
            backend.add_child(container, widget);
        }
        *committed = desired;
    }
    for index in 0..committed.len() {
        backend.set_child_position(container, index, geometry::zero());
    }
}
