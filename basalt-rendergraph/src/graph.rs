//! Graph container.

use crate::links::NodeLinks;
use crate::nodes::Node;
use crate::resource::ResourceStateTracker;

/// Index of a node inside the graph it was appended to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeHandle(pub(crate) usize);

/// Debug group stacks, deduplicated across nodes.
///
/// Each node stores at most one index into `groups`; consecutive nodes
/// recorded under the same stack share the entry, which is what lets the
/// command builder emit only the label transitions between stacks.
#[derive(Default)]
pub(crate) struct DebugGroups {
    stack: Vec<String>,
    groups: Vec<Vec<String>>,
    node_group: Vec<Option<usize>>,
}

impl DebugGroups {
    fn capture(&mut self) -> Option<usize> {
        if self.stack.is_empty() {
            return None;
        }
        if let Some(index) = self.groups.iter().position(|group| *group == self.stack) {
            return Some(index);
        }
        self.groups.push(self.stack.clone());
        Some(self.groups.len() - 1)
    }

    pub(crate) fn node_stack(&self, node: usize) -> &[String] {
        self.node_group
            .get(node)
            .copied()
            .flatten()
            .map(|index| self.groups[index].as_slice())
            .unwrap_or(&[])
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.groups.clear();
        self.node_group.clear();
    }
}

/// An ordered list of nodes plus the resource versions linking them.
///
/// The graph is a recording structure, not a retained one: it is filled,
/// built into a command stream and [`reset`](RenderGraph::reset) every
/// submission. The resource tracker survives resets.
#[derive(Default)]
pub struct RenderGraph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) links: Vec<NodeLinks>,
    pub(crate) tracker: ResourceStateTracker,
    pub(crate) debug: DebugGroups,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node. Its links are resolved against the tracker immediately
    /// so later nodes see the new resource versions.
    pub fn add_node(&mut self, node: impl Into<Node>) -> NodeHandle {
        let node = node.into();
        let mut links = NodeLinks::default();
        node.build_links(&mut self.tracker, &mut links);

        let handle = NodeHandle(self.nodes.len());
        let group = self.debug.capture();
        self.debug.node_group.push(group);
        self.nodes.push(node);
        self.links.push(links);
        handle
    }

    pub fn push_debug_group(&mut self, name: &str) {
        self.debug.stack.push(name.to_owned());
    }

    pub fn pop_debug_group(&mut self) {
        if self.debug.stack.pop().is_none() {
            log::warn!("Debug group stack underflow");
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn links(&self, handle: NodeHandle) -> &NodeLinks {
        &self.links[handle.0]
    }

    /// Resource registry shared by all submissions of this graph.
    pub fn tracker_mut(&mut self) -> &mut ResourceStateTracker {
        &mut self.tracker
    }

    /// Drop all nodes, links and debug groups. Node payloads (clear values,
    /// upload data, region lists) are freed here; tracked resource state is
    /// kept so the next submission continues from the correct versions.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.debug.reset();
    }
}
