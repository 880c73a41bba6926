//! Node selection and ordering.
//!
//! The scheduler decides which nodes a submission replays and in what order.
//! The current policy selects every node in append order: links carry enough
//! version information for dependency-based reordering, but any future
//! reordering must keep each rendering scope contiguous apart from the
//! suspension points the command builder already handles.

use basalt_rhi::vk;

use crate::graph::{NodeHandle, RenderGraph};

#[derive(Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Self {
        Self
    }

    /// Nodes to submit so that `_image` reaches its final contents.
    pub fn select_nodes_for_image(&self, graph: &RenderGraph, _image: vk::Image) -> Vec<NodeHandle> {
        self.select_all(graph)
    }

    /// Nodes to submit so that `_buffer` reaches its final contents.
    pub fn select_nodes_for_buffer(
        &self,
        graph: &RenderGraph,
        _buffer: vk::Buffer,
    ) -> Vec<NodeHandle> {
        self.select_all(graph)
    }

    fn select_all(&self, graph: &RenderGraph) -> Vec<NodeHandle> {
        (0..graph.node_count()).map(NodeHandle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::FillBuffer;
    use basalt_rhi::vk::Handle;

    #[test]
    fn selection_preserves_append_order() {
        let mut graph = RenderGraph::new();
        for i in 0..4 {
            graph.add_node(FillBuffer {
                buffer: vk::Buffer::from_raw(1),
                offset: 0,
                size: vk::WHOLE_SIZE,
                data: i,
            });
        }

        let scheduler = Scheduler::new();
        let selected = scheduler.select_nodes_for_buffer(&graph, vk::Buffer::from_raw(1));
        assert_eq!(selected, (0..4).map(NodeHandle).collect::<Vec<_>>());
    }
}
