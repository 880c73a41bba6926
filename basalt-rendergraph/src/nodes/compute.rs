//! Compute dispatch nodes.

use basalt_rhi::{vk, CommandStream};

use crate::command_builder::BoundState;
use crate::links::{Link, NodeLinks};
use crate::nodes::PipelineBinding;
use crate::resource::ResourceStateTracker;

pub struct Dispatch {
    pub pipeline: PipelineBinding,
    pub resources: crate::links::ResourceAccessInfo,
    pub group_count: [u32; 3],
}

impl Dispatch {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        self.resources.build_links(tracker, links);
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream, bound: &mut BoundState) {
        self.pipeline.bind(stream, bound);
        let [x, y, z] = self.group_count;
        stream.dispatch(x, y, z);
    }
}

pub struct DispatchIndirect {
    pub pipeline: PipelineBinding,
    pub resources: crate::links::ResourceAccessInfo,
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
}

impl DispatchIndirect {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        self.resources.build_links(tracker, links);
        let resource = tracker.get_buffer(self.buffer);
        links
            .inputs
            .push(Link::buffer(resource, vk::AccessFlags2::INDIRECT_COMMAND_READ));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream, bound: &mut BoundState) {
        self.pipeline.bind(stream, bound);
        stream.dispatch_indirect(self.buffer, self.offset);
    }
}
