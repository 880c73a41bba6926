//! Typed render graph nodes.
//!
//! Every node kind is a plain owned struct; [`Node`] is the enum the graph
//! stores. A node contributes three things: the links it builds at append
//! time, the pipeline stages its barriers should target and the commands it
//! records at build time.

mod compute;
mod graphics;
mod maintenance;
mod transfer;

pub use compute::{Dispatch, DispatchIndirect};
pub use graphics::{
    BeginRendering, ClearAttachments, Draw, DrawIndexed, DrawIndexedIndirect, DrawIndirect,
    EndRendering, GraphicsState, IndexBufferBinding, VertexBufferBinding,
};
pub use maintenance::{ResetQueryPool, Synchronization, UpdateMipmaps};
pub use transfer::{
    BlitImage, ClearColorImage, ClearDepthStencilImage, CopyBuffer, CopyBufferToImage, CopyImage,
    CopyImageToBuffer, FillBuffer, UpdateBuffer,
};

use basalt_rhi::{vk, CommandStream};
use derive_more::From;
use enumflags2::{bitflags, BitFlags};

use crate::command_builder::BoundState;
use crate::links::NodeLinks;
use crate::resource::ResourceStateTracker;

/// Resource classes a node declares links against. Nodes with an empty set
/// are skipped entirely by the barrier pass.
#[bitflags]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackedResource {
    Buffer = 1,
    Image = 2,
}

/// Pipeline, descriptor set and push constant state shared by dispatch and
/// draw nodes.
#[derive(Clone, Debug)]
pub struct PipelineBinding {
    pub bind_point: vk::PipelineBindPoint,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: Option<vk::DescriptorSet>,
    pub push_constants: Option<PushConstants>,
}

#[derive(Clone, Debug)]
pub struct PushConstants {
    pub stages: vk::ShaderStageFlags,
    pub offset: u32,
    pub data: Vec<u8>,
}

impl PipelineBinding {
    pub fn new(
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
    ) -> Self {
        Self {
            bind_point,
            pipeline,
            layout,
            descriptor_set: None,
            push_constants: None,
        }
    }

    /// Record the binds this state needs, skipping everything `bound`
    /// already holds. Push constants are always recorded.
    pub(crate) fn bind(&self, stream: &mut dyn CommandStream, bound: &mut BoundState) {
        if bound.pipeline != Some(self.pipeline) {
            stream.bind_pipeline(self.bind_point, self.pipeline);
            bound.pipeline = Some(self.pipeline);
        }
        if let Some(set) = self.descriptor_set {
            if bound.descriptor_set != Some((self.layout, set)) {
                stream.bind_descriptor_sets(self.bind_point, self.layout, 0, &[set]);
                bound.descriptor_set = Some((self.layout, set));
            }
        }
        if let Some(push) = &self.push_constants {
            stream.push_constants(self.layout, push.stages, push.offset, &push.data);
        }
    }
}

#[derive(From)]
pub enum Node {
    BeginRendering(BeginRendering),
    EndRendering(EndRendering),
    Draw(Draw),
    DrawIndexed(DrawIndexed),
    DrawIndirect(DrawIndirect),
    DrawIndexedIndirect(DrawIndexedIndirect),
    ClearAttachments(ClearAttachments),
    Dispatch(Dispatch),
    DispatchIndirect(DispatchIndirect),
    ClearColorImage(ClearColorImage),
    ClearDepthStencilImage(ClearDepthStencilImage),
    FillBuffer(FillBuffer),
    UpdateBuffer(UpdateBuffer),
    CopyBuffer(CopyBuffer),
    CopyImage(CopyImage),
    CopyBufferToImage(CopyBufferToImage),
    CopyImageToBuffer(CopyImageToBuffer),
    BlitImage(BlitImage),
    Synchronization(Synchronization),
    UpdateMipmaps(UpdateMipmaps),
    ResetQueryPool(ResetQueryPool),
}

impl Node {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        match self {
            Node::BeginRendering(node) => node.build_links(tracker, links),
            Node::EndRendering(_) => {}
            Node::Draw(node) => node.state.build_links(tracker, links),
            Node::DrawIndexed(node) => node.state.build_links(tracker, links),
            Node::DrawIndirect(node) => node.build_links(tracker, links),
            Node::DrawIndexedIndirect(node) => node.build_links(tracker, links),
            Node::ClearAttachments(_) => {}
            Node::Dispatch(node) => node.build_links(tracker, links),
            Node::DispatchIndirect(node) => node.build_links(tracker, links),
            Node::ClearColorImage(node) => node.build_links(tracker, links),
            Node::ClearDepthStencilImage(node) => node.build_links(tracker, links),
            Node::FillBuffer(node) => node.build_links(tracker, links),
            Node::UpdateBuffer(node) => node.build_links(tracker, links),
            Node::CopyBuffer(node) => node.build_links(tracker, links),
            Node::CopyImage(node) => node.build_links(tracker, links),
            Node::CopyBufferToImage(node) => node.build_links(tracker, links),
            Node::CopyImageToBuffer(node) => node.build_links(tracker, links),
            Node::BlitImage(node) => node.build_links(tracker, links),
            Node::Synchronization(node) => node.build_links(tracker, links),
            Node::UpdateMipmaps(node) => node.build_links(tracker, links),
            Node::ResetQueryPool(_) => {}
        }
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream, bound: &mut BoundState) {
        match self {
            // rendering scope entry and exit are owned by the command builder
            Node::BeginRendering(_) | Node::EndRendering(_) => {}
            Node::Draw(node) => node.build_commands(stream, bound),
            Node::DrawIndexed(node) => node.build_commands(stream, bound),
            Node::DrawIndirect(node) => node.build_commands(stream, bound),
            Node::DrawIndexedIndirect(node) => node.build_commands(stream, bound),
            Node::ClearAttachments(node) => node.build_commands(stream),
            Node::Dispatch(node) => node.build_commands(stream, bound),
            Node::DispatchIndirect(node) => node.build_commands(stream, bound),
            Node::ClearColorImage(node) => node.build_commands(stream),
            Node::ClearDepthStencilImage(node) => node.build_commands(stream),
            Node::FillBuffer(node) => node.build_commands(stream),
            Node::UpdateBuffer(node) => node.build_commands(stream),
            Node::CopyBuffer(node) => node.build_commands(stream),
            Node::CopyImage(node) => node.build_commands(stream),
            Node::CopyBufferToImage(node) => node.build_commands(stream),
            Node::CopyImageToBuffer(node) => node.build_commands(stream),
            Node::BlitImage(node) => node.build_commands(stream),
            Node::Synchronization(_) => {}
            Node::UpdateMipmaps(node) => node.build_commands(stream),
            Node::ResetQueryPool(node) => node.build_commands(stream),
        }
    }

    /// Destination stage mask for barriers guarding this node.
    pub(crate) fn pipeline_stages(&self) -> vk::PipelineStageFlags2 {
        match self {
            Node::BeginRendering(_) | Node::EndRendering(_) => {
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
            }
            Node::Draw(_) | Node::DrawIndexed(_) => vk::PipelineStageFlags2::ALL_GRAPHICS,
            Node::DrawIndirect(_) | Node::DrawIndexedIndirect(_) => {
                vk::PipelineStageFlags2::ALL_GRAPHICS | vk::PipelineStageFlags2::DRAW_INDIRECT
            }
            Node::ClearAttachments(_) => vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            Node::Dispatch(_) => vk::PipelineStageFlags2::COMPUTE_SHADER,
            Node::DispatchIndirect(_) => {
                vk::PipelineStageFlags2::COMPUTE_SHADER | vk::PipelineStageFlags2::DRAW_INDIRECT
            }
            Node::ClearColorImage(_)
            | Node::ClearDepthStencilImage(_)
            | Node::FillBuffer(_)
            | Node::UpdateBuffer(_)
            | Node::CopyBuffer(_)
            | Node::CopyImage(_)
            | Node::CopyBufferToImage(_)
            | Node::CopyImageToBuffer(_)
            | Node::BlitImage(_)
            | Node::UpdateMipmaps(_) => vk::PipelineStageFlags2::TRANSFER,
            Node::Synchronization(_) => vk::PipelineStageFlags2::ALL_COMMANDS,
            Node::ResetQueryPool(_) => vk::PipelineStageFlags2::NONE,
        }
    }

    /// Which resource classes this node links. Lets the barrier pass skip
    /// nodes that cannot have hazards.
    pub(crate) fn tracked_resources(&self) -> BitFlags<TrackedResource> {
        match self {
            Node::BeginRendering(_) => TrackedResource::Image.into(),
            Node::EndRendering(_) | Node::ClearAttachments(_) | Node::ResetQueryPool(_) => {
                BitFlags::empty()
            }
            Node::Draw(_)
            | Node::DrawIndexed(_)
            | Node::DrawIndirect(_)
            | Node::DrawIndexedIndirect(_)
            | Node::Dispatch(_)
            | Node::DispatchIndirect(_) => TrackedResource::Buffer | TrackedResource::Image,
            Node::ClearColorImage(_)
            | Node::ClearDepthStencilImage(_)
            | Node::Synchronization(_)
            | Node::UpdateMipmaps(_) => TrackedResource::Image.into(),
            Node::FillBuffer(_) | Node::UpdateBuffer(_) | Node::CopyBuffer(_) => {
                TrackedResource::Buffer.into()
            }
            Node::CopyImage(_) | Node::BlitImage(_) => TrackedResource::Image.into(),
            Node::CopyBufferToImage(_) | Node::CopyImageToBuffer(_) => {
                TrackedResource::Buffer | TrackedResource::Image
            }
        }
    }

    /// Opens a native dynamic rendering scope.
    pub(crate) fn is_rendering_scope_begin(&self) -> bool {
        matches!(self, Node::BeginRendering(_))
    }

    /// Closes the open dynamic rendering scope.
    pub(crate) fn is_rendering_scope_end(&self) -> bool {
        matches!(self, Node::EndRendering(_))
    }

    /// Must be recorded inside the native rendering scope.
    pub(crate) fn renders_within_scope(&self) -> bool {
        matches!(
            self,
            Node::Draw(_)
                | Node::DrawIndexed(_)
                | Node::DrawIndirect(_)
                | Node::DrawIndexedIndirect(_)
                | Node::ClearAttachments(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_classification() {
        let begin = Node::from(BeginRendering::new(basalt_rhi::RenderingBegin::new(
            vk::Rect2D::default(),
            1,
        )));
        let end = Node::from(EndRendering);
        let copy = Node::from(FillBuffer {
            buffer: vk::Buffer::null(),
            offset: 0,
            size: vk::WHOLE_SIZE,
            data: 0,
        });

        assert!(begin.is_rendering_scope_begin());
        assert!(!begin.renders_within_scope());
        assert!(end.is_rendering_scope_end());
        assert!(!copy.is_rendering_scope_begin());
        assert!(!copy.renders_within_scope());
    }

    #[test]
    fn untracked_nodes_report_no_resources() {
        let node = Node::from(ResetQueryPool {
            pool: vk::QueryPool::null(),
            first_query: 0,
            query_count: 8,
        });
        assert!(node.tracked_resources().is_empty());
    }
}
