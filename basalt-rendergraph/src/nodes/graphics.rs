//! Rendering scope and draw nodes.

use basalt_core::collections::SmallVec;
use basalt_rhi::{vk, CommandStream, RenderingBegin};

use crate::command_builder::{rect_eq, viewport_eq, BoundState};
use crate::links::{Link, NodeLinks, ResourceAccessInfo};
use crate::nodes::PipelineBinding;
use crate::resource::ResourceStateTracker;

/// Opens a dynamic rendering scope over the given attachments.
///
/// The node only declares attachment accesses and stashes the rendering
/// info; the command builder decides when the native scope actually begins,
/// suspends and resumes.
pub struct BeginRendering {
    pub info: RenderingBegin,
    /// Aspect of the depth attachment, when one is set.
    pub depth_aspect: vk::ImageAspectFlags,
}

impl BeginRendering {
    pub fn new(info: RenderingBegin) -> Self {
        Self {
            info,
            depth_aspect: vk::ImageAspectFlags::DEPTH,
        }
    }

    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        for attachment in &self.info.color_attachments {
            let resource = tracker.get_image_and_increase_stamp(attachment.image);
            links.outputs.push(Link::image_layers(
                resource,
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                attachment.image_layout,
                vk::ImageAspectFlags::COLOR,
                0,
                self.info.layer_count,
            ));
        }
        if let Some(depth) = &self.info.depth_attachment {
            let resource = tracker.get_image_and_increase_stamp(depth.image);
            links.outputs.push(Link::image_layers(
                resource,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                depth.image_layout,
                self.depth_aspect,
                0,
                self.info.layer_count,
            ));
        }
    }
}

/// Closes the open dynamic rendering scope.
pub struct EndRendering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferBinding {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub index_type: vk::IndexType,
}

/// Full pipeline state a draw needs, bound with redundancy elimination.
#[derive(Clone)]
pub struct GraphicsState {
    pub pipeline: PipelineBinding,
    pub vertex_buffers: SmallVec<[VertexBufferBinding; 4]>,
    pub index_buffer: Option<IndexBufferBinding>,
    pub viewport: Option<vk::Viewport>,
    pub scissor: Option<vk::Rect2D>,
    pub line_width: Option<f32>,
    pub resources: ResourceAccessInfo,
}

impl GraphicsState {
    pub fn new(pipeline: PipelineBinding) -> Self {
        Self {
            pipeline,
            vertex_buffers: SmallVec::new(),
            index_buffer: None,
            viewport: None,
            scissor: None,
            line_width: None,
            resources: ResourceAccessInfo::default(),
        }
    }

    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        self.resources.build_links(tracker, links);
        if let Some(index_buffer) = &self.index_buffer {
            let resource = tracker.get_buffer(index_buffer.buffer);
            links.inputs.push(Link::buffer(resource, vk::AccessFlags2::INDEX_READ));
        }
        for vertex_buffer in &self.vertex_buffers {
            let resource = tracker.get_buffer(vertex_buffer.buffer);
            links
                .inputs
                .push(Link::buffer(resource, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ));
        }
    }

    pub(crate) fn bind(&self, stream: &mut dyn CommandStream, bound: &mut BoundState) {
        self.pipeline.bind(stream, bound);

        if let Some(index_buffer) = self.index_buffer {
            if bound.index_buffer != Some(index_buffer) {
                stream.bind_index_buffer(
                    index_buffer.buffer,
                    index_buffer.offset,
                    index_buffer.index_type,
                );
                bound.index_buffer = Some(index_buffer);
            }
        }

        if !self.vertex_buffers.is_empty() && bound.vertex_buffers != self.vertex_buffers {
            let buffers: SmallVec<[vk::Buffer; 4]> =
                self.vertex_buffers.iter().map(|b| b.buffer).collect();
            let offsets: SmallVec<[vk::DeviceSize; 4]> =
                self.vertex_buffers.iter().map(|b| b.offset).collect();
            stream.bind_vertex_buffers(0, &buffers, &offsets);
            bound.vertex_buffers = self.vertex_buffers.clone();
        }

        if let Some(viewport) = &self.viewport {
            if !bound.viewport.as_ref().is_some_and(|v| viewport_eq(v, viewport)) {
                stream.set_viewport(viewport);
                bound.viewport = Some(*viewport);
            }
        }
        if let Some(scissor) = &self.scissor {
            if !bound.scissor.as_ref().is_some_and(|s| rect_eq(s, scissor)) {
                stream.set_scissor(scissor);
                bound.scissor = Some(*scissor);
            }
        }
        if let Some(width) = self.line_width {
            if bound.line_width != Some(width) {
                stream.set_line_width(width);
                bound.line_width = Some(width);
            }
        }
    }
}

pub struct Draw {
    pub state: GraphicsState,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl Draw {
    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream, bound: &mut BoundState) {
        self.state.bind(stream, bound);
        stream.draw(
            self.vertex_count,
            self.instance_count,
            self.first_vertex,
            self.first_instance,
        );
    }
}

pub struct DrawIndexed {
    pub state: GraphicsState,
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

impl DrawIndexed {
    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream, bound: &mut BoundState) {
        self.state.bind(stream, bound);
        stream.draw_indexed(
            self.index_count,
            self.instance_count,
            self.first_index,
            self.vertex_offset,
            self.first_instance,
        );
    }
}

pub struct DrawIndirect {
    pub state: GraphicsState,
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub draw_count: u32,
    pub stride: u32,
}

impl DrawIndirect {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        self.state.build_links(tracker, links);
        let resource = tracker.get_buffer(self.buffer);
        links
            .inputs
            .push(Link::buffer(resource, vk::AccessFlags2::INDIRECT_COMMAND_READ));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream, bound: &mut BoundState) {
        self.state.bind(stream, bound);
        stream.draw_indirect(self.buffer, self.offset, self.draw_count, self.stride);
    }
}

pub struct DrawIndexedIndirect {
    pub state: GraphicsState,
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub draw_count: u32,
    pub stride: u32,
}

impl DrawIndexedIndirect {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        self.state.build_links(tracker, links);
        let resource = tracker.get_buffer(self.buffer);
        links
            .inputs
            .push(Link::buffer(resource, vk::AccessFlags2::INDIRECT_COMMAND_READ));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream, bound: &mut BoundState) {
        self.state.bind(stream, bound);
        stream.draw_indexed_indirect(self.buffer, self.offset, self.draw_count, self.stride);
    }
}

/// Clears regions of the attachments bound by the current rendering scope.
///
/// Attachment state is synchronized by the surrounding scope, so the node
/// needs no links of its own.
pub struct ClearAttachments {
    pub attachments: SmallVec<[vk::ClearAttachment; 4]>,
    pub rects: SmallVec<[vk::ClearRect; 2]>,
}

impl ClearAttachments {
    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.clear_attachments(&self.attachments, &self.rects);
    }
}
