//! In-memory command stream for asserting on recorded call sequences.

use basalt_rhi::vk::Handle;
use basalt_rhi::{vk, BufferBarrier, CommandStream, ImageBarrier, RenderingBegin};

pub(crate) fn buffer(raw: u64) -> vk::Buffer {
    vk::Buffer::from_raw(raw)
}

pub(crate) fn image(raw: u64) -> vk::Image {
    vk::Image::from_raw(raw)
}

/// One recorded [`CommandStream`] call, reduced to the fields tests assert
/// on.
#[derive(Clone, Debug)]
pub(crate) enum Call {
    BeginRecording,
    EndRecording,
    BindPipeline(vk::Pipeline),
    BindDescriptorSets(vk::PipelineLayout, Vec<vk::DescriptorSet>),
    BindIndexBuffer(vk::Buffer),
    BindVertexBuffers(Vec<vk::Buffer>),
    PushConstants(Vec<u8>),
    Draw,
    DrawIndexed,
    DrawIndirect(vk::Buffer),
    DrawIndexedIndirect(vk::Buffer),
    Dispatch([u32; 3]),
    DispatchIndirect(vk::Buffer),
    UpdateBuffer(vk::Buffer, Vec<u8>),
    CopyBuffer(vk::Buffer, vk::Buffer),
    CopyImage(vk::Image, vk::Image),
    CopyBufferToImage(vk::Buffer, vk::Image),
    CopyImageToBuffer(vk::Image, vk::Buffer),
    BlitImage(vk::Image, vk::Image),
    FillBuffer(vk::Buffer),
    ClearColorImage(vk::Image),
    ClearDepthStencilImage(vk::Image),
    ClearAttachments(usize),
    PipelineBarrier {
        buffers: Vec<BufferBarrier>,
        images: Vec<ImageBarrier>,
    },
    BeginRendering {
        flags: vk::RenderingFlags,
        color_attachments: usize,
        layer_count: u32,
    },
    EndRendering,
    SetViewport,
    SetScissor,
    SetLineWidth(f32),
    BeginDebugLabel(String),
    EndDebugLabel,
    ResetQueryPool(vk::QueryPool),
    BeginQuery(vk::QueryPool, u32),
    EndQuery(vk::QueryPool, u32),
}

#[derive(Default)]
pub(crate) struct RecordingStream {
    pub calls: Vec<Call>,
}

impl RecordingStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| matches(call)).count()
    }

    pub fn position(&self, matches: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.iter().position(matches)
    }

    /// All image barriers of every recorded dependency, flattened in order.
    pub fn image_barriers(&self) -> Vec<ImageBarrier> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::PipelineBarrier { images, .. } => Some(images.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl CommandStream for RecordingStream {
    fn begin_recording(&mut self) -> anyhow::Result<()> {
        self.calls.push(Call::BeginRecording);
        Ok(())
    }

    fn end_recording(&mut self) -> anyhow::Result<()> {
        self.calls.push(Call::EndRecording);
        Ok(())
    }

    fn bind_pipeline(&mut self, _bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.calls.push(Call::BindPipeline(pipeline));
    }

    fn bind_descriptor_sets(
        &mut self,
        _bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        _first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.calls.push(Call::BindDescriptorSets(layout, sets.to_vec()));
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, _offset: vk::DeviceSize, _index_type: vk::IndexType) {
        self.calls.push(Call::BindIndexBuffer(buffer));
    }

    fn bind_vertex_buffers(&mut self, _first_binding: u32, buffers: &[vk::Buffer], _offsets: &[vk::DeviceSize]) {
        self.calls.push(Call::BindVertexBuffers(buffers.to_vec()));
    }

    fn push_constants(&mut self, _layout: vk::PipelineLayout, _stages: vk::ShaderStageFlags, _offset: u32, data: &[u8]) {
        self.calls.push(Call::PushConstants(data.to_vec()));
    }

    fn draw(&mut self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.calls.push(Call::Draw);
    }

    fn draw_indexed(
        &mut self,
        _index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.calls.push(Call::DrawIndexed);
    }

    fn draw_indirect(&mut self, buffer: vk::Buffer, _offset: vk::DeviceSize, _draw_count: u32, _stride: u32) {
        self.calls.push(Call::DrawIndirect(buffer));
    }

    fn draw_indexed_indirect(&mut self, buffer: vk::Buffer, _offset: vk::DeviceSize, _draw_count: u32, _stride: u32) {
        self.calls.push(Call::DrawIndexedIndirect(buffer));
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.calls.push(Call::Dispatch([group_count_x, group_count_y, group_count_z]));
    }

    fn dispatch_indirect(&mut self, buffer: vk::Buffer, _offset: vk::DeviceSize) {
        self.calls.push(Call::DispatchIndirect(buffer));
    }

    fn update_buffer(&mut self, dst: vk::Buffer, _offset: vk::DeviceSize, data: &[u8]) {
        self.calls.push(Call::UpdateBuffer(dst, data.to_vec()));
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, _regions: &[vk::BufferCopy]) {
        self.calls.push(Call::CopyBuffer(src, dst));
    }

    fn copy_image(
        &mut self,
        src: vk::Image,
        _src_layout: vk::ImageLayout,
        dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        _regions: &[vk::ImageCopy],
    ) {
        self.calls.push(Call::CopyImage(src, dst));
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        _regions: &[vk::BufferImageCopy],
    ) {
        self.calls.push(Call::CopyBufferToImage(src, dst));
    }

    fn copy_image_to_buffer(
        &mut self,
        src: vk::Image,
        _src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        _regions: &[vk::BufferImageCopy],
    ) {
        self.calls.push(Call::CopyImageToBuffer(src, dst));
    }

    fn blit_image(
        &mut self,
        src: vk::Image,
        _src_layout: vk::ImageLayout,
        dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        _regions: &[vk::ImageBlit],
        _filter: vk::Filter,
    ) {
        self.calls.push(Call::BlitImage(src, dst));
    }

    fn fill_buffer(&mut self, dst: vk::Buffer, _offset: vk::DeviceSize, _size: vk::DeviceSize, _data: u32) {
        self.calls.push(Call::FillBuffer(dst));
    }

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        _layout: vk::ImageLayout,
        _clear_value: &vk::ClearColorValue,
        _ranges: &[vk::ImageSubresourceRange],
    ) {
        self.calls.push(Call::ClearColorImage(image));
    }

    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        _layout: vk::ImageLayout,
        _clear_value: &vk::ClearDepthStencilValue,
        _ranges: &[vk::ImageSubresourceRange],
    ) {
        self.calls.push(Call::ClearDepthStencilImage(image));
    }

    fn clear_attachments(&mut self, attachments: &[vk::ClearAttachment], _rects: &[vk::ClearRect]) {
        self.calls.push(Call::ClearAttachments(attachments.len()));
    }

    fn pipeline_barrier(&mut self, buffer_barriers: &[BufferBarrier], image_barriers: &[ImageBarrier]) {
        self.calls.push(Call::PipelineBarrier {
            buffers: buffer_barriers.to_vec(),
            images: image_barriers.to_vec(),
        });
    }

    fn begin_rendering(&mut self, info: &RenderingBegin) {
        self.calls.push(Call::BeginRendering {
            flags: info.flags,
            color_attachments: info.color_attachments.len(),
            layer_count: info.layer_count,
        });
    }

    fn end_rendering(&mut self) {
        self.calls.push(Call::EndRendering);
    }

    fn set_viewport(&mut self, _viewport: &vk::Viewport) {
        self.calls.push(Call::SetViewport);
    }

    fn set_scissor(&mut self, _scissor: &vk::Rect2D) {
        self.calls.push(Call::SetScissor);
    }

    fn set_line_width(&mut self, width: f32) {
        self.calls.push(Call::SetLineWidth(width));
    }

    fn begin_debug_label(&mut self, name: &str) {
        self.calls.push(Call::BeginDebugLabel(name.to_owned()));
    }

    fn end_debug_label(&mut self) {
        self.calls.push(Call::EndDebugLabel);
    }

    fn reset_query_pool(&mut self, pool: vk::QueryPool, _first_query: u32, _query_count: u32) {
        self.calls.push(Call::ResetQueryPool(pool));
    }

    fn begin_query(&mut self, pool: vk::QueryPool, query: u32, _flags: vk::QueryControlFlags) {
        self.calls.push(Call::BeginQuery(pool, query));
    }

    fn end_query(&mut self, pool: vk::QueryPool, query: u32) {
        self.calls.push(Call::EndQuery(pool, query));
    }
}
