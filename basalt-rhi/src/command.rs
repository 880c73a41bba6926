//! Command stream interface, pool and recorder.

use std::cell::{Cell, RefCell};
use std::ffi::CString;

use ash::vk;
use basalt_core::collections::SmallVec;

use crate::barrier::{BufferBarrier, ImageBarrier};

/// One attachment of a dynamic rendering scope, as plain owned data.
///
/// Carries the image handle next to the view so the render graph can track
/// the attachment's synchronization state without dereferencing the view.
#[derive(Clone, Copy)]
pub struct RenderingAttachment {
    pub image: vk::Image,
    pub image_view: vk::ImageView,
    pub image_layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: vk::ClearValue,
}

impl RenderingAttachment {
    fn to_vk(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.image_layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(self.clear_value)
    }
}

/// Owned equivalent of `vk::RenderingInfo`.
///
/// The command builder keeps a copy of this around so a suspended rendering
/// scope can be resumed with identical parameters plus the `RESUMING` flag.
#[derive(Clone)]
pub struct RenderingBegin {
    pub flags: vk::RenderingFlags,
    pub render_area: vk::Rect2D,
    pub layer_count: u32,
    pub color_attachments: SmallVec<[RenderingAttachment; 4]>,
    pub depth_attachment: Option<RenderingAttachment>,
}

impl RenderingBegin {
    pub fn new(render_area: vk::Rect2D, layer_count: u32) -> Self {
        Self {
            flags: vk::RenderingFlags::empty(),
            render_area,
            layer_count,
            color_attachments: SmallVec::new(),
            depth_attachment: None,
        }
    }
}

/// The native command sink the render graph records into.
///
/// Implemented over `ash` by [`CommandEncoder`]; tests implement it with a
/// recorder. Every operation maps to exactly one `vkCmd*`/lifecycle call, so
/// call sequences on this trait are the unit the command builder is tested
/// against.
pub trait CommandStream {
    fn begin_recording(&mut self) -> anyhow::Result<()>;
    fn end_recording(&mut self) -> anyhow::Result<()>;

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType);
    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]);
    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]);

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn draw_indirect(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32);
    fn draw_indexed_indirect(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32);
    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);
    fn dispatch_indirect(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize);

    fn update_buffer(&mut self, dst: vk::Buffer, offset: vk::DeviceSize, data: &[u8]);
    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);
    fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    );
    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );
    fn copy_image_to_buffer(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    );
    fn blit_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    );
    fn fill_buffer(&mut self, dst: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize, data: u32);

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        clear_value: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    );
    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        clear_value: &vk::ClearDepthStencilValue,
        ranges: &[vk::ImageSubresourceRange],
    );
    fn clear_attachments(&mut self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]);

    /// One batched dependency covering all of a node's buffer and image
    /// hazards. Stage masks travel per barrier (sync2).
    fn pipeline_barrier(&mut self, buffer_barriers: &[BufferBarrier], image_barriers: &[ImageBarrier]);

    fn begin_rendering(&mut self, info: &RenderingBegin);
    fn end_rendering(&mut self);

    fn set_viewport(&mut self, viewport: &vk::Viewport);
    fn set_scissor(&mut self, scissor: &vk::Rect2D);
    fn set_line_width(&mut self, width: f32);

    fn begin_debug_label(&mut self, name: &str);
    fn end_debug_label(&mut self);

    fn reset_query_pool(&mut self, pool: vk::QueryPool, first_query: u32, query_count: u32);
    fn begin_query(&mut self, pool: vk::QueryPool, query: u32, flags: vk::QueryControlFlags);
    fn end_query(&mut self, pool: vk::QueryPool, query: u32);
}

/// Command buffer pool for allocating command buffers.
pub struct CommandPool {
    device: ash::Device,
    pool: vk::CommandPool,
    buffers: RefCell<Vec<vk::CommandBuffer>>,
    next_index: Cell<usize>,
}

impl CommandPool {
    pub fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self, vk::Result> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };
        Ok(Self {
            device: device.clone(),
            pool,
            buffers: RefCell::new(Vec::new()),
            next_index: Cell::new(0),
        })
    }

    pub fn allocate(&self) -> Result<vk::CommandBuffer, vk::Result> {
        let index = self.next_index.get();
        self.next_index.set(index + 1);

        if let Some(buffer) = self.buffers.borrow().get(index) {
            return Ok(*buffer);
        }

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        let cmd = buffers[0];

        self.buffers.borrow_mut().push(cmd);
        Ok(cmd)
    }

    pub fn reset(&self) -> Result<(), vk::Result> {
        self.next_index.set(0);
        unsafe { self.device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty()) }
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// `ash`-backed [`CommandStream`] recording into one primary command buffer.
///
/// Debug labels become no-ops when the encoder is built without the debug
/// utils extension device.
pub struct CommandEncoder {
    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    cmd: vk::CommandBuffer,
}

impl CommandEncoder {
    pub fn new(device: &ash::Device, pool: &CommandPool) -> anyhow::Result<Self> {
        let cmd = pool.allocate()?;
        Ok(Self {
            device: device.clone(),
            debug_utils: None,
            cmd,
        })
    }

    pub fn with_debug_utils(mut self, debug_utils: ash::ext::debug_utils::Device) -> Self {
        self.debug_utils = Some(debug_utils);
        self
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.cmd
    }
}

impl CommandStream for CommandEncoder {
    fn begin_recording(&mut self) -> anyhow::Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(self.cmd, &begin_info)? };
        Ok(())
    }

    fn end_recording(&mut self) -> anyhow::Result<()> {
        unsafe { self.device.end_command_buffer(self.cmd)? };
        Ok(())
    }

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(self.cmd, bind_point, pipeline) }
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(self.cmd, bind_point, layout, first_set, sets, &[])
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(self.cmd, buffer, offset, index_type) }
    }

    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe { self.device.cmd_bind_vertex_buffers(self.cmd, first_binding, buffers, offsets) }
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        unsafe { self.device.cmd_push_constants(self.cmd, layout, stages, offset, data) }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device
                .cmd_draw(self.cmd, vertex_count, instance_count, first_vertex, first_instance)
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    fn draw_indirect(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32) {
        unsafe { self.device.cmd_draw_indirect(self.cmd, buffer, offset, draw_count, stride) }
    }

    fn draw_indexed_indirect(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed_indirect(self.cmd, buffer, offset, draw_count, stride)
        }
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe { self.device.cmd_dispatch(self.cmd, group_count_x, group_count_y, group_count_z) }
    }

    fn dispatch_indirect(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe { self.device.cmd_dispatch_indirect(self.cmd, buffer, offset) }
    }

    fn update_buffer(&mut self, dst: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) {
        unsafe { self.device.cmd_update_buffer(self.cmd, dst, offset, data) }
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(self.cmd, src, dst, regions) }
    }

    fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_image(self.cmd, src, src_layout, dst, dst_layout, regions)
        }
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer_to_image(self.cmd, src, dst, dst_layout, regions) }
    }

    fn copy_image_to_buffer(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.device.cmd_copy_image_to_buffer(self.cmd, src, src_layout, dst, regions) }
    }

    fn blit_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe {
            self.device
                .cmd_blit_image(self.cmd, src, src_layout, dst, dst_layout, regions, filter)
        }
    }

    fn fill_buffer(&mut self, dst: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize, data: u32) {
        unsafe { self.device.cmd_fill_buffer(self.cmd, dst, offset, size, data) }
    }

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        clear_value: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        unsafe { self.device.cmd_clear_color_image(self.cmd, image, layout, clear_value, ranges) }
    }

    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        clear_value: &vk::ClearDepthStencilValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        unsafe {
            self.device
                .cmd_clear_depth_stencil_image(self.cmd, image, layout, clear_value, ranges)
        }
    }

    fn clear_attachments(&mut self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]) {
        unsafe { self.device.cmd_clear_attachments(self.cmd, attachments, rects) }
    }

    fn pipeline_barrier(&mut self, buffer_barriers: &[BufferBarrier], image_barriers: &[ImageBarrier]) {
        if buffer_barriers.is_empty() && image_barriers.is_empty() {
            return;
        }
        let vk_buffers: SmallVec<[vk::BufferMemoryBarrier2; 8]> =
            buffer_barriers.iter().map(|b| b.to_vk()).collect();
        let vk_images: SmallVec<[vk::ImageMemoryBarrier2; 8]> =
            image_barriers.iter().map(|b| b.to_vk()).collect();
        let dependency_info = vk::DependencyInfo::default()
            .buffer_memory_barriers(&vk_buffers)
            .image_memory_barriers(&vk_images);
        unsafe { self.device.cmd_pipeline_barrier2(self.cmd, &dependency_info) }
    }

    fn begin_rendering(&mut self, info: &RenderingBegin) {
        let color_attachments: SmallVec<[vk::RenderingAttachmentInfo; 4]> =
            info.color_attachments.iter().map(|a| a.to_vk()).collect();
        let depth_attachment = info.depth_attachment.as_ref().map(|a| a.to_vk());

        let mut rendering_info = vk::RenderingInfo::default()
            .flags(info.flags)
            .render_area(info.render_area)
            .layer_count(info.layer_count)
            .color_attachments(&color_attachments);

        if let Some(ref depth) = depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        unsafe { self.device.cmd_begin_rendering(self.cmd, &rendering_info) }
    }

    fn end_rendering(&mut self) {
        unsafe { self.device.cmd_end_rendering(self.cmd) }
    }

    fn set_viewport(&mut self, viewport: &vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(self.cmd, 0, std::slice::from_ref(viewport)) }
    }

    fn set_scissor(&mut self, scissor: &vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(self.cmd, 0, std::slice::from_ref(scissor)) }
    }

    fn set_line_width(&mut self, width: f32) {
        unsafe { self.device.cmd_set_line_width(self.cmd, width) }
    }

    fn begin_debug_label(&mut self, name: &str) {
        if let Some(debug_utils) = &self.debug_utils {
            let name = CString::new(name).unwrap_or_default();
            let label = vk::DebugUtilsLabelEXT::default().label_name(&name);
            unsafe { debug_utils.cmd_begin_debug_utils_label(self.cmd, &label) }
        }
    }

    fn end_debug_label(&mut self) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(self.cmd) }
        }
    }

    fn reset_query_pool(&mut self, pool: vk::QueryPool, first_query: u32, query_count: u32) {
        unsafe { self.device.cmd_reset_query_pool(self.cmd, pool, first_query, query_count) }
    }

    fn begin_query(&mut self, pool: vk::QueryPool, query: u32, flags: vk::QueryControlFlags) {
        unsafe { self.device.cmd_begin_query(self.cmd, pool, query, flags) }
    }

    fn end_query(&mut self, pool: vk::QueryPool, query: u32) {
        unsafe { self.device.cmd_end_query(self.cmd, pool, query) }
    }
}
