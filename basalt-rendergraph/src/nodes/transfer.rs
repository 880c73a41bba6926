//! Clear, fill, update, copy and blit nodes.
//!
//! Transfer nodes always access images in the transfer-optimal layouts; the
//! barrier pass transitions them there and back as neighboring nodes demand.

use basalt_rhi::{vk, CommandStream};

use crate::links::{Link, NodeLinks};
use crate::resource::ResourceStateTracker;

fn subresource_aspect(ranges: &[vk::ImageSubresourceRange]) -> vk::ImageAspectFlags {
    ranges
        .first()
        .map(|r| r.aspect_mask)
        .unwrap_or(vk::ImageAspectFlags::COLOR)
}

fn layers_aspect(layers: Option<&vk::ImageSubresourceLayers>) -> vk::ImageAspectFlags {
    layers
        .map(|l| l.aspect_mask)
        .unwrap_or(vk::ImageAspectFlags::COLOR)
}

pub struct ClearColorImage {
    pub image: vk::Image,
    pub clear_value: vk::ClearColorValue,
    pub ranges: Vec<vk::ImageSubresourceRange>,
}

impl ClearColorImage {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let resource = tracker.get_image_and_increase_stamp(self.image);
        links.outputs.push(Link::image(
            resource,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            subresource_aspect(&self.ranges),
        ));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.clear_color_image(
            self.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &self.clear_value,
            &self.ranges,
        );
    }
}

pub struct ClearDepthStencilImage {
    pub image: vk::Image,
    pub clear_value: vk::ClearDepthStencilValue,
    pub ranges: Vec<vk::ImageSubresourceRange>,
}

impl ClearDepthStencilImage {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let resource = tracker.get_image_and_increase_stamp(self.image);
        links.outputs.push(Link::image(
            resource,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            subresource_aspect(&self.ranges),
        ));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.clear_depth_stencil_image(
            self.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &self.clear_value,
            &self.ranges,
        );
    }
}

pub struct FillBuffer {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
    pub data: u32,
}

impl FillBuffer {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let resource = tracker.get_buffer_and_increase_stamp(self.buffer);
        links
            .outputs
            .push(Link::buffer(resource, vk::AccessFlags2::TRANSFER_WRITE));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.fill_buffer(self.buffer, self.offset, self.size, self.data);
    }
}

/// Inline buffer upload. The payload is owned by the node and dropped with
/// the graph.
pub struct UpdateBuffer {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub data: Vec<u8>,
}

impl UpdateBuffer {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let resource = tracker.get_buffer_and_increase_stamp(self.buffer);
        links
            .outputs
            .push(Link::buffer(resource, vk::AccessFlags2::TRANSFER_WRITE));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.update_buffer(self.buffer, self.offset, &self.data);
    }
}

pub struct CopyBuffer {
    pub src: vk::Buffer,
    pub dst: vk::Buffer,
    pub regions: Vec<vk::BufferCopy>,
}

impl CopyBuffer {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let src = tracker.get_buffer(self.src);
        links
            .inputs
            .push(Link::buffer(src, vk::AccessFlags2::TRANSFER_READ));
        let dst = tracker.get_buffer_and_increase_stamp(self.dst);
        links
            .outputs
            .push(Link::buffer(dst, vk::AccessFlags2::TRANSFER_WRITE));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.copy_buffer(self.src, self.dst, &self.regions);
    }
}

pub struct CopyImage {
    pub src: vk::Image,
    pub dst: vk::Image,
    pub regions: Vec<vk::ImageCopy>,
}

impl CopyImage {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let src = tracker.get_image(self.src);
        links.inputs.push(Link::image(
            src,
            vk::AccessFlags2::TRANSFER_READ,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            layers_aspect(self.regions.first().map(|r| &r.src_subresource)),
        ));
        let dst = tracker.get_image_and_increase_stamp(self.dst);
        links.outputs.push(Link::image(
            dst,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            layers_aspect(self.regions.first().map(|r| &r.dst_subresource)),
        ));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.copy_image(
            self.src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            self.dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &self.regions,
        );
    }
}

pub struct CopyBufferToImage {
    pub src: vk::Buffer,
    pub dst: vk::Image,
    pub regions: Vec<vk::BufferImageCopy>,
}

impl CopyBufferToImage {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let src = tracker.get_buffer(self.src);
        links
            .inputs
            .push(Link::buffer(src, vk::AccessFlags2::TRANSFER_READ));
        let dst = tracker.get_image_and_increase_stamp(self.dst);
        links.outputs.push(Link::image(
            dst,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            layers_aspect(self.regions.first().map(|r| &r.image_subresource)),
        ));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.copy_buffer_to_image(
            self.src,
            self.dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &self.regions,
        );
    }
}

pub struct CopyImageToBuffer {
    pub src: vk::Image,
    pub dst: vk::Buffer,
    pub regions: Vec<vk::BufferImageCopy>,
}

impl CopyImageToBuffer {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let src = tracker.get_image(self.src);
        links.inputs.push(Link::image(
            src,
            vk::AccessFlags2::TRANSFER_READ,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            layers_aspect(self.regions.first().map(|r| &r.image_subresource)),
        ));
        let dst = tracker.get_buffer_and_increase_stamp(self.dst);
        links
            .outputs
            .push(Link::buffer(dst, vk::AccessFlags2::TRANSFER_WRITE));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.copy_image_to_buffer(
            self.src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            self.dst,
            &self.regions,
        );
    }
}

pub struct BlitImage {
    pub src: vk::Image,
    pub dst: vk::Image,
    pub regions: Vec<vk::ImageBlit>,
    pub filter: vk::Filter,
}

impl BlitImage {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let src = tracker.get_image(self.src);
        links.inputs.push(Link::image(
            src,
            vk::AccessFlags2::TRANSFER_READ,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            layers_aspect(self.regions.first().map(|r| &r.src_subresource)),
        ));
        let dst = tracker.get_image_and_increase_stamp(self.dst);
        links.outputs.push(Link::image(
            dst,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            layers_aspect(self.regions.first().map(|r| &r.dst_subresource)),
        ));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.blit_image(
            self.src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            self.dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &self.regions,
            self.filter,
        );
    }
}
