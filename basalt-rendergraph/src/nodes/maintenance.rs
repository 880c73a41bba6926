//! Nodes without a 1:1 draw/transfer command mapping.

use basalt_rhi::{vk, CommandStream, ImageBarrier};

use crate::links::{Link, NodeLinks};
use crate::resource::ResourceStateTracker;

/// Forces an image (or a layer range of it) into a layout and access state
/// without recording any commands itself. Used to hand resources over to
/// code outside the graph, and to flip individual layers of an attachment
/// while its rendering scope is suspended.
pub struct Synchronization {
    pub image: vk::Image,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl Synchronization {
    pub fn whole_image(
        image: vk::Image,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self {
            image,
            access,
            layout,
            aspect,
            base_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        }
    }

    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let resource = tracker.get_image_and_increase_stamp(self.image);
        links.outputs.push(Link::image_layers(
            resource,
            self.access,
            self.layout,
            self.aspect,
            self.base_layer,
            self.layer_count,
        ));
    }
}

/// Regenerates the full mip chain of an image by blitting level to level.
///
/// The image enters and leaves in `TRANSFER_DST_OPTIMAL`; the per-level
/// transitions in between are recorded directly since they never interact
/// with other nodes.
pub struct UpdateMipmaps {
    pub image: vk::Image,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub layer_count: u32,
    pub aspect: vk::ImageAspectFlags,
}

impl UpdateMipmaps {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        let resource = tracker.get_image_and_increase_stamp(self.image);
        links.outputs.push(Link::image(
            resource,
            vk::AccessFlags2::TRANSFER_READ | vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            self.aspect,
        ));
    }

    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        let mut src_extent = self.extent;
        for level in 1..self.mip_levels {
            let dst_extent = vk::Extent3D {
                width: (src_extent.width / 2).max(1),
                height: (src_extent.height / 2).max(1),
                depth: (src_extent.depth / 2).max(1),
            };

            stream.pipeline_barrier(&[], &[self.level_barrier(
                level - 1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            )]);

            let region = vk::ImageBlit {
                src_subresource: self.level_layers(level - 1),
                src_offsets: [vk::Offset3D::default(), extent_offset(src_extent)],
                dst_subresource: self.level_layers(level),
                dst_offsets: [vk::Offset3D::default(), extent_offset(dst_extent)],
            };
            stream.blit_image(
                self.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::LINEAR,
            );

            src_extent = dst_extent;
        }

        // return the source levels to the layout the tracker expects
        if self.mip_levels > 1 {
            let mut barrier = self.level_barrier(
                0,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            barrier.level_count = self.mip_levels - 1;
            stream.pipeline_barrier(&[], &[barrier]);
        }
    }

    fn level_layers(&self, level: u32) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: self.aspect,
            mip_level: level,
            base_array_layer: 0,
            layer_count: self.layer_count,
        }
    }

    fn level_barrier(
        &self,
        level: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> ImageBarrier {
        ImageBarrier {
            image: self.image,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_access: vk::AccessFlags2::TRANSFER_READ,
            old_layout,
            new_layout,
            aspect: self.aspect,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count: self.layer_count,
        }
    }
}

fn extent_offset(extent: vk::Extent3D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: extent.depth as i32,
    }
}

pub struct ResetQueryPool {
    pub pool: vk::QueryPool,
    pub first_query: u32,
    pub query_count: u32,
}

impl ResetQueryPool {
    pub(crate) fn build_commands(&self, stream: &mut dyn CommandStream) {
        stream.reset_query_pool(self.pool, self.first_query, self.query_count);
    }
}
