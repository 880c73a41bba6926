//! Per-node resource links.
//!
//! When a node is appended to the graph it reports every resource access it
//! will perform. Read accesses become input links against the resource's
//! current version; write accesses bump the version first and become output
//! links. The command builder walks these lists to synthesize barriers.

use basalt_core::collections::SmallVec;
use basalt_rhi::{is_write_access, vk};

use crate::resource::{ResourceStateTracker, ResourceWithStamp};

/// One resource access of a node.
#[derive(Clone, Copy, Debug)]
pub struct Link {
    pub resource: ResourceWithStamp,
    pub access: vk::AccessFlags2,
    /// Image layout the node needs; `UNDEFINED` for buffers.
    pub layout: vk::ImageLayout,
    /// `NONE` marks a buffer link.
    pub aspect: vk::ImageAspectFlags,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl Link {
    pub(crate) fn buffer(resource: ResourceWithStamp, access: vk::AccessFlags2) -> Self {
        Self {
            resource,
            access,
            layout: vk::ImageLayout::UNDEFINED,
            aspect: vk::ImageAspectFlags::NONE,
            base_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        }
    }

    pub(crate) fn image(
        resource: ResourceWithStamp,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self::image_layers(resource, access, layout, aspect, 0, vk::REMAINING_ARRAY_LAYERS)
    }

    pub(crate) fn image_layers(
        resource: ResourceWithStamp,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
        base_layer: u32,
        layer_count: u32,
    ) -> Self {
        Self {
            resource,
            access,
            layout,
            aspect,
            base_layer,
            layer_count,
        }
    }

    pub fn is_image(&self) -> bool {
        self.aspect != vk::ImageAspectFlags::NONE
    }
}

/// Input and output links of a single node.
#[derive(Default)]
pub struct NodeLinks {
    pub inputs: SmallVec<[Link; 4]>,
    pub outputs: SmallVec<[Link; 4]>,
}

/// Shader resource accesses of a dispatch or draw, declared by the caller.
#[derive(Clone, Debug, Default)]
pub struct ResourceAccessInfo {
    pub buffers: Vec<BufferAccess>,
    pub images: Vec<ImageAccess>,
}

#[derive(Clone, Copy, Debug)]
pub struct BufferAccess {
    pub buffer: vk::Buffer,
    pub access: vk::AccessFlags2,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageAccess {
    pub image: vk::Image,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl ImageAccess {
    pub fn whole(
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
}

impl ResourceAccessInfo {
    pub(crate) fn build_links(&self, tracker: &mut ResourceStateTracker, links: &mut NodeLinks) {
        for buffer in &self.buffers {
            if is_write_access(buffer.access) {
                let resource = tracker.get_buffer_and_increase_stamp(buffer.buffer);
                links.outputs.push(Link::buffer(resource, buffer.access));
            } else {
                let resource = tracker.get_buffer(buffer.buffer);
                links.inputs.push(Link::buffer(resource, buffer.access));
            }
        }
        for image in &self.images {
            let link = |resource| {
                Link::image_layers(
                    resource,
                    image.access,
                    image.layout,
                    image.aspect,
                    image.base_layer,
                    image.layer_count,
                )
            };
            if is_write_access(image.access) {
                links.outputs.push(link(tracker.get_image_and_increase_stamp(image.image)));
            } else {
                links.inputs.push(link(tracker.get_image(image.image)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_rhi::vk::Handle;

    #[test]
    fn accesses_split_into_inputs_and_outputs() {
        let mut tracker = ResourceStateTracker::new();
        let info = ResourceAccessInfo {
            buffers: vec![
                BufferAccess {
                    buffer: vk::Buffer::from_raw(1),
                    access: vk::AccessFlags2::SHADER_STORAGE_READ,
                },
                BufferAccess {
                    buffer: vk::Buffer::from_raw(2),
                    access: vk::AccessFlags2::SHADER_STORAGE_READ
                        | vk::AccessFlags2::SHADER_STORAGE_WRITE,
                },
            ],
            images: vec![ImageAccess::whole(
                vk::Image::from_raw(3),
                vk::AccessFlags2::SHADER_SAMPLED_READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
            )],
        };

        let mut links = NodeLinks::default();
        info.build_links(&mut tracker, &mut links);

        assert_eq!(links.inputs.len(), 2);
        assert_eq!(links.outputs.len(), 1);
        assert!(!links.inputs[0].is_image());
        assert!(links.inputs[1].is_image());
        // read-write counts as a write and versions the buffer
        assert_eq!(links.outputs[0].resource.stamp, 1);
    }
}
