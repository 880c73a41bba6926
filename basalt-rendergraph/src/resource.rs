//! Versioned resource state tracking.
//!
//! The tracker owns one record per registered buffer or image. Each record
//! carries a monotonically increasing version stamp (bumped on every write
//! access) and the last barrier state the command builder synchronized the
//! resource to. Records survive graph resets so synchronization state carries
//! across submissions.

use basalt_core::collections::HashMap;
use basalt_rhi::vk;

/// Index of a tracked resource inside [`ResourceStateTracker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(pub(crate) u32);

/// A resource reference pinned to the version it had when a link was made.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceWithStamp {
    pub id: ResourceId,
    pub stamp: u64,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum NativeHandle {
    Buffer(vk::Buffer),
    Image(vk::Image),
}

/// Last synchronized state of a resource, as seen by already-built barriers.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BarrierState {
    pub stages: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
    /// Set until the first barrier touches the resource. A first read then
    /// needs no src scope at all.
    pub untracked: bool,
}

impl BarrierState {
    fn new() -> Self {
        Self {
            stages: vk::PipelineStageFlags2::NONE,
            access: vk::AccessFlags2::NONE,
            layout: vk::ImageLayout::UNDEFINED,
            untracked: true,
        }
    }
}

pub(crate) struct ResourceRecord {
    pub handle: NativeHandle,
    pub stamp: u64,
    pub state: BarrierState,
}

/// Registry of all buffers and images the render graph knows about.
#[derive(Default)]
pub struct ResourceStateTracker {
    buffers: HashMap<vk::Buffer, ResourceId>,
    images: HashMap<vk::Image, ResourceId>,
    records: Vec<ResourceRecord>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version of `buffer`, registering it on first sight.
    pub fn get_buffer(&mut self, buffer: vk::Buffer) -> ResourceWithStamp {
        let id = self.ensure_buffer(buffer);
        ResourceWithStamp {
            id,
            stamp: self.records[id.0 as usize].stamp,
        }
    }

    /// Version `buffer` for a write access. Returns the new version.
    pub fn get_buffer_and_increase_stamp(&mut self, buffer: vk::Buffer) -> ResourceWithStamp {
        let id = self.ensure_buffer(buffer);
        let record = &mut self.records[id.0 as usize];
        record.stamp += 1;
        ResourceWithStamp {
            id,
            stamp: record.stamp,
        }
    }

    /// Current version of `image`, registering it on first sight.
    pub fn get_image(&mut self, image: vk::Image) -> ResourceWithStamp {
        let id = self.ensure_image(image);
        ResourceWithStamp {
            id,
            stamp: self.records[id.0 as usize].stamp,
        }
    }

    /// Version `image` for a write access. Returns the new version.
    pub fn get_image_and_increase_stamp(&mut self, image: vk::Image) -> ResourceWithStamp {
        let id = self.ensure_image(image);
        let record = &mut self.records[id.0 as usize];
        record.stamp += 1;
        ResourceWithStamp {
            id,
            stamp: record.stamp,
        }
    }

    /// Forget a destroyed buffer. Its record slot is not reused.
    pub fn remove_buffer(&mut self, buffer: vk::Buffer) {
        if self.buffers.remove(&buffer).is_none() {
            log::warn!("Removing untracked buffer {buffer:?}");
        }
    }

    /// Forget a destroyed image. Its record slot is not reused.
    pub fn remove_image(&mut self, image: vk::Image) {
        if self.images.remove(&image).is_none() {
            log::warn!("Removing untracked image {image:?}");
        }
    }

    pub(crate) fn record_mut(&mut self, id: ResourceId) -> &mut ResourceRecord {
        &mut self.records[id.0 as usize]
    }

    pub(crate) fn buffer_handle(&self, id: ResourceId) -> vk::Buffer {
        match self.records[id.0 as usize].handle {
            NativeHandle::Buffer(buffer) => buffer,
            NativeHandle::Image(_) => unreachable!("buffer link made against an image record"),
        }
    }

    pub(crate) fn image_handle(&self, id: ResourceId) -> vk::Image {
        match self.records[id.0 as usize].handle {
            NativeHandle::Image(image) => image,
            NativeHandle::Buffer(_) => unreachable!("image link made against a buffer record"),
        }
    }

    fn ensure_buffer(&mut self, buffer: vk::Buffer) -> ResourceId {
        if let Some(id) = self.buffers.get(&buffer) {
            return *id;
        }
        let id = self.push_record(NativeHandle::Buffer(buffer));
        self.buffers.insert(buffer, id);
        id
    }

    fn ensure_image(&mut self, image: vk::Image) -> ResourceId {
        if let Some(id) = self.images.get(&image) {
            return *id;
        }
        let id = self.push_record(NativeHandle::Image(image));
        self.images.insert(image, id);
        id
    }

    fn push_record(&mut self, handle: NativeHandle) -> ResourceId {
        let id = ResourceId(self.records.len() as u32);
        self.records.push(ResourceRecord {
            handle,
            stamp: 0,
            state: BarrierState::new(),
        });
        id
    }
}
