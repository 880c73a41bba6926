//! Render graph construction and command building.
//!
//! Application code appends typed nodes to a [`RenderGraph`]; every node
//! declares the resources it reads and writes as links against a versioned
//! resource state tracker. A [`Scheduler`] picks an ordered node subset and
//! the [`CommandBuilder`] replays it into a [`CommandStream`], synthesizing
//! minimal pipeline barriers, suspending/resuming dynamic rendering around
//! interleaved non-draw work and eliding redundant state binds.

mod command_builder;
mod graph;
mod links;
mod nodes;
mod resource;
mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use basalt_rhi::{
    vk, BufferBarrier, CommandStream, ImageBarrier, RenderingAttachment, RenderingBegin,
};
pub use command_builder::CommandBuilder;
pub use graph::{NodeHandle, RenderGraph};
pub use links::{BufferAccess, ImageAccess, Link, NodeLinks, ResourceAccessInfo};
pub use nodes::{
    BeginRendering, BlitImage, ClearAttachments, ClearColorImage, ClearDepthStencilImage,
    CopyBuffer, CopyBufferToImage, CopyImage, CopyImageToBuffer, Dispatch, DispatchIndirect,
    Draw, DrawIndexed, DrawIndexedIndirect, DrawIndirect, EndRendering, FillBuffer,
    GraphicsState, IndexBufferBinding, Node, PipelineBinding, PushConstants, ResetQueryPool,
    Synchronization, TrackedResource, UpdateBuffer, UpdateMipmaps, VertexBufferBinding,
};
pub use resource::{ResourceId, ResourceStateTracker, ResourceWithStamp};
pub use scheduler::Scheduler;
