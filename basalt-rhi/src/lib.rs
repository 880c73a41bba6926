//! Basalt RHI - Pure Vulkan backend.
//!
//! This crate provides the low-level Vulkan surface the render graph records
//! into: owned barrier descriptions and the [`CommandStream`] command sink.

pub mod barrier;
pub mod command;

pub use ash::{vk, Device};
pub use barrier::{BufferBarrier, ImageBarrier, READ_ACCESS, WRITE_ACCESS, is_write_access};
pub use command::{
    CommandEncoder, CommandPool, CommandStream, RenderingAttachment, RenderingBegin,
};
