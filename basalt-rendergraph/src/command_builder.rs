//! Replays scheduled nodes into a command stream.
//!
//! The builder walks the scheduled nodes in groups. A group is either a run
//! of non-render work or a contiguous slice of one rendering scope; barriers
//! are recorded before a group's native `begin_rendering` since they are
//! illegal inside one. When non-render work interrupts a scope the scope is
//! suspended (`SUSPENDING`) and later resumed (`RESUMING`) with identical
//! rendering parameters, so the whole scope stays a single render pass
//! instance on tile hardware.

use std::ops::Range;

use basalt_core::collections::{HashMap, SmallVec};
use basalt_rhi::{vk, BufferBarrier, CommandStream, ImageBarrier, RenderingBegin};

use crate::graph::{NodeHandle, RenderGraph};
use crate::links::Link;
use crate::nodes::{IndexBufferBinding, Node, VertexBufferBinding};
use crate::resource::{NativeHandle, ResourceStateTracker};

/// State already bound on the command buffer. Nodes consult this through
/// their bind helpers to skip redundant binds.
#[derive(Default)]
pub(crate) struct BoundState {
    pub pipeline: Option<vk::Pipeline>,
    pub descriptor_set: Option<(vk::PipelineLayout, vk::DescriptorSet)>,
    pub index_buffer: Option<IndexBufferBinding>,
    pub vertex_buffers: SmallVec<[VertexBufferBinding; 4]>,
    pub viewport: Option<vk::Viewport>,
    pub scissor: Option<vk::Rect2D>,
    pub line_width: Option<f32>,
}

// vk::Viewport has no PartialEq impl
pub(crate) fn viewport_eq(a: &vk::Viewport, b: &vk::Viewport) -> bool {
    a.x == b.x
        && a.y == b.y
        && a.width == b.width
        && a.height == b.height
        && a.min_depth == b.min_depth
        && a.max_depth == b.max_depth
}

pub(crate) fn rect_eq(a: &vk::Rect2D, b: &vk::Rect2D) -> bool {
    a.offset.x == b.offset.x
        && a.offset.y == b.offset.y
        && a.extent.width == b.extent.width
        && a.extent.height == b.extent.height
}

/// A contiguous slice of the scheduled node list that is recorded as a unit.
struct NodeGroup {
    range: Range<usize>,
    rendering: bool,
    ends_scope: bool,
}

enum RenderingScope {
    Outside,
    Active { info: RenderingBegin },
    Suspended { info: RenderingBegin },
}

/// Per-layer layout tracking for a multi-layer attachment while its
/// rendering scope is open. Individual layers may leave the attachment
/// layout (to be sampled by interleaved work) and are transitioned back
/// before the scope needs them again.
struct LayeredAttachment {
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    attachment_layout: vk::ImageLayout,
    layers: Vec<vk::ImageLayout>,
}

pub struct CommandBuilder {
    bound: BoundState,
    buffer_barriers: Vec<BufferBarrier>,
    image_barriers: Vec<ImageBarrier>,
    active_labels: Vec<String>,
    scope: RenderingScope,
    layered: HashMap<crate::resource::ResourceId, LayeredAttachment>,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self {
            bound: BoundState::default(),
            buffer_barriers: Vec::new(),
            image_barriers: Vec::new(),
            active_labels: Vec::new(),
            scope: RenderingScope::Outside,
            layered: HashMap::default(),
        }
    }

    /// Record `nodes` (in the given order) into `stream`, including the
    /// recording begin/end lifecycle.
    #[profiling::function]
    pub fn build_nodes(
        &mut self,
        graph: &mut RenderGraph,
        stream: &mut impl CommandStream,
        nodes: &[NodeHandle],
    ) -> anyhow::Result<()> {
        self.reset_build_state();
        stream.begin_recording()?;

        let groups = Self::partition_groups(graph, nodes);
        for group in &groups {
            self.build_group(graph, stream, nodes, group);
        }

        if let RenderingScope::Active { .. } | RenderingScope::Suspended { .. } = self.scope {
            log::warn!("Rendering scope still open after the last node; closing it");
            if let RenderingScope::Active { .. } = self.scope {
                stream.end_rendering();
            }
            self.scope = RenderingScope::Outside;
            self.restore_layered_layouts(stream);
            self.layered.clear();
        }

        while self.active_labels.pop().is_some() {
            stream.end_debug_label();
        }

        stream.end_recording()?;
        Ok(())
    }

    fn reset_build_state(&mut self) {
        self.bound = BoundState::default();
        self.buffer_barriers.clear();
        self.image_barriers.clear();
        self.active_labels.clear();
        self.scope = RenderingScope::Outside;
        self.layered.clear();
    }

    /// Split the scheduled nodes into maximal groups. Scope begin/end and
    /// in-scope draws extend a rendering group; everything else extends a
    /// non-render group.
    fn partition_groups(graph: &RenderGraph, nodes: &[NodeHandle]) -> Vec<NodeGroup> {
        let mut groups = Vec::new();
        let mut start = 0;
        let mut rendering = false;
        let mut scope_open = false;

        for (index, handle) in nodes.iter().enumerate() {
            let node = &graph.nodes[handle.0];
            if node.is_rendering_scope_begin() {
                debug_assert!(!scope_open, "nested rendering scopes are not supported");
                if index > start {
                    groups.push(NodeGroup {
                        range: start..index,
                        rendering,
                        ends_scope: false,
                    });
                }
                start = index;
                rendering = true;
                scope_open = true;
            } else if node.is_rendering_scope_end() {
                debug_assert!(scope_open, "end of rendering without a begin");
                if !rendering {
                    if index > start {
                        groups.push(NodeGroup {
                            range: start..index,
                            rendering: false,
                            ends_scope: false,
                        });
                    }
                    start = index;
                }
                groups.push(NodeGroup {
                    range: start..index + 1,
                    rendering: true,
                    ends_scope: true,
                });
                start = index + 1;
                rendering = false;
                scope_open = false;
            } else if node.renders_within_scope() {
                debug_assert!(scope_open, "draw recorded outside a rendering scope");
                if !rendering {
                    if index > start {
                        groups.push(NodeGroup {
                            range: start..index,
                            rendering: false,
                            ends_scope: false,
                        });
                    }
                    start = index;
                    rendering = true;
                }
            } else if rendering {
                // non-render work interrupts the scope
                if index > start {
                    groups.push(NodeGroup {
                        range: start..index,
                        rendering: true,
                        ends_scope: false,
                    });
                }
                start = index;
                rendering = false;
            }
        }

        if nodes.len() > start {
            groups.push(NodeGroup {
                range: start..nodes.len(),
                rendering,
                ends_scope: false,
            });
        }
        groups
    }

    fn build_group(
        &mut self,
        graph: &mut RenderGraph,
        stream: &mut impl CommandStream,
        nodes: &[NodeHandle],
        group: &NodeGroup,
    ) {
        if !group.rendering {
            self.suspend_rendering(stream);
            for index in group.range.clone() {
                let handle = nodes[index];
                self.activate_debug_labels(graph, stream, handle);
                self.build_pipeline_barriers(graph, stream, handle);
                graph.nodes[handle.0].build_commands(stream, &mut self.bound);
            }
            return;
        }

        let entering = matches!(self.scope, RenderingScope::Outside);

        // barriers for the whole group come first; they cannot be recorded
        // once the native scope is open
        for (position, index) in group.range.clone().enumerate() {
            self.build_pipeline_barriers(graph, stream, nodes[index]);
            if position == 0 && entering {
                self.register_layered_attachments(graph, nodes[index]);
            }
        }

        match std::mem::replace(&mut self.scope, RenderingScope::Outside) {
            RenderingScope::Outside => {
                let first = &graph.nodes[nodes[group.range.start].0];
                let Node::BeginRendering(begin) = first else {
                    log::error!("Rendering group does not start with a begin-rendering node");
                    return;
                };
                let mut info = begin.info.clone();
                info.flags = if group.ends_scope {
                    vk::RenderingFlags::empty()
                } else {
                    vk::RenderingFlags::SUSPENDING
                };
                stream.begin_rendering(&info);
                self.scope = RenderingScope::Active { info };
            }
            RenderingScope::Suspended { mut info } => {
                // identical parameters, only the suspend/resume flags change
                info.flags = vk::RenderingFlags::RESUMING;
                if !group.ends_scope {
                    info.flags |= vk::RenderingFlags::SUSPENDING;
                }
                stream.begin_rendering(&info);
                self.scope = RenderingScope::Active { info };
            }
            RenderingScope::Active { info } => {
                debug_assert!(false, "rendering group reached with a scope already active");
                self.scope = RenderingScope::Active { info };
            }
        }

        for index in group.range.clone() {
            let handle = nodes[index];
            let node = &graph.nodes[handle.0];
            if node.is_rendering_scope_begin() || node.is_rendering_scope_end() {
                continue;
            }
            self.activate_debug_labels(graph, stream, handle);
            node.build_commands(stream, &mut self.bound);
        }

        if group.ends_scope {
            stream.end_rendering();
            self.scope = RenderingScope::Outside;
            self.restore_layered_layouts(stream);
            self.layered.clear();
        }
    }

    fn suspend_rendering(&mut self, stream: &mut impl CommandStream) {
        let scope = std::mem::replace(&mut self.scope, RenderingScope::Outside);
        self.scope = match scope {
            RenderingScope::Active { info } => {
                stream.end_rendering();
                self.restore_layered_layouts(stream);
                RenderingScope::Suspended { info }
            }
            other => other,
        };
    }

    /// Synthesize this node's barriers and emit them as one batched
    /// dependency before the node's commands.
    fn build_pipeline_barriers(
        &mut self,
        graph: &mut RenderGraph,
        stream: &mut impl CommandStream,
        handle: NodeHandle,
    ) {
        let node = &graph.nodes[handle.0];
        if node.tracked_resources().is_empty() {
            return;
        }
        let node_stages = node.pipeline_stages();

        debug_assert!(self.buffer_barriers.is_empty() && self.image_barriers.is_empty());
        let links = &graph.links[handle.0];
        let tracker = &mut graph.tracker;
        for link in &links.inputs {
            self.input_barrier(tracker, link, node_stages);
        }
        for link in &links.outputs {
            self.output_barrier(tracker, link, node_stages);
        }

        if !self.buffer_barriers.is_empty() || !self.image_barriers.is_empty() {
            stream.pipeline_barrier(&self.buffer_barriers, &self.image_barriers);
            self.buffer_barriers.clear();
            self.image_barriers.clear();
        }
    }

    /// Read access: skipped entirely when the tracked state already covers
    /// the requested stages, access and layout.
    fn input_barrier(
        &mut self,
        tracker: &mut ResourceStateTracker,
        link: &Link,
        node_stages: vk::PipelineStageFlags2,
    ) {
        if link.is_image() && self.layer_tracking_update(link) {
            return;
        }

        let record = tracker.record_mut(link.resource.id);
        let state = record.state;
        let covered = !state.untracked
            && state.access.contains(link.access)
            && state.stages.contains(node_stages)
            && (!link.is_image() || state.layout == link.layout);
        if covered {
            return;
        }

        let (src_stage, src_access) = if state.untracked {
            (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE)
        } else {
            (state.stages, state.access)
        };

        record.state.stages = if state.untracked {
            node_stages
        } else {
            state.stages | node_stages
        };
        record.state.access = if state.untracked {
            link.access
        } else {
            state.access | link.access
        };
        if link.is_image() {
            record.state.layout = link.layout;
        }
        record.state.untracked = false;
        let handle = record.handle;

        self.push_barrier(handle, link, src_stage, src_access, state.layout, node_stages);
    }

    /// Write access: always fences against the previous state (unless the
    /// resource was never accessed and needs no layout change), then
    /// replaces the tracked state wholesale.
    fn output_barrier(
        &mut self,
        tracker: &mut ResourceStateTracker,
        link: &Link,
        node_stages: vk::PipelineStageFlags2,
    ) {
        if link.is_image() && self.layer_tracking_update(link) {
            return;
        }

        let record = tracker.record_mut(link.resource.id);
        let state = record.state;
        let layout_change = link.is_image() && state.layout != link.layout;

        record.state.stages = node_stages;
        record.state.access = link.access;
        if link.is_image() {
            record.state.layout = link.layout;
        }
        record.state.untracked = false;
        let handle = record.handle;

        if state.access != vk::AccessFlags2::NONE || layout_change {
            let (src_stage, src_access) = if state.untracked {
                (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE)
            } else {
                (state.stages, state.access)
            };
            self.push_barrier(handle, link, src_stage, src_access, state.layout, node_stages);
        }
    }

    fn push_barrier(
        &mut self,
        handle: NativeHandle,
        link: &Link,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        old_layout: vk::ImageLayout,
        node_stages: vk::PipelineStageFlags2,
    ) {
        match handle {
            NativeHandle::Buffer(buffer) => self.buffer_barriers.push(BufferBarrier {
                buffer,
                src_stage,
                src_access,
                dst_stage: node_stages,
                dst_access: link.access,
                offset: 0,
                size: vk::WHOLE_SIZE,
            }),
            NativeHandle::Image(image) => self.image_barriers.push(ImageBarrier {
                image,
                src_stage,
                src_access,
                dst_stage: node_stages,
                dst_access: link.access,
                old_layout,
                new_layout: link.layout,
                aspect: link.aspect,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: link.base_layer,
                layer_count: link.layer_count,
            }),
        }
    }

    fn register_layered_attachments(&mut self, graph: &RenderGraph, handle: NodeHandle) {
        for link in &graph.links[handle.0].outputs {
            if !link.is_image()
                || link.layer_count <= 1
                || link.layer_count == vk::REMAINING_ARRAY_LAYERS
            {
                continue;
            }
            self.layered.insert(
                link.resource.id,
                LayeredAttachment {
                    image: graph.tracker.image_handle(link.resource.id),
                    aspect: link.aspect,
                    attachment_layout: link.layout,
                    layers: vec![link.layout; link.layer_count as usize],
                },
            );
        }
    }

    /// Intercepts an access to an attachment under per-layer tracking.
    /// Transitions exactly the touched layer runs, with conservative
    /// all-commands scopes, and leaves the whole-image tracker state at the
    /// attachment layout.
    fn layer_tracking_update(&mut self, link: &Link) -> bool {
        let Some(tracked) = self.layered.get_mut(&link.resource.id) else {
            return false;
        };
        let barriers = &mut self.image_barriers;

        let base = link.base_layer as usize;
        let end = if link.layer_count == vk::REMAINING_ARRAY_LAYERS {
            tracked.layers.len()
        } else {
            (base + link.layer_count as usize).min(tracked.layers.len())
        };

        let mut layer = base;
        while layer < end {
            let old_layout = tracked.layers[layer];
            let run_start = layer;
            while layer < end && tracked.layers[layer] == old_layout {
                layer += 1;
            }
            if old_layout == link.layout {
                continue;
            }
            barriers.push(layered_barrier(
                tracked.image,
                tracked.aspect,
                old_layout,
                link.layout,
                run_start as u32,
                (layer - run_start) as u32,
            ));
            for slot in &mut tracked.layers[run_start..layer] {
                *slot = link.layout;
            }
        }
        true
    }

    /// Returns every tracked layer to its attachment layout. Runs when the
    /// scope suspends or ends, so non-render work and later whole-image
    /// barriers see consistent state.
    fn restore_layered_layouts(&mut self, stream: &mut impl CommandStream) {
        let mut barriers: SmallVec<[ImageBarrier; 4]> = SmallVec::new();
        for tracked in self.layered.values_mut() {
            let count = tracked.layers.len();
            let mut layer = 0;
            while layer < count {
                let old_layout = tracked.layers[layer];
                let run_start = layer;
                while layer < count && tracked.layers[layer] == old_layout {
                    layer += 1;
                }
                if old_layout == tracked.attachment_layout {
                    continue;
                }
                barriers.push(layered_barrier(
                    tracked.image,
                    tracked.aspect,
                    old_layout,
                    tracked.attachment_layout,
                    run_start as u32,
                    (layer - run_start) as u32,
                ));
                for slot in &mut tracked.layers[run_start..layer] {
                    *slot = tracked.attachment_layout;
                }
            }
        }
        if !barriers.is_empty() {
            stream.pipeline_barrier(&[], &barriers);
        }
    }

    /// Emit only the debug label transitions between the previous node's
    /// stack and this node's stack: pop to the common prefix, then push the
    /// rest.
    fn activate_debug_labels(
        &mut self,
        graph: &RenderGraph,
        stream: &mut impl CommandStream,
        handle: NodeHandle,
    ) {
        let target = graph.debug.node_stack(handle.0);
        let common = self
            .active_labels
            .iter()
            .zip(target)
            .take_while(|(active, wanted)| active.as_str() == wanted.as_str())
            .count();
        while self.active_labels.len() > common {
            stream.end_debug_label();
            self.active_labels.pop();
        }
        for name in &target[common..] {
            stream.begin_debug_label(name);
            self.active_labels.push(name.clone());
        }
    }
}

fn layered_barrier(
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    base_array_layer: u32,
    layer_count: u32,
) -> ImageBarrier {
    ImageBarrier {
        image,
        src_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
        src_access: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        dst_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
        dst_access: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        old_layout,
        new_layout,
        aspect,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer,
        layer_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::{BufferAccess, ResourceAccessInfo};
    use crate::nodes::{
        BeginRendering, Dispatch, Draw, EndRendering, GraphicsState, PipelineBinding,
        Synchronization, UpdateBuffer,
    };
    use crate::scheduler::Scheduler;
    use crate::testing::{buffer, image, Call, RecordingStream};
    use basalt_rhi::vk::Handle;
    use basalt_rhi::RenderingAttachment;

    fn build(graph: &mut RenderGraph) -> RecordingStream {
        let mut stream = RecordingStream::new();
        let nodes = Scheduler::new().select_nodes_for_buffer(graph, buffer(0));
        CommandBuilder::new()
            .build_nodes(graph, &mut stream, &nodes)
            .unwrap();
        stream
    }

    fn update(buf: vk::Buffer) -> UpdateBuffer {
        UpdateBuffer {
            buffer: buf,
            offset: 0,
            data: vec![0xAB; 4],
        }
    }

    fn dispatch_read(buf: vk::Buffer) -> Dispatch {
        Dispatch {
            pipeline: PipelineBinding::new(
                vk::PipelineBindPoint::COMPUTE,
                vk::Pipeline::from_raw(90),
                vk::PipelineLayout::from_raw(91),
            ),
            resources: ResourceAccessInfo {
                buffers: vec![BufferAccess {
                    buffer: buf,
                    access: vk::AccessFlags2::SHADER_STORAGE_READ,
                }],
                images: vec![],
            },
            group_count: [1, 1, 1],
        }
    }

    fn begin_rendering(img: vk::Image, layer_count: u32) -> BeginRendering {
        let mut info = RenderingBegin::new(
            vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: 16,
                    height: 16,
                },
            },
            layer_count,
        );
        info.color_attachments.push(RenderingAttachment {
            image: img,
            image_view: vk::ImageView::from_raw(2),
            image_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: vk::ClearValue::default(),
        });
        BeginRendering::new(info)
    }

    fn draw() -> Draw {
        let mut state = GraphicsState::new(PipelineBinding::new(
            vk::PipelineBindPoint::GRAPHICS,
            vk::Pipeline::from_raw(70),
            vk::PipelineLayout::from_raw(71),
        ));
        state.vertex_buffers.push(crate::nodes::VertexBufferBinding {
            buffer: buffer(60),
            offset: 0,
        });
        state.viewport = Some(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: 16.0,
            height: 16.0,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        Draw {
            state,
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    fn barrier_count(stream: &RecordingStream) -> usize {
        stream.count(|call| matches!(call, Call::PipelineBarrier { .. }))
    }

    #[test]
    fn empty_build_records_lifecycle_only() {
        let mut graph = RenderGraph::new();
        let stream = build(&mut graph);
        assert!(matches!(
            &stream.calls[..],
            [Call::BeginRecording, Call::EndRecording]
        ));
    }

    #[test]
    fn covered_read_emits_no_second_barrier() {
        let buf = buffer(1);
        let mut graph = RenderGraph::new();
        graph.add_node(update(buf));
        graph.add_node(dispatch_read(buf));
        graph.add_node(dispatch_read(buf));

        let stream = build(&mut graph);
        assert_eq!(barrier_count(&stream), 1);
        let Some(Call::PipelineBarrier { buffers, .. }) = stream
            .calls
            .iter()
            .find(|call| matches!(call, Call::PipelineBarrier { .. }))
        else {
            panic!("missing barrier");
        };
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(buffers[0].dst_access, vk::AccessFlags2::SHADER_STORAGE_READ);
    }

    #[test]
    fn writes_always_fence() {
        let buf = buffer(1);
        let mut graph = RenderGraph::new();
        graph.add_node(update(buf));
        graph.add_node(update(buf));
        graph.add_node(update(buf));

        let stream = build(&mut graph);
        // the first write hits an untracked buffer and needs no fence
        assert_eq!(barrier_count(&stream), 2);
    }

    #[test]
    fn first_read_waits_on_nothing() {
        let mut graph = RenderGraph::new();
        graph.add_node(dispatch_read(buffer(1)));

        let stream = build(&mut graph);
        assert_eq!(barrier_count(&stream), 1);
        let Some(Call::PipelineBarrier { buffers, .. }) = stream
            .calls
            .iter()
            .find(|call| matches!(call, Call::PipelineBarrier { .. }))
        else {
            panic!("missing barrier");
        };
        assert_eq!(buffers[0].src_stage, vk::PipelineStageFlags2::NONE);
        assert_eq!(buffers[0].src_access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn uninterrupted_scope_begins_once() {
        let mut graph = RenderGraph::new();
        graph.add_node(begin_rendering(image(1), 1));
        graph.add_node(draw());
        graph.add_node(draw());
        graph.add_node(EndRendering);

        let stream = build(&mut graph);
        let begins: Vec<vk::RenderingFlags> = stream
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::BeginRendering { flags, .. } => Some(*flags),
                _ => None,
            })
            .collect();
        assert_eq!(begins, [vk::RenderingFlags::empty()]);
        assert_eq!(stream.count(|call| matches!(call, Call::EndRendering)), 1);
        assert_eq!(stream.count(|call| matches!(call, Call::Draw)), 2);

        // identical state binds once
        assert_eq!(stream.count(|call| matches!(call, Call::BindPipeline(_))), 1);
        assert_eq!(
            stream.count(|call| matches!(call, Call::BindVertexBuffers(_))),
            1
        );
        assert_eq!(stream.count(|call| matches!(call, Call::SetViewport)), 1);
    }

    #[test]
    fn interrupting_work_suspends_and_resumes_the_scope() {
        let buf = buffer(1);
        let mut graph = RenderGraph::new();
        graph.add_node(update(buf));
        graph.add_node(begin_rendering(image(1), 1));
        graph.add_node(draw());
        graph.add_node(dispatch_read(buf));
        graph.add_node(draw());
        graph.add_node(EndRendering);

        let stream = build(&mut graph);
        let begins: Vec<vk::RenderingFlags> = stream
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::BeginRendering { flags, .. } => Some(*flags),
                _ => None,
            })
            .collect();
        assert_eq!(
            begins,
            [vk::RenderingFlags::SUSPENDING, vk::RenderingFlags::RESUMING]
        );
        assert_eq!(stream.count(|call| matches!(call, Call::EndRendering)), 2);

        // the compute read is fenced between suspension and resumption
        let suspend = stream
            .position(|call| matches!(call, Call::EndRendering))
            .unwrap();
        let resume = stream
            .position(|call| {
                matches!(
                    call,
                    Call::BeginRendering { flags, .. } if flags.contains(vk::RenderingFlags::RESUMING)
                )
            })
            .unwrap();
        let dispatch_barrier = stream
            .position(|call| {
                matches!(
                    call,
                    Call::PipelineBarrier { buffers, .. }
                        if buffers.first().is_some_and(|b| b.buffer == buf
                            && b.dst_access == vk::AccessFlags2::SHADER_STORAGE_READ)
                )
            })
            .unwrap();
        assert!(suspend < dispatch_barrier && dispatch_barrier < resume);

        // barriers never land inside an open rendering scope
        let mut inside = false;
        for call in &stream.calls {
            match call {
                Call::BeginRendering { .. } => inside = true,
                Call::EndRendering => inside = false,
                Call::PipelineBarrier { .. } => assert!(!inside),
                _ => {}
            }
        }
    }

    #[test]
    fn layered_attachment_transitions_stay_per_layer() {
        let img = image(1);
        let mut graph = RenderGraph::new();
        graph.add_node(begin_rendering(img, 2));
        graph.add_node(draw());
        graph.add_node(Synchronization {
            image: img,
            access: vk::AccessFlags2::SHADER_SAMPLED_READ,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            aspect: vk::ImageAspectFlags::COLOR,
            base_layer: 1,
            layer_count: 1,
        });
        graph.add_node(draw());
        graph.add_node(EndRendering);

        let stream = build(&mut graph);
        let barriers = stream.image_barriers();
        assert_eq!(barriers.len(), 3);

        // entering the scope transitions the whole attachment
        assert_eq!(barriers[0].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barriers[0].layer_count, 2);

        // the interleaved transition and its restore only touch layer 1
        assert_eq!(barriers[1].base_array_layer, 1);
        assert_eq!(barriers[1].layer_count, 1);
        assert_eq!(barriers[1].new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barriers[2].base_array_layer, 1);
        assert_eq!(barriers[2].layer_count, 1);
        assert_eq!(barriers[2].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        // the restore happens after the scope closed
        let last_end = stream.calls.len()
            - 1
            - stream
                .calls
                .iter()
                .rev()
                .position(|call| matches!(call, Call::EndRendering))
                .unwrap();
        let restore = stream
            .position(|call| {
                matches!(
                    call,
                    Call::PipelineBarrier { images, .. }
                        if images.first().is_some_and(|b| b.base_array_layer == 1
                            && b.new_layout == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                )
            })
            .unwrap();
        assert!(restore > last_end);
    }

    #[test]
    fn debug_labels_transition_through_the_common_prefix() {
        let mut graph = RenderGraph::new();
        graph.push_debug_group("Frame");
        graph.push_debug_group("Shadows");
        graph.add_node(update(buffer(1)));
        graph.pop_debug_group();
        graph.push_debug_group("Opaque");
        graph.add_node(update(buffer(2)));
        graph.pop_debug_group();
        graph.pop_debug_group();
        graph.add_node(update(buffer(3)));

        let stream = build(&mut graph);
        let labels: Vec<Option<&str>> = stream
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::BeginDebugLabel(name) => Some(Some(name.as_str())),
                Call::EndDebugLabel => Some(None),
                _ => None,
            })
            .collect();
        assert_eq!(
            labels,
            [
                Some("Frame"),
                Some("Shadows"),
                None,
                Some("Opaque"),
                None,
                None,
            ]
        );
    }

    #[test]
    fn dangling_debug_labels_are_closed() {
        let mut graph = RenderGraph::new();
        graph.push_debug_group("Frame");
        graph.add_node(update(buffer(1)));

        let stream = build(&mut graph);
        assert_eq!(
            stream.count(|call| matches!(call, Call::BeginDebugLabel(_))),
            stream.count(|call| matches!(call, Call::EndDebugLabel))
        );
    }
}
