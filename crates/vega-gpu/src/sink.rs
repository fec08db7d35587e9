//! The ordered command stream consumed by the graphics device.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::queries::OcclusionQueryId;
use crate::targets::RenderTargetId;

/// Identity of a compiled shader program, as issued by the device layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShaderProgramId(pub u64);

/// Identity of a vertex declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexFormatId(pub u64);

/// Identity of a material's bound parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialId(pub u64);

/// Identity of one drawable mesh element (a vertex/index range the device
/// owns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshElementId(pub u64);

/// Depth unit state for the next draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthState {
    Disabled,
    ReadOnly,
    ReadWrite,
}

/// Blend unit state for the next draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendState {
    Opaque,
    Masked,
    Translucent,
    Additive,
    /// Destination-color multiply, used by modulated shadow projection.
    Modulate,
}

/// Rasterizer state for the next draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterizerState {
    Solid,
    SolidNoCull,
    TwoSided,
}

/// Per-draw constants uploaded alongside each mesh draw.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct InstanceConstants {
    pub local_to_world: [[f32; 4]; 4],
}

impl InstanceConstants {
    pub fn new(local_to_world: Mat4) -> Self {
        Self {
            local_to_world: local_to_world.to_cols_array_2d(),
        }
    }
}

/// Ordered command-sink interface to the graphics device.
///
/// Submission order is the only synchronization contract: a resolve issued
/// before a read is observed as such by the device.
pub trait CommandSink {
    /// Bind color and depth surfaces for subsequent draws.
    fn set_render_target(&mut self, color: Option<RenderTargetId>, depth: Option<RenderTargetId>);
    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);
    /// `None` disables the scissor test.
    fn set_scissor(&mut self, rect: Option<(u32, u32, u32, u32)>);
    fn set_depth_state(&mut self, state: DepthState);
    fn set_blend_state(&mut self, state: BlendState);
    fn set_rasterizer_state(&mut self, state: RasterizerState);
    /// Bind once-per-policy state: the shader program and vertex declaration
    /// shared by a batch of draws.
    fn set_shared_state(&mut self, program: ShaderProgramId, vertex_format: VertexFormatId);
    /// Bind per-draw state and submit one mesh element.
    fn draw_mesh(&mut self, element: MeshElementId, material: MaterialId, constants: InstanceConstants);
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>);
    /// Copy a renderable surface into its readable texture.
    fn resolve(&mut self, target: RenderTargetId);
    fn begin_occlusion_query(&mut self, query: OcclusionQueryId);
    fn end_occlusion_query(&mut self, query: OcclusionQueryId);
    /// Non-blocking poll. `Some(pixels)` once the result has landed, `None`
    /// while it is still in flight.
    fn poll_occlusion_query(&mut self, query: OcclusionQueryId) -> Option<u64>;
    /// Present a resolved target to the viewport.
    fn present(&mut self, source: RenderTargetId);
}

/// Everything a [`RecordingSink`] remembers about one sink call.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCommand {
    SetRenderTarget {
        color: Option<RenderTargetId>,
        depth: Option<RenderTargetId>,
    },
    SetViewport(u32, u32, u32, u32),
    SetScissor(Option<(u32, u32, u32, u32)>),
    SetDepthState(DepthState),
    SetBlendState(BlendState),
    SetRasterizerState(RasterizerState),
    SetSharedState {
        program: ShaderProgramId,
        vertex_format: VertexFormatId,
    },
    DrawMesh {
        element: MeshElementId,
        material: MaterialId,
        constants: InstanceConstants,
    },
    Clear {
        color: Option<[f32; 4]>,
        depth: Option<f32>,
    },
    Resolve(RenderTargetId),
    BeginOcclusionQuery(OcclusionQueryId),
    EndOcclusionQuery(OcclusionQueryId),
    Present(RenderTargetId),
}

/// A [`CommandSink`] that records the command stream instead of submitting
/// it, with scriptable occlusion query results.
#[derive(Debug, Default)]
pub struct RecordingSink {
    commands: Vec<SinkCommand>,
    query_results: FxHashMap<OcclusionQueryId, u64>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full recorded stream, in submission order.
    pub fn commands(&self) -> &[SinkCommand] {
        &self.commands
    }

    /// Number of mesh draws recorded so far.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, SinkCommand::DrawMesh { .. }))
            .count()
    }

    /// Number of shared-state binds recorded so far.
    pub fn shared_state_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, SinkCommand::SetSharedState { .. }))
            .count()
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Script the pixel count a query will report once polled.
    pub fn complete_query(&mut self, query: OcclusionQueryId, pixels: u64) {
        self.query_results.insert(query, pixels);
    }
}

impl CommandSink for RecordingSink {
    fn set_render_target(&mut self, color: Option<RenderTargetId>, depth: Option<RenderTargetId>) {
        self.commands.push(SinkCommand::SetRenderTarget { color, depth });
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.commands.push(SinkCommand::SetViewport(x, y, width, height));
    }

    fn set_scissor(&mut self, rect: Option<(u32, u32, u32, u32)>) {
        self.commands.push(SinkCommand::SetScissor(rect));
    }

    fn set_depth_state(&mut self, state: DepthState) {
        self.commands.push(SinkCommand::SetDepthState(state));
    }

    fn set_blend_state(&mut self, state: BlendState) {
        self.commands.push(SinkCommand::SetBlendState(state));
    }

    fn set_rasterizer_state(&mut self, state: RasterizerState) {
        self.commands.push(SinkCommand::SetRasterizerState(state));
    }

    fn set_shared_state(&mut self, program: ShaderProgramId, vertex_format: VertexFormatId) {
        self.commands.push(SinkCommand::SetSharedState {
            program,
            vertex_format,
        });
    }

    fn draw_mesh(
        &mut self,
        element: MeshElementId,
        material: MaterialId,
        constants: InstanceConstants,
    ) {
        self.commands.push(SinkCommand::DrawMesh {
            element,
            material,
            constants,
        });
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.commands.push(SinkCommand::Clear { color, depth });
    }

    fn resolve(&mut self, target: RenderTargetId) {
        self.commands.push(SinkCommand::Resolve(target));
    }

    fn begin_occlusion_query(&mut self, query: OcclusionQueryId) {
        self.commands.push(SinkCommand::BeginOcclusionQuery(query));
    }

    fn end_occlusion_query(&mut self, query: OcclusionQueryId) {
        self.commands.push(SinkCommand::EndOcclusionQuery(query));
    }

    fn poll_occlusion_query(&mut self, query: OcclusionQueryId) -> Option<u64> {
        self.query_results.get(&query).copied()
    }

    fn present(&mut self, source: RenderTargetId) {
        self.commands.push(SinkCommand::Present(source));
    }
}
