//! The drawing-policy sum type.

use glam::Mat4;

use vega_gpu::{
    BlendState, CommandSink, DepthState, InstanceConstants, MaterialId, MeshElementId,
    RasterizerState, ShaderProgramId, VertexFormatId,
};
use vega_scene::{LightMapKind, StaticMeshElement};

/// Material every draw can fall back to when the real material lacks the
/// required shader permutation.
pub const DEFAULT_MATERIAL: MaterialId = MaterialId(0);

/// Pass tags for fallback program lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Depth = 1,
    PositionOnlyDepth,
    BasePass,
    ShadowDepth,
    ShadowVolume,
    Distortion,
    Translucency,
    Velocity,
    HitTest,
}

/// The default material's program for a pass. The default material carries
/// every permutation, so this never fails.
pub fn fallback_program(pass: Pass) -> ShaderProgramId {
    ShaderProgramId(pass as u64)
}

/// Batching key for one mesh in one pass.
///
/// `Matches` (structural equality) compares bound program identities, never
/// material contents; two meshes with equal policies can share one
/// shared-state bind. The closed variant set covers every pass the renderer
/// issues mesh draws in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPolicy {
    DepthOnly {
        vertex_format: VertexFormatId,
        program: ShaderProgramId,
    },
    /// Depth-only with a position-only vertex stream, for static occluders.
    PositionOnlyDepth {
        vertex_format: VertexFormatId,
        program: ShaderProgramId,
    },
    BasePass {
        vertex_format: VertexFormatId,
        program: ShaderProgramId,
        material: MaterialId,
        light_map: LightMapKind,
    },
    ShadowDepth {
        vertex_format: VertexFormatId,
        program: ShaderProgramId,
    },
    ShadowVolume {
        vertex_format: VertexFormatId,
        program: ShaderProgramId,
    },
    Distortion {
        vertex_format: VertexFormatId,
        program: ShaderProgramId,
        material: MaterialId,
    },
    Translucency {
        vertex_format: VertexFormatId,
        program: ShaderProgramId,
        material: MaterialId,
    },
    Velocity {
        vertex_format: VertexFormatId,
        program: ShaderProgramId,
    },
    HitTest {
        vertex_format: VertexFormatId,
        program: ShaderProgramId,
    },
}

impl DrawPolicy {
    // --- Constructors from a static mesh element, with default-material
    // fallback when the permutation is missing. ---

    pub fn depth_for(element: &StaticMeshElement) -> Self {
        DrawPolicy::DepthOnly {
            vertex_format: element.vertex_format,
            program: element.programs.depth.unwrap_or_else(|| fallback_program(Pass::Depth)),
        }
    }

    /// `None` if the mesh has no position-only stream.
    pub fn position_only_depth_for(element: &StaticMeshElement) -> Option<Self> {
        element.programs.position_only_depth.map(|program| DrawPolicy::PositionOnlyDepth {
            vertex_format: element.vertex_format,
            program,
        })
    }

    pub fn base_pass_for(element: &StaticMeshElement) -> Self {
        match element.programs.base_pass {
            Some(program) => DrawPolicy::BasePass {
                vertex_format: element.vertex_format,
                program,
                material: element.material,
                light_map: element.light_map,
            },
            None => DrawPolicy::BasePass {
                vertex_format: element.vertex_format,
                program: fallback_program(Pass::BasePass),
                material: DEFAULT_MATERIAL,
                light_map: LightMapKind::None,
            },
        }
    }

    pub fn shadow_depth_for(element: &StaticMeshElement) -> Self {
        DrawPolicy::ShadowDepth {
            vertex_format: element.vertex_format,
            program: element
                .programs
                .shadow_depth
                .unwrap_or_else(|| fallback_program(Pass::ShadowDepth)),
        }
    }

    pub fn shadow_volume_for(vertex_format: VertexFormatId) -> Self {
        DrawPolicy::ShadowVolume {
            vertex_format,
            program: fallback_program(Pass::ShadowVolume),
        }
    }

    pub fn distortion_for(element: &StaticMeshElement) -> Self {
        match element.programs.distortion {
            Some(program) => DrawPolicy::Distortion {
                vertex_format: element.vertex_format,
                program,
                material: element.material,
            },
            None => DrawPolicy::Distortion {
                vertex_format: element.vertex_format,
                program: fallback_program(Pass::Distortion),
                material: DEFAULT_MATERIAL,
            },
        }
    }

    pub fn translucency_for(element: &StaticMeshElement) -> Self {
        match element.programs.translucency {
            Some(program) => DrawPolicy::Translucency {
                vertex_format: element.vertex_format,
                program,
                material: element.material,
            },
            None => DrawPolicy::Translucency {
                vertex_format: element.vertex_format,
                program: fallback_program(Pass::Translucency),
                material: DEFAULT_MATERIAL,
            },
        }
    }

    pub fn velocity_for(element: &StaticMeshElement) -> Self {
        DrawPolicy::Velocity {
            vertex_format: element.vertex_format,
            program: element
                .programs
                .velocity
                .unwrap_or_else(|| fallback_program(Pass::Velocity)),
        }
    }

    pub fn hit_test_for(element: &StaticMeshElement) -> Self {
        DrawPolicy::HitTest {
            vertex_format: element.vertex_format,
            program: element
                .programs
                .hit_test
                .unwrap_or_else(|| fallback_program(Pass::HitTest)),
        }
    }

    /// Structural equality for batching.
    pub fn matches(&self, other: &DrawPolicy) -> bool {
        self == other
    }

    pub fn vertex_format(&self) -> VertexFormatId {
        match *self {
            DrawPolicy::DepthOnly { vertex_format, .. }
            | DrawPolicy::PositionOnlyDepth { vertex_format, .. }
            | DrawPolicy::BasePass { vertex_format, .. }
            | DrawPolicy::ShadowDepth { vertex_format, .. }
            | DrawPolicy::ShadowVolume { vertex_format, .. }
            | DrawPolicy::Distortion { vertex_format, .. }
            | DrawPolicy::Translucency { vertex_format, .. }
            | DrawPolicy::Velocity { vertex_format, .. }
            | DrawPolicy::HitTest { vertex_format, .. } => vertex_format,
        }
    }

    pub fn program(&self) -> ShaderProgramId {
        match *self {
            DrawPolicy::DepthOnly { program, .. }
            | DrawPolicy::PositionOnlyDepth { program, .. }
            | DrawPolicy::BasePass { program, .. }
            | DrawPolicy::ShadowDepth { program, .. }
            | DrawPolicy::ShadowVolume { program, .. }
            | DrawPolicy::Distortion { program, .. }
            | DrawPolicy::Translucency { program, .. }
            | DrawPolicy::Velocity { program, .. }
            | DrawPolicy::HitTest { program, .. } => program,
        }
    }

    fn material(&self) -> MaterialId {
        match *self {
            DrawPolicy::BasePass { material, .. }
            | DrawPolicy::Distortion { material, .. }
            | DrawPolicy::Translucency { material, .. } => material,
            _ => DEFAULT_MATERIAL,
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            DrawPolicy::DepthOnly { .. } => 0,
            DrawPolicy::PositionOnlyDepth { .. } => 1,
            DrawPolicy::BasePass { .. } => 2,
            DrawPolicy::ShadowDepth { .. } => 3,
            DrawPolicy::ShadowVolume { .. } => 4,
            DrawPolicy::Distortion { .. } => 5,
            DrawPolicy::Translucency { .. } => 6,
            DrawPolicy::Velocity { .. } => 7,
            DrawPolicy::HitTest { .. } => 8,
        }
    }

    fn light_map_rank(&self) -> u8 {
        match self {
            DrawPolicy::BasePass { light_map, .. } => *light_map as u8,
            _ => 0,
        }
    }

    /// Total-order key: cheap state (vertex format) outermost, then
    /// program, then material identity.
    fn sort_key(&self) -> (u8, VertexFormatId, ShaderProgramId, MaterialId, u8) {
        (
            self.variant_rank(),
            self.vertex_format(),
            self.program(),
            self.material(),
            self.light_map_rank(),
        )
    }

    /// Bind the once-per-policy state for a batch of draws.
    pub fn set_shared_state(&self, sink: &mut dyn CommandSink) {
        let (depth, blend) = match self {
            DrawPolicy::DepthOnly { .. }
            | DrawPolicy::PositionOnlyDepth { .. }
            | DrawPolicy::ShadowDepth { .. }
            | DrawPolicy::HitTest { .. } => (DepthState::ReadWrite, BlendState::Opaque),
            DrawPolicy::BasePass { .. } => (DepthState::ReadWrite, BlendState::Opaque),
            DrawPolicy::ShadowVolume { .. } => (DepthState::ReadOnly, BlendState::Modulate),
            DrawPolicy::Distortion { .. } | DrawPolicy::Translucency { .. } => {
                (DepthState::ReadOnly, BlendState::Translucent)
            }
            DrawPolicy::Velocity { .. } => (DepthState::ReadOnly, BlendState::Opaque),
        };
        sink.set_depth_state(depth);
        sink.set_blend_state(blend);
        sink.set_rasterizer_state(RasterizerState::Solid);
        sink.set_shared_state(self.program(), self.vertex_format());
    }

    /// Bind per-draw state and submit one mesh element.
    pub fn draw(
        &self,
        sink: &mut dyn CommandSink,
        element: MeshElementId,
        material: MaterialId,
        local_to_world: Mat4,
    ) {
        sink.draw_mesh(element, material, InstanceConstants::new(local_to_world));
    }
}

impl PartialOrd for DrawPolicy {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DrawPolicy {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vega_gpu::RecordingSink;
    use vega_scene::{DepthPriorityGroup, ProgramSet};

    fn element(vertex_format: u64, base_program: Option<u64>, material: u64) -> StaticMeshElement {
        StaticMeshElement {
            dpg: DepthPriorityGroup::World,
            element: MeshElementId(1),
            vertex_format: VertexFormatId(vertex_format),
            material: MaterialId(material),
            light_map: LightMapKind::TextureDirectional,
            programs: ProgramSet {
                base_pass: base_program.map(ShaderProgramId),
                ..Default::default()
            },
            local_to_world: Mat4::IDENTITY,
            use_as_occluder: true,
            casts_shadow: true,
        }
    }

    #[test]
    fn test_matches_compares_program_identity() {
        let a = DrawPolicy::base_pass_for(&element(1, Some(10), 5));
        let b = DrawPolicy::base_pass_for(&element(1, Some(10), 5));
        let c = DrawPolicy::base_pass_for(&element(1, Some(11), 5));
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_ordering_puts_vertex_format_outermost() {
        let mut policies = vec![
            DrawPolicy::base_pass_for(&element(2, Some(10), 5)),
            DrawPolicy::base_pass_for(&element(1, Some(99), 5)),
            DrawPolicy::base_pass_for(&element(1, Some(10), 5)),
        ];
        policies.sort_unstable();
        assert_eq!(policies[0].vertex_format(), VertexFormatId(1));
        assert_eq!(policies[1].vertex_format(), VertexFormatId(1));
        assert_eq!(policies[2].vertex_format(), VertexFormatId(2));
        assert!(policies[0].program() < policies[1].program());
    }

    #[test]
    fn test_missing_permutation_falls_back_to_default_material() {
        let policy = DrawPolicy::base_pass_for(&element(1, None, 5));
        match policy {
            DrawPolicy::BasePass { program, material, .. } => {
                assert_eq!(program, fallback_program(Pass::BasePass));
                assert_eq!(material, DEFAULT_MATERIAL);
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }

    #[test]
    fn test_depth_sort_precedes_base_pass() {
        let depth = DrawPolicy::depth_for(&element(9, Some(10), 5));
        let base = DrawPolicy::base_pass_for(&element(1, Some(10), 5));
        assert!(depth < base);
    }

    #[test]
    fn test_shared_state_binds_program_and_format() {
        let mut sink = RecordingSink::new();
        let policy = DrawPolicy::base_pass_for(&element(3, Some(10), 5));
        policy.set_shared_state(&mut sink);
        assert_eq!(sink.shared_state_count(), 1);
    }
}
