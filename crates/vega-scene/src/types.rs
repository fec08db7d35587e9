//! Shared scene-side value types.

use glam::Mat4;

use vega_gpu::{MaterialId, MeshElementId, ShaderProgramId, VertexFormatId};

/// Stable index of a primitive in the scene's sparse array, valid for the
/// primitive's attached lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimitiveId(pub u32);

impl PrimitiveId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable index of a registered static mesh element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticMeshId(pub u32);

impl StaticMeshId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Coarse back-to-front rendering buckets. Passes run to completion for one
/// group before the next group starts, which guarantees draw order across
/// unrelated passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DepthPriorityGroup {
    Background,
    World,
    Foreground,
    UiForeground,
    PostProcess,
}

impl DepthPriorityGroup {
    /// All groups, in render order.
    pub const ALL: [DepthPriorityGroup; 5] = [
        DepthPriorityGroup::Background,
        DepthPriorityGroup::World,
        DepthPriorityGroup::Foreground,
        DepthPriorityGroup::UiForeground,
        DepthPriorityGroup::PostProcess,
    ];

    pub fn index(self) -> usize {
        match self {
            DepthPriorityGroup::Background => 0,
            DepthPriorityGroup::World => 1,
            DepthPriorityGroup::Foreground => 2,
            DepthPriorityGroup::UiForeground => 3,
            DepthPriorityGroup::PostProcess => 4,
        }
    }
}

/// How a mesh's precomputed lighting is fed to the base pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LightMapKind {
    None,
    VertexDirectional,
    VertexSimple,
    TextureDirectional,
    TextureSimple,
    DynamicDirectional,
    SphericalHarmonic,
}

/// Shader programs a mesh element can be drawn with, one per pass kind.
///
/// A `None` for a pass the mesh is asked to draw in means the material lacks
/// that permutation; the draw falls back to the default material's program
/// rather than failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramSet {
    pub depth: Option<ShaderProgramId>,
    pub position_only_depth: Option<ShaderProgramId>,
    pub base_pass: Option<ShaderProgramId>,
    pub shadow_depth: Option<ShaderProgramId>,
    pub distortion: Option<ShaderProgramId>,
    pub translucency: Option<ShaderProgramId>,
    pub velocity: Option<ShaderProgramId>,
    pub hit_test: Option<ShaderProgramId>,
}

/// A precomputed draw command pushed once at attach time by a proxy's
/// `draw_static_elements`.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticMeshElement {
    pub dpg: DepthPriorityGroup,
    pub element: MeshElementId,
    pub vertex_format: VertexFormatId,
    pub material: MaterialId,
    pub light_map: LightMapKind,
    pub programs: ProgramSet,
    pub local_to_world: Mat4,
    /// Whether this element may render into the depth pre-pass.
    pub use_as_occluder: bool,
    pub casts_shadow: bool,
}

/// A draw command collected per frame from a proxy's
/// `draw_dynamic_elements`.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMeshElement {
    pub element: MeshElementId,
    pub vertex_format: VertexFormatId,
    pub material: MaterialId,
    pub programs: ProgramSet,
    pub local_to_world: Mat4,
}

/// Per-primitive-per-view classification of how a primitive must be drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewRelevance {
    /// Has precomputed static mesh elements.
    pub static_relevance: bool,
    /// Needs `draw_dynamic_elements` calls.
    pub dynamic_relevance: bool,
    pub opaque: bool,
    pub masked: bool,
    pub translucent: bool,
    pub distortion: bool,
    pub decal_static: bool,
    pub decal_dynamic: bool,
    /// Samples scene color while drawing (forces a resolve first).
    pub reads_scene_color: bool,
    /// Receives dynamic lighting.
    pub lit: bool,
    /// Blending priority among translucent primitives; lower draws first.
    pub translucency_sort_priority: i32,
}

impl ViewRelevance {
    /// True if the primitive draws in any opaque-path pass.
    pub fn has_opaque(&self) -> bool {
        self.opaque || self.masked
    }

    /// True if anything at all is drawn for this primitive.
    pub fn has_any(&self) -> bool {
        self.opaque || self.masked || self.translucent || self.distortion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dpg_all_is_render_ordered() {
        let mut previous = None;
        for (expected, dpg) in DepthPriorityGroup::ALL.iter().enumerate() {
            assert_eq!(dpg.index(), expected);
            if let Some(prev) = previous {
                assert!(*dpg > prev);
            }
            previous = Some(*dpg);
        }
    }

    #[test]
    fn test_relevance_flags() {
        let mut relevance = ViewRelevance::default();
        assert!(!relevance.has_any());
        relevance.masked = true;
        assert!(relevance.has_opaque());
        assert!(relevance.has_any());
    }
}
