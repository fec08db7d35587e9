//! Render-side primitive records.

use glam::Mat4;

use vega_math::BoxSphereBounds;
use vega_octree::OctreeElementId;

use crate::interactions::InteractionId;
use crate::proxy::PrimitiveProxy;
use crate::types::{PrimitiveId, StaticMeshId};

/// Attach-time behavior flags for a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveFlags {
    /// Casts dynamic (per-frame projected) shadows.
    pub casts_dynamic_shadow: bool,
    /// Lighting is precomputed; the primitive casts into preshadows rather
    /// than per-frame subject shadows.
    pub static_shadowing: bool,
    pub accepts_lights: bool,
    /// Skips distance culling and occlusion queries entirely.
    pub always_visible: bool,
    /// Shadows only itself, never other receivers.
    pub self_shadow_only: bool,
    /// Eligible for the depth pre-pass.
    pub use_as_occluder: bool,
    /// Static lighting is wanted but not yet built; the primitive is lit
    /// and shadowed dynamically until it is.
    pub unbuilt_static_lighting: bool,
}

impl Default for PrimitiveFlags {
    fn default() -> Self {
        Self {
            casts_dynamic_shadow: false,
            static_shadowing: false,
            accepts_lights: true,
            always_visible: false,
            self_shadow_only: false,
            use_as_occluder: false,
            unbuilt_static_lighting: false,
        }
    }
}

/// Persistent record for one attached primitive.
pub struct PrimitiveSceneInfo {
    pub id: PrimitiveId,
    pub proxy: Box<dyn PrimitiveProxy>,
    pub bounds: BoxSphereBounds,
    pub local_to_world: Mat4,
    pub flags: PrimitiveFlags,
    pub min_draw_distance: f32,
    /// Culling limit; primitives at exactly this distance are culled.
    /// Substituted with a large sentinel when the descriptor said 0.
    pub max_draw_distance: f32,
    pub shadow_parent: Option<PrimitiveId>,
    /// Valid iff the primitive is currently in the octree.
    pub octree_id: Option<OctreeElementId>,
    /// Ids of this primitive's registered static mesh elements.
    pub static_meshes: Vec<StaticMeshId>,
    /// Head of the interaction list for lights affecting this primitive.
    pub interaction_head: Option<InteractionId>,
    /// Set by the renderer when the primitive was last definitely
    /// unoccluded; drives shadow fading and external streaming decisions.
    pub last_render_time: f32,
    /// Last time the primitive entered or left the visible set, for
    /// time-based modulated shadow fading.
    pub last_visibility_change_time: f32,
    /// Persisted fade percent so modulated shadows resume mid-fade when
    /// visibility flips quickly.
    pub mod_shadow_start_fade_in_percent: f32,
    pub mod_shadow_start_fade_out_percent: f32,
}

/// Stand-in for "no configured draw distance limit".
pub(crate) const UNLIMITED_DRAW_DISTANCE: f32 = 1.0e9;

impl PrimitiveSceneInfo {
    pub fn new(
        id: PrimitiveId,
        proxy: Box<dyn PrimitiveProxy>,
        local_to_world: Mat4,
        flags: PrimitiveFlags,
        min_draw_distance: f32,
        max_draw_distance: f32,
        shadow_parent: Option<PrimitiveId>,
    ) -> Self {
        let bounds = proxy.bounds();
        Self {
            id,
            proxy,
            bounds,
            local_to_world,
            flags,
            min_draw_distance,
            max_draw_distance: if max_draw_distance <= 0.0 {
                UNLIMITED_DRAW_DISTANCE
            } else {
                max_draw_distance
            },
            shadow_parent,
            octree_id: None,
            static_meshes: Vec::new(),
            interaction_head: None,
            last_render_time: -1000.0,
            last_visibility_change_time: -1000.0,
            mod_shadow_start_fade_in_percent: 0.0,
            mod_shadow_start_fade_out_percent: 0.0,
        }
    }
}
