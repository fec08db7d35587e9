//! Per-frame view state.
//!
//! A [`View`] is rebuilt every frame from a [`ViewInit`]; everything in it is
//! frame-scoped and dropped at frame end. Persistent cross-frame state
//! (occlusion history, previous camera) lives in
//! [`crate::occlusion::ViewState`].

use glam::{Mat4, Vec2, Vec3};
use rustc_hash::FxHashSet;

use vega_math::{BoxSphereBounds, ConvexVolume, frustum_from_matrix, screen_radius};
use vega_scene::{Bitset, DepthPriorityGroup, LightId, PrimitiveId, Scene};

/// Frame stages, strictly ordered. A pass may only run when the view sits in
/// the stage directly before its own; skipping or re-entering a stage is an
/// internal-consistency error and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameStage {
    Uninitialized,
    BitsetsAllocated,
    PrimitivesCulled,
    LightsCulled,
    ShadowsGathered,
    Rendered,
    Finalized,
}

impl FrameStage {
    fn successor(self) -> FrameStage {
        match self {
            FrameStage::Uninitialized => FrameStage::BitsetsAllocated,
            FrameStage::BitsetsAllocated => FrameStage::PrimitivesCulled,
            FrameStage::PrimitivesCulled => FrameStage::LightsCulled,
            FrameStage::LightsCulled => FrameStage::ShadowsGathered,
            FrameStage::ShadowsGathered => FrameStage::Rendered,
            FrameStage::Rendered => FrameStage::Finalized,
            FrameStage::Finalized => panic!("frame stage cannot advance past Finalized"),
        }
    }
}

/// Camera parameters a view is built from.
#[derive(Debug, Clone)]
pub struct ViewInit {
    /// World to view space.
    pub view_matrix: Mat4,
    /// View to clip space.
    pub projection: Mat4,
    pub view_origin: Vec3,
    /// Viewport extent in pixels.
    pub size: Vec2,
    /// Orthographic views skip distance culling.
    pub is_perspective: bool,
    /// Primitives explicitly hidden for this view.
    pub hidden_primitives: FxHashSet<PrimitiveId>,
}

impl ViewInit {
    pub fn perspective(view_matrix: Mat4, projection: Mat4, view_origin: Vec3, size: Vec2) -> Self {
        Self {
            view_matrix,
            projection,
            view_origin,
            size,
            is_perspective: true,
            hidden_primitives: FxHashSet::default(),
        }
    }
}

/// Per-light visibility info for one view.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibleLightInfo {
    pub in_view_frustum: bool,
    /// Whether any visible lit primitive in each DPG interacts with this
    /// light.
    pub dpg_has_visible_lit: [bool; 5],
}

/// A translucent or distortion primitive awaiting back-to-front sorting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortedPrimitive {
    pub id: PrimitiveId,
    /// Primary sort key; lower draws first.
    pub priority: i32,
    /// View-space depth of the bounds origin; farther draws first within a
    /// priority.
    pub depth: f32,
    pub reads_scene_color: bool,
}

/// One frame's visibility and relevance state for a single camera.
pub struct View {
    pub init: ViewInit,
    pub view_projection: Mat4,
    pub frustum: ConvexVolume,
    stage: FrameStage,

    /// Indexed by primitive id.
    pub primitive_visibility: Bitset,
    /// Subset of `primitive_visibility` confirmed by an actual occlusion
    /// query result (or flagged always-visible); drives last-render-time
    /// bookkeeping.
    pub definitely_unoccluded: Bitset,
    /// Indexed by static mesh id; consumed by the static draw lists.
    pub static_mesh_visibility: Bitset,
    /// Occluder-eligible subset of `static_mesh_visibility` for the depth
    /// pre-pass.
    pub occluder_visibility: Bitset,
    /// Moved-primitive subset for the velocity pass.
    pub velocity_visibility: Bitset,

    /// Indexed by primitive id; `None` until the primitive passes culling.
    pub relevance: Vec<Option<vega_scene::ViewRelevance>>,
    pub visible_dynamic_primitives: [Vec<PrimitiveId>; 5],
    pub translucent: [Vec<SortedPrimitive>; 5],
    pub distortion: [Vec<SortedPrimitive>; 5],
    /// Indexed by light id.
    pub lights: Vec<VisibleLightInfo>,
}

impl View {
    pub fn new(init: ViewInit) -> Self {
        let view_projection = init.projection * init.view_matrix;
        let frustum = frustum_from_matrix(&view_projection);
        Self {
            init,
            view_projection,
            frustum,
            stage: FrameStage::Uninitialized,
            primitive_visibility: Bitset::new(),
            definitely_unoccluded: Bitset::new(),
            static_mesh_visibility: Bitset::new(),
            occluder_visibility: Bitset::new(),
            velocity_visibility: Bitset::new(),
            relevance: Vec::new(),
            visible_dynamic_primitives: Default::default(),
            translucent: Default::default(),
            distortion: Default::default(),
            lights: Vec::new(),
        }
    }

    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    /// Advance to the next stage, asserting the caller is running in order.
    pub fn advance_to(&mut self, stage: FrameStage) {
        assert_eq!(
            self.stage.successor(),
            stage,
            "frame stage advanced out of order from {:?}",
            self.stage
        );
        self.stage = stage;
    }

    /// Size every per-frame container to the scene's current capacities.
    pub fn allocate_bitsets(&mut self, scene: &Scene) {
        self.primitive_visibility.reset(scene.primitive_capacity());
        self.definitely_unoccluded.reset(scene.primitive_capacity());
        self.static_mesh_visibility.reset(scene.static_mesh_capacity());
        self.occluder_visibility.reset(scene.static_mesh_capacity());
        self.velocity_visibility.reset(scene.static_mesh_capacity());
        self.relevance.clear();
        self.relevance.resize(scene.primitive_capacity(), None);
        for bucket in &mut self.visible_dynamic_primitives {
            bucket.clear();
        }
        for bucket in &mut self.translucent {
            bucket.clear();
        }
        for bucket in &mut self.distortion {
            bucket.clear();
        }
        self.lights.clear();
        self.lights.resize(scene.light_capacity(), VisibleLightInfo::default());
        self.advance_to(FrameStage::BitsetsAllocated);
    }

    /// View-space depth of a world point, positive in front of the camera.
    pub fn view_depth(&self, point: Vec3) -> f32 {
        -self.init.view_matrix.transform_point3(point).z
    }

    /// Largest on-screen radius in pixels the bounds project to.
    pub fn screen_radius_of(&self, bounds: &BoxSphereBounds) -> f32 {
        let w = self.view_depth(bounds.origin);
        screen_radius(&self.init.projection, self.init.size, bounds.radius, w)
    }

    /// Screen-size gate shared by the depth pre-pass and velocity pass:
    /// true when the bounds cover more than `min_fraction` of the screen at
    /// their distance from the camera.
    pub fn passes_screen_size(&self, bounds: &BoxSphereBounds, min_fraction: f32) -> bool {
        let lod_distance = bounds.origin.distance(self.init.view_origin);
        bounds.radius * bounds.radius > (min_fraction * lod_distance).powi(2)
    }

    pub fn light_info(&self, id: LightId) -> VisibleLightInfo {
        self.lights.get(id.index()).copied().unwrap_or_default()
    }

    /// Sort the translucent and distortion sets for one DPG: priority
    /// ascending, then view depth descending (farther first).
    pub fn sort_ordered_sets(&mut self, dpg: DepthPriorityGroup) {
        let comparator = |a: &SortedPrimitive, b: &SortedPrimitive| {
            a.priority
                .cmp(&b.priority)
                .then(b.depth.partial_cmp(&a.depth).unwrap_or(std::cmp::Ordering::Equal))
        };
        self.translucent[dpg.index()].sort_by(comparator);
        self.distortion[dpg.index()].sort_by(comparator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_view() -> View {
        let projection = Mat4::perspective_rh(1.0, 16.0 / 9.0, 1.0, 10_000.0);
        View::new(ViewInit::perspective(
            Mat4::IDENTITY,
            projection,
            Vec3::ZERO,
            Vec2::new(1280.0, 720.0),
        ))
    }

    #[test]
    fn test_stage_advances_in_order() {
        let mut view = test_view();
        let scene = Scene::new(1024.0);
        view.allocate_bitsets(&scene);
        assert_eq!(view.stage(), FrameStage::BitsetsAllocated);
        view.advance_to(FrameStage::PrimitivesCulled);
        view.advance_to(FrameStage::LightsCulled);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_stage_skip_panics() {
        let mut view = test_view();
        view.advance_to(FrameStage::PrimitivesCulled);
    }

    #[test]
    fn test_view_depth_is_positive_in_front() {
        let view = test_view();
        // Camera at origin looking down -Z.
        assert!(view.view_depth(Vec3::new(0.0, 0.0, -50.0)) > 0.0);
        assert!(view.view_depth(Vec3::new(0.0, 0.0, 50.0)) < 0.0);
    }

    #[test]
    fn test_screen_radius_shrinks_with_distance() {
        let view = test_view();
        let near = BoxSphereBounds::new(Vec3::new(0.0, 0.0, -10.0), Vec3::ONE, 1.0);
        let far = BoxSphereBounds::new(Vec3::new(0.0, 0.0, -100.0), Vec3::ONE, 1.0);
        assert!(view.screen_radius_of(&near) > view.screen_radius_of(&far));
    }

    #[test]
    fn test_ordered_set_sorts_priority_then_depth() {
        let mut view = test_view();
        let dpg = DepthPriorityGroup::World;
        view.translucent[dpg.index()] = vec![
            SortedPrimitive { id: PrimitiveId(0), priority: 1, depth: 50.0, reads_scene_color: false },
            SortedPrimitive { id: PrimitiveId(1), priority: 0, depth: 10.0, reads_scene_color: false },
            SortedPrimitive { id: PrimitiveId(2), priority: 0, depth: 90.0, reads_scene_color: false },
        ];
        view.sort_ordered_sets(dpg);
        let order: Vec<u32> = view.translucent[dpg.index()].iter().map(|p| p.id.0).collect();
        // Priority 0 first; within it the farther primitive draws first.
        assert_eq!(order, vec![2, 1, 0]);
    }
}
