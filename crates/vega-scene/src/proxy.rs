//! The boundary to the external scene graph.
//!
//! A proxy is the render-data provider a scene-graph component hands over
//! when it attaches. The renderer only ever sees proxies; component
//! internals stay on the logic side of the command channel.

use vega_math::BoxSphereBounds;

use crate::primitive::PrimitiveFlags;
use crate::types::{DepthPriorityGroup, DynamicMeshElement, PrimitiveId, StaticMeshElement, ViewRelevance};

/// Render-data provider for one attached primitive.
///
/// Proxies cross the command channel by value, so they must be `Send`; after
/// that they are owned and used exclusively by the render thread.
pub trait PrimitiveProxy: Send {
    /// Current world-space bounds.
    fn bounds(&self) -> BoxSphereBounds;

    /// How this primitive must be drawn.
    fn view_relevance(&self) -> ViewRelevance;

    /// Push precomputed mesh-draw descriptors. Called once at attach time.
    fn draw_static_elements(&self, collector: &mut StaticElementCollector);

    /// Push this frame's dynamic mesh elements for one depth priority group.
    /// Called per visible dynamic primitive per pass that needs it.
    fn draw_dynamic_elements(&self, collector: &mut DynamicElementCollector, dpg: DepthPriorityGroup);
}

/// Attach-time description of a primitive, alongside its proxy.
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveDescriptor {
    pub flags: PrimitiveFlags,
    pub min_draw_distance: f32,
    /// 0 means unlimited.
    pub max_draw_distance: f32,
    /// Primitives with a shadow parent merge into the parent's shadow group
    /// and never cast an independent per-primitive shadow.
    pub shadow_parent: Option<PrimitiveId>,
}

impl Default for PrimitiveDescriptor {
    fn default() -> Self {
        Self {
            flags: PrimitiveFlags::default(),
            min_draw_distance: 0.0,
            max_draw_distance: 0.0,
            shadow_parent: None,
        }
    }
}

/// Receives static mesh elements from `draw_static_elements`.
#[derive(Debug, Default)]
pub struct StaticElementCollector {
    elements: Vec<StaticMeshElement>,
}

impl StaticElementCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, element: StaticMeshElement) {
        self.elements.push(element);
    }

    pub fn into_elements(self) -> Vec<StaticMeshElement> {
        self.elements
    }
}

/// Receives dynamic mesh elements from `draw_dynamic_elements`.
#[derive(Debug, Default)]
pub struct DynamicElementCollector {
    elements: Vec<DynamicMeshElement>,
}

impl DynamicElementCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, element: DynamicMeshElement) {
        self.elements.push(element);
    }

    pub fn elements(&self) -> &[DynamicMeshElement] {
        &self.elements
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }
}
