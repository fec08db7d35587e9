//! Shared fixtures for the in-crate tests.

use glam::{Mat4, Vec2, Vec3};

use vega_gpu::{MaterialId, MeshElementId, ShaderProgramId, VertexFormatId};
use vega_math::BoxSphereBounds;
use vega_scene::{
    DepthPriorityGroup, DynamicElementCollector, LightMapKind, PrimitiveProxy, ProgramSet,
    StaticElementCollector, StaticMeshElement, ViewRelevance,
};

use crate::view::ViewInit;

/// A lit opaque cube with one world-group static mesh element.
pub(crate) struct MeshProxy {
    pub bounds: BoxSphereBounds,
    pub relevance: ViewRelevance,
    pub element: StaticMeshElement,
}

impl MeshProxy {
    pub fn cube(origin: Vec3) -> Box<Self> {
        Box::new(Self {
            bounds: BoxSphereBounds::new(origin, Vec3::ONE, 1.8),
            relevance: ViewRelevance {
                static_relevance: true,
                opaque: true,
                lit: true,
                ..Default::default()
            },
            element: StaticMeshElement {
                dpg: DepthPriorityGroup::World,
                element: MeshElementId(1),
                vertex_format: VertexFormatId(1),
                material: MaterialId(7),
                light_map: LightMapKind::None,
                programs: ProgramSet {
                    base_pass: Some(ShaderProgramId(100)),
                    depth: Some(ShaderProgramId(101)),
                    ..Default::default()
                },
                local_to_world: Mat4::from_translation(origin),
                use_as_occluder: true,
                casts_shadow: true,
            },
        })
    }
}

impl PrimitiveProxy for MeshProxy {
    fn bounds(&self) -> BoxSphereBounds {
        self.bounds
    }

    fn view_relevance(&self) -> ViewRelevance {
        self.relevance
    }

    fn draw_static_elements(&self, collector: &mut StaticElementCollector) {
        collector.add_mesh(self.element.clone());
    }

    fn draw_dynamic_elements(&self, _collector: &mut DynamicElementCollector, _dpg: DepthPriorityGroup) {}
}

/// A 1280x720 perspective view at the origin looking down -Z.
pub(crate) fn view_init() -> ViewInit {
    ViewInit::perspective(
        Mat4::IDENTITY,
        Mat4::perspective_rh(1.0, 16.0 / 9.0, 1.0, 100_000.0),
        Vec3::ZERO,
        Vec2::new(1280.0, 720.0),
    )
}
