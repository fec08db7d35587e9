//! Render-side light records.

use glam::{Mat4, Vec3};

use vega_math::BoxSphereBounds;

use crate::interactions::InteractionId;

/// Stable index of a light in the scene's sparse array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LightId(pub u32);

impl LightId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Light source shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional { direction: Vec3 },
    Point { position: Vec3, radius: f32 },
    Spot {
        position: Vec3,
        direction: Vec3,
        radius: f32,
        outer_cone_radians: f32,
    },
    Sky,
}

/// How a light's shadows are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMode {
    None,
    /// Normal projected shadow depth buffers.
    Projected,
    /// Modulative blend onto scene color. Renders even with no visible lit
    /// primitives.
    Modulated,
    /// Modulative with receiver masking.
    ModulatedBetter,
}

impl ShadowMode {
    pub fn is_modulated(self) -> bool {
        matches!(self, ShadowMode::Modulated | ShadowMode::ModulatedBetter)
    }
}

/// Inputs to per-shadow transform construction, produced by the light for a
/// given subject.
#[derive(Debug, Clone, Copy)]
pub struct ShadowInitializer {
    /// Translation applied to world positions before `world_to_light`, so
    /// the subject sits at the light-space origin for depth precision.
    pub pre_shadow_translation: Vec3,
    /// Rotation-only basis into light space; -Z is the light direction.
    pub world_to_light: Mat4,
    /// Subject bounds after `pre_shadow_translation`.
    pub subject_bounds: BoxSphereBounds,
    /// Far limit of the receiver range behind the subject.
    pub max_distance_to_cast: f32,
    /// One shadow covering every caster on the light, instead of one per
    /// subject group.
    pub whole_scene: bool,
}

/// Receiver range used for directional lights, which have no natural far
/// limit.
const DIRECTIONAL_SHADOW_RANGE: f32 = 65_536.0;

/// Render-side record for one attached light.
#[derive(Debug, Clone)]
pub struct LightSceneInfo {
    pub id: LightId,
    pub kind: LightKind,
    pub color: Vec3,
    pub shadow_mode: ShadowMode,
    /// Seconds for the time-based modulated shadow fade; 0 disables it.
    pub mod_shadow_fadeout_time: f32,
    pub mod_shadow_fadeout_exponent: f32,
    /// Per-light overrides of the settings-file shadow resolution bounds.
    pub min_shadow_resolution: Option<u32>,
    pub max_shadow_resolution: Option<u32>,
    pub shadow_fade_resolution: Option<u32>,
    /// Heads of the interaction lists, split by whether the primitive's
    /// lighting is static.
    pub dynamic_interaction_head: Option<InteractionId>,
    pub static_interaction_head: Option<InteractionId>,
    /// Valid iff the light is currently in the light octree. Directional
    /// and sky lights are never inserted.
    pub octree_id: Option<vega_octree::OctreeElementId>,
    /// Device-side bound-state cache, created on first use and dropped on
    /// device reset.
    pub cached_device_state: Option<u64>,
}

impl LightSceneInfo {
    pub fn new(id: LightId, kind: LightKind, color: Vec3, shadow_mode: ShadowMode) -> Self {
        Self {
            id,
            kind,
            color,
            shadow_mode,
            mod_shadow_fadeout_time: 0.0,
            mod_shadow_fadeout_exponent: 3.0,
            min_shadow_resolution: None,
            max_shadow_resolution: None,
            shadow_fade_resolution: None,
            dynamic_interaction_head: None,
            static_interaction_head: None,
            octree_id: None,
            cached_device_state: None,
        }
    }

    pub fn is_directional(&self) -> bool {
        matches!(self.kind, LightKind::Directional { .. })
    }

    /// Finite bounding sphere for frustum culling; `None` for lights that
    /// affect the whole scene.
    pub fn bounding_sphere(&self) -> Option<vega_math::Sphere> {
        match self.kind {
            LightKind::Directional { .. } | LightKind::Sky => None,
            LightKind::Point { position, radius } => {
                Some(vega_math::Sphere::new(position, radius))
            }
            LightKind::Spot { position, radius, .. } => {
                Some(vega_math::Sphere::new(position, radius))
            }
        }
    }

    /// Whether this light's influence overlaps the given bounds.
    pub fn affects_bounds(&self, bounds: &BoxSphereBounds) -> bool {
        match self.bounding_sphere() {
            None => true,
            Some(sphere) => sphere.intersects(&bounds.sphere()),
        }
    }

    pub fn casts_shadows(&self) -> bool {
        self.shadow_mode != ShadowMode::None && !matches!(self.kind, LightKind::Sky)
    }

    /// Initializer for a single shadow covering every caster on this light.
    /// Only directional lights support one.
    pub fn whole_scene_shadow_initializer(
        &self,
        scene_bounds: &BoxSphereBounds,
    ) -> Option<ShadowInitializer> {
        match self.kind {
            LightKind::Directional { direction } if self.casts_shadows() => {
                Some(ShadowInitializer {
                    pre_shadow_translation: -scene_bounds.origin,
                    world_to_light: light_basis(direction),
                    subject_bounds: centered(scene_bounds),
                    max_distance_to_cast: DIRECTIONAL_SHADOW_RANGE,
                    whole_scene: true,
                })
            }
            _ => None,
        }
    }

    /// Initializer for a per-subject projected shadow.
    pub fn projected_shadow_initializer(
        &self,
        subject_bounds: &BoxSphereBounds,
    ) -> Option<ShadowInitializer> {
        if !self.casts_shadows() {
            return None;
        }
        let (direction, max_distance) = match self.kind {
            LightKind::Directional { direction } => (direction, DIRECTIONAL_SHADOW_RANGE),
            LightKind::Point { position, radius } | LightKind::Spot { position, radius, .. } => {
                let to_subject = subject_bounds.origin - position;
                let distance = to_subject.length();
                if distance <= f32::EPSILON || distance >= radius {
                    // Subject at the light or outside its influence.
                    return None;
                }
                (to_subject / distance, radius - distance)
            }
            LightKind::Sky => return None,
        };
        Some(ShadowInitializer {
            pre_shadow_translation: -subject_bounds.origin,
            world_to_light: light_basis(direction),
            subject_bounds: centered(subject_bounds),
            max_distance_to_cast: max_distance,
            whole_scene: false,
        })
    }

    pub fn invalidate_cached_state(&mut self) {
        self.cached_device_state = None;
    }
}

/// Rotation-only basis whose -Z axis is the light direction.
fn light_basis(direction: Vec3) -> Mat4 {
    let direction = direction.normalize_or_zero();
    let up = if direction.z.abs() < 0.99 {
        Vec3::Z
    } else {
        Vec3::X
    };
    Mat4::look_to_rh(Vec3::ZERO, direction, up)
}

fn centered(bounds: &BoxSphereBounds) -> BoxSphereBounds {
    BoxSphereBounds::new(Vec3::ZERO, bounds.box_extent, bounds.radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds_at(origin: Vec3) -> BoxSphereBounds {
        BoxSphereBounds::new(origin, Vec3::splat(5.0), 8.7)
    }

    #[test]
    fn test_directional_light_affects_everything() {
        let light = LightSceneInfo::new(
            LightId(0),
            LightKind::Directional { direction: Vec3::NEG_Z },
            Vec3::ONE,
            ShadowMode::Projected,
        );
        assert!(light.affects_bounds(&bounds_at(Vec3::splat(1.0e6))));
        assert!(light.bounding_sphere().is_none());
    }

    #[test]
    fn test_point_light_radius_bounds_influence() {
        let light = LightSceneInfo::new(
            LightId(0),
            LightKind::Point {
                position: Vec3::ZERO,
                radius: 100.0,
            },
            Vec3::ONE,
            ShadowMode::None,
        );
        assert!(light.affects_bounds(&bounds_at(Vec3::new(90.0, 0.0, 0.0))));
        assert!(!light.affects_bounds(&bounds_at(Vec3::new(200.0, 0.0, 0.0))));
    }

    #[test]
    fn test_shadow_initializer_requires_shadow_mode() {
        let light = LightSceneInfo::new(
            LightId(0),
            LightKind::Point {
                position: Vec3::ZERO,
                radius: 100.0,
            },
            Vec3::ONE,
            ShadowMode::None,
        );
        assert!(light.projected_shadow_initializer(&bounds_at(Vec3::X * 50.0)).is_none());
    }

    #[test]
    fn test_point_light_shadow_direction_and_range() {
        let light = LightSceneInfo::new(
            LightId(0),
            LightKind::Point {
                position: Vec3::ZERO,
                radius: 100.0,
            },
            Vec3::ONE,
            ShadowMode::Projected,
        );
        let init = light
            .projected_shadow_initializer(&bounds_at(Vec3::new(40.0, 0.0, 0.0)))
            .unwrap();
        assert!(!init.whole_scene);
        assert!((init.max_distance_to_cast - 60.0).abs() < 1e-3);
        // Light direction +X maps to light-space -Z.
        let mapped = init.world_to_light.transform_vector3(Vec3::X);
        assert!(mapped.z < -0.99);
    }

    #[test]
    fn test_subject_outside_radius_gets_no_shadow() {
        let light = LightSceneInfo::new(
            LightId(0),
            LightKind::Point {
                position: Vec3::ZERO,
                radius: 100.0,
            },
            Vec3::ONE,
            ShadowMode::Projected,
        );
        assert!(light
            .projected_shadow_initializer(&bounds_at(Vec3::new(150.0, 0.0, 0.0)))
            .is_none());
    }

    #[test]
    fn test_whole_scene_initializer_only_for_directional() {
        let scene_bounds = BoxSphereBounds::new(Vec3::ZERO, Vec3::splat(1000.0), 1732.0);
        let directional = LightSceneInfo::new(
            LightId(0),
            LightKind::Directional { direction: Vec3::NEG_Z },
            Vec3::ONE,
            ShadowMode::Projected,
        );
        assert!(directional.whole_scene_shadow_initializer(&scene_bounds).is_some());

        let point = LightSceneInfo::new(
            LightId(1),
            LightKind::Point {
                position: Vec3::ZERO,
                radius: 100.0,
            },
            Vec3::ONE,
            ShadowMode::Projected,
        );
        assert!(point.whole_scene_shadow_initializer(&scene_bounds).is_none());
    }
}
