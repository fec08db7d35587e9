//! Projected-shadow transform construction.

use glam::{Mat3, Mat4, Vec3, Vec4};

use vega_math::{ConvexVolume, frustum_from_matrix};
use vega_scene::ShadowInitializer;

/// Texel border around the shadow depth buffer reserved for filtering.
pub const SHADOW_BORDER: u32 = 5;

/// A projection degenerates below this light-space area; such subjects are
/// unshadowable (zero extent along the chosen basis).
const MIN_PROJECTED_AREA: f32 = 1.0e-4;

/// Depth-remapping shadow projection.
///
/// Leaves x/y untouched and maps light-space depth `[min_z, max_z]` onto
/// `[0, 1]`; `w_axis` is `(0,0,0,1)` for a uniform (orthographic) shadow.
pub fn shadow_projection_matrix(min_z: f32, max_z: f32, w_axis: Vec4) -> Mat4 {
    let scale = (w_axis.z * max_z + w_axis.w) / (max_z - min_z);
    Mat4::from_cols(
        Vec4::X,
        Vec4::Y,
        Vec4::new(0.0, 0.0, scale, w_axis.z),
        Vec4::new(0.0, 0.0, -min_z * scale, w_axis.w),
    )
}

/// The three world-to-shadow-clip matrices of one projected shadow, split
/// by depth range to maximize depth precision around the subject.
#[derive(Debug, Clone)]
pub struct ShadowTransforms {
    /// Depth range reaching from the light to the subject's far side; used
    /// to render casters in front of the subject without peter-panning.
    pub pre_subject: Mat4,
    /// The subject's own depth range.
    pub subject: Mat4,
    /// Range extended to the light's far limit, for receiver testing
    /// beyond the subject.
    pub post_subject: Mat4,
    /// Light-space depth covered by the subject.
    pub max_subject_depth: f32,
    /// Ratio of the larger (x) to the smaller (y) projected extent, >= 1.
    pub aspect: f32,
}

impl ShadowTransforms {
    /// Build the transforms for an initializer.
    ///
    /// Projects the subject's box corners into light space, picks the 2D
    /// basis (each box edge direction tried as the x candidate) minimizing
    /// projected area, and swaps axes so x carries the larger extent.
    /// `None` if every candidate degenerates, which means the subject has
    /// no area to catch a shadow from.
    pub fn calculate(initializer: &ShadowInitializer) -> Option<ShadowTransforms> {
        // Rotation-only, so the inverse is the transpose.
        let z_axis = initializer
            .world_to_light
            .transpose()
            .transform_vector3(Vec3::NEG_Z)
            .normalize_or_zero();
        if z_axis == Vec3::ZERO {
            return None;
        }

        let extent = initializer.subject_bounds.box_extent;
        let corners = box_corners(initializer.subject_bounds.origin, extent);

        let (mut x_axis, mut y_axis) = best_shadow_basis(z_axis, &corners)?;

        // Give the x axis the larger extent; the shadow buffer allocates
        // its full width along x.
        let (dx, dy) = projected_extents(x_axis, y_axis, &corners);
        if dy > dx {
            let old_x = x_axis;
            x_axis = y_axis;
            y_axis = -old_x;
        }

        let (min_x, max_x) = min_max(&corners, x_axis);
        let (min_y, max_y) = min_max(&corners, y_axis);
        let (min_z, max_z) = min_max(&corners, z_axis);
        let dx = max_x - min_x;
        let dy = max_y - min_y;
        if dx * dy <= MIN_PROJECTED_AREA {
            return None;
        }

        let view = Mat4::from_mat3(Mat3::from_cols(x_axis, y_axis, z_axis).transpose())
            * Mat4::from_translation(initializer.pre_shadow_translation);
        let normalize_xy = Mat4::from_scale(Vec3::new(2.0 / dx, 2.0 / dy, 1.0))
            * Mat4::from_translation(Vec3::new(
                -(min_x + max_x) * 0.5,
                -(min_y + max_y) * 0.5,
                0.0,
            ));
        let base = normalize_xy * view;

        let far = initializer.max_distance_to_cast;
        let w_axis = Vec4::W;
        Some(ShadowTransforms {
            pre_subject: shadow_projection_matrix(min_z - far, max_z, w_axis) * base,
            subject: shadow_projection_matrix(min_z, max_z, w_axis) * base,
            post_subject: shadow_projection_matrix(min_z, min_z + far, w_axis) * base,
            max_subject_depth: max_z - min_z,
            aspect: dx / dy,
        })
    }

    /// Volume holding every potential caster for the subject pass.
    pub fn subject_frustum(&self) -> ConvexVolume {
        frustum_from_matrix(&self.pre_subject)
    }

    /// Volume holding every potential receiver.
    pub fn receiver_frustum(&self) -> ConvexVolume {
        frustum_from_matrix(&self.post_subject)
    }
}

fn box_corners(origin: Vec3, extent: Vec3) -> [Vec3; 8] {
    let mut corners = [Vec3::ZERO; 8];
    for (index, corner) in corners.iter_mut().enumerate() {
        *corner = origin
            + Vec3::new(
                if index & 1 != 0 { extent.x } else { -extent.x },
                if index & 2 != 0 { extent.y } else { -extent.y },
                if index & 4 != 0 { extent.z } else { -extent.z },
            );
    }
    corners
}

/// Try each box edge direction as the x axis of the shadow basis and keep
/// the one minimizing the projected area of the corners.
fn best_shadow_basis(z_axis: Vec3, corners: &[Vec3; 8]) -> Option<(Vec3, Vec3)> {
    let mut best: Option<(Vec3, Vec3)> = None;
    let mut best_area = f32::MAX;

    for candidate in [Vec3::X, Vec3::Y, Vec3::Z] {
        let perpendicular = candidate - z_axis * candidate.dot(z_axis);
        if perpendicular.length_squared() < 1.0e-6 {
            continue;
        }
        let x_axis = perpendicular.normalize();
        let y_axis = z_axis.cross(x_axis);

        let (dx, dy) = projected_extents(x_axis, y_axis, corners);
        let area = dx * dy;
        if area > MIN_PROJECTED_AREA && area < best_area {
            best_area = area;
            best = Some((x_axis, y_axis));
        }
    }
    best
}

fn projected_extents(x_axis: Vec3, y_axis: Vec3, corners: &[Vec3; 8]) -> (f32, f32) {
    let (min_x, max_x) = min_max(corners, x_axis);
    let (min_y, max_y) = min_max(corners, y_axis);
    (max_x - min_x, max_y - min_y)
}

fn min_max(corners: &[Vec3; 8], axis: Vec3) -> (f32, f32) {
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for corner in corners {
        let projection = corner.dot(axis);
        min = min.min(projection);
        max = max.max(projection);
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vega_math::BoxSphereBounds;

    fn initializer(extent: Vec3, direction: Vec3) -> ShadowInitializer {
        let up = if direction.z.abs() < 0.99 { Vec3::Z } else { Vec3::X };
        ShadowInitializer {
            pre_shadow_translation: Vec3::ZERO,
            world_to_light: Mat4::look_to_rh(Vec3::ZERO, direction, up),
            subject_bounds: BoxSphereBounds::new(Vec3::ZERO, extent, extent.length()),
            max_distance_to_cast: 100.0,
            whole_scene: false,
        }
    }

    #[test]
    fn test_projection_matrix_remaps_depth_to_unit_range() {
        let projection = shadow_projection_matrix(10.0, 30.0, Vec4::W);
        let near = projection.project_point3(Vec3::new(0.0, 0.0, 10.0));
        let far = projection.project_point3(Vec3::new(0.0, 0.0, 30.0));
        assert!((near.z - 0.0).abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);
        // x/y pass through untouched.
        let side = projection.project_point3(Vec3::new(0.5, -0.25, 20.0));
        assert!((side.x - 0.5).abs() < 1e-5);
        assert!((side.y + 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_subject_corners_land_in_clip_volume() {
        let init = initializer(Vec3::new(1.0, 2.0, 4.0), Vec3::new(0.3, -0.5, -0.8).normalize());
        let transforms = ShadowTransforms::calculate(&init).unwrap();
        for corner in box_corners(Vec3::ZERO, init.subject_bounds.box_extent) {
            let clip = transforms.subject.project_point3(corner);
            assert!(clip.x >= -1.001 && clip.x <= 1.001, "x out of range: {clip:?}");
            assert!(clip.y >= -1.001 && clip.y <= 1.001, "y out of range: {clip:?}");
            assert!(clip.z >= -0.001 && clip.z <= 1.001, "z out of range: {clip:?}");
        }
    }

    #[test]
    fn test_x_axis_carries_larger_extent() {
        let init = initializer(Vec3::new(1.0, 8.0, 2.0), Vec3::NEG_Z);
        let transforms = ShadowTransforms::calculate(&init).unwrap();
        assert!(transforms.aspect >= 1.0);
    }

    #[test]
    fn test_degenerate_subject_produces_no_shadow() {
        let init = initializer(Vec3::ZERO, Vec3::NEG_Z);
        assert!(ShadowTransforms::calculate(&init).is_none());
    }

    #[test]
    fn test_pre_subject_range_covers_casters_in_front() {
        let init = initializer(Vec3::splat(2.0), Vec3::NEG_Z);
        let transforms = ShadowTransforms::calculate(&init).unwrap();
        // A point 20 units toward the light (light shines along -Z, so the
        // light side is +Z in world).
        let in_front = Vec3::new(0.0, 0.0, 22.0);
        let subject_clip = transforms.subject.project_point3(in_front);
        let pre_clip = transforms.pre_subject.project_point3(in_front);
        assert!(subject_clip.z < 0.0, "in-front caster is outside the subject range");
        assert!(pre_clip.z >= 0.0 && pre_clip.z <= 1.0);
    }

    #[test]
    fn test_receiver_range_extends_beyond_subject() {
        let init = initializer(Vec3::splat(2.0), Vec3::NEG_Z);
        let transforms = ShadowTransforms::calculate(&init).unwrap();
        let beyond = Vec3::new(0.0, 0.0, -50.0);
        let subject_clip = transforms.subject.project_point3(beyond);
        let receiver_clip = transforms.post_subject.project_point3(beyond);
        assert!(subject_clip.z > 1.0);
        assert!(receiver_clip.z > 0.0 && receiver_clip.z <= 1.0);
    }

    #[test]
    fn test_max_subject_depth_spans_box() {
        let init = initializer(Vec3::new(1.0, 1.0, 3.0), Vec3::NEG_Z);
        let transforms = ShadowTransforms::calculate(&init).unwrap();
        assert!((transforms.max_subject_depth - 6.0).abs() < 1e-4);
    }
}
