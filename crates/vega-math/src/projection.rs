//! Frustum-plane extraction and screen-space projection helpers.

use glam::{Mat4, Vec2, Vec4};

use crate::plane::{ConvexVolume, Plane};

/// Extract the bounding planes of the clip volume of an arbitrary projection
/// matrix using the Gribb-Hartmann row method.
///
/// Works for perspective and orthographic matrices alike, which makes it
/// usable for both camera view frusta and shadow subject/receiver frusta.
/// Rows whose extraction degenerates (a shadow projection with an unbounded
/// far range, for example) are skipped rather than treated as an error; the
/// resulting volume is simply bounded by fewer planes.
pub fn frustum_from_matrix(m: &Mat4) -> ConvexVolume {
    let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

    let candidates: [Vec4; 6] = [
        rows[3] + rows[0], // left
        rows[3] - rows[0], // right
        rows[3] + rows[1], // bottom
        rows[3] - rows[1], // top
        rows[2],           // near (z >= 0 in clip space)
        rows[3] - rows[2], // far
    ];

    let planes: Vec<Plane> = candidates
        .iter()
        .filter_map(|&c| Plane::from_coefficients(c))
        .collect();
    ConvexVolume::new(planes)
}

/// Projected screen-space radius, in pixels, of a sphere of `radius` whose
/// center projects with homogeneous coordinate `w`.
///
/// `w` is clamped to 1 so bounds behind or at the camera report their
/// unshrunk size instead of exploding.
pub fn screen_radius(proj: &Mat4, view_size: Vec2, radius: f32, w: f32) -> f32 {
    let half_scale = f32::max(
        view_size.x * 0.5 * proj.x_axis.x,
        view_size.y * 0.5 * proj.y_axis.y,
    );
    half_scale * radius / f32::max(w, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Sphere;
    use glam::Vec3;

    fn camera_vp() -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 1000.0);
        proj * view
    }

    #[test]
    fn test_frustum_has_six_planes_for_perspective() {
        let volume = frustum_from_matrix(&camera_vp());
        assert_eq!(volume.planes().len(), 6);
    }

    #[test]
    fn test_object_in_front_is_inside() {
        let volume = frustum_from_matrix(&camera_vp());
        assert!(volume.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0)));
    }

    #[test]
    fn test_object_behind_camera_is_outside() {
        let volume = frustum_from_matrix(&camera_vp());
        assert!(!volume.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0)));
        assert!(!volume.intersects_box(Vec3::new(0.0, 0.0, 10.0), Vec3::ONE));
    }

    #[test]
    fn test_object_beyond_far_plane_is_outside() {
        let volume = frustum_from_matrix(&camera_vp());
        assert!(!volume.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -2000.0), 1.0)));
    }

    #[test]
    fn test_orthographic_extraction() {
        let proj = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 0.0, 100.0);
        let volume = frustum_from_matrix(&proj);
        assert!(volume.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -50.0), 1.0)));
        assert!(!volume.intersects_sphere(&Sphere::new(Vec3::new(50.0, 0.0, -50.0), 1.0)));
    }

    #[test]
    fn test_screen_radius_shrinks_with_distance() {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 1000.0);
        let size = Vec2::new(1280.0, 720.0);
        let near = screen_radius(&proj, size, 1.0, 10.0);
        let far = screen_radius(&proj, size, 1.0, 100.0);
        assert!(near > far);
        assert!((near / far - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_screen_radius_clamps_small_w() {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 1000.0);
        let size = Vec2::new(1280.0, 720.0);
        let at_zero = screen_radius(&proj, size, 1.0, 0.0);
        let at_one = screen_radius(&proj, size, 1.0, 1.0);
        assert_eq!(at_zero, at_one);
    }
}
