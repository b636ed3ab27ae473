//! View frustum volume

use super::aabb::AabbVolume;
use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Plane defined by normal and distance from origin
///
/// Points with a non-negative signed distance are on the inner side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Plane from `ax + by + cz + d = 0` coefficients, normalized
    fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.norm();
        if length > f32::EPSILON {
            Self { normal: normal / length, distance: coefficients.w / length }
        } else {
            Self { normal, distance: coefficients.w }
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Six inward-facing planes of a camera frustum
///
/// Plane order: left, right, bottom, top, near, far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumVolume {
    planes: [Plane; 6],
}

impl FrustumVolume {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for clip volumes with `-w <= x, y <= w` and
    /// `0 <= z <= w`.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { view_projection.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self::new([
            Plane::from_coefficients(r3 + r0),
            Plane::from_coefficients(r3 - r0),
            Plane::from_coefficients(r3 + r1),
            Plane::from_coefficients(r3 - r1),
            Plane::from_coefficients(r2),
            Plane::from_coefficients(r3 - r2),
        ])
    }

    /// Frustum planes
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Check if an AABB is inside or intersects the frustum
    ///
    /// Conservative: boxes near frustum corners may be reported as
    /// intersecting although they are outside.
    pub fn intersects(&self, aabb: &AabbVolume) -> bool {
        let (min, max) = (aabb.min(), aabb.max());
        self.planes.iter().all(|plane| {
            // Corner furthest along the plane normal
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { max.x } else { min.x },
                if plane.normal.y >= 0.0 { max.y } else { min.y },
                if plane.normal.z >= 0.0 { max.z } else { min.z },
            );
            plane.distance_to_point(&positive) >= 0.0
        })
    }

    /// Check if a point lies inside the frustum
    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    fn looking_down_negative_z() -> FrustumVolume {
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y());
        let projection = Mat4::perspective(90.0_f32.to_radians(), 1.0, 1.0, 100.0);
        FrustumVolume::from_view_projection(&(projection * Mat4::view_axis_flip() * view))
    }

    fn cube_at(center: Vec3) -> AabbVolume {
        AabbVolume::from_center_extents(center, Vec3::repeat(1.0)).unwrap()
    }

    #[test]
    fn test_planes_are_normalized() {
        for plane in looking_down_negative_z().planes() {
            assert_relative_eq!(plane.normal.norm(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_near_and_far_planes() {
        let frustum = looking_down_negative_z();

        assert!(frustum.contains_point(&Vec3::new(0.0, 0.0, -1.5)));
        assert!(!frustum.contains_point(&Vec3::new(0.0, 0.0, -0.5)));
        assert!(frustum.contains_point(&Vec3::new(0.0, 0.0, -99.0)));
        assert!(!frustum.contains_point(&Vec3::new(0.0, 0.0, -101.0)));
    }

    #[test]
    fn test_box_classification() {
        let frustum = looking_down_negative_z();

        assert!(frustum.intersects(&cube_at(Vec3::new(0.0, 0.0, -10.0))));
        // Straddles the right plane
        assert!(frustum.intersects(&cube_at(Vec3::new(10.5, 0.0, -10.0))));
        assert!(!frustum.intersects(&cube_at(Vec3::new(0.0, 0.0, 10.0))));
        assert!(!frustum.intersects(&cube_at(Vec3::new(30.0, 0.0, -10.0))));
        assert!(!frustum.intersects(&cube_at(Vec3::new(0.0, -30.0, -10.0))));
        assert!(!frustum.intersects(&cube_at(Vec3::new(0.0, 0.0, -150.0))));
    }
}
