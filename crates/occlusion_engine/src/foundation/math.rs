//! Math utilities and types
//!
//! Provides the vector and matrix aliases used by volumes, cameras and scene
//! transforms. All matrices follow nalgebra's column-vector convention:
//! `world = parent * local`, `clip = projection * view * world`.

pub use nalgebra::{Matrix4, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Row-major conversions for scene files
pub mod utils {
    use super::Mat4;

    /// Build a matrix from sixteen values given row by row
    ///
    /// Scene descriptions store transforms row by row with the translation in
    /// the last column.
    pub fn mat4_from_rows(rows: &[[f32; 4]; 4]) -> Mat4 {
        Mat4::from_fn(|row, column| rows[row][column])
    }

    /// Inverse of [`mat4_from_rows`]
    pub fn mat4_to_rows(matrix: &Mat4) -> [[f32; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (row, values) in rows.iter_mut().enumerate() {
            for (column, value) in values.iter_mut().enumerate() {
                *value = matrix[(row, column)];
            }
        }
        rows
    }
}

/// Extension trait for Mat4 with camera matrix constructors
pub trait Mat4Ext {
    /// Create a perspective projection matrix mapping depth to `[0, 1]`
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Flip Y and Z so that the right-handed view space faces down +Z
    ///
    /// Applied between the view and projection matrices: `P * X * V`.
    fn view_axis_flip() -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;

        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn view_axis_flip() -> Mat4 {
        Mat4::new(
            1.0,  0.0,  0.0, 0.0,
            0.0, -1.0,  0.0, 0.0,
            0.0,  0.0, -1.0, 0.0,
            0.0,  0.0,  0.0, 1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rows_round_trip_keeps_translation_in_last_column() {
        let rows = [
            [1.0, 0.0, 0.0, 5.0],
            [0.0, 1.0, 0.0, 6.0],
            [0.0, 0.0, 1.0, 7.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let matrix = utils::mat4_from_rows(&rows);
        let moved = matrix.transform_point(&Point3::origin());

        assert_relative_eq!(moved.x, 5.0);
        assert_relative_eq!(moved.y, 6.0);
        assert_relative_eq!(moved.z, 7.0);
        assert_eq!(utils::mat4_to_rows(&matrix), rows);
    }

    #[test]
    fn test_perspective_maps_near_and_far_to_unit_depth() {
        let projection = Mat4::perspective(60.0_f32.to_radians(), 1.0, 1.0, 100.0);

        let near = projection * Vec4::new(0.0, 0.0, 1.0, 1.0);
        let far = projection * Vec4::new(0.0, 0.0, 100.0, 1.0);

        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-6);
    }
}
