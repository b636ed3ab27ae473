//! Bounding volumes used for culling and occlusion proxies

pub mod aabb;
pub mod frustum;

pub use aabb::{cube_corners, AabbBounds, AabbVolume, UNIT_CUBE_INDICES};
pub use frustum::{FrustumVolume, Plane};
