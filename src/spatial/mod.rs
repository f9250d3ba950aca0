//! Spatial primitives for pose decomposition
//!
//! Matrices are stored row-major as 16 `f32`s, the layout the tracking
//! engine reports poses in.

mod matrix44;
mod vector3d;

pub use matrix44::Matrix44;
pub use vector3d::Vector3D;
