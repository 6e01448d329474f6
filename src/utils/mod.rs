//! 工具模块
//! Utility modules
pub mod affine_transform;

pub use affine_transform::AffineMatrix;
