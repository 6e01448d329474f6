//! 错误类型
//! Error types for the surface bridge and the motion pipeline.

use thiserror::Error;

use crate::surface::PixelFormat;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Result type for the frame difference pipeline.
pub type MotionResult<T> = Result<T, MotionError>;

/// GPU表面与CPU缓冲区之间的转换错误
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Unsupported surface format: {0:?} (expected BGRA8 premultiplied)")]
    UnsupportedFormat(PixelFormat),

    #[error("Failed to map surface for CPU read: {0}")]
    MapFailed(String),

    #[error("Invalid pixel format for upload: {0:?} (expected BGRA8)")]
    InvalidPixelFormat(PixelFormat),

    #[error("Surface allocation failed: {0}")]
    Allocation(String),

    #[error("Surface copy failed: {0}")]
    Copy(String),

    #[error("Invalid buffer layout: {0}")]
    Layout(String),
}

/// 帧差分流水线错误
#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Frame size mismatch: current {current:?}, previous {previous:?}")]
    DimensionMismatch {
        current: (u32, u32),
        previous: (u32, u32),
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
