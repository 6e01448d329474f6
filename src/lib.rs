//! 帧差分动体检测效果
//! Frame-difference motion detection over GPU surfaces.
pub mod buffer; // CPU像素缓冲区
pub mod compositor; // 输出定位
pub mod config; // 参数配置
pub mod error; // 错误类型
pub mod motion; // 帧差分流水线
pub mod processor; // 效果实例
pub mod surface; // GPU表面抽象与桥接
pub mod temporal; // 前一帧状态
pub mod utils; // 仿射变换

pub use crate::buffer::PixelBuffer;
pub use crate::compositor::OutputStage;
pub use crate::config::{Args, MotionParams, ParameterSnapshot};
pub use crate::error::{BridgeError, BridgeResult, MotionError, MotionResult};
pub use crate::motion::{compute_motion, MotionOutput, MotionRegion};
pub use crate::processor::{MotionDetectionProcessor, MotionReport, UpdateOutcome};
pub use crate::surface::{
    read_surface_to_buffer, write_buffer_to_surface, FrameImage, HostDevice, PixelFormat, RectF,
    Surface, SurfaceDevice,
};
pub use crate::temporal::{FramePhase, TemporalState};

#[cfg(feature = "gpu")]
pub use crate::surface::wgpu_device::WgpuDevice;
