//! 帧差分流水线 (Frame Difference Pipeline)
//!
//! 当前帧 + 前一帧 + 参数 -> 处理后的帧 + 运动区域
//!
//! 1. 灰度化
//! 2. 高斯平滑
//! 3. 帧差
//! 4. 二值化
//! 5. 极性 (反转)
//! 6. 输出帧 (裁剪或完整复制)
//! 7. 外轮廓提取
//! 8. 面积过滤
//! 9. 标注外接矩形
pub mod filter;
pub mod regions;

use image::GrayImage;

use crate::buffer::PixelBuffer;
use crate::config::ParameterSnapshot;
use crate::error::{BridgeError, MotionError, MotionResult};
use crate::surface::PixelFormat;

pub use regions::MotionRegion;

/// 流水线输出
#[derive(Debug, Clone)]
pub struct MotionOutput {
    pub buffer: PixelBuffer,
    pub regions: Vec<MotionRegion>,
}

/// 流水线中间结果, 便于调试和测试
#[derive(Debug, Clone)]
pub struct MotionMasks {
    pub diff: GrayImage,
    pub binary: GrayImage,
    pub motion: GrayImage,
}

/// 计算两帧之间的运动掩码 (步骤 1-5)
pub fn motion_masks(
    current: &PixelBuffer,
    previous: &PixelBuffer,
    params: &ParameterSnapshot,
) -> MotionResult<MotionMasks> {
    for buffer in [current, previous] {
        if buffer.format() != PixelFormat::Bgra8Premultiplied {
            return Err(BridgeError::UnsupportedFormat(buffer.format()).into());
        }
    }
    if current.dimensions() != previous.dimensions() {
        return Err(MotionError::DimensionMismatch {
            current: current.dimensions(),
            previous: previous.dimensions(),
        });
    }

    let ksize = filter::blur_kernel_size(params.blur);
    let gray_current = filter::gaussian_blur(&filter::to_luma(current), ksize);
    let gray_previous = filter::gaussian_blur(&filter::to_luma(previous), ksize);

    let diff = filter::abs_diff(&gray_current, &gray_previous);
    let binary = filter::threshold_binary(&diff, params.threshold);
    let motion = filter::motion_mask(&diff, params.threshold, params.invert);

    Ok(MotionMasks {
        diff,
        binary,
        motion,
    })
}

/// 完整流水线, 不修改输入
pub fn compute_motion(
    current: &PixelBuffer,
    previous: &PixelBuffer,
    params: &ParameterSnapshot,
) -> MotionResult<MotionOutput> {
    let masks = motion_masks(current, previous, params)?;

    let mut buffer = if params.crop {
        masked_copy(current, &masks.motion)
    } else {
        current.to_packed()
    };

    let regions = regions::extract_regions(&masks.motion, params.noise_area);
    if params.show_regions {
        regions::annotate_regions(&mut buffer, &regions, params.color, params.thickness);
    }

    Ok(MotionOutput { buffer, regions })
}

/// 透明黑底, 仅复制掩码非零处的像素
fn masked_copy(src: &PixelBuffer, mask: &GrayImage) -> PixelBuffer {
    let mut out = PixelBuffer::new(src.width(), src.height());
    for (x, y, m) in mask.enumerate_pixels() {
        if m.0[0] != 0 {
            out.set_pixel(x, y, src.pixel(x, y));
        }
    }
    out
}
