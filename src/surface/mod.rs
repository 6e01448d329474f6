//! GPU表面抽象
//! Surface capability contract consumed by the bridge and the processor.
//!
//! - `Surface`:       GPU端图像资源 (尺寸/格式/是否可CPU映射)
//! - `SurfaceDevice`: 图形设备 (分配/复制/上传/映射/绘制)
//! - `host`:          内存后端 (测试与无GPU环境)
//! - `wgpu_device`:   wgpu后端 (需要 `gpu` 功能)
pub mod bridge;
pub mod host;

#[cfg(feature = "gpu")]
pub mod wgpu_device;

use std::sync::Arc;

use crate::error::BridgeResult;

pub use bridge::{read_surface_to_buffer, write_buffer_to_surface};
pub use host::{HostDevice, HostStats, HostSurface};

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32位 BGRA, 预乘alpha (唯一被流水线接受的格式)
    Bgra8Premultiplied,
    Rgba8,
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgra8Premultiplied | PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// 表面用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceUsage {
    /// 可作为绘制/复制目标, 不可直接CPU映射
    Target,
    /// 可CPU映射读取, 不可绘制 (暂存表面)
    CpuRead,
}

/// 表面描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: SurfaceUsage,
}

impl SurfaceDesc {
    /// BGRA8预乘的绘制目标
    pub fn target(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Bgra8Premultiplied,
            usage: SurfaceUsage::Target,
        }
    }

    /// 与源表面同尺寸同格式的CPU可读暂存表面
    pub fn staging_for<S: Surface>(surface: &S) -> Self {
        Self {
            width: surface.width(),
            height: surface.height(),
            format: surface.format(),
            usage: SurfaceUsage::CpuRead,
        }
    }
}

/// GPU端图像资源, Drop时释放
pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;
    /// 是否支持直接CPU读映射
    fn is_cpu_readable(&self) -> bool;

    fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

/// 图形设备能力约定
pub trait SurfaceDevice {
    type Surface: Surface;

    fn create_surface(&self, desc: &SurfaceDesc) -> BridgeResult<Self::Surface>;

    /// 整幅复制, 两个表面尺寸和格式必须一致
    fn copy_surface(&self, dst: &mut Self::Surface, src: &Self::Surface) -> BridgeResult<()>;

    /// 按步长 `pitch` 从CPU内存上传到表面
    fn upload(&self, dst: &mut Self::Surface, data: &[u8], pitch: usize) -> BridgeResult<()>;

    /// 映射表面供CPU读取, 回调返回后保证解除映射
    ///
    /// 回调参数: (映射内存, 行步长)
    fn map_read<R, F>(&self, surface: &Self::Surface, read: F) -> BridgeResult<R>
    where
        F: FnOnce(&[u8], usize) -> R;

    /// 清空 `target` 并在偏移 `offset` 处绘制 `image`
    fn draw_image(
        &self,
        target: &mut Self::Surface,
        image: &FrameImage<Self::Surface>,
        offset: (f32, f32),
    ) -> BridgeResult<()>;
}

/// 浮点矩形 (逻辑边界)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    /// 截断为整数像素尺寸
    pub fn pixel_size(&self) -> (u32, u32) {
        let width = (self.right - self.left).max(0.0) as u32;
        let height = (self.bottom - self.top).max(0.0) as u32;
        (width, height)
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }
}

/// 宿主提供的输入图像句柄: 共享表面 + 逻辑边界
pub struct FrameImage<S> {
    surface: Arc<S>,
    bounds: RectF,
}

impl<S> Clone for FrameImage<S> {
    fn clone(&self) -> Self {
        Self {
            surface: Arc::clone(&self.surface),
            bounds: self.bounds,
        }
    }
}

impl<S: Surface> FrameImage<S> {
    /// 边界为 (0, 0, 宽, 高)
    pub fn new(surface: Arc<S>) -> Self {
        let bounds = RectF::from_size(surface.width(), surface.height());
        Self { surface, bounds }
    }
}

impl<S> FrameImage<S> {
    pub fn with_bounds(surface: Arc<S>, bounds: RectF) -> Self {
        Self { surface, bounds }
    }

    pub fn surface(&self) -> &Arc<S> {
        &self.surface
    }

    pub fn bounds(&self) -> RectF {
        self.bounds
    }
}

/// 带偏移的复制区域 (已裁剪到两个表面内)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitRegion {
    pub src_x: u32,
    pub src_y: u32,
    pub dst_x: u32,
    pub dst_y: u32,
    pub width: u32,
    pub height: u32,
}

/// 计算把 `src` 画到 `dst` 的 `offset` 处时的重叠区域, 偏移四舍五入到整像素
pub fn blit_region(
    src_size: (u32, u32),
    dst_size: (u32, u32),
    offset: (f32, f32),
) -> Option<BlitRegion> {
    let ox = offset.0.round() as i64;
    let oy = offset.1.round() as i64;

    let dst_x0 = ox.max(0);
    let dst_y0 = oy.max(0);
    let dst_x1 = (ox + src_size.0 as i64).min(dst_size.0 as i64);
    let dst_y1 = (oy + src_size.1 as i64).min(dst_size.1 as i64);
    if dst_x1 <= dst_x0 || dst_y1 <= dst_y0 {
        return None;
    }

    Some(BlitRegion {
        src_x: (dst_x0 - ox) as u32,
        src_y: (dst_y0 - oy) as u32,
        dst_x: dst_x0 as u32,
        dst_y: dst_y0 as u32,
        width: (dst_x1 - dst_x0) as u32,
        height: (dst_y1 - dst_y0) as u32,
    })
}
