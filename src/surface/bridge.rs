/// 表面桥接: GPU表面 <-> CPU像素缓冲区
use tracing::debug;

use super::{PixelFormat, Surface, SurfaceDesc, SurfaceDevice};
use crate::buffer::PixelBuffer;
use crate::error::{BridgeError, BridgeResult};

/// 读取表面内容到新的CPU缓冲区 (深拷贝)
///
/// 表面可直接映射时直接映射复制; 否则先复制到同尺寸的CPU可读暂存表面.
/// 暂存表面在返回前释放, 无论成功与否.
pub fn read_surface_to_buffer<D: SurfaceDevice>(
    device: &D,
    surface: &D::Surface,
) -> BridgeResult<PixelBuffer> {
    if surface.format() != PixelFormat::Bgra8Premultiplied {
        return Err(BridgeError::UnsupportedFormat(surface.format()));
    }

    if surface.is_cpu_readable() {
        return map_to_buffer(device, surface);
    }

    debug!(
        "staging {}x{} surface for CPU read",
        surface.width(),
        surface.height()
    );
    let mut staging = device.create_surface(&SurfaceDesc::staging_for(surface))?;
    device.copy_surface(&mut staging, surface)?;
    map_to_buffer(device, &staging)
}

/// 把CPU缓冲区写入新的BGRA8预乘表面
pub fn write_buffer_to_surface<D: SurfaceDevice>(
    device: &D,
    buffer: &PixelBuffer,
) -> BridgeResult<D::Surface> {
    if buffer.format() != PixelFormat::Bgra8Premultiplied {
        return Err(BridgeError::InvalidPixelFormat(buffer.format()));
    }

    let mut surface =
        device.create_surface(&SurfaceDesc::target(buffer.width(), buffer.height()))?;
    device.upload(&mut surface, buffer.as_bytes(), buffer.stride())?;
    Ok(surface)
}

fn map_to_buffer<D: SurfaceDevice>(device: &D, surface: &D::Surface) -> BridgeResult<PixelBuffer> {
    let (width, height) = surface.size();
    device.map_read(surface, |bytes, pitch| {
        PixelBuffer::copy_from_strided(width, height, bytes, pitch)
    })?
}
