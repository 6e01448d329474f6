/// 内存后端 (Host memory backend)
///
/// 与GPU后端遵守同一能力约定:
/// - `Target` 表面不可直接映射, 读取必须经过 `CpuRead` 暂存表面
/// - 行步长按 `ROW_ALIGNMENT` 对齐, 与wgpu的256字节行对齐一致
/// - 统计存活表面和映射次数, 便于检查资源泄漏
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{blit_region, FrameImage, PixelFormat, Surface, SurfaceDesc, SurfaceDevice, SurfaceUsage};
use crate::error::{BridgeError, BridgeResult};

/// 行对齐 (字节)
pub const ROW_ALIGNMENT: usize = 256;

/// 资源统计
#[derive(Debug, Default)]
pub struct HostStats {
    live: AtomicUsize,
    created: AtomicUsize,
    staging_created: AtomicUsize,
    maps: AtomicUsize,
    unmaps: AtomicUsize,
    fail_maps: AtomicBool,
}

impl HostStats {
    /// 当前存活的表面数
    pub fn live_surfaces(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn created_surfaces(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// 已分配的 `CpuRead` 暂存表面数
    pub fn staging_surfaces(&self) -> usize {
        self.staging_created.load(Ordering::SeqCst)
    }

    pub fn maps(&self) -> usize {
        self.maps.load(Ordering::SeqCst)
    }

    pub fn unmaps(&self) -> usize {
        self.unmaps.load(Ordering::SeqCst)
    }
}

/// 内存表面
pub struct HostSurface {
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: SurfaceUsage,
    pitch: usize,
    data: Vec<u8>,
    stats: Arc<HostStats>,
}

impl HostSurface {
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

impl Surface for HostSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn is_cpu_readable(&self) -> bool {
        self.usage == SurfaceUsage::CpuRead
    }
}

impl Drop for HostSurface {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 内存图形设备, 克隆后共享同一份统计
#[derive(Clone, Default)]
pub struct HostDevice {
    stats: Arc<HostStats>,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<HostStats> {
        Arc::clone(&self.stats)
    }

    /// 模拟后端无法建立CPU映射
    pub fn set_fail_maps(&self, fail: bool) {
        self.stats.fail_maps.store(fail, Ordering::SeqCst);
    }
}

impl SurfaceDevice for HostDevice {
    type Surface = HostSurface;

    fn create_surface(&self, desc: &SurfaceDesc) -> BridgeResult<HostSurface> {
        let row_bytes = desc.width as usize * desc.format.bytes_per_pixel();
        let pitch = align_to(row_bytes.max(1), ROW_ALIGNMENT);
        let len = pitch
            .checked_mul(desc.height as usize)
            .ok_or_else(|| BridgeError::Allocation(format!("{}x{} overflows", desc.width, desc.height)))?;

        self.stats.live.fetch_add(1, Ordering::SeqCst);
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        if desc.usage == SurfaceUsage::CpuRead {
            self.stats.staging_created.fetch_add(1, Ordering::SeqCst);
        }

        Ok(HostSurface {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
            pitch,
            data: vec![0u8; len],
            stats: Arc::clone(&self.stats),
        })
    }

    fn copy_surface(&self, dst: &mut HostSurface, src: &HostSurface) -> BridgeResult<()> {
        if dst.size() != src.size() || dst.format != src.format {
            return Err(BridgeError::Copy(format!(
                "{:?} {:?} -> {:?} {:?}",
                src.size(),
                src.format,
                dst.size(),
                dst.format
            )));
        }
        let row_bytes = src.row_bytes();
        for y in 0..src.height as usize {
            let s = y * src.pitch;
            let d = y * dst.pitch;
            dst.data[d..d + row_bytes].copy_from_slice(&src.data[s..s + row_bytes]);
        }
        Ok(())
    }

    fn upload(&self, dst: &mut HostSurface, data: &[u8], pitch: usize) -> BridgeResult<()> {
        let row_bytes = dst.row_bytes();
        let rows = dst.height as usize;
        if pitch < row_bytes || (rows > 0 && data.len() < pitch * (rows - 1) + row_bytes) {
            return Err(BridgeError::Layout(format!(
                "{} bytes at pitch {} cannot fill {}x{}",
                data.len(),
                pitch,
                dst.width,
                dst.height
            )));
        }
        for y in 0..rows {
            let d = y * dst.pitch;
            dst.data[d..d + row_bytes].copy_from_slice(&data[y * pitch..y * pitch + row_bytes]);
        }
        Ok(())
    }

    fn map_read<R, F>(&self, surface: &HostSurface, read: F) -> BridgeResult<R>
    where
        F: FnOnce(&[u8], usize) -> R,
    {
        if !surface.is_cpu_readable() {
            return Err(BridgeError::MapFailed(
                "surface was created without CPU read access".into(),
            ));
        }
        if self.stats.fail_maps.load(Ordering::SeqCst) {
            return Err(BridgeError::MapFailed("mapping refused by device".into()));
        }

        self.stats.maps.fetch_add(1, Ordering::SeqCst);
        let _unmap = UnmapGuard(&self.stats);
        Ok(read(&surface.data, surface.pitch))
    }

    fn draw_image(
        &self,
        target: &mut HostSurface,
        image: &FrameImage<HostSurface>,
        offset: (f32, f32),
    ) -> BridgeResult<()> {
        let src = image.surface();
        if src.format != target.format {
            return Err(BridgeError::Copy(format!(
                "cannot draw {:?} onto {:?}",
                src.format, target.format
            )));
        }

        target.data.fill(0);
        let Some(region) = blit_region(src.size(), target.size(), offset) else {
            return Ok(());
        };

        let bpp = src.format.bytes_per_pixel();
        let span = region.width as usize * bpp;
        for row in 0..region.height as usize {
            let s = (region.src_y as usize + row) * src.pitch + region.src_x as usize * bpp;
            let d = (region.dst_y as usize + row) * target.pitch + region.dst_x as usize * bpp;
            target.data[d..d + span].copy_from_slice(&src.data[s..s + span]);
        }
        Ok(())
    }
}

struct UnmapGuard<'a>(&'a HostStats);

impl Drop for UnmapGuard<'_> {
    fn drop(&mut self) {
        self.0.unmaps.fetch_add(1, Ordering::SeqCst);
    }
}

fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_is_aligned() {
        let device = HostDevice::new();
        let surface = device.create_surface(&SurfaceDesc::target(65, 3)).unwrap();
        assert_eq!(surface.pitch(), 512);
        assert!(!surface.is_cpu_readable());
    }

    #[test]
    fn test_live_count_tracks_drop() {
        let device = HostDevice::new();
        let stats = device.stats();
        {
            let _a = device.create_surface(&SurfaceDesc::target(4, 4)).unwrap();
            let _b = device.create_surface(&SurfaceDesc::target(4, 4)).unwrap();
            assert_eq!(stats.live_surfaces(), 2);
        }
        assert_eq!(stats.live_surfaces(), 0);
        assert_eq!(stats.created_surfaces(), 2);
    }

    #[test]
    fn test_target_cannot_be_mapped() {
        let device = HostDevice::new();
        let surface = device.create_surface(&SurfaceDesc::target(4, 4)).unwrap();
        let result = device.map_read(&surface, |bytes, _| bytes.len());
        assert!(matches!(result, Err(BridgeError::MapFailed(_))));
    }

    #[test]
    fn test_map_is_always_unmapped() {
        let device = HostDevice::new();
        let stats = device.stats();
        let target = device.create_surface(&SurfaceDesc::target(2, 2)).unwrap();
        let staging = device.create_surface(&SurfaceDesc::staging_for(&target)).unwrap();

        let pitch = device.map_read(&staging, |_, pitch| pitch).unwrap();
        assert_eq!(pitch, 256);
        assert_eq!(stats.maps(), 1);
        assert_eq!(stats.unmaps(), 1);
    }

    #[test]
    fn test_draw_image_with_offset() {
        let device = HostDevice::new();
        let mut src = device.create_surface(&SurfaceDesc::target(4, 4)).unwrap();
        let mut pixels = vec![0u8; 16 * 4];
        for (i, px) in pixels.chunks_exact_mut(4).enumerate() {
            px.copy_from_slice(&[i as u8, 0, 0, 255]);
        }
        device.upload(&mut src, &pixels, 16).unwrap();

        let image = FrameImage::new(Arc::new(src));
        let mut target = device.create_surface(&SurfaceDesc::target(2, 2)).unwrap();
        device.draw_image(&mut target, &image, (-1.0, -2.0)).unwrap();

        // target(0,0) = src(1,2) = index 9
        assert_eq!(&target.data[0..4], &[9, 0, 0, 255]);
        assert_eq!(&target.data[4..8], &[10, 0, 0, 255]);
        assert_eq!(&target.data[target.pitch()..target.pitch() + 4], &[13, 0, 0, 255]);
    }
}
