/// wgpu后端 (GPU surface backend)
///
/// - `Target` 表面: `Bgra8Unorm` 纹理, 不可直接映射
/// - `CpuRead` 表面: `MAP_READ | COPY_DST` 缓冲区, 行按256字节对齐
///
/// 注意: 使用pollster::block_on内部处理异步,外部是同步调用
use super::{blit_region, FrameImage, PixelFormat, Surface, SurfaceDesc, SurfaceDevice, SurfaceUsage};
use crate::error::{BridgeError, BridgeResult};

/// `copy_texture_to_buffer` 要求的行对齐
const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

enum Storage {
    Texture(wgpu::Texture),
    Readback {
        buffer: wgpu::Buffer,
        bytes_per_row: u32,
    },
}

/// GPU表面, Drop时释放纹理/缓冲区
pub struct WgpuSurface {
    storage: Storage,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Surface for WgpuSurface {
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
        matches!(self.storage, Storage::Readback { .. })
    }
}

impl WgpuSurface {
    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    fn row_bytes(&self) -> u32 {
        self.width * self.format.bytes_per_pixel() as u32
    }
}

/// wgpu图形设备
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuDevice {
    /// 创建GPU设备
    ///
    /// 1. 选择GPU适配器
    /// 2. 获取设备和队列
    pub fn new() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow::anyhow!("无法找到合适的GPU"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Motion Detect Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))?;

        tracing::info!("GPU adapter: {}", adapter.get_info().name);
        Ok(Self { device, queue })
    }

    fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
        match format {
            PixelFormat::Bgra8Premultiplied => wgpu::TextureFormat::Bgra8Unorm,
            PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Gray8 => wgpu::TextureFormat::R8Unorm,
        }
    }

    fn texture_copy(texture: &wgpu::Texture, x: u32, y: u32) -> wgpu::ImageCopyTexture<'_> {
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x, y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        }
    }

    fn buffer_copy(
        buffer: &wgpu::Buffer,
        offset: u64,
        bytes_per_row: u32,
        rows: u32,
    ) -> wgpu::ImageCopyBuffer<'_> {
        wgpu::ImageCopyBuffer {
            buffer,
            layout: wgpu::ImageDataLayout {
                offset,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(rows),
            },
        }
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(Some(encoder.finish()));
    }

    /// 以零填充整个表面
    fn clear(&self, surface: &WgpuSurface) {
        match &surface.storage {
            Storage::Texture(texture) => {
                let row_bytes = surface.row_bytes();
                let zeros = vec![0u8; (row_bytes * surface.height) as usize];
                self.queue.write_texture(
                    Self::texture_copy(texture, 0, 0),
                    &zeros,
                    wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(row_bytes),
                        rows_per_image: Some(surface.height),
                    },
                    surface.extent(),
                );
            }
            Storage::Readback {
                buffer,
                bytes_per_row,
            } => {
                let zeros = vec![0u8; (*bytes_per_row * surface.height) as usize];
                self.queue.write_buffer(buffer, 0, &zeros);
            }
        }
    }
}

impl SurfaceDevice for WgpuDevice {
    type Surface = WgpuSurface;

    fn create_surface(&self, desc: &SurfaceDesc) -> BridgeResult<WgpuSurface> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BridgeError::Allocation(format!(
                "empty surface {}x{}",
                desc.width, desc.height
            )));
        }

        let storage = match desc.usage {
            SurfaceUsage::Target => Storage::Texture(self.device.create_texture(
                &wgpu::TextureDescriptor {
                    label: Some("MotionSurface"),
                    size: wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: Self::texture_format(desc.format),
                    usage: wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_DST
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                },
            )),
            SurfaceUsage::CpuRead => {
                let row_bytes = desc.width * desc.format.bytes_per_pixel() as u32;
                let bytes_per_row = align_to(row_bytes, COPY_ALIGNMENT);
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("MotionSurface::readback"),
                    size: bytes_per_row as u64 * desc.height as u64,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                Storage::Readback {
                    buffer,
                    bytes_per_row,
                }
            }
        };

        Ok(WgpuSurface {
            storage,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        })
    }

    fn copy_surface(&self, dst: &mut WgpuSurface, src: &WgpuSurface) -> BridgeResult<()> {
        if dst.size() != src.size() || dst.format != src.format {
            return Err(BridgeError::Copy(format!(
                "{:?} {:?} -> {:?} {:?}",
                src.size(),
                src.format,
                dst.size(),
                dst.format
            )));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("MotionSurface::copy"),
            });

        match (&src.storage, &dst.storage) {
            (Storage::Texture(s), Storage::Texture(d)) => encoder.copy_texture_to_texture(
                Self::texture_copy(s, 0, 0),
                Self::texture_copy(d, 0, 0),
                src.extent(),
            ),
            (Storage::Texture(s), Storage::Readback { buffer, bytes_per_row }) => encoder
                .copy_texture_to_buffer(
                    Self::texture_copy(s, 0, 0),
                    Self::buffer_copy(buffer, 0, *bytes_per_row, src.height),
                    src.extent(),
                ),
            (Storage::Readback { .. }, _) => {
                // MAP_READ 缓冲区不能作为复制源
                return Err(BridgeError::Copy(
                    "readback surfaces cannot be used as a copy source".into(),
                ));
            }
        }

        self.submit(encoder);
        Ok(())
    }

    fn upload(&self, dst: &mut WgpuSurface, data: &[u8], pitch: usize) -> BridgeResult<()> {
        let row_bytes = dst.row_bytes() as usize;
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

        match &dst.storage {
            Storage::Texture(texture) => {
                // write_texture 不要求256字节对齐
                self.queue.write_texture(
                    Self::texture_copy(texture, 0, 0),
                    data,
                    wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(pitch as u32),
                        rows_per_image: Some(dst.height),
                    },
                    dst.extent(),
                );
            }
            Storage::Readback {
                buffer,
                bytes_per_row,
            } => {
                let aligned = *bytes_per_row as usize;
                let mut staging = vec![0u8; aligned * rows];
                for y in 0..rows {
                    staging[y * aligned..y * aligned + row_bytes]
                        .copy_from_slice(&data[y * pitch..y * pitch + row_bytes]);
                }
                self.queue.write_buffer(buffer, 0, &staging);
            }
        }
        self.queue.submit(None);
        Ok(())
    }

    fn map_read<R, F>(&self, surface: &WgpuSurface, read: F) -> BridgeResult<R>
    where
        F: FnOnce(&[u8], usize) -> R,
    {
        let Storage::Readback {
            buffer,
            bytes_per_row,
        } = &surface.storage
        else {
            return Err(BridgeError::MapFailed(
                "texture storage is not CPU-mappable".into(),
            ));
        };

        let slice = buffer.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        // 等待GPU完成
        self.device.poll(wgpu::Maintain::Wait);
        match pollster::block_on(rx) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(BridgeError::MapFailed(e.to_string())),
            Err(_) => return Err(BridgeError::MapFailed("map callback was dropped".into())),
        }

        let _unmap = UnmapGuard(buffer);
        let mapped = slice.get_mapped_range();
        let result = read(&mapped, *bytes_per_row as usize);
        drop(mapped);
        Ok(result)
    }

    fn draw_image(
        &self,
        target: &mut WgpuSurface,
        image: &FrameImage<WgpuSurface>,
        offset: (f32, f32),
    ) -> BridgeResult<()> {
        let src = image.surface();
        if src.format != target.format {
            return Err(BridgeError::Copy(format!(
                "cannot draw {:?} onto {:?}",
                src.format, target.format
            )));
        }
        let Storage::Texture(src_texture) = &src.storage else {
            return Err(BridgeError::Copy("readback surfaces cannot be drawn".into()));
        };

        self.clear(target);
        let Some(region) = blit_region(src.size(), target.size(), offset) else {
            self.queue.submit(None);
            return Ok(());
        };

        let extent = wgpu::Extent3d {
            width: region.width,
            height: region.height,
            depth_or_array_layers: 1,
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("MotionSurface::draw_image"),
            });

        match &target.storage {
            Storage::Texture(dst_texture) => encoder.copy_texture_to_texture(
                Self::texture_copy(src_texture, region.src_x, region.src_y),
                Self::texture_copy(dst_texture, region.dst_x, region.dst_y),
                extent,
            ),
            Storage::Readback {
                buffer,
                bytes_per_row,
            } => {
                let bpp = target.format.bytes_per_pixel() as u64;
                let offset =
                    region.dst_y as u64 * *bytes_per_row as u64 + region.dst_x as u64 * bpp;
                encoder.copy_texture_to_buffer(
                    Self::texture_copy(src_texture, region.src_x, region.src_y),
                    Self::buffer_copy(buffer, offset, *bytes_per_row, region.height),
                    extent,
                )
            }
        }

        self.submit(encoder);
        Ok(())
    }
}

struct UnmapGuard<'a>(&'a wgpu::Buffer);

impl Drop for UnmapGuard<'_> {
    fn drop(&mut self) {
        self.0.unmap();
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
