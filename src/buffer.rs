/// CPU像素缓冲区 (BGRA8, 每像素4字节)
/// CPU-addressable pixel buffer with an explicit row stride.
use image::{Rgba, RgbaImage};

use crate::error::{BridgeError, BridgeResult};
use crate::surface::PixelFormat;

/// BGRA8 每像素字节数
pub const BYTES_PER_PIXEL: usize = 4;

/// CPU像素缓冲区
///
/// 行步长 (stride) 可能大于 `width * 4` (对齐填充).
/// 不变量: `stride >= width * 4` 且 `height * stride <= data.len()`.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl PixelBuffer {
    /// 全透明黑色缓冲区 (紧凑行布局)
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            stride,
            format: PixelFormat::Bgra8Premultiplied,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// 纯色缓冲区, `bgra` 为预乘后的颜色
    pub fn solid(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let mut buffer = Self::new(width, height);
        for px in buffer.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&bgra);
        }
        buffer
    }

    /// 从原始内存构造, 校验步长和长度
    pub fn from_raw(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> BridgeResult<Self> {
        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride < row_bytes {
            return Err(BridgeError::Layout(format!(
                "stride {} is smaller than a row of {} bytes",
                stride, row_bytes
            )));
        }
        if stride * height as usize > data.len() {
            return Err(BridgeError::Layout(format!(
                "{} rows of stride {} exceed {} bytes of backing memory",
                height,
                stride,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// 从带步长的映射内存复制出紧凑的BGRA缓冲区
    pub fn copy_from_strided(
        width: u32,
        height: u32,
        src: &[u8],
        src_pitch: usize,
    ) -> BridgeResult<Self> {
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        if src_pitch < row_bytes {
            return Err(BridgeError::Layout(format!(
                "mapped pitch {} is smaller than a row of {} bytes",
                src_pitch, row_bytes
            )));
        }
        if height > 0 && src.len() < src_pitch * (height as usize - 1) + row_bytes {
            return Err(BridgeError::Layout(format!(
                "mapped memory of {} bytes is too small for {}x{} at pitch {}",
                src.len(),
                width,
                height,
                src_pitch
            )));
        }

        let mut buffer = Self::new(width, height);
        for y in 0..height as usize {
            let src_row = &src[y * src_pitch..y * src_pitch + row_bytes];
            buffer.row_mut(y as u32).copy_from_slice(src_row);
        }
        Ok(buffer)
    }

    /// 从直通alpha的RGBA图像转换 (预乘)
    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let mut buffer = Self::new(width, height);
        for (x, y, px) in img.enumerate_pixels() {
            let [r, g, b, a] = px.0;
            buffer.set_pixel(
                x,
                y,
                [premultiply(b, a), premultiply(g, a), premultiply(r, a), a],
            );
        }
        buffer
    }

    /// 转换为直通alpha的RGBA图像 (反预乘)
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let [b, g, r, a] = self.pixel(x, y);
            Rgba([unpremultiply(r, a), unpremultiply(g, a), unpremultiply(b, a), a])
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 行步长 (字节)
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// 第 `y` 行的有效像素 (不含填充)
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.row_bytes();
        &mut self.data[start..start + len]
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, bgra: [u8; 4]) {
        let idx = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        self.data[idx..idx + BYTES_PER_PIXEL].copy_from_slice(&bgra);
    }

    /// 是否为紧凑布局 (stride == width * 4)
    pub fn is_packed(&self) -> bool {
        self.stride == self.row_bytes()
    }

    /// 去掉行填充, 返回紧凑副本
    pub fn to_packed(&self) -> Self {
        if self.is_packed() {
            return self.clone();
        }
        let mut packed = Self::new(self.width, self.height);
        packed.format = self.format;
        for y in 0..self.height {
            packed.row_mut(y).copy_from_slice(self.row(y));
        }
        packed
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

#[inline]
fn premultiply(c: u8, a: u8) -> u8 {
    ((c as u32 * a as u32 + 127) / 255) as u8
}

#[inline]
fn unpremultiply(c: u8, a: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8
}
