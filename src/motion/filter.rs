/// 帧差分的逐像素阶段
/// Per-pixel stages: luma, Gaussian smoothing, difference, threshold and polarity.
use image::{GrayImage, Luma};
use imageproc::contrast::{self, ThresholdType};
use imageproc::map::map_colors2;

use crate::buffer::PixelBuffer;

/// BT.601 亮度权重 (14位定点)
const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

/// BGRA -> 灰度, 忽略alpha
pub fn to_luma(buffer: &PixelBuffer) -> GrayImage {
    let mut gray = GrayImage::new(buffer.width(), buffer.height());
    for y in 0..buffer.height() {
        let row = buffer.row(y);
        for (x, px) in row.chunks_exact(4).enumerate() {
            let (b, g, r) = (px[0] as u32, px[1] as u32, px[2] as u32);
            let value = (r * LUMA_R + g * LUMA_G + b * LUMA_B + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT;
            gray.put_pixel(x as u32, y, Luma([value as u8]));
        }
    }
    gray
}

/// 由"滑らかさ"参数计算高斯核尺寸: `3 + 2 * (b - 1)`, b = 0 时为1 (跳过)
pub fn blur_kernel_size(blur: u32) -> usize {
    if blur == 0 {
        1
    } else {
        3 + 2 * (blur as usize - 1)
    }
}

/// 一维高斯核 (归一化)
///
/// 尺寸 3/5/7 使用固定二项式系数, 其余按
/// `sigma = 0.3 * ((k - 1) * 0.5 - 1) + 0.8` 采样.
pub fn gaussian_kernel(ksize: usize) -> Vec<f32> {
    // 偶数尺寸向上取奇数
    let ksize = if ksize % 2 == 0 { ksize + 1 } else { ksize.max(1) };
    match ksize {
        1 => return vec![1.0],
        3 => return vec![0.25, 0.5, 0.25],
        5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => {
            return vec![
                0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
            ]
        }
        _ => {}
    }

    let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let scale = -0.5 / (sigma * sigma);
    let half = (ksize / 2) as f64;
    let raw: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - half;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.iter().map(|w| (w / sum) as f32).collect()
}

/// reflect-101 边界: -1 -> 1, n -> n - 2
#[inline]
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut i = index.rem_euclid(period);
    if i >= len as isize {
        i = period - i;
    }
    i as usize
}

/// 可分离高斯平滑 (先水平后垂直), 核尺寸为1时原样返回
pub fn gaussian_blur(src: &GrayImage, ksize: usize) -> GrayImage {
    let kernel = gaussian_kernel(ksize);
    if kernel.len() == 1 {
        return src.clone();
    }

    let (w, h) = src.dimensions();
    let (w, h) = (w as usize, h as usize);
    let half = (kernel.len() / 2) as isize;
    let pixels = src.as_raw();

    // 水平
    let mut rows = vec![0f32; w * h];
    for y in 0..h {
        let line = &pixels[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = reflect_101(x as isize + ki as isize - half, w);
                acc += line[sx] as f32 * kv;
            }
            rows[y * w + x] = acc;
        }
    }

    // 垂直
    let mut dst = GrayImage::new(w as u32, h as u32);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = reflect_101(y as isize + ki as isize - half, h);
                acc += rows[sy * w + x] * kv;
            }
            dst.put_pixel(x as u32, y as u32, Luma([acc.round().clamp(0.0, 255.0) as u8]));
        }
    }
    dst
}

/// |a - b|
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    map_colors2(a, b, |pa, pb| Luma([pa.0[0].abs_diff(pb.0[0])]))
}

/// 二值化: diff > t 为 255, 否则 0
pub fn threshold_binary(diff: &GrayImage, threshold: u8) -> GrayImage {
    contrast::threshold(diff, threshold, ThresholdType::Binary)
}

/// 带极性的运动掩码: 反转时即二值图, 非反转时取反 (未变化像素为255)
pub fn motion_mask(diff: &GrayImage, threshold: u8, invert: bool) -> GrayImage {
    let kind = if invert {
        ThresholdType::Binary
    } else {
        ThresholdType::BinaryInverted
    };
    contrast::threshold(diff, threshold, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_weights() {
        let mut buffer = PixelBuffer::new(4, 1);
        buffer.set_pixel(0, 0, [0, 0, 255, 255]); // 红
        buffer.set_pixel(1, 0, [0, 255, 0, 255]); // 绿
        buffer.set_pixel(2, 0, [255, 0, 0, 255]); // 蓝
        buffer.set_pixel(3, 0, [200, 200, 200, 0]);

        let gray = to_luma(&buffer);
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 29);
        // alpha 不影响亮度
        assert_eq!(gray.get_pixel(3, 0).0[0], 200);
    }

    #[test]
    fn test_kernel_size() {
        assert_eq!(blur_kernel_size(0), 1);
        assert_eq!(blur_kernel_size(1), 3);
        assert_eq!(blur_kernel_size(2), 5);
        assert_eq!(blur_kernel_size(10), 21);
    }

    #[test]
    fn test_kernel_normalized_and_symmetric() {
        for ksize in [1, 3, 5, 7, 9, 21, 8] {
            let kernel = gaussian_kernel(ksize);
            assert_eq!(kernel.len() % 2, 1);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "ksize {} sums to {}", ksize, sum);
            for i in 0..kernel.len() / 2 {
                assert!((kernel[i] - kernel[kernel.len() - 1 - i]).abs() < 1e-7);
            }
        }
        assert_eq!(gaussian_kernel(8).len(), 9);
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn test_blur_keeps_constant_image() {
        let src = GrayImage::from_pixel(9, 7, Luma([123]));
        for ksize in [3, 5, 11] {
            assert_eq!(gaussian_blur(&src, ksize), src);
        }
    }

    #[test]
    fn test_blur_spreads_impulse() {
        let mut src = GrayImage::new(5, 5);
        src.put_pixel(2, 2, Luma([255]));
        let out = gaussian_blur(&src, 3);
        // 255 * 0.5 * 0.5
        assert_eq!(out.get_pixel(2, 2).0[0], 64);
        // 255 * 0.25 * 0.5
        assert_eq!(out.get_pixel(1, 2).0[0], 32);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_blur_zero_is_identity() {
        let src = GrayImage::from_fn(6, 4, |x, y| Luma([(x * 40 + y) as u8]));
        assert_eq!(gaussian_blur(&src, blur_kernel_size(0)), src);
    }

    #[test]
    fn test_threshold_is_strict() {
        let diff = GrayImage::from_fn(3, 1, |x, _| Luma([[9u8, 10, 11][x as usize]]));
        let binary = threshold_binary(&diff, 10);
        assert_eq!(binary.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn test_polarity() {
        let diff = GrayImage::from_fn(3, 1, |x, _| Luma([[200u8, 20, 21][x as usize]]));
        assert_eq!(motion_mask(&diff, 20, true).as_raw(), &vec![255, 0, 255]);
        assert_eq!(motion_mask(&diff, 20, false).as_raw(), &vec![0, 255, 0]);
    }

    #[test]
    fn test_abs_diff_is_symmetric() {
        let a = GrayImage::from_fn(2, 1, |x, _| Luma([[10u8, 250][x as usize]]));
        let b = GrayImage::from_fn(2, 1, |x, _| Luma([[30u8, 5][x as usize]]));
        assert_eq!(abs_diff(&a, &b).as_raw(), &vec![20, 245]);
        assert_eq!(abs_diff(&b, &a), abs_diff(&a, &b));
    }
}
