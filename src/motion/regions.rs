/// 区域提取与标注 (Region extraction & annotation)
///
/// 外轮廓 -> 面积过滤 -> 外接矩形 -> 描边
use image::{GenericImage, GrayImage, Rgba, RgbaImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::point::Point;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;

/// 描边粗细上限
pub const MAX_THICKNESS: i32 = 1024;

/// 运动区域: 外接矩形 + 轮廓面积
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// 轮廓多边形面积 (像素), 不是 width * height
    pub area: f64,
}

impl MotionRegion {
    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

/// 提取掩码的外轮廓 (不含孔洞及嵌套轮廓), 按光栅扫描发现顺序
///
/// 四周补一圈0后追踪, 贴边的前景同样闭合; 返回的坐标已移回原图.
pub fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    let (width, height) = mask.dimensions();
    let mut padded = GrayImage::new(width + 2, height + 2);
    if padded.copy_from(mask, 1, 1).is_err() {
        return Vec::new();
    }

    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|mut c| {
            for p in c.points.iter_mut() {
                p.x -= 1;
                p.y -= 1;
            }
            c
        })
        .collect()
}

/// 轮廓多边形面积 (鞋带公式)
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice as f64 / 2.0).abs()
}

/// 外接矩形 (x, y, 宽, 高), 包含两端像素
pub fn bounding_rect(points: &[Point<i32>]) -> Option<(i32, i32, u32, u32)> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points.iter().skip(1) {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some((
        min_x,
        min_y,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// 提取运动区域, 丢弃面积小于 `noise_area` 的轮廓
pub fn extract_regions(mask: &GrayImage, noise_area: f64) -> Vec<MotionRegion> {
    external_contours(mask)
        .iter()
        .filter_map(|contour| {
            let area = contour_area(&contour.points);
            if area < noise_area {
                return None;
            }
            let (x, y, width, height) = bounding_rect(&contour.points)?;
            Some(MotionRegion {
                x,
                y,
                width,
                height,
                area,
            })
        })
        .collect()
}

/// 描边粗细: 0 及负数按1像素处理, 不超过 `MAX_THICKNESS`
pub fn stroke_width(thickness: i32) -> u32 {
    thickness.clamp(1, MAX_THICKNESS) as u32
}

/// 在缓冲区上绘制区域外接矩形 (仅描边)
///
/// 线宽为 `t` 时, 线条以矩形边为中心, 向外扩展 `t / 2` 像素.
/// 线宽不超过画面的长边. `color` 为BGRA.
pub fn annotate_regions(
    buffer: &mut PixelBuffer,
    regions: &[MotionRegion],
    color: [u8; 4],
    thickness: i32,
) {
    if regions.is_empty() {
        return;
    }

    let (width, height) = buffer.dimensions();
    let packed = buffer.to_packed();
    // 通道按位置解释, 不做颜色转换
    let Some(mut canvas) = RgbaImage::from_raw(width, height, packed.as_bytes().to_vec()) else {
        return;
    };

    let t = stroke_width(thickness).min(width.max(height).max(1));
    let half = (t / 2) as i32;
    let pixel = Rgba(color);
    for region in regions {
        let x0 = region.x - half;
        let y0 = region.y - half;
        let x1 = region.x + region.width as i32 - 1 - half;
        let y1 = region.y + region.height as i32 - 1 - half;
        let span_w = region.width + t - 1;
        let span_h = region.height + t - 1;

        draw_filled_rect_mut(&mut canvas, Rect::at(x0, y0).of_size(span_w, t), pixel);
        draw_filled_rect_mut(&mut canvas, Rect::at(x0, y1).of_size(span_w, t), pixel);
        draw_filled_rect_mut(&mut canvas, Rect::at(x0, y0).of_size(t, span_h), pixel);
        draw_filled_rect_mut(&mut canvas, Rect::at(x1, y0).of_size(t, span_h), pixel);
    }

    for y in 0..height {
        let start = (y * width * 4) as usize;
        let end = start + (width * 4) as usize;
        buffer.row_mut(y).copy_from_slice(&canvas.as_raw()[start..end]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn rect_mask(width: u32, height: u32, x: u32, y: u32, w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |px, py| {
            let inside = px >= x && px < x + w && py >= y && py < y + h;
            Luma([if inside { 255 } else { 0 }])
        })
    }

    fn square_mask(size: u32, x: u32, y: u32, side: u32) -> GrayImage {
        rect_mask(size, size, x, y, side, side)
    }

    fn bbox(r: &MotionRegion) -> (i32, i32, u32, u32) {
        (r.x, r.y, r.width, r.height)
    }

    #[test]
    fn test_single_square() {
        let mask = square_mask(64, 20, 20, 10);
        let regions = extract_regions(&mask, 0.0);
        assert_eq!(regions.len(), 1);

        assert_eq!(bbox(&regions[0]), (20, 20, 10, 10));
        // 轮廓经过边界像素中心: 9 x 9
        assert_eq!(regions[0].area, 81.0);
    }

    #[test]
    fn test_blobs_touching_each_edge() {
        let cases = [
            // 左
            ((0, 10, 5, 10), (0, 10, 5, 10)),
            // 上
            ((10, 0, 10, 5), (10, 0, 10, 5)),
            // 右
            ((27, 4, 5, 6), (27, 4, 5, 6)),
            // 下
            ((8, 26, 7, 6), (8, 26, 7, 6)),
            // 左上角
            ((0, 0, 4, 4), (0, 0, 4, 4)),
        ];
        for ((x, y, w, h), expected) in cases {
            let mask = rect_mask(32, 32, x, y, w, h);
            let regions = extract_regions(&mask, 0.0);
            assert_eq!(regions.len(), 1, "blob at ({}, {})", x, y);
            assert_eq!(bbox(&regions[0]), expected);
            assert_eq!(regions[0].area, ((w - 1) * (h - 1)) as f64);
        }
    }

    #[test]
    fn test_full_frame_mask() {
        let mask = GrayImage::from_pixel(16, 16, Luma([255]));
        let regions = extract_regions(&mask, 0.0);
        assert_eq!(regions.len(), 1);
        assert_eq!(bbox(&regions[0]), (0, 0, 16, 16));
        assert_eq!(regions[0].area, 225.0);
    }

    #[test]
    fn test_frame_with_hole_is_one_region() {
        // 画面中只有方块处为0
        let mut mask = GrayImage::from_pixel(64, 64, Luma([255]));
        for y in 20..30 {
            for x in 20..30 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        let regions = extract_regions(&mask, 0.0);
        assert_eq!(regions.len(), 1);
        assert_eq!(bbox(&regions[0]), (0, 0, 64, 64));
    }

    #[test]
    fn test_holes_are_not_regions() {
        // 环形: 外框 20x20, 中间挖空 10x10
        let mut mask = square_mask(40, 10, 10, 20);
        for y in 15..25 {
            for x in 15..25 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        // 孔洞内的小块是嵌套轮廓, 不计入
        mask.put_pixel(20, 20, Luma([255]));

        let regions = extract_regions(&mask, 0.0);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].x, regions[0].y), (10, 10));
    }

    #[test]
    fn test_noise_filter_and_order() {
        let mut mask = GrayImage::new(50, 50);
        // 下方大块
        for y in 30..40 {
            for x in 5..15 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        // 上方单像素噪点
        mask.put_pixel(40, 3, Luma([255]));
        // 中间 3x3
        for y in 10..13 {
            for x in 20..23 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let all = extract_regions(&mask, 0.0);
        assert_eq!(all.len(), 3);
        assert_eq!((all[0].x, all[0].y), (40, 3));
        assert_eq!(all[0].area, 0.0);
        assert_eq!((all[1].x, all[1].y), (20, 10));
        assert_eq!((all[2].x, all[2].y), (5, 30));

        let filtered = extract_regions(&mask, 10.0);
        assert_eq!(filtered.len(), 1);
        assert_eq!((filtered[0].x, filtered[0].y), (5, 30));
    }

    #[test]
    fn test_bounding_rect_single_point() {
        assert_eq!(bounding_rect(&[Point::new(3, 4)]), Some((3, 4, 1, 1)));
        assert_eq!(bounding_rect(&[]), None);
    }

    #[test]
    fn test_annotate_one_pixel_outline() {
        let mut buffer = PixelBuffer::solid(12, 12, [0, 0, 0, 255]);
        let region = MotionRegion {
            x: 2,
            y: 3,
            width: 5,
            height: 4,
            area: 12.0,
        };
        let red = [0, 0, 255, 255];
        annotate_regions(&mut buffer, &[region], red, 1);

        assert_eq!(buffer.pixel(2, 3), red);
        assert_eq!(buffer.pixel(6, 3), red);
        assert_eq!(buffer.pixel(2, 6), red);
        assert_eq!(buffer.pixel(6, 6), red);
        assert_eq!(buffer.pixel(4, 3), red);
        // 内部不填充
        assert_eq!(buffer.pixel(4, 4), [0, 0, 0, 255]);
        // 外部不变
        assert_eq!(buffer.pixel(7, 3), [0, 0, 0, 255]);
        assert_eq!(buffer.pixel(1, 3), [0, 0, 0, 255]);
    }

    #[test]
    fn test_zero_thickness_draws_hairline() {
        let mut zero = PixelBuffer::new(10, 10);
        let mut one = PixelBuffer::new(10, 10);
        let region = MotionRegion {
            x: 1,
            y: 1,
            width: 6,
            height: 6,
            area: 25.0,
        };
        annotate_regions(&mut zero, &[region.clone()], [255, 255, 255, 255], 0);
        annotate_regions(&mut one, &[region.clone()], [255, 255, 255, 255], 1);
        assert_eq!(zero, one);

        let mut negative = PixelBuffer::new(10, 10);
        annotate_regions(&mut negative, &[region], [255, 255, 255, 255], -3);
        assert_eq!(negative, one);
    }

    #[test]
    fn test_thick_outline_is_centered() {
        let mut buffer = PixelBuffer::new(20, 20);
        let region = MotionRegion {
            x: 5,
            y: 5,
            width: 10,
            height: 10,
            area: 81.0,
        };
        let white = [255, 255, 255, 255];
        annotate_regions(&mut buffer, &[region], white, 3);

        // 上边: y 4..=6
        assert_eq!(buffer.pixel(8, 4), white);
        assert_eq!(buffer.pixel(8, 6), white);
        assert_eq!(buffer.pixel(8, 7), [0, 0, 0, 0]);
        assert_eq!(buffer.pixel(8, 3), [0, 0, 0, 0]);
        // 右边: x 13..=15
        assert_eq!(buffer.pixel(15, 10), white);
        assert_eq!(buffer.pixel(16, 10), [0, 0, 0, 0]);
    }

    #[test]
    fn test_outline_clipped_at_border() {
        let mut buffer = PixelBuffer::new(8, 8);
        let region = MotionRegion {
            x: 0,
            y: 0,
            width: 8,
            height: 8,
            area: 49.0,
        };
        annotate_regions(&mut buffer, &[region], [1, 2, 3, 4], 5);
        assert_eq!(buffer.pixel(0, 0), [1, 2, 3, 4]);
        assert_eq!(buffer.pixel(7, 7), [1, 2, 3, 4]);
    }

    #[test]
    fn test_huge_thickness_is_capped() {
        assert_eq!(stroke_width(i32::MAX), MAX_THICKNESS as u32);

        let mut buffer = PixelBuffer::new(16, 12);
        let region = MotionRegion {
            x: 4,
            y: 4,
            width: 4,
            height: 4,
            area: 9.0,
        };
        annotate_regions(&mut buffer, &[region], [9, 9, 9, 9], i32::MAX);
        assert_eq!(buffer.pixel(0, 0), [9, 9, 9, 9]);
        assert_eq!(buffer.pixel(14, 11), [9, 9, 9, 9]);
    }
}
