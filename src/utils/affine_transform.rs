/// 仿射变换工具模块
/// 输出阶段的定位矩阵 (平移) 及边界变换
use crate::surface::RectF;

/// 仿射变换矩阵 (2x3)
/// | a11 a12 b1 |
/// | a21 a22 b2 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub a11: f32,
    pub a12: f32,
    pub b1: f32,
    pub a21: f32,
    pub a22: f32,
    pub b2: f32,
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineMatrix {
    /// 单位矩阵
    pub fn identity() -> Self {
        Self::translation(0.0, 0.0)
    }

    /// 平移矩阵
    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            a11: 1.0,
            a12: 0.0,
            b1: dx,
            a21: 0.0,
            a22: 1.0,
            b2: dy,
        }
    }

    /// 把矩形中心移到原点
    pub fn centering(bounds: &RectF) -> Self {
        let (cx, cy) = bounds.center();
        Self::translation(-cx, -cy)
    }

    /// 平移分量
    pub fn offset(&self) -> (f32, f32) {
        (self.b1, self.b2)
    }

    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a11 * x + self.a12 * y + self.b1,
            self.a21 * x + self.a22 * y + self.b2,
        )
    }

    /// 变换矩形的四个角, 返回其轴对齐外接矩形
    pub fn transform_rect(&self, rect: &RectF) -> RectF {
        let corners = [
            self.transform_point(rect.left, rect.top),
            self.transform_point(rect.right, rect.top),
            self.transform_point(rect.left, rect.bottom),
            self.transform_point(rect.right, rect.bottom),
        ];
        let mut out = RectF::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for (x, y) in corners {
            out.left = out.left.min(x);
            out.top = out.top.min(y);
            out.right = out.right.max(x);
            out.bottom = out.bottom.max(y);
        }
        out
    }
}
