/// 输出阶段 (Output compositor)
///
/// 持有处理后的表面和定位矩阵. 矩阵把结果的中心移到原点,
/// 下游按此矩阵重新定位到原帧的位置.
use std::sync::Arc;

use crate::surface::{RectF, Surface};
use crate::utils::AffineMatrix;

pub struct OutputStage<S> {
    transform: AffineMatrix,
    input: Option<Arc<S>>,
    bounds: RectF,
}

impl<S> Default for OutputStage<S> {
    fn default() -> Self {
        Self {
            transform: AffineMatrix::identity(),
            input: None,
            bounds: RectF::default(),
        }
    }
}

impl<S: Surface> OutputStage<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置输出表面, `bounds` 为其逻辑边界
    pub fn set_input(&mut self, surface: Arc<S>, bounds: RectF) {
        self.transform = AffineMatrix::centering(&bounds);
        self.bounds = bounds;
        self.input = Some(surface);
    }

    /// 断开输出
    pub fn clear(&mut self) {
        self.input = None;
        self.bounds = RectF::default();
        self.transform = AffineMatrix::identity();
    }

    pub fn surface(&self) -> Option<&Arc<S>> {
        self.input.as_ref()
    }

    pub fn transform(&self) -> AffineMatrix {
        self.transform
    }

    /// 输入边界
    pub fn input_bounds(&self) -> RectF {
        self.bounds
    }

    /// 变换后的边界
    pub fn output_bounds(&self) -> RectF {
        self.transform.transform_rect(&self.bounds)
    }
}
