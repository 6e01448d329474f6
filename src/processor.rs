/// 动体检测效果实例 (Motion detection processor)
///
/// 每次 `update`:
/// 1. 把当前输入按其边界绘制到目标表面, 读回CPU
/// 2. 首帧或尺寸变化时播种前一帧, 直接输出当前帧
/// 3. 否则读回前一帧, 计算帧差分, 写回新表面
/// 4. 新表面同时作为下一帧的前一帧和输出
///
/// 任何桥接失败都退化为直通: 输出未修改的当前输入.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compositor::OutputStage;
use crate::config::MotionParams;
use crate::error::{BridgeError, MotionError, MotionResult};
use crate::motion::{compute_motion, MotionRegion};
use crate::surface::{
    read_surface_to_buffer, write_buffer_to_surface, FrameImage, RectF, SurfaceDesc,
    SurfaceDevice,
};
use crate::temporal::{FramePhase, TemporalState};

/// 单帧检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionReport {
    pub width: u32,
    pub height: u32,
    pub regions: Vec<MotionRegion>,
}

/// 一次 `update` 的结果
#[derive(Debug)]
pub enum UpdateOutcome {
    /// 无输入 / 已释放 / 边界为空
    Skipped,
    /// 首帧或尺寸变化, 输出为当前帧
    Seeded,
    Processed(MotionReport),
    /// 处理失败, 输出为未修改的输入
    PassThrough(MotionError),
}

pub struct MotionDetectionProcessor<D: SurfaceDevice> {
    device: D,
    current: Option<FrameImage<D::Surface>>,
    previous_input: Option<FrameImage<D::Surface>>,
    state: TemporalState<D::Surface>,
    output: OutputStage<D::Surface>,
}

impl<D: SurfaceDevice> MotionDetectionProcessor<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            current: None,
            previous_input: None,
            state: TemporalState::new(),
            output: OutputStage::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// 定位后的输出
    pub fn output(&self) -> &OutputStage<D::Surface> {
        &self.output
    }

    pub fn phase(&self) -> FramePhase {
        self.state.phase()
    }

    pub fn current_input(&self) -> Option<&FrameImage<D::Surface>> {
        self.current.as_ref()
    }

    pub fn previous_input(&self) -> Option<&FrameImage<D::Surface>> {
        self.previous_input.as_ref()
    }

    /// 设置当前输入, 旧的当前输入移入前一输入槽; 之前没有输入时两槽相同
    pub fn set_input(&mut self, input: Option<FrameImage<D::Surface>>) {
        if self.state.phase() == FramePhase::Disposed {
            return;
        }
        if input.is_none() {
            self.state.invalidate();
        }
        self.previous_input = self.current.take().or_else(|| input.clone());
        self.current = input;
    }

    /// 断开输出
    pub fn clear_input(&mut self) {
        self.output.clear();
        self.state.invalidate();
    }

    /// 释放前一帧和输出, 之后的调用全部跳过
    pub fn dispose(&mut self) {
        self.output.clear();
        self.state.dispose();
        self.current = None;
        self.previous_input = None;
        debug!("motion processor disposed");
    }

    pub fn update(&mut self, params: &MotionParams) -> UpdateOutcome {
        if self.state.phase() == FramePhase::Disposed {
            return UpdateOutcome::Skipped;
        }
        let (Some(current), Some(_)) = (self.current.clone(), self.previous_input.as_ref()) else {
            return UpdateOutcome::Skipped;
        };
        let bounds = current.bounds();
        let (width, height) = bounds.pixel_size();
        if width == 0 || height == 0 {
            return UpdateOutcome::Skipped;
        }

        match self.process(&current, bounds, params) {
            Ok(outcome) => outcome,
            Err(e) => self.pass_through(&current, e),
        }
    }

    fn process(
        &mut self,
        current: &FrameImage<D::Surface>,
        bounds: RectF,
        params: &MotionParams,
    ) -> MotionResult<UpdateOutcome> {
        let (width, height) = bounds.pixel_size();
        let frame_bounds = RectF::from_size(width, height);

        let mut target = self
            .device
            .create_surface(&SurfaceDesc::target(width, height))?;
        self.device
            .draw_image(&mut target, current, (-bounds.left, -bounds.top))?;

        if self.state.needs_seed((width, height)) {
            info!("seeding previous frame at {}x{}", width, height);
            let seeded = Arc::new(target);
            self.state.seed(Arc::clone(&seeded));
            self.output.set_input(seeded, frame_bounds);
            return Ok(UpdateOutcome::Seeded);
        }

        let Some(previous) = self.state.previous().cloned() else {
            return Ok(UpdateOutcome::Skipped);
        };

        let current_buf = read_surface_to_buffer(&self.device, &target)?;
        drop(target);
        let previous_buf = read_surface_to_buffer(&self.device, &previous)?;
        drop(previous);

        let snapshot = params.snapshot();
        let result = compute_motion(&current_buf, &previous_buf, &snapshot)?;
        debug!("{} motion regions", result.regions.len());

        let processed = Arc::new(write_buffer_to_surface(&self.device, &result.buffer)?);
        self.state.advance(Arc::clone(&processed));
        self.output.set_input(processed, frame_bounds);

        Ok(UpdateOutcome::Processed(MotionReport {
            width,
            height,
            regions: result.regions,
        }))
    }

    fn pass_through(&mut self, current: &FrameImage<D::Surface>, err: MotionError) -> UpdateOutcome {
        debug_assert!(
            !matches!(err, MotionError::Bridge(BridgeError::InvalidPixelFormat(_))),
            "pipeline produced a non-BGRA buffer: {}",
            err
        );
        warn!("motion detection skipped for this frame: {}", err);
        self.output
            .set_input(Arc::clone(current.surface()), current.bounds());
        UpdateOutcome::PassThrough(err)
    }
}
