/// 前一帧状态 (Temporal state holder)
///
/// ```text
/// Empty -> Seeded -> Steady
/// Steady -> Seeded   (尺寸变化 / 输入丢失)
/// *      -> Disposed (终态)
/// ```
use std::sync::Arc;

use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// 尚无前一帧
    Empty,
    /// 已保存第一帧 (或尺寸变化后的新帧), 尚未输出差分
    Seeded,
    /// 正常差分
    Steady,
    /// 已释放
    Disposed,
}

/// 持有至多一个前一帧表面
pub struct TemporalState<S> {
    phase: FramePhase,
    previous: Option<Arc<S>>,
}

impl<S> Default for TemporalState<S> {
    fn default() -> Self {
        Self {
            phase: FramePhase::Empty,
            previous: None,
        }
    }
}

impl<S: Surface> TemporalState<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn previous(&self) -> Option<&Arc<S>> {
        self.previous.as_ref()
    }

    /// 前一帧尺寸与 `size` 一致
    pub fn matches_size(&self, size: (u32, u32)) -> bool {
        self.previous.as_ref().is_some_and(|s| s.size() == size)
    }

    /// 是否需要用当前帧重新播种
    pub fn needs_seed(&self, size: (u32, u32)) -> bool {
        match self.phase {
            FramePhase::Empty => true,
            FramePhase::Seeded | FramePhase::Steady => !self.matches_size(size),
            FramePhase::Disposed => false,
        }
    }

    /// 保存新的基准帧, 旧表面随之释放. 已释放时忽略
    pub fn seed(&mut self, surface: Arc<S>) {
        if self.phase == FramePhase::Disposed {
            return;
        }
        self.previous = Some(surface);
        self.phase = FramePhase::Seeded;
    }

    /// 差分成功后用新结果替换前一帧
    pub fn advance(&mut self, surface: Arc<S>) {
        if self.phase == FramePhase::Disposed {
            return;
        }
        self.previous = Some(surface);
        self.phase = FramePhase::Steady;
    }

    /// 输入丢失: Steady -> Seeded, 保留前一帧
    pub fn invalidate(&mut self) {
        if self.phase == FramePhase::Steady {
            self.phase = FramePhase::Seeded;
        }
    }

    /// 释放前一帧, 进入终态
    pub fn dispose(&mut self) {
        self.previous = None;
        self.phase = FramePhase::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{HostDevice, HostSurface, SurfaceDesc, SurfaceDevice};

    fn surface(device: &HostDevice, w: u32, h: u32) -> Arc<HostSurface> {
        Arc::new(device.create_surface(&SurfaceDesc::target(w, h)).unwrap())
    }

    #[test]
    fn test_seed_then_steady() {
        let device = HostDevice::new();
        let mut state = TemporalState::new();
        assert_eq!(state.phase(), FramePhase::Empty);
        assert!(state.needs_seed((4, 4)));

        state.seed(surface(&device, 4, 4));
        assert_eq!(state.phase(), FramePhase::Seeded);
        assert!(!state.needs_seed((4, 4)));

        state.advance(surface(&device, 4, 4));
        assert_eq!(state.phase(), FramePhase::Steady);
        assert_eq!(device.stats().live_surfaces(), 1);
    }

    #[test]
    fn test_resize_requires_seed() {
        let device = HostDevice::new();
        let mut state = TemporalState::new();
        state.seed(surface(&device, 4, 4));
        state.advance(surface(&device, 4, 4));

        assert!(state.needs_seed((8, 4)));
        state.seed(surface(&device, 8, 4));
        assert_eq!(state.phase(), FramePhase::Seeded);
        assert!(state.matches_size((8, 4)));
        assert_eq!(device.stats().live_surfaces(), 1);
    }

    #[test]
    fn test_invalidate_only_from_steady() {
        let device = HostDevice::new();
        let mut state = TemporalState::new();
        state.invalidate();
        assert_eq!(state.phase(), FramePhase::Empty);

        state.seed(surface(&device, 2, 2));
        state.advance(surface(&device, 2, 2));
        state.invalidate();
        assert_eq!(state.phase(), FramePhase::Seeded);
        assert!(state.previous().is_some());
    }

    #[test]
    fn test_dispose_is_terminal() {
        let device = HostDevice::new();
        let stats = device.stats();
        let mut state = TemporalState::new();
        state.seed(surface(&device, 2, 2));

        state.dispose();
        assert_eq!(state.phase(), FramePhase::Disposed);
        assert_eq!(stats.live_surfaces(), 0);

        state.seed(surface(&device, 2, 2));
        assert_eq!(state.phase(), FramePhase::Disposed);
        assert!(state.previous().is_none());
        assert!(!state.needs_seed((2, 2)));
        assert_eq!(stats.live_surfaces(), 0);
    }
}
