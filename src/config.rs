//! 动体检测参数 - 通过JSON文件或命令行调整

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 噪声等级 -> 最小轮廓面积的倍率
pub const NOISE_AREA_PER_LEVEL: f64 = 10.0;

/// 平滑度上限
pub const MAX_BLUR: f64 = 50.0;

/// 噪声等级上限
pub const MAX_NOISE_LEVEL: f64 = 100.0;

/// NaN 视为 0, 其余截到 [0, max]
fn clamp_level(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

/// 用户参数 (宿主可调)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionParams {
    // === 检测 ===
    pub threshold_percent: f64, // 差分阈值 (0-100%)
    pub blur: f64,              // 平滑度 (0-50)
    pub noise_level: f64,       // 噪声过滤 (0-100)

    // === 输出 ===
    pub invert: bool,       // 反转掩码
    pub crop: bool,         // 仅保留掩码内像素
    pub show_regions: bool, // 绘制外接矩形
    pub thickness: f64,     // 描边粗细
    pub color: [u8; 4],     // 描边颜色 (BGRA)
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            threshold_percent: 75.0,
            blur: 0.0,
            noise_level: 0.0,

            invert: false,
            crop: false,
            show_regions: true,
            thickness: 1.0,
            color: [255, 255, 255, 255],
        }
    }
}

/// 单帧使用的已解析参数
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSnapshot {
    pub threshold: u8,
    pub blur: u32,
    pub noise_area: f64,
    pub thickness: i32,
    pub invert: bool,
    pub crop: bool,
    pub show_regions: bool,
    pub color: [u8; 4],
}

impl MotionParams {
    /// 解析为单帧参数
    pub fn snapshot(&self) -> ParameterSnapshot {
        let pct = clamp_level(self.threshold_percent, 100.0);
        ParameterSnapshot {
            threshold: (pct / 100.0 * 255.0).floor() as u8,
            blur: clamp_level(self.blur, MAX_BLUR).trunc() as u32,
            noise_area: clamp_level(self.noise_level, MAX_NOISE_LEVEL) * NOISE_AREA_PER_LEVEL,
            thickness: self.thickness.trunc() as i32,
            invert: self.invert,
            crop: self.crop,
            show_regions: self.show_regions,
            color: self.color,
        }
    }

    /// 从JSON文件加载参数, 文件不存在时写入默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(params) => {
                    info!("参数已从 {} 加载", path.display());
                    params
                }
                Err(e) => {
                    warn!("参数文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("参数文件不存在, 创建默认参数: {}", path.display());
                let params = Self::default();
                if let Err(e) = params.save(path) {
                    warn!("{:#}", e);
                }
                params
            }
        }
    }

    /// 保存参数到JSON文件
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("序列化参数失败")?;
        fs::write(path, json).with_context(|| format!("保存参数失败: {}", path.display()))?;
        Ok(())
    }

    /// 命令行参数覆盖
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(v) = args.threshold {
            self.threshold_percent = v;
        }
        if let Some(v) = args.blur {
            self.blur = v;
        }
        if let Some(v) = args.noise {
            self.noise_level = v;
        }
        if let Some(v) = args.thickness {
            self.thickness = v;
        }
        if args.invert {
            self.invert = true;
        }
        if args.crop {
            self.crop = true;
        }
        if args.hide_regions {
            self.show_regions = false;
        }
    }
}

/// 命令行参数
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "帧差分动体检测", long_about = None)]
pub struct Args {
    /// 输入帧 (按顺序)
    #[arg(required = true)]
    pub frames: Vec<PathBuf>,

    /// 输出目录
    #[arg(short, long, default_value = "motion_out")]
    pub output: PathBuf,

    /// 参数文件 (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 区域报告 (JSON)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// 差分阈值 (%)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// 平滑度
    #[arg(long)]
    pub blur: Option<f64>,

    /// 噪声过滤等级
    #[arg(long)]
    pub noise: Option<f64>,

    /// 描边粗细
    #[arg(long)]
    pub thickness: Option<f64>,

    /// 反转掩码
    #[arg(long)]
    pub invert: bool,

    /// 裁剪到运动区域
    #[arg(long)]
    pub crop: bool,

    /// 不绘制区域
    #[arg(long)]
    pub hide_regions: bool,

    /// 使用wgpu后端
    #[arg(long)]
    pub gpu: bool,
}
