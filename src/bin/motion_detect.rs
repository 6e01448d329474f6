//! 帧差分动体检测 - 图像序列
//!
//! 主程序入口: cargo run --bin motion-detect -- frames/*.png -o out --invert

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use motion_detect::{
    read_surface_to_buffer, write_buffer_to_surface, Args, FrameImage, HostDevice,
    MotionDetectionProcessor, MotionParams, MotionReport, PixelBuffer, SurfaceDevice,
    UpdateOutcome,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut params = match &args.config {
        Some(path) => MotionParams::load(path),
        None => MotionParams::default(),
    };
    params.apply_args(&args);
    let snapshot = params.snapshot();
    println!(
        "🎛️  阈值 {} | 平滑 {} | 噪声面积 {} | 反转 {} | 裁剪 {}",
        snapshot.threshold, snapshot.blur, snapshot.noise_area, snapshot.invert, snapshot.crop
    );

    fs::create_dir_all(&args.output)
        .with_context(|| format!("无法创建输出目录 {}", args.output.display()))?;

    let reports = if args.gpu {
        run_gpu(&args, &params)?
    } else {
        println!("🖥️  CPU内存后端");
        run(HostDevice::new(), &args, &params)?
    };

    let total: usize = reports.iter().map(|r| r.regions.len()).sum();
    println!("✅ {} 帧处理完成, 共 {} 个运动区域", args.frames.len(), total);

    let json = serde_json::to_string_pretty(&reports).context("序列化报告失败")?;
    match &args.report {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("写入报告失败: {}", path.display()))?;
            println!("💾 区域报告已保存到 {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(feature = "gpu")]
fn run_gpu(args: &Args, params: &MotionParams) -> Result<Vec<MotionReport>> {
    let device = motion_detect::WgpuDevice::new()?;
    println!("⚡ wgpu GPU后端");
    run(device, args, params)
}

#[cfg(not(feature = "gpu"))]
fn run_gpu(_args: &Args, _params: &MotionParams) -> Result<Vec<MotionReport>> {
    bail!("--gpu 需要以 `--features gpu` 编译")
}

fn run<D: SurfaceDevice>(
    device: D,
    args: &Args,
    params: &MotionParams,
) -> Result<Vec<MotionReport>> {
    let mut processor = MotionDetectionProcessor::new(device);
    let mut reports = Vec::with_capacity(args.frames.len());

    for (index, path) in args.frames.iter().enumerate() {
        let frame = load_frame(processor.device(), path)?;
        processor.set_input(Some(frame));

        match processor.update(params) {
            UpdateOutcome::Processed(report) => {
                info!("frame {}: {} regions", index, report.regions.len());
                reports.push(report);
            }
            UpdateOutcome::Seeded => info!("frame {}: seeded", index),
            UpdateOutcome::Skipped => info!("frame {}: skipped", index),
            UpdateOutcome::PassThrough(e) => println!("⚠️  第 {} 帧直通: {}", index, e),
        }

        let Some(surface) = processor.output().surface() else {
            continue;
        };
        let out = read_surface_to_buffer(processor.device(), surface)?;
        let out_path = args.output.join(format!("frame_{:05}.png", index));
        out.to_rgba_image()
            .save(&out_path)
            .with_context(|| format!("保存失败: {}", out_path.display()))?;
    }

    processor.dispose();
    Ok(reports)
}

fn load_frame<D: SurfaceDevice>(device: &D, path: &Path) -> Result<FrameImage<D::Surface>> {
    let img = image::open(path)
        .with_context(|| format!("无法读取图像 {}", path.display()))?
        .to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        bail!("空图像: {}", path.display());
    }
    let buffer = PixelBuffer::from_rgba_image(&img);
    let surface = write_buffer_to_surface(device, &buffer)?;
    Ok(FrameImage::new(Arc::new(surface)))
}
