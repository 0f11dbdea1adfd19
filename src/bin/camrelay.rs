use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 摄像头中继 - 本地预览 + 远程推流 + 检测框叠加
/// Camera relay: local preview, remote frame streaming, detection overlays
///
/// 主程序入口 - 直接运行: cargo run --bin camrelay --release
use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use camrelay::config::{Args, PipelineConfig};
use camrelay::device::{FramebufferDisplay, TestPatternSensor};
use camrelay::pipeline::{self, PipelineContext};
use camrelay::transport::TcpTransport;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_logging(level: &str) {
    // RUST_LOG 优先于 --log-level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = PipelineConfig::load(&args.config);
    config.apply_args(&args);
    config.validate().context("invalid pipeline configuration")?;
    config.log_summary();

    let geometry = config.geometry();
    let sensor = TestPatternSensor::new(geometry).with_miss_rate(args.miss_rate, rand::random());

    let mut display = FramebufferDisplay::new(geometry.width, geometry.height);
    if let Some(font) = &args.font {
        display = display.with_font(font)?;
    }
    if let Some(dir) = &args.snapshot_dir {
        display = display.with_snapshots(dir.clone(), args.snapshot_every)?;
        info!("📸 snapshots every {} frames → {}", args.snapshot_every, dir.display());
    }

    let transport = TcpTransport::new(config.transport.clone());
    info!("📡 detection server: {}", transport.endpoint());

    let ctx = Arc::new(PipelineContext::new(config));

    let on_signal = ctx.clone();
    ctrlc::set_handler(move || {
        info!("🛑 Ctrl+C received, stopping");
        on_signal.request_stop();
    })
    .context("failed to install Ctrl+C handler")?;

    if let Some(secs) = args.duration_secs {
        let on_timer = ctx.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            info!("⏱️ run time of {secs}s elapsed, stopping");
            on_timer.request_stop();
        });
    }

    let summary = pipeline::run(&ctx, sensor, display, transport);
    info!(
        "📊 stats: {}",
        serde_json::to_string(&summary).context("failed to serialize stats")?
    );
    Ok(())
}
