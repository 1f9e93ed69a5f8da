// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 室内人数统计服务
///
/// 系统架构:
/// 1. 解码线程: FFmpeg 采集 + YUV → RGB (独立工作线程)
/// 2. 计数线程: 检测 → 跟踪 → 越线 → 标注 → 推流队列
/// 3. 主线程:   HTTP 控制面 (actix-web)
use clap::Parser;
use people_counter::controller::FfmpegYoloFactory;
use people_counter::{server, Args, CounterConfig, CounterController, StartOutcome};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut config = CounterConfig::load(&args.config);
    args.apply(&mut config);
    config.log_summary();

    let factory = Arc::new(FfmpegYoloFactory::new(config.clone()));
    let controller = Arc::new(CounterController::new(&config, factory));

    if args.autostart {
        match controller.start() {
            Ok(StartOutcome::Started) => info!("🚀 已自动启动"),
            Ok(StartOutcome::AlreadyRunning) => {}
            Err(e) => error!("❌ 自动启动失败: {}", e),
        }
    }

    let served = actix_web::rt::System::new().block_on(server::serve(
        controller.clone(),
        &config.bind,
        config.port,
    ));

    let outcome = controller.stop();
    info!("👋 服务退出 ({})", outcome.status());

    served?;
    Ok(())
}
