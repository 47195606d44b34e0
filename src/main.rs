//! Patrol - 巡逻机器人演示入口
//!
//! 初始化日志、加载配置，在内存模拟世界上运行受监管的巡逻循环，并把过程事件以 JSON 行输出。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use patrol::config::load_config;
use patrol::core::{run_until_shutdown, spawn_patrol_with_token, PatrolShutdown, ShutdownSignal};
use patrol::session::{SimulatedAuthenticator, SimulatedSession};
use patrol::world::Coordinate;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "patrol")]
#[command(author, version, about = "Run the patrol loop against a simulated world", long_about = None)]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 起始纬度
    #[arg(long, default_value_t = 40.7580, allow_hyphen_values = true)]
    lat: f64,

    /// 起始经度
    #[arg(long, default_value_t = -73.9855, allow_hyphen_values = true)]
    lng: f64,

    /// 完成多少轮后退出（覆盖 patrol.max_cycles）
    #[arg(long)]
    cycles: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    patrol::observability::init("info");
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    if let Some(n) = cli.cycles {
        cfg.patrol.max_cycles = Some(n);
    }

    let origin = Coordinate::new(cli.lat, cli.lng);
    let session = SimulatedSession::demo(origin);
    let authenticator = Arc::new(SimulatedAuthenticator::new(&session));
    tracing::info!("Starting patrol at ({}, {})", origin.latitude, origin.longitude);

    let signal = ShutdownSignal::new();
    let handle = spawn_patrol_with_token(cfg, authenticator, Arc::new(session), signal.token())
        .context("Failed to start patrol")?;

    let mut events = handle.events;
    let shutdown = PatrolShutdown::new(handle.commands.clone(), handle.task);

    // 事件流结束（巡逻任务退出）即视为应用正常结束；事件写 stdout，日志写 stderr
    let log_events = async move {
        loop {
            match events.recv().await {
                Ok(ev) => match serde_json::to_string(&ev) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("Event serialization failed: {}", e),
                },
                Err(RecvError::Lagged(n)) => tracing::warn!("Dropped {} event(s)", n),
                Err(RecvError::Closed) => break,
            }
        }
    };

    run_until_shutdown(&signal, log_events).await;
    let result = shutdown.stop().await;

    let snapshot = handle.state.borrow().clone();
    tracing::info!(
        "Patrol finished: {} cycle(s), {} fault(s)",
        snapshot.cycles_completed,
        snapshot.faults
    );
    if let Some(err) = snapshot.last_error {
        tracing::info!("Last error: {}", err);
    }
    result
}
