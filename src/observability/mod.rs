//! 可观测性：日志初始化
//!
//! 默认级别由调用方给出（通常是 info），RUST_LOG 设置时以其为准。
//! 日志写 stderr，stdout 留给事件流。

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber<W>(default_level: &str, writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(fmt::layer().with_target(false).with_writer(writer))
}

/// 安装全局 subscriber；重复调用时忽略（测试中多次初始化）
pub fn init(default_level: &str) {
    let _ = subscriber(default_level, std::io::stderr).try_init();
}
