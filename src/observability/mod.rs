//! 可观测性：tracing 订阅器（日志写 stderr，stdout 留给运行结果）

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局订阅器；`RUST_LOG` 优先，默认 `default_level`。重复调用时忽略。
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
