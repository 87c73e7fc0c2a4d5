// src/infra/logger.rs

//! 日志初始化

use chrono::Local;
use log::LevelFilter;
use std::io::Write;

/// 初始化日志系统
///
/// 级别优先级：显式参数 > RUST_LOG 环境变量 > Info。
/// 重复调用安全（第二次起为空操作）。
pub fn init_logging(level: Option<&str>) {
    let log_level = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| std::env::var("RUST_LOG").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(LevelFilter::Info);
    let result = env_logger::Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5}] {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .try_init();
    if result.is_ok() {
        log::info!("Logger initialized (level: {})", log_level);
    }
}
