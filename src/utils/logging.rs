//! 日志工具模块
//!
//! 提供 tracing 初始化和日志格式化的辅助函数

use crate::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志
///
/// `RUST_LOG` 优先，其次使用传入的级别。重复调用不会 panic。
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多智能体选择题验证");
    info!("🤖 模型: {}", config.llm_model_name);
    info!("📊 最大并发数: {}", config.max_concurrent_workers);
    info!("🔁 最大验证轮数: {}", config.max_validation_iterations);
    info!("⏱️ 单次调用超时: {}ms", config.request_timeout_ms);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
pub fn log_batch_start(total: usize, max_concurrent: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理 {} 道题目", total);
    info!("📋 最多同时处理 {} 道", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 打印批次统计
///
/// # 参数
/// - `consensus`: 验证者认可的数量
/// - `fallback`: 轮数耗尽、采用最后一次提议的数量
/// - `failed`: 失败数量
/// - `total`: 总数
pub fn print_final_stats(consensus: usize, fallback: usize, failed: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("📊 批次处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("✅ 达成共识: {}/{}", consensus, total);
    info!("⚠️ 轮数耗尽(采用最后提议): {}", fallback);
    info!("❌ 失败: {}", failed);
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
