use anyhow::Result;
use question_validator::utils::logging;
use question_validator::{App, Config};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志（配置加载前，保证配置错误也能输出）
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    logging::init(&level.to_lowercase());

    // 加载配置，任何错误都在处理题目之前终止
    let config = Config::from_env()?;

    let app = App::initialize(config)?;

    // 带参数时处理批量文件，否则启动 HTTP 服务
    match std::env::args().nth(1) {
        Some(path) => {
            app.run_file(&PathBuf::from(path)).await?;
        }
        None => app.serve().await?,
    }

    Ok(())
}
