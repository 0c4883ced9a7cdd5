use crate::api;
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{load_questions_from_file, ProcessingResult};
use crate::orchestrator::BatchOrchestrator;
use crate::services::LlmReasoningClient;
use crate::utils::logging::log_startup;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 应用主结构
///
/// 持有只读配置和唯一的批量处理器，所有请求共用同一个 worker 池。
pub struct App {
    config: Config,
    orchestrator: Arc<BatchOrchestrator<LlmReasoningClient>>,
}

impl App {
    /// 初始化应用
    ///
    /// 配置不合法时在创建任何客户端之前返回 `AppError::Config`。
    pub fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;
        log_startup(&config);

        let client = Arc::new(LlmReasoningClient::new(&config));
        let orchestrator = Arc::new(BatchOrchestrator::from_config(client, &config));

        Ok(Self {
            config,
            orchestrator,
        })
    }

    /// 以 HTTP 服务方式运行
    pub async fn serve(&self) -> Result<()> {
        let router = api::router(Arc::clone(&self.orchestrator), self.config.batch_timeout());
        api::serve(router, self.config.api_port).await
    }

    /// 处理单个批量文件，结果以 JSON 打印到标准输出
    pub async fn run_file(&self, path: &Path) -> Result<Vec<ProcessingResult>> {
        info!("\n📁 正在加载题目文件: {}", path.display());
        let questions = load_questions_from_file(path)
            .await
            .with_context(|| format!("无法加载题目文件: {}", path.display()))?;

        if questions.is_empty() {
            warn!("⚠️ 文件中没有题目，程序结束");
        }

        let results = match self.config.batch_timeout() {
            Some(deadline) => {
                self.orchestrator
                    .process_with_deadline(questions, deadline)
                    .await
            }
            None => self.orchestrator.process(questions).await,
        };

        println!("{}", serde_json::to_string_pretty(&results)?);
        Ok(results)
    }
}
