//! LLM API 客户端
//!
//! 封装一次"发消息 → 取文本"的往返，负责超时与传输层重试，不理解内容。
//! 兼容 OpenAI API 的服务（Gemini、Doubao 等）均可使用。

use crate::config::Config;
use crate::error::LlmError;
use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 单次调用的超时与重试策略
///
/// 第 k 次尝试（k ≥ 2）之前等待 `base_delay * multiplier^(k-2)`。
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl CallPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.request_timeout(),
            max_attempts: config.llm_max_retries.max(1),
            base_delay: Duration::from_millis(config.llm_base_retry_delay_ms),
            multiplier: config.llm_retry_multiplier.max(1),
        }
    }

    /// 第 `attempt` 次尝试前的等待时间（从 1 开始计数，首次不等待）
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor)
    }

    /// 带超时和指数退避地执行 `op`
    ///
    /// 只有传输类错误会重试；其他错误原样返回。
    /// 尝试次数用尽后返回 `RetriesExhausted`。
    pub async fn run<T, F, Fut>(&self, model: &str, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut last_error: Option<LlmError> = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = self.delay_before(attempt);
                info!(
                    "⏳ {}ms 后进行第 {}/{} 次尝试",
                    delay.as_millis(),
                    attempt,
                    self.max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout {
                    model: model.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("第 {} 次尝试成功", attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "LLM 调用第 {}/{} 次尝试失败: {}",
                        attempt, self.max_attempts, e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "未进行任何尝试".to_string()),
        })
    }
}

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    policy: CallPolicy,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            policy: CallPolicy::from_config(config),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 发送聊天请求
    ///
    /// # 参数
    /// - `system_message`: 系统消息
    /// - `user_message`: 用户消息内容
    ///
    /// # 返回
    /// 返回去掉首尾空白的响应文本
    pub async fn chat(&self, system_message: &str, user_message: &str) -> Result<String, LlmError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let request = self.build_request(system_message, user_message)?;

        self.policy
            .run(&self.model_name, || self.send_once(request.clone()))
            .await
    }

    fn build_request(
        &self,
        system_message: &str,
        user_message: &str,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.3)
            .max_tokens(1024u32)
            .build()?;

        Ok(request)
    }

    async fn send_once(&self, request: CreateChatCompletionRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| classify_api_error(&self.model_name, e))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::EmptyContent {
                model: self.model_name.clone(),
            });
        }

        debug!("LLM API 调用成功");
        Ok(content)
    }
}

/// 把 async-openai 的错误归到重试策略认识的类别
///
/// - 网络错误、5xx、限流 → `ApiCallFailed`（可重试）
/// - 响应体无法反序列化 → `MalformedResponse`（交给验证循环的协议重问）
/// - 其余服务端拒绝（鉴权、模型不存在、参数错误、额度用尽）→ `Rejected`（不重试）
pub fn classify_api_error(model: &str, err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => LlmError::ApiCallFailed {
            model: model.to_string(),
            message: e.to_string(),
        },
        OpenAIError::JSONDeserialize(e, content) => LlmError::MalformedResponse {
            reason: format!("响应反序列化失败: {}", e),
            response: content,
        },
        OpenAIError::ApiError(api_error) if is_retryable_api_error(&api_error) => {
            LlmError::ApiCallFailed {
                model: model.to_string(),
                message: api_error.to_string(),
            }
        }
        OpenAIError::ApiError(api_error) => LlmError::Rejected {
            model: model.to_string(),
            message: api_error.to_string(),
        },
        other => LlmError::RequestBuild(other.to_string()),
    }
}

// 5xx 的错误体不是 JSON，async-openai 只保留原文，type 和 code 都为空
fn is_retryable_api_error(api_error: &ApiError) -> bool {
    let tags = [api_error.r#type.as_deref(), api_error.code.as_deref()];
    if tags.iter().all(Option::is_none) {
        return true;
    }
    if tags.iter().flatten().any(|tag| tag.contains("insufficient_quota")) {
        return false;
    }
    tags.iter().flatten().any(|tag| {
        tag.contains("rate_limit") || tag.contains("server_error") || tag.contains("overloaded")
    })
}
