//! 错误类型
//!
//! 按来源分层：配置、题目校验、LLM 调用、单题验证循环。
//! 单题错误最终都被渲染进 `ProcessingResult.error`，不会越过 worker 边界。

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（启动时致命）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
}

/// 配置错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 环境变量不存在
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
    /// 取值不满足约束
    #[error("配置项 {name} 取值无效: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// 题目校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusinessError {
    #[error("题目内容不能为空")]
    EmptyContent,
    #[error("题目标题不能为空")]
    EmptyTitle,
    #[error("题号不能为空")]
    EmptyQuestionNumber,
    #[error("候选答案列表不能为空")]
    NoOptions,
    /// 第 index 个选项为空白字符串
    #[error("第 {index} 个候选答案为空")]
    EmptyOption { index: usize },
}

/// LLM 服务错误
///
/// 传输类错误（`ApiCallFailed` / `Timeout`）在客户端内部按退避策略重试；
/// 协议类错误（`EmptyContent` / `MalformedResponse`）交给验证循环在本轮内重问；
/// 其余均为硬失败。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// API 调用失败（网络或服务端错误）
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 单次调用超时
    #[error("LLM API调用超时 (模型: {model}, 超时: {timeout_ms}ms)")]
    Timeout { model: String, timeout_ms: u64 },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容无法解析
    #[error("无法解析LLM响应 ({reason}): {response}")]
    MalformedResponse { reason: String, response: String },
    /// 服务端拒绝请求（鉴权、模型、参数、额度），重试无意义
    #[error("LLM服务拒绝请求 (模型: {model}): {message}")]
    Rejected { model: String, message: String },
    /// 重试次数用尽
    #[error("LLM调用在 {attempts} 次尝试后仍失败: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    /// 请求构建失败
    #[error("LLM请求构建失败: {0}")]
    RequestBuild(String),
}

impl LlmError {
    /// 是否值得在传输层重试
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::ApiCallFailed { .. } | LlmError::Timeout { .. })
    }

    /// 是否属于协议违规（服务有应答，但应答不可用）
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            LlmError::EmptyContent { .. } | LlmError::MalformedResponse { .. }
        )
    }
}

impl From<async_openai::error::OpenAIError> for LlmError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        LlmError::RequestBuild(err.to_string())
    }
}

/// 验证循环的硬失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoopError {
    /// 客户端已放弃（重试用尽或不可恢复错误）
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// 提议的答案连续不在候选项中
    #[error("连续 {budget} 次提议的答案不在候选项中，最后一次: '{last}'")]
    InvalidProposal { budget: u32, last: String },
    /// 协议违规重试预算耗尽
    #[error("{step} 步骤连续 {budget} 次响应不可用: {last}")]
    ProtocolBudgetExhausted {
        step: &'static str,
        budget: u32,
        last: String,
    },
    /// 题目本身不合法，未调用服务
    #[error("题目不合法: {0}")]
    InvalidQuestion(#[from] BusinessError),
    /// 批次被取消或超时
    #[error("处理被取消")]
    Cancelled,
    /// worker 任务异常退出
    #[error("worker 任务异常退出: {0}")]
    WorkerPanicked(String),
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("不支持的文件类型: {path}")]
    UnsupportedExtension { path: String },
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
