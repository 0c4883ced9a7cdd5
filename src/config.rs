use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

/// 程序配置
///
/// 启动时构建一次，之后只读，按值（或 `Arc`）传给各层构造函数。
#[derive(Clone, Debug)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 单次调用超时（毫秒）
    pub request_timeout_ms: u64,
    /// 单次调用的最大尝试次数（含首次）
    pub llm_max_retries: u32,
    /// 第一次重试前的等待（毫秒）
    pub llm_base_retry_delay_ms: u64,
    /// 退避倍数
    pub llm_retry_multiplier: u32,
    // --- 并发与验证 ---
    /// 同时处理的题目数量
    pub max_concurrent_workers: usize,
    /// 每道题的最大验证轮数
    pub max_validation_iterations: u32,
    /// 协议违规时单步额外重问次数
    pub max_protocol_retries: u32,
    /// 批次总超时（毫秒），None 表示不限
    pub batch_timeout_ms: Option<u64>,
    // --- 服务 ---
    pub api_port: u16,
    pub log_level: String,
    /// 是否输出提示词和原始响应
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gemini-2.0-flash".to_string(),
            request_timeout_ms: 60_000,
            llm_max_retries: 3,
            llm_base_retry_delay_ms: 1000,
            llm_retry_multiplier: 2,
            max_concurrent_workers: 5,
            max_validation_iterations: 5,
            max_protocol_retries: 2,
            batch_timeout_ms: None,
            api_port: 8000,
            log_level: "info".to_string(),
            verbose_logging: false,
        }
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// 从环境变量加载配置，缺失项使用默认值
    ///
    /// 变量存在但无法解析、必填项缺失或取值越界都会返回 `ConfigError`，
    /// 调用方应在处理任何题目之前终止进程。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 从任意键值来源加载，便于测试
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let config = Self {
            llm_api_key: lookup("LLM_API_KEY").ok_or_else(|| ConfigError::EnvVarNotFound {
                var_name: "LLM_API_KEY".to_string(),
            })?,
            llm_api_base_url: lookup("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: lookup("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            request_timeout_ms: parse_var(&lookup, "LLM_REQUEST_TIMEOUT_MS")?
                .unwrap_or(default.request_timeout_ms),
            llm_max_retries: parse_var(&lookup, "LLM_MAX_RETRIES")?
                .unwrap_or(default.llm_max_retries),
            llm_base_retry_delay_ms: parse_var(&lookup, "LLM_BASE_RETRY_DELAY_MS")?
                .unwrap_or(default.llm_base_retry_delay_ms),
            llm_retry_multiplier: parse_var(&lookup, "LLM_RETRY_MULTIPLIER")?
                .unwrap_or(default.llm_retry_multiplier),
            max_concurrent_workers: parse_var(&lookup, "MAX_CONCURRENT_WORKERS")?
                .unwrap_or(default.max_concurrent_workers),
            max_validation_iterations: parse_var(&lookup, "MAX_VALIDATION_ITERATIONS")?
                .unwrap_or(default.max_validation_iterations),
            max_protocol_retries: parse_var(&lookup, "MAX_PROTOCOL_RETRIES")?
                .unwrap_or(default.max_protocol_retries),
            batch_timeout_ms: parse_var(&lookup, "BATCH_TIMEOUT_MS")?,
            api_port: parse_var(&lookup, "API_PORT")?.unwrap_or(default.api_port),
            log_level: lookup("LOG_LEVEL")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.log_level),
            verbose_logging: parse_var(&lookup, "VERBOSE_LOGGING")?
                .unwrap_or(default.verbose_logging),
        };

        config.validate()?;
        Ok(config)
    }

    /// 检查取值约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.llm_api_key.trim();
        if key.is_empty() || key == "your_api_key_here" {
            return Err(invalid("LLM_API_KEY", "未配置有效的 API Key"));
        }
        if self.llm_api_base_url.trim().is_empty() {
            return Err(invalid("LLM_API_BASE_URL", "不能为空"));
        }
        if self.llm_model_name.trim().is_empty() {
            return Err(invalid("LLM_MODEL_NAME", "不能为空"));
        }
        if self.max_concurrent_workers == 0 {
            return Err(invalid("MAX_CONCURRENT_WORKERS", "必须为正整数"));
        }
        if self.max_validation_iterations == 0 {
            return Err(invalid("MAX_VALIDATION_ITERATIONS", "必须为正整数"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("LLM_REQUEST_TIMEOUT_MS", "必须为正整数"));
        }
        if self.llm_max_retries == 0 {
            return Err(invalid("LLM_MAX_RETRIES", "必须为正整数"));
        }
        if self.llm_retry_multiplier == 0 {
            return Err(invalid("LLM_RETRY_MULTIPLIER", "必须为正整数"));
        }
        if self.batch_timeout_ms == Some(0) {
            return Err(invalid("BATCH_TIMEOUT_MS", "必须为正整数"));
        }
        if self.api_port == 0 {
            return Err(invalid("API_PORT", "必须在 1-65535 之间"));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(invalid(
                "LOG_LEVEL",
                &format!("必须是 {:?} 之一", VALID_LOG_LEVELS),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: name.to_string(),
                value: raw,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
    }
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
