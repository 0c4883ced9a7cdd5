//! 推理服务客户端契约 - 业务能力层
//!
//! 验证循环只通过这个 trait 访问外部推理服务，
//! 生产实现是 [`LlmReasoningClient`](crate::services::LlmReasoningClient)，
//! 测试里换成脚本化的 mock。

use async_trait::async_trait;

use crate::error::LlmError;
use crate::models::{Question, Verdict};

/// 上一轮被驳回时带回给提议者的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorFeedback {
    pub previous_answer: String,
    pub feedback: String,
}

/// 提议者给出的候选答案
///
/// `answer` 未经校验，调用方必须检查它是否属于题目的候选项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub answer: String,
    pub reasoning: String,
}

impl Proposal {
    pub fn new(answer: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            reasoning: reasoning.into(),
        }
    }
}

/// 验证者的裁决；ACCEPT 时 `feedback` 可以为空
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Critique {
    pub verdict: Verdict,
    pub feedback: String,
}

impl Critique {
    pub fn accept() -> Self {
        Self {
            verdict: Verdict::Accept,
            feedback: String::new(),
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Reject,
            feedback: feedback.into(),
        }
    }
}

/// 推理服务客户端
///
/// 每次调用对应一次网络往返（含客户端内部的超时与退避重试），调用之间不保留状态。
/// REJECT 是正常结果；无法解析的响应以 `LlmError` 返回。
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// 请求一个候选答案；第一轮之后带上上一轮的驳回意见
    async fn propose(
        &self,
        question: &Question,
        prior: Option<&PriorFeedback>,
    ) -> Result<Proposal, LlmError>;

    /// 请求对候选答案的裁决
    async fn critique(&self, question: &Question, proposal: &Proposal)
        -> Result<Critique, LlmError>;
}
