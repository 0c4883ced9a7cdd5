//! LLM 推理服务 - 业务能力层
//!
//! 用同一个 LLM 扮演两个角色：提议者（answerer）和验证者（validator）。
//! 只负责"问一次、解析一次"，不关心轮次和流程。
//!
//! ## 技术栈
//! - 传输由 [`LlmClient`] 负责（`async-openai`，含超时与退避重试）
//! - 响应解析见 [`prompts`](crate::services::prompts)

use async_trait::async_trait;
use tracing::{debug, info};

use crate::clients::LlmClient;
use crate::config::Config;
use crate::error::LlmError;
use crate::models::Question;
use crate::services::prompts::{
    build_critique_prompt, build_propose_prompt, parse_critique_response, parse_propose_response,
    ANSWERER_SYSTEM_MESSAGE, VALIDATOR_SYSTEM_MESSAGE,
};
use crate::services::reasoning_client::{Critique, PriorFeedback, Proposal, ReasoningClient};
use crate::utils::logging::truncate_text;

/// 基于 LLM 的推理服务客户端
pub struct LlmReasoningClient {
    llm: LlmClient,
    verbose_logging: bool,
}

impl LlmReasoningClient {
    pub fn new(config: &Config) -> Self {
        Self {
            llm: LlmClient::new(config),
            verbose_logging: config.verbose_logging,
        }
    }

    async fn ask(&self, role: &str, system: &str, prompt: &str) -> Result<String, LlmError> {
        if self.verbose_logging {
            debug!("[{}] 提示词:\n{}", role, prompt);
        }
        let response = self.llm.chat(system, prompt).await?;
        if self.verbose_logging {
            debug!("[{}] 原始响应:\n{}", role, response);
        }
        Ok(response)
    }
}

#[async_trait]
impl ReasoningClient for LlmReasoningClient {
    async fn propose(
        &self,
        question: &Question,
        prior: Option<&PriorFeedback>,
    ) -> Result<Proposal, LlmError> {
        let prompt = build_propose_prompt(question, prior);
        let response = self.ask("answerer", ANSWERER_SYSTEM_MESSAGE, &prompt).await?;
        let proposal = parse_propose_response(&response, question)?;

        info!(
            "题号 {}: 提议答案 '{}' (模型: {})",
            question.question_number,
            truncate_text(&proposal.answer, 40),
            self.llm.model_name()
        );
        Ok(proposal)
    }

    async fn critique(
        &self,
        question: &Question,
        proposal: &Proposal,
    ) -> Result<Critique, LlmError> {
        let prompt = build_critique_prompt(question, proposal);
        let response = self.ask("validator", VALIDATOR_SYSTEM_MESSAGE, &prompt).await?;
        let critique = parse_critique_response(&response)?;

        info!(
            "题号 {}: 验证结果 {:?}",
            question.question_number, critique.verdict
        );
        Ok(critique)
    }
}
