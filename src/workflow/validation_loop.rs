//! 验证循环 - 流程层
//!
//! 核心职责：把一道题从开始推进到终态
//!
//! 状态流转：
//! 1. Start → propose（无反馈）→ Proposed
//! 2. Proposed → critique → Accepted（终态）或 Rejected
//! 3. Rejected → 未到轮数上限：带着反馈重新 propose → Proposed；否则 → Exhausted（终态）
//!
//! 协议违规（提议不在候选项中、响应无法解析）在本步骤内重问，不消耗轮数；
//! 重问预算耗尽或客户端放弃时直接进入 Exhausted 并带上失败原因。

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::LoopError;
use crate::models::{AnswerAttempt, ProcessingResult, Question, Verdict};
use crate::services::{Critique, PriorFeedback, Proposal, ReasoningClient};
use crate::utils::logging::truncate_text;
use crate::workflow::question_ctx::QuestionCtx;

/// 循环参数
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// 最大验证轮数
    pub max_iterations: u32,
    /// 单步协议违规的额外重问次数
    pub max_protocol_retries: u32,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.max_validation_iterations.max(1),
            max_protocol_retries: config.max_protocol_retries,
        }
    }

    fn step_budget(&self) -> u32 {
        1 + self.max_protocol_retries
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_protocol_retries: 2,
        }
    }
}

/// 循环状态
#[derive(Debug)]
enum LoopState {
    Start,
    Proposed {
        proposal: Proposal,
    },
    Rejected {
        proposal: Proposal,
        feedback: String,
    },
    Accepted {
        proposal: Proposal,
    },
    Exhausted {
        last: Option<Proposal>,
        failure: Option<LoopError>,
    },
}

/// 循环终态
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub selected_answer: Option<String>,
    /// 已完成的 propose → critique 轮数
    pub iterations: u32,
    pub consensus_reached: bool,
    pub error: Option<LoopError>,
}

impl LoopOutcome {
    fn failed(error: LoopError, iterations: u32) -> Self {
        Self {
            selected_answer: None,
            iterations,
            consensus_reached: false,
            error: Some(error),
        }
    }

    /// 转换为对外结果
    pub fn into_result(self, question_number: &str, processing_time_ms: u64) -> ProcessingResult {
        ProcessingResult {
            question_number: question_number.to_string(),
            selected_answer: self.selected_answer,
            validation_iterations: self.iterations,
            processing_time_ms,
            consensus_reached: self.consensus_reached,
            error: self.error.map(|e| e.to_string()),
        }
    }
}

/// 单题验证循环
///
/// 每个实例只处理一道题，从头跑到尾，不跨 worker 共享或恢复。
pub struct ValidationLoop<'a, C: ReasoningClient + ?Sized> {
    client: &'a C,
    question: &'a Question,
    ctx: &'a QuestionCtx,
    settings: LoopSettings,
    /// 当前轮次（从1开始）
    iteration: u32,
    /// 已拿到裁决的轮数
    completed: u32,
}

impl<'a, C: ReasoningClient + ?Sized> ValidationLoop<'a, C> {
    pub fn new(
        client: &'a C,
        question: &'a Question,
        ctx: &'a QuestionCtx,
        settings: LoopSettings,
    ) -> Self {
        Self {
            client,
            question,
            ctx,
            settings,
            iteration: 0,
            completed: 0,
        }
    }

    /// 运行到终态
    pub async fn run(self) -> LoopOutcome {
        self.run_until_cancelled(&CancellationToken::new()).await
    }

    /// 运行到终态或被取消
    ///
    /// 取消时报告已完成的轮数，不给出答案。
    pub async fn run_until_cancelled(mut self, cancel: &CancellationToken) -> LoopOutcome {
        if let Err(e) = self.question.validate() {
            warn!("{} ⚠️ 题目不合法，跳过: {}", self.ctx, e);
            return LoopOutcome::failed(LoopError::InvalidQuestion(e), 0);
        }

        info!(
            "{} 开始验证: {}",
            self.ctx,
            truncate_text(&self.question.title, 40)
        );

        let mut state = LoopState::Start;
        loop {
            state = match state {
                LoopState::Accepted { proposal } => {
                    info!(
                        "{} ✓ 第 {} 轮达成共识: '{}'",
                        self.ctx,
                        self.completed,
                        truncate_text(&proposal.answer, 40)
                    );
                    return LoopOutcome {
                        selected_answer: Some(proposal.answer),
                        iterations: self.completed,
                        consensus_reached: true,
                        error: None,
                    };
                }
                LoopState::Exhausted { last, failure } => {
                    return self.finish_exhausted(last, failure);
                }
                other => {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        next = self.step(other) => Some(next),
                    };
                    match next {
                        Some(next) => next,
                        None => {
                            warn!("{} ⚠️ 处理中被取消 (已完成 {} 轮)", self.ctx, self.completed);
                            return LoopOutcome::failed(LoopError::Cancelled, self.completed);
                        }
                    }
                }
            };
        }
    }

    async fn step(&mut self, state: LoopState) -> LoopState {
        match state {
            LoopState::Start => {
                self.iteration = 1;
                match self.propose_valid(None).await {
                    Ok(proposal) => LoopState::Proposed { proposal },
                    Err(failure) => LoopState::Exhausted {
                        last: None,
                        failure: Some(failure),
                    },
                }
            }
            LoopState::Proposed { proposal } => match self.critique_valid(&proposal).await {
                Ok(Critique { verdict, feedback }) => {
                    self.completed = self.iteration;
                    self.log_attempt(AnswerAttempt {
                        iteration_index: self.iteration,
                        proposed_answer: proposal.answer.clone(),
                        validator_verdict: verdict,
                        validator_feedback: feedback.clone(),
                    });
                    match verdict {
                        Verdict::Accept => LoopState::Accepted { proposal },
                        Verdict::Reject => LoopState::Rejected { proposal, feedback },
                    }
                }
                Err(failure) => LoopState::Exhausted {
                    last: Some(proposal),
                    failure: Some(failure),
                },
            },
            LoopState::Rejected { proposal, feedback } => {
                if self.iteration >= self.settings.max_iterations {
                    return LoopState::Exhausted {
                        last: Some(proposal),
                        failure: None,
                    };
                }
                self.iteration += 1;
                let prior = PriorFeedback {
                    previous_answer: proposal.answer.clone(),
                    feedback,
                };
                match self.propose_valid(Some(&prior)).await {
                    Ok(next) => LoopState::Proposed { proposal: next },
                    Err(failure) => LoopState::Exhausted {
                        last: Some(proposal),
                        failure: Some(failure),
                    },
                }
            }
            terminal @ (LoopState::Accepted { .. } | LoopState::Exhausted { .. }) => terminal,
        }
    }

    /// 取得一个属于候选项的提议
    async fn propose_valid(&self, prior: Option<&PriorFeedback>) -> Result<Proposal, LoopError> {
        let budget = self.settings.step_budget();
        let mut last_violation = String::new();
        let mut only_invalid_answers = true;

        for attempt in 1..=budget {
            match self.client.propose(self.question, prior).await {
                Ok(proposal) if self.question.has_option(&proposal.answer) => return Ok(proposal),
                Ok(proposal) => {
                    warn!(
                        "{} 第 {} 轮提议 '{}' 不在候选项中 ({}/{})",
                        self.ctx,
                        self.iteration,
                        truncate_text(&proposal.answer, 40),
                        attempt,
                        budget
                    );
                    last_violation = proposal.answer;
                }
                Err(e) if e.is_protocol_violation() => {
                    warn!(
                        "{} 第 {} 轮提议响应不可用 ({}/{}): {}",
                        self.ctx, self.iteration, attempt, budget, e
                    );
                    last_violation = e.to_string();
                    only_invalid_answers = false;
                }
                Err(e) => {
                    warn!("{} ❌ propose 调用失败: {}", self.ctx, e);
                    return Err(LoopError::Llm(e));
                }
            }
        }

        Err(if only_invalid_answers {
            LoopError::InvalidProposal {
                budget,
                last: last_violation,
            }
        } else {
            LoopError::ProtocolBudgetExhausted {
                step: "propose",
                budget,
                last: last_violation,
            }
        })
    }

    /// 取得一个可解析的裁决
    async fn critique_valid(&self, proposal: &Proposal) -> Result<Critique, LoopError> {
        let budget = self.settings.step_budget();
        let mut last_violation = String::new();

        for attempt in 1..=budget {
            match self.client.critique(self.question, proposal).await {
                Ok(critique) => return Ok(critique),
                Err(e) if e.is_protocol_violation() => {
                    warn!(
                        "{} 第 {} 轮裁决响应不可用 ({}/{}): {}",
                        self.ctx, self.iteration, attempt, budget, e
                    );
                    last_violation = e.to_string();
                }
                Err(e) => {
                    warn!("{} ❌ critique 调用失败: {}", self.ctx, e);
                    return Err(LoopError::Llm(e));
                }
            }
        }

        Err(LoopError::ProtocolBudgetExhausted {
            step: "critique",
            budget,
            last: last_violation,
        })
    }

    fn finish_exhausted(self, last: Option<Proposal>, failure: Option<LoopError>) -> LoopOutcome {
        match (last, failure) {
            (_, Some(failure)) => {
                warn!(
                    "{} ❌ 处理失败 (已完成 {} 轮): {}",
                    self.ctx, self.completed, failure
                );
                LoopOutcome::failed(failure, self.completed)
            }
            (Some(proposal), None) => {
                warn!(
                    "{} ⚠️ 已达最大轮数 {} 仍未达成共识，采用最后一次提议: '{}'",
                    self.ctx,
                    self.settings.max_iterations,
                    truncate_text(&proposal.answer, 40)
                );
                LoopOutcome {
                    selected_answer: Some(proposal.answer),
                    iterations: self.completed,
                    consensus_reached: false,
                    error: None,
                }
            }
            // 只有硬失败会在没有提议时进入 Exhausted
            (None, None) => LoopOutcome::failed(
                LoopError::ProtocolBudgetExhausted {
                    step: "propose",
                    budget: self.settings.step_budget(),
                    last: String::new(),
                },
                self.completed,
            ),
        }
    }

    fn log_attempt(&self, attempt: AnswerAttempt) {
        debug!(
            "{} 第 {}/{} 轮: 提议 '{}' → {:?} {}",
            self.ctx,
            attempt.iteration_index,
            self.settings.max_iterations,
            truncate_text(&attempt.proposed_answer, 40),
            attempt.validator_verdict,
            truncate_text(&attempt.validator_feedback, 80)
        );
    }
}
