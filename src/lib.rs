//! # Question Validator
//!
//! 多智能体选择题作答服务：对每道题在"提议者 / 验证者"两个角色之间反复协商，
//! 直到验证者认可或达到轮数上限，为每道题给出一个答案。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 一次 LLM API 往返，负责超时与指数退避重试
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个 Question
//! - `ReasoningClient` - propose / critique 契约
//! - `LlmReasoningClient` - 基于 LLM 的实现（提示词与解析）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整处理流程
//! - `QuestionCtx` - 上下文封装（批次位置 + 题号）
//! - `ValidationLoop` - 状态机（Start → Proposed → Accepted / Rejected → Exhausted）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/worker_pool` - 固定槽位的并发 worker 池
//! - `orchestrator/batch_processor` - 批量处理器，按输入顺序重排结果
//!
//! ### ⑤ 接口层（API）
//! - `api/` - HTTP 收发（axum）
//!
//! ## 模块结构

pub mod api;
pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult, LlmError, LoopError};
pub use models::{ProcessingResult, Question, Verdict};
pub use orchestrator::{BatchOrchestrator, WorkerPool};
pub use services::{Critique, LlmReasoningClient, PriorFeedback, Proposal, ReasoningClient};
pub use workflow::{LoopSettings, QuestionCtx, ValidationLoop};
