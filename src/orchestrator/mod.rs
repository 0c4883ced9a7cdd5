//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量处理器
//! - 为每道题分配位置下标
//! - 交给 worker 池并等待全部完成
//! - 按位置重排结果、输出批次统计
//!
//! ### `worker_pool` - 并发 worker 池
//! - 固定数量的槽位（Semaphore）
//! - 每道题一个任务，运行一个验证循环
//! - 单题失败或 panic 只影响自己的位置
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Question>)
//!     ↓
//! worker_pool (并发调度，最多 N 个)
//!     ↓
//! workflow::ValidationLoop (处理单个 Question)
//!     ↓
//! services::ReasoningClient (propose / critique)
//!     ↓
//! clients::LlmClient (一次 API 往返)
//! ```

pub mod batch_processor;
pub mod worker_pool;

pub use batch_processor::{BatchOrchestrator, BatchStats};
pub use worker_pool::WorkerPool;
