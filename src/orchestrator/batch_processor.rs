//! 批量处理器 - 编排层
//!
//! ## 职责
//!
//! 给每道题分配稳定的位置下标，交给 worker 池，等待全部完成后按位置重排。
//!
//! ## 设计特点
//!
//! - **顺序由位置决定**：不依赖提交顺序或完成顺序，也不依赖题号唯一
//! - **全量覆盖**：输出长度恒等于输入长度，失败题目单独标记
//! - **空批次**：直接返回空结果，不发起任何调用

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{ProcessingResult, Question};
use crate::orchestrator::worker_pool::WorkerPool;
use crate::services::ReasoningClient;
use crate::utils::logging::{log_batch_start, print_final_stats};

/// 批次统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub consensus: usize,
    pub fallback: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchStats {
    pub fn from_results(results: &[ProcessingResult]) -> Self {
        let mut stats = BatchStats {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            if !result.is_success() {
                stats.failed += 1;
            } else if result.consensus_reached {
                stats.consensus += 1;
            } else {
                stats.fallback += 1;
            }
        }
        stats
    }
}

/// 批量处理器
pub struct BatchOrchestrator<C: ReasoningClient + 'static> {
    pool: WorkerPool<C>,
}

impl<C: ReasoningClient + 'static> BatchOrchestrator<C> {
    pub fn new(pool: WorkerPool<C>) -> Self {
        Self { pool }
    }

    pub fn from_config(client: Arc<C>, config: &Config) -> Self {
        Self::new(WorkerPool::from_config(client, config))
    }

    pub fn pool(&self) -> &WorkerPool<C> {
        &self.pool
    }

    /// 处理一批题目，结果与输入逐位对应
    pub async fn process(&self, questions: Vec<Question>) -> Vec<ProcessingResult> {
        self.process_with_cancel(questions, CancellationToken::new())
            .await
    }

    /// 带整体截止时间的处理
    ///
    /// 截止时仍未完成的题目以失败结果返回，不会被丢弃。
    pub async fn process_with_deadline(
        &self,
        questions: Vec<Question>,
        deadline: Duration,
    ) -> Vec<ProcessingResult> {
        let cancel = CancellationToken::new();
        let timer_cancel = cancel.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!("⏰ 批次超过 {}ms 截止时间，取消未完成的题目", deadline.as_millis());
            timer_cancel.cancel();
        });

        let results = self.process_with_cancel(questions, cancel).await;
        timer.abort();
        results
    }

    /// 可由外部取消的处理
    pub async fn process_with_cancel(
        &self,
        questions: Vec<Question>,
        cancel: CancellationToken,
    ) -> Vec<ProcessingResult> {
        if questions.is_empty() {
            info!("题目列表为空，无需处理");
            return Vec::new();
        }

        let total = questions.len();
        log_batch_start(total, self.pool.max_workers());

        let question_numbers: Vec<String> = questions
            .iter()
            .map(|q| q.question_number.clone())
            .collect();
        let jobs: Vec<(usize, Question)> = questions.into_iter().enumerate().collect();

        let unordered = self.pool.run(jobs, cancel).await;
        let results = reassemble(question_numbers, unordered);

        let stats = BatchStats::from_results(&results);
        print_final_stats(stats.consensus, stats.fallback, stats.failed, stats.total);

        results
    }
}

/// 按位置重排；缺失的位置补失败结果
fn reassemble(
    question_numbers: Vec<String>,
    unordered: Vec<(usize, ProcessingResult)>,
) -> Vec<ProcessingResult> {
    let mut slots: Vec<Option<ProcessingResult>> = vec![None; question_numbers.len()];

    for (position, result) in unordered {
        match slots.get_mut(position) {
            Some(slot) if slot.is_none() => *slot = Some(result),
            Some(_) => warn!("位置 {} 收到重复结果，已忽略", position),
            None => warn!("位置 {} 超出批次范围，已忽略", position),
        }
    }

    slots
        .into_iter()
        .zip(question_numbers)
        .map(|(slot, question_number)| {
            slot.unwrap_or_else(|| ProcessingResult::failed(question_number, "未返回结果", 0, 0))
        })
        .collect()
}
