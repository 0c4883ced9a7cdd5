//! 并发 worker 池 - 编排层
//!
//! ## 职责
//!
//! 并发运行多个验证循环，同时限制对外部服务的并发占用。
//!
//! ## 设计特点
//!
//! - **固定槽位**：`Semaphore` 容量即最大并发数，拿到槽位后才能发起任何客户端调用
//! - **RAII 释放**：槽位是 `OwnedSemaphorePermit`，任务以任何方式结束都会归还
//! - **故障隔离**：每道题一个 `tokio::spawn` 任务，panic 只影响自己那一个位置
//! - **带位置返回**：结果按完成顺序返回 `(position, result)`，由上层重排
//! - **随批次退出**：调用方丢弃批次 future 时，未完成的任务随之取消

use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::LoopError;
use crate::models::{ProcessingResult, Question};
use crate::services::ReasoningClient;
use crate::workflow::{LoopSettings, QuestionCtx, ValidationLoop};

/// worker 池
pub struct WorkerPool<C: ReasoningClient + 'static> {
    client: Arc<C>,
    slots: Arc<Semaphore>,
    max_workers: usize,
    settings: LoopSettings,
}

impl<C: ReasoningClient + 'static> WorkerPool<C> {
    /// 创建 worker 池
    ///
    /// `max_workers` 为 0 时按 1 处理。
    pub fn new(client: Arc<C>, max_workers: usize, settings: LoopSettings) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            client,
            slots: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            settings,
        }
    }

    pub fn from_config(client: Arc<C>, config: &Config) -> Self {
        Self::new(
            client,
            config.max_concurrent_workers,
            LoopSettings::from_config(config),
        )
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// 当前空闲槽位数
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// 处理一批带位置的题目
    ///
    /// 每个输入位置恰好产生一个输出，失败和被取消的题目也不例外。
    /// 返回顺序不保证与输入一致。
    pub async fn run(
        &self,
        jobs: Vec<(usize, Question)>,
        cancel: CancellationToken,
    ) -> Vec<(usize, ProcessingResult)> {
        // 批次 future 被丢弃时取消全部任务，归还槽位
        let cancel = cancel.child_token();
        let _abandon = cancel.clone().drop_guard();

        let mut handles = Vec::with_capacity(jobs.len());

        for (position, question) in jobs {
            let client = Arc::clone(&self.client);
            let slots = Arc::clone(&self.slots);
            let cancel = cancel.clone();
            let settings = self.settings;
            let question_number = question.question_number.clone();

            let handle = tokio::spawn(async move {
                process_one(client, slots, position, question, settings, cancel).await
            });
            handles.push((position, question_number, handle));
        }

        let joined = join_all(
            handles
                .into_iter()
                .map(|(position, question_number, handle)| async move {
                    (position, question_number, handle.await)
                }),
        )
        .await;

        joined
            .into_iter()
            .map(|(position, question_number, joined)| match joined {
                Ok(result) => (position, result),
                Err(e) => {
                    error!(
                        "{} 任务执行失败: {}",
                        QuestionCtx::new(position, &question_number),
                        e
                    );
                    let failure = LoopError::WorkerPanicked(e.to_string());
                    (
                        position,
                        ProcessingResult::failed(question_number, failure.to_string(), 0, 0),
                    )
                }
            })
            .collect()
    }
}

/// 单题任务：取槽位 → 跑循环 → 生成结果
async fn process_one<C: ReasoningClient + 'static>(
    client: Arc<C>,
    slots: Arc<Semaphore>,
    position: usize,
    question: Question,
    settings: LoopSettings,
    cancel: CancellationToken,
) -> ProcessingResult {
    let ctx = QuestionCtx::new(position, &question.question_number);
    let queued_at = Instant::now();

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("{} ⚠️ 等待 worker 时被取消", ctx);
            return cancelled_result(&question, 0, queued_at);
        }
        permit = slots.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                error!("{} worker 槽位已关闭", ctx);
                return cancelled_result(&question, 0, queued_at);
            }
        },
    };
    // 持有到函数返回，任何退出路径都会归还槽位
    let _permit = permit;

    let started_at = Instant::now();
    debug!(
        "{} 获得 worker，排队 {}ms",
        ctx,
        queued_at.elapsed().as_millis()
    );

    let outcome = ValidationLoop::new(client.as_ref(), &question, &ctx, settings)
        .run_until_cancelled(&cancel)
        .await;

    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    debug!(
        "{} 完成，用时 {}ms，{} 轮",
        ctx, elapsed_ms, outcome.iterations
    );
    outcome.into_result(&question.question_number, elapsed_ms)
}

fn cancelled_result(question: &Question, iterations: u32, since: Instant) -> ProcessingResult {
    ProcessingResult::failed(
        question.question_number.clone(),
        LoopError::Cancelled.to_string(),
        iterations,
        since.elapsed().as_millis() as u64,
    )
}
