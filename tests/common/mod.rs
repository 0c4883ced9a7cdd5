//! 集成测试公用的 mock 推理客户端
#![allow(dead_code)]

use async_trait::async_trait;
use question_validator::models::QuestionType;
use question_validator::{Critique, LlmError, PriorFeedback, Proposal, Question, ReasoningClient};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// 单道题的行为脚本
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// 依次返回的提议和裁决
    Script {
        proposals: VecDeque<String>,
        critiques: VecDeque<Critique>,
    },
    /// 总是提议同一个答案、总是驳回
    AlwaysReject { answer: String },
    /// 客户端已放弃（重试耗尽）
    HardFailure,
    /// 调用时 panic
    Panic,
}

impl Behaviour {
    pub fn script(proposals: &[&str], critiques: Vec<Critique>) -> Self {
        Behaviour::Script {
            proposals: proposals.iter().map(|s| s.to_string()).collect(),
            critiques: critiques.into(),
        }
    }
}

/// 可插桩的 mock：记录调用次数、并发峰值和调用顺序
#[derive(Default)]
pub struct MockClient {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    call_log: Mutex<Vec<(String, &'static str)>>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, question_number: &str, behaviour: Behaviour) -> Self {
        self.behaviours
            .get_mut()
            .unwrap()
            .insert(question_number.to_string(), behaviour);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn with_question_delay(mut self, question_number: &str, delay: Duration) -> Self {
        self.delays.insert(question_number.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn call_log(&self) -> Vec<(String, &'static str)> {
        self.call_log.lock().unwrap().clone()
    }

    async fn enter(&self, question: &Question, kind: &'static str) -> InFlight<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log
            .lock()
            .unwrap()
            .push((question.question_number.clone(), kind));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let delay = self
            .delays
            .get(&question.question_number)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        guard
    }

    fn behaviour(&self, question: &Question) -> Option<Behaviour> {
        self.behaviours
            .lock()
            .unwrap()
            .get(&question.question_number)
            .cloned()
    }
}

fn hard_failure() -> LlmError {
    LlmError::RetriesExhausted {
        attempts: 3,
        last_error: "connection refused".to_string(),
    }
}

fn script_exhausted() -> LlmError {
    LlmError::ApiCallFailed {
        model: "mock".to_string(),
        message: "脚本外的调用".to_string(),
    }
}

#[async_trait]
impl ReasoningClient for MockClient {
    async fn propose(
        &self,
        question: &Question,
        _prior: Option<&PriorFeedback>,
    ) -> Result<Proposal, LlmError> {
        let _guard = self.enter(question, "propose").await;

        match self.behaviour(question) {
            // 未配置的题目：选第一个选项
            None => Ok(Proposal::new(question.answer[0].clone(), "默认")),
            Some(Behaviour::AlwaysReject { answer }) => Ok(Proposal::new(answer, "坚持")),
            Some(Behaviour::HardFailure) => Err(hard_failure()),
            Some(Behaviour::Panic) => panic!("mock propose panic"),
            Some(Behaviour::Script { .. }) => {
                let mut behaviours = self.behaviours.lock().unwrap();
                match behaviours.get_mut(&question.question_number) {
                    Some(Behaviour::Script { proposals, .. }) => proposals
                        .pop_front()
                        .map(|answer| Proposal::new(answer, "脚本"))
                        .ok_or_else(script_exhausted),
                    _ => Err(script_exhausted()),
                }
            }
        }
    }

    async fn critique(
        &self,
        question: &Question,
        _proposal: &Proposal,
    ) -> Result<Critique, LlmError> {
        let _guard = self.enter(question, "critique").await;

        match self.behaviour(question) {
            None => Ok(Critique::accept()),
            Some(Behaviour::AlwaysReject { .. }) => Ok(Critique::reject("不同意")),
            Some(Behaviour::HardFailure) => Err(hard_failure()),
            Some(Behaviour::Panic) => panic!("mock critique panic"),
            Some(Behaviour::Script { .. }) => {
                let mut behaviours = self.behaviours.lock().unwrap();
                match behaviours.get_mut(&question.question_number) {
                    Some(Behaviour::Script { critiques, .. }) => {
                        critiques.pop_front().ok_or_else(script_exhausted)
                    }
                    _ => Err(script_exhausted()),
                }
            }
        }
    }
}

pub fn question(number: &str, options: &[&str]) -> Question {
    Question {
        content: format!("第 {} 题的题干", number),
        title: format!("题目 {}", number),
        question_type: QuestionType::Option,
        answer: options.iter().map(|s| s.to_string()).collect(),
        question_number: number.to_string(),
    }
}
