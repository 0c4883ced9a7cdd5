//! 题目处理上下文
//!
//! 封装"我正在处理批次中的第几题"这一信息

use std::fmt::Display;

/// 题目处理上下文
///
/// `position` 是题目在输入批次中的下标，内部一律按它定位；
/// `question_number` 只用于日志和结果关联，可能重复。
#[derive(Debug, Clone)]
pub struct QuestionCtx {
    /// 批次内下标（从0开始）
    pub position: usize,

    /// 外部题号
    pub question_number: String,
}

impl QuestionCtx {
    /// 创建新的题目上下文
    pub fn new(position: usize, question_number: impl Into<String>) -> Self {
        Self {
            position,
            question_number: question_number.into(),
        }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[题目 #{} 题号 {}]", self.position + 1, self.question_number)
    }
}
