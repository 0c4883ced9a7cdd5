use serde::{Deserialize, Serialize};

use crate::error::BusinessError;

/// 题目类型，目前只有单选
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    #[default]
    Option,
}

/// 待处理的选择题（接收后只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// 题干及上下文
    pub content: String,
    /// 简短标题
    pub title: String,
    #[serde(rename = "type", default)]
    pub question_type: QuestionType,
    /// 候选答案，按原顺序
    pub answer: Vec<String>,
    /// 外部题号，只用于关联，不保证唯一
    #[serde(deserialize_with = "deserialize_question_number")]
    pub question_number: String,
}

impl Question {
    /// 接收时的结构校验
    pub fn validate(&self) -> Result<(), BusinessError> {
        if self.content.trim().is_empty() {
            return Err(BusinessError::EmptyContent);
        }
        if self.title.trim().is_empty() {
            return Err(BusinessError::EmptyTitle);
        }
        if self.question_number.trim().is_empty() {
            return Err(BusinessError::EmptyQuestionNumber);
        }
        if self.answer.is_empty() {
            return Err(BusinessError::NoOptions);
        }
        if let Some(index) = self.answer.iter().position(|opt| opt.trim().is_empty()) {
            return Err(BusinessError::EmptyOption { index });
        }
        Ok(())
    }

    /// 候选项精确匹配
    pub fn has_option(&self, candidate: &str) -> bool {
        self.answer.iter().any(|opt| opt == candidate)
    }
}

/// 裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Accept,
    Reject,
}

/// 单轮 propose → critique 的记录，只在本轮内存在
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerAttempt {
    /// 从 1 开始
    pub iteration_index: u32,
    pub proposed_answer: String,
    pub validator_verdict: Verdict,
    pub validator_feedback: String,
}

/// 单题处理结果，每道输入题目恰好一个
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub question_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_answer: Option<String>,
    pub validation_iterations: u32,
    pub processing_time_ms: u64,
    /// 验证者是否最终认可（轮数耗尽时为 false）
    #[serde(default)]
    pub consensus_reached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingResult {
    /// 失败结果：带错误标记，没有答案
    pub fn failed(
        question_number: impl Into<String>,
        error: impl Into<String>,
        validation_iterations: u32,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            question_number: question_number.into(),
            selected_answer: None,
            validation_iterations,
            processing_time_ms,
            consensus_reached: false,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.selected_answer.is_some()
    }
}

/// 批量输入文件的外层结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBatch {
    pub questions: Vec<Question>,
}

// 题号既可能是字符串也可能是数字，统一转成字符串
fn deserialize_question_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct QuestionNumberVisitor;

    impl<'de> Visitor<'de> for QuestionNumberVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer question number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(QuestionNumberVisitor)
}
