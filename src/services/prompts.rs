//! 提示词构建与响应解析
//!
//! 提议者按 `SELECTED:` / `REASONING:` 作答，验证者按 `VERDICT:` / `CRITICISM:` 作答。

use regex::Regex;
use std::sync::LazyLock;

use crate::error::LlmError;
use crate::models::{Question, Verdict};
use crate::services::reasoning_client::{Critique, PriorFeedback, Proposal};

pub const ANSWERER_SYSTEM_MESSAGE: &str =
    "你是一个擅长分析选择题的专家，需要从给定选项中选出唯一的最佳答案。";

pub const VALIDATOR_SYSTEM_MESSAGE: &str =
    "你是一个严格的审题专家，负责审查他人对选择题的作答，只在确信答案最佳时表示认可。";

static SELECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[\s*#>\-]*SELECTED\s*\**\s*[:：]\s*(.+?)\s*$").expect("SELECTED 正则")
});

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?si)REASONING\s*\**\s*[:：]\s*(.*)$").expect("REASONING 正则")
});

static VERDICT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[\s*#>\-]*VERDICT\s*\**\s*[:：][\s*\[]*(AGREE|DISAGREE|ACCEPT|REJECT)\b")
        .expect("VERDICT 正则")
});

static CRITICISM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?si)CRITICISM\s*\**\s*[:：]\s*(.*)$").expect("CRITICISM 正则")
});

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]|\d{1,3})(?:[.、:：)）\s]|$)").expect("选项标签正则")
});

/// 选项标签：前 26 个用字母，之后用序号
pub fn option_label(index: usize) -> String {
    if index < 26 {
        ((b'A' + index as u8) as char).to_string()
    } else {
        (index + 1).to_string()
    }
}

fn format_options(question: &Question) -> String {
    question
        .answer
        .iter()
        .enumerate()
        .map(|(i, opt)| format!("{}. {}", option_label(i), opt))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 构建提议者的用户消息
pub fn build_propose_prompt(question: &Question, prior: Option<&PriorFeedback>) -> String {
    let mut prompt = format!(
        r#"请分析下面的选择题并选出最佳答案。

【题目内容】
{}

【题目标题】
{}

【候选答案】
{}
"#,
        question.content,
        question.title,
        format_options(question)
    );

    if let Some(prior) = prior {
        prompt.push_str(&format!(
            r#"
【上一次的选择】
{}

【审查意见】
{}

请结合审查意见重新考虑你的答案。
"#,
            prior.previous_answer, prior.feedback
        ));
    }

    prompt.push_str(
        r#"
只能从候选答案中选择一个。按如下格式回复：
SELECTED: [选项字母]
REASONING: [简要理由]"#,
    );

    prompt
}

/// 构建验证者的用户消息
pub fn build_critique_prompt(question: &Question, proposal: &Proposal) -> String {
    format!(
        r#"请审查下面这道选择题的作答。

【题目内容】
{}

【题目标题】
{}

【候选答案】
{}

【拟选答案】
{}

【作答理由】
{}

请判断拟选答案是否是最佳选择：是否准确回答了题目？是否存在更好的选项？理由是否成立？

按如下格式回复：
VERDICT: [AGREE 或 DISAGREE]
如果 DISAGREE，再给出：
CRITICISM: [具体问题以及建议的选项字母]"#,
        question.content,
        question.title,
        format_options(question),
        proposal.answer,
        if proposal.reasoning.is_empty() {
            "（无）"
        } else {
            proposal.reasoning.as_str()
        }
    )
}

/// 把模型给出的选择映射回候选项原文
///
/// 依次尝试：原文精确匹配、忽略大小写匹配、选项标签。
/// 都不匹配时原样返回，由调用方判为协议违规。
pub fn resolve_selection(raw: &str, options: &[String]) -> String {
    let cleaned = clean_selection(raw);

    if let Some(opt) = options.iter().find(|opt| opt.as_str() == cleaned) {
        return opt.clone();
    }

    if let Some(opt) = options
        .iter()
        .find(|opt| opt.trim().to_lowercase() == cleaned.to_lowercase())
    {
        return opt.clone();
    }

    if let Some(caps) = LABEL_RE.captures(cleaned) {
        let label = &caps[1];
        let index = match label.parse::<usize>() {
            Ok(n) => n.checked_sub(1),
            Err(_) => label
                .chars()
                .next()
                .map(|c| (c.to_ascii_uppercase() as u8 - b'A') as usize),
        };
        if let Some(opt) = index.and_then(|i| options.get(i)) {
            return opt.clone();
        }
    }

    cleaned.to_string()
}

fn clean_selection(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '*' | '[' | ']' | '"' | '\'' | '`' | '“' | '”')
        })
        .trim_end_matches(['.', '。'])
}

/// 解析提议者响应
pub fn parse_propose_response(response: &str, question: &Question) -> Result<Proposal, LlmError> {
    let raw = SELECTED_RE
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|s| !clean_selection(s).is_empty())
        .ok_or_else(|| LlmError::MalformedResponse {
            reason: "缺少 SELECTED".to_string(),
            response: response.to_string(),
        })?;

    let reasoning = REASONING_RE
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Ok(Proposal {
        answer: resolve_selection(raw, &question.answer),
        reasoning,
    })
}

/// 解析验证者响应
pub fn parse_critique_response(response: &str) -> Result<Critique, LlmError> {
    let verdict = VERDICT_RE
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| match m.as_str().to_uppercase().as_str() {
            "AGREE" | "ACCEPT" => Verdict::Accept,
            _ => Verdict::Reject,
        })
        .ok_or_else(|| LlmError::MalformedResponse {
            reason: "缺少 VERDICT".to_string(),
            response: response.to_string(),
        })?;

    let feedback = CRITICISM_RE
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    if verdict == Verdict::Reject && feedback.is_empty() {
        tracing::warn!("验证者驳回但未给出 CRITICISM");
    }

    Ok(Critique { verdict, feedback })
}
