use crate::error::{AppResult, FileError};
use crate::models::question::{Question, QuestionBatch};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 批量文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Json,
    Toml,
}

impl BatchFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Some(BatchFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Some(BatchFormat::Toml),
            _ => None,
        }
    }
}

// JSON 既可以是裸数组，也可以是 { "questions": [...] }
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonBatch {
    Bare(Vec<Question>),
    Wrapped(QuestionBatch),
}

/// 从文件加载一批题目，保持文件中的顺序
pub async fn load_questions_from_file(path: &Path) -> AppResult<Vec<Question>> {
    let origin = path.display().to_string();

    if !path.exists() {
        return Err(FileError::NotFound { path: origin }.into());
    }

    let format = BatchFormat::from_path(path)
        .ok_or_else(|| FileError::UnsupportedExtension { path: origin.clone() })?;

    let content = fs::read_to_string(path)
        .await
        .map_err(|source| FileError::ReadFailed {
            path: origin.clone(),
            source,
        })?;

    let questions = parse_questions(&content, format, &origin)?;
    tracing::info!("成功加载 {} 道题目: {}", questions.len(), origin);

    Ok(questions)
}

/// 解析批量内容
pub fn parse_questions(
    content: &str,
    format: BatchFormat,
    origin: &str,
) -> AppResult<Vec<Question>> {
    let questions = match format {
        BatchFormat::Json => match serde_json::from_str::<JsonBatch>(content).map_err(|source| {
            FileError::JsonParseFailed {
                path: origin.to_string(),
                source,
            }
        })? {
            JsonBatch::Bare(questions) => questions,
            JsonBatch::Wrapped(batch) => batch.questions,
        },
        BatchFormat::Toml => {
            toml::from_str::<QuestionBatch>(content)
                .map_err(|source| FileError::TomlParseFailed {
                    path: origin.to_string(),
                    source,
                })?
                .questions
        }
    };
    Ok(questions)
}
