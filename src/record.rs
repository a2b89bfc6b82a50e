use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;

use crate::models::{AnswerStatus, SessionRecord};

/// Render one session into a Markdown transcript. Pure; the pipeline never
/// calls this — persistence belongs to the binaries.
pub fn render_markdown(record: &SessionRecord) -> String {
    let mut md = String::new();
    md.push_str("# 问答记录\n\n");
    md.push_str(&format!(
        "**时间**: {}\n\n",
        record
            .started_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    ));
    md.push_str(&format!("**文档**: {}\n\n", record.doc_path.display()));
    md.push_str(&format!("## 用户问题\n```\n{}\n```\n\n", record.question));

    md.push_str("## 文档处理\n");
    md.push_str(&format!("- **分块数**: {}\n", record.chunk_count));

    if record.coarse.selected_ids.is_empty() {
        md.push_str("- **粗滤结果**: 未找到相关文档块。\n");
    } else {
        let ids = join_ids(&record.coarse.selected_ids);
        md.push_str(&format!("- **粗滤结果**: 选中的块 ID: {ids}\n"));
    }
    let coarse_json = serde_json::to_string_pretty(&record.coarse.scratchpad).unwrap_or_default();
    md.push_str(&format!("  - Scratchpad: ```json\n{coarse_json}\n```\n"));

    if record.fine.selected_sub_chunks.is_empty() {
        md.push_str("- **精滤结果**: 未找到相关子块。\n");
    } else {
        md.push_str(&format!(
            "- **精滤结果**: 选中的子块数: {}\n",
            record.fine.selected_sub_chunks.len()
        ));
    }
    let fine_json = serde_json::to_string_pretty(&record.fine.scratchpad).unwrap_or_default();
    md.push_str(&format!("  - Scratchpad: ```json\n{fine_json}\n```\n\n"));

    md.push_str("## 最终结果\n");
    match &record.answer.status {
        AnswerStatus::Success => {
            md.push_str(&format!("- **答案**: \n```\n{}\n```\n", record.answer.text));
            md.push_str(&format!(
                "- **答案是否正确**: {}\n",
                if record.verified { "是" } else { "否" }
            ));
            md.push_str(&format!(
                "- **使用的文档块 ID**: {}\n",
                join_ids(&record.answer.source_chunk_ids)
            ));
        }
        AnswerStatus::Error(reason) => {
            md.push_str(&format!("- **错误**: 答案生成失败：{reason}\n"));
        }
    }

    md
}

/// Persist a full session transcript under `dir`, returning the written path.
pub async fn write_record(dir: &Path, record: &SessionRecord) -> Result<PathBuf> {
    let path = dir.join(filename(&record.question)?);
    write_markdown(&path, &render_markdown(record)).await?;
    Ok(path)
}

/// Session-start failures get a record too; no terminal outcome is lost.
pub async fn write_failure(
    dir: &Path,
    label: &str,
    user_input: &str,
    message: &str,
) -> Result<PathBuf> {
    let mut md = String::new();
    md.push_str("# 问答记录\n\n");
    md.push_str(&format!(
        "**时间**: {}\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    md.push_str(&format!("## 用户输入\n```\n{user_input}\n```\n\n"));
    md.push_str(&format!("## 错误\n{message}\n"));

    let path = dir.join(filename(label)?);
    write_markdown(&path, &md).await?;
    Ok(path)
}

async fn write_markdown(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed creating record dir {}", parent.display()))?;
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("failed writing record {}", path.display()))
}

/// `<timestamp>_<slug>.md`; the slug keeps the first 20 word characters of
/// the question so records sort by time but stay recognizable.
fn filename(question: &str) -> Result<String> {
    Ok(format!(
        "{}_{}.md",
        Local::now().format("%Y-%m-%d_%H-%M-%S"),
        slug(question)?
    ))
}

fn join_ids(ids: &[usize]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn slug(question: &str) -> Result<String> {
    let strip = Regex::new(r"[^\w\s-]")?;
    let cleaned = strip.replace_all(question, "");
    let truncated: String = cleaned.chars().take(20).collect();
    let slug = truncated.trim().replace(char::is_whitespace, "_");
    Ok(if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answer, CoarseOutcome, FineOutcome, Scratchpad};
    use chrono::Utc;

    fn sample_record() -> SessionRecord {
        SessionRecord {
            question: "违约责任的规定是什么".to_string(),
            doc_path: PathBuf::from("/docs/contract.pdf"),
            chunk_count: 5,
            coarse: CoarseOutcome {
                selected_ids: vec![1, 3],
                scratchpad: Scratchpad::new(),
            },
            fine: FineOutcome {
                selected_sub_chunks: vec!["违约方应支付合同总价百分之五的违约金。".to_string()],
                scratchpad: vec!["直接给出违约金比例".to_string()],
            },
            answer: Answer {
                text: "违约金为合同总价的百分之五。".to_string(),
                source_chunk_ids: vec![0],
                status: AnswerStatus::Success,
            },
            verified: true,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn slug_keeps_word_characters_and_truncates() {
        assert_eq!(slug("违约责任的规定是什么？").unwrap(), "违约责任的规定是什么");
        assert_eq!(
            slug("what is the penalty clause in this contract").unwrap(),
            "what_is_the_penalty"
        );
        assert_eq!(slug("？！。").unwrap(), "unnamed");
        assert_eq!(slug("").unwrap(), "unnamed");
    }

    #[test]
    fn transcript_contains_question_answer_and_verification() {
        let md = render_markdown(&sample_record());
        assert!(md.contains("违约责任的规定是什么"));
        assert!(md.contains("选中的块 ID: 1, 3"));
        assert!(md.contains("违约金为合同总价的百分之五。"));
        assert!(md.contains("**答案是否正确**: 是"));
    }

    #[test]
    fn error_answer_renders_error_section() {
        let mut record = sample_record();
        record.answer = Answer::error("模型不可用");
        record.verified = false;

        let md = render_markdown(&record);
        assert!(md.contains("答案生成失败：模型不可用"));
        assert!(!md.contains("**答案是否正确**"));
    }

    #[tokio::test]
    async fn records_are_written_under_the_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_record(dir.path(), &sample_record()).await.unwrap();

        assert!(path.exists());
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("# 问答记录"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("违约责任的规定是什么.md"));
    }
}
