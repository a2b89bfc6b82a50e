use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filtration::{parse_json_object, snippet};
use crate::oracle::{JudgmentOracle, Stage};
use crate::prompts;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedQuery {
    pub question: String,
    pub doc_path: String,
    pub reasoning: String,
}

/// Route one free-form utterance through the oracle to pull out the question
/// and the document path. Unlike the filtration stages this is a
/// session-start step: failure here aborts before any document work begins.
pub async fn extract_query(
    oracle: &dyn JudgmentOracle,
    user_input: &str,
) -> Result<ExtractedQuery> {
    let prompt = prompts::intake_prompt(user_input);
    let raw = oracle.judge(Stage::Intake, &prompt).await?;

    let value =
        parse_json_object(&raw).ok_or_else(|| anyhow!("无法解析输入解析响应：{}", snippet(&raw)))?;

    let question = field(&value, "question");
    let doc_path = field(&value, "doc_path");
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("未提供推理")
        .to_string();

    if question.is_empty() {
        anyhow::bail!("无法从输入中提取有效问题：{reasoning}");
    }
    if doc_path.is_empty() {
        anyhow::bail!("无法从输入中提取有效文档路径：{reasoning}");
    }

    Ok(ExtractedQuery {
        question,
        doc_path,
        reasoning,
    })
}

fn field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::ScriptedOracle;

    #[tokio::test]
    async fn extracts_question_and_path() {
        let oracle = ScriptedOracle::new(Ok(r#"{
            "question": "违约责任的规定是什么",
            "doc_path": "/docs/contract.pdf",
            "reasoning": "输入中明确给出了问题和路径"
        }"#
        .to_string()));

        let extracted = extract_query(&oracle, "请回答合同中违约责任的规定是什么？文档路径是 /docs/contract.pdf")
            .await
            .unwrap();

        assert_eq!(extracted.question, "违约责任的规定是什么");
        assert_eq!(extracted.doc_path, "/docs/contract.pdf");
    }

    #[tokio::test]
    async fn empty_question_is_a_session_start_error() {
        let oracle = ScriptedOracle::new(Ok(
            r#"{"question": "", "doc_path": "/a.pdf", "reasoning": "输入中没有问题"}"#.to_string(),
        ));

        let err = extract_query(&oracle, "随便说点什么").await.unwrap_err();
        assert!(err.to_string().contains("有效问题"));
    }

    #[tokio::test]
    async fn unparseable_response_is_a_session_start_error() {
        let oracle = ScriptedOracle::new(Ok("我不太明白你的意思".to_string()));

        let err = extract_query(&oracle, "帮我查一下签署日期").await.unwrap_err();
        assert!(err.to_string().contains("无法解析"));
    }
}
