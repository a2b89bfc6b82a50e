use crate::filtration::{parse_json_object, truthy};
use crate::models::{Answer, AnswerStatus, Paragraph};
use crate::oracle::{JudgmentOracle, Stage};
use crate::prompts;

/// One synchronous synthesis call over the selected paragraphs, presented in
/// ascending id order so the model reasons over a single forward pass of the
/// document. Failure is a representable outcome, not an error to propagate.
pub async fn generate_answer(
    oracle: &dyn JudgmentOracle,
    question: &str,
    paragraphs: &[Paragraph],
) -> Answer {
    if paragraphs.is_empty() {
        return Answer::error("没有可用的参考段落，无法生成答案");
    }

    let mut ordered: Vec<Paragraph> = paragraphs.to_vec();
    ordered.sort_by_key(|paragraph| paragraph.id);
    let source_chunk_ids: Vec<usize> = ordered.iter().map(|paragraph| paragraph.id).collect();

    let prompt = prompts::synthesis_prompt(question, &ordered);
    match oracle.judge(Stage::Synthesis, &prompt).await {
        Ok(text) if !text.trim().is_empty() => Answer {
            text: text.trim().to_string(),
            source_chunk_ids,
            status: AnswerStatus::Success,
        },
        Ok(_) => Answer::error("模型返回了空答案"),
        Err(err) => Answer::error(format!("答案生成失败：{err}")),
    }
}

/// Independently re-judge the generated answer. Degrades to `false` on any
/// failure; never calls the oracle for an answer that is not a success.
pub async fn verify_answer(oracle: &dyn JudgmentOracle, question: &str, answer: &Answer) -> bool {
    if !answer.status.is_success() || answer.text.trim().is_empty() {
        return false;
    }

    let prompt = prompts::verification_prompt(question, &answer.text);
    match oracle.judge(Stage::Verification, &prompt).await {
        Ok(raw) => parse_json_object(&raw)
            .map(|value| truthy(value.get("is_correct")))
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::ScriptedOracle;
    use crate::oracle::OracleError;

    fn paragraph(id: usize, text: &str) -> Paragraph {
        Paragraph {
            id,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn zero_paragraphs_yield_error_status_without_oracle_call() {
        let oracle = ScriptedOracle::new(Ok("不应被调用".to_string()));

        let answer = generate_answer(&oracle, "问题", &[]).await;

        assert!(matches!(answer.status, AnswerStatus::Error(_)));
        assert_eq!(answer.text, "");
        assert!(answer.source_chunk_ids.is_empty());
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn paragraphs_are_presented_in_ascending_id_order() {
        let oracle = ScriptedOracle::new(Ok("交付日期为三月一日。".to_string()));
        let paragraphs = vec![
            paragraph(2, "末段内容"),
            paragraph(0, "首段内容"),
            paragraph(1, "中段内容"),
        ];

        let answer = generate_answer(&oracle, "问题", &paragraphs).await;

        assert!(answer.status.is_success());
        assert_eq!(answer.source_chunk_ids, vec![0, 1, 2]);

        let seen = oracle.seen_prompts();
        assert_eq!(seen.len(), 1);
        let prompt = &seen[0].1;
        let first = prompt.find("首段内容").unwrap();
        let middle = prompt.find("中段内容").unwrap();
        let last = prompt.find("末段内容").unwrap();
        assert!(first < middle && middle < last);
    }

    #[tokio::test]
    async fn oracle_failure_becomes_error_status_answer() {
        let oracle = ScriptedOracle::new(Err(OracleError::Transport("连接超时".into())));

        let answer = generate_answer(&oracle, "问题", &[paragraph(0, "段落内容")]).await;

        assert!(matches!(answer.status, AnswerStatus::Error(_)));
        assert_eq!(answer.text, "");
        assert!(answer.source_chunk_ids.is_empty());
    }

    #[tokio::test]
    async fn verification_short_circuits_on_non_success_answer() {
        let oracle = ScriptedOracle::new(Ok(r#"{"is_correct": true}"#.to_string()));
        let answer = Answer::error("生成失败");

        assert!(!verify_answer(&oracle, "问题", &answer).await);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn verification_accepts_boolean_or_string_true() {
        let answer = Answer {
            text: "答案正文".to_string(),
            source_chunk_ids: vec![0],
            status: AnswerStatus::Success,
        };

        let oracle =
            ScriptedOracle::new(Ok(r#"{"is_correct": true, "reasoning": "正确"}"#.to_string()));
        assert!(verify_answer(&oracle, "问题", &answer).await);

        let oracle =
            ScriptedOracle::new(Ok(r#"{"is_correct": "True", "reasoning": "正确"}"#.to_string()));
        assert!(verify_answer(&oracle, "问题", &answer).await);
    }

    #[tokio::test]
    async fn verification_degrades_to_false_on_malformed_or_failed_response() {
        let answer = Answer {
            text: "答案正文".to_string(),
            source_chunk_ids: vec![0],
            status: AnswerStatus::Success,
        };

        let oracle = ScriptedOracle::new(Ok("审核服务暂不可用".to_string()));
        assert!(!verify_answer(&oracle, "问题", &answer).await);

        let oracle = ScriptedOracle::new(Err(OracleError::Transport("断连".into())));
        assert!(!verify_answer(&oracle, "问题", &answer).await);
    }
}
