use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::chunker::Chunker;
use crate::config::ChunkingConfig;
use crate::models::{Chunk, CoarseOutcome, CoarseVerdict, FineOutcome, Scratchpad};
use crate::oracle::{JudgmentOracle, OracleError, Stage};
use crate::prompts;

/// Coarse and fine filtration over one in-memory chunk set. All oracle
/// fan-out goes through a counting admission gate local to each batch.
pub struct FiltrationEngine {
    oracle: Arc<dyn JudgmentOracle>,
    concurrency: usize,
}

impl FiltrationEngine {
    pub fn new(oracle: Arc<dyn JudgmentOracle>, concurrency: usize) -> Self {
        Self {
            oracle,
            concurrency: concurrency.max(1),
        }
    }

    /// Judge every chunk independently for relevance to the question. The
    /// scratchpad gets exactly one verdict per input chunk; `selected_ids`
    /// holds the chunks whose verdict came back relevant, ascending.
    pub async fn coarse_filter(&self, question: &str, chunks: &[Chunk]) -> CoarseOutcome {
        let requests: Vec<String> = chunks
            .iter()
            .map(|chunk| prompts::coarse_prompt(question, chunk.id, &chunk.text))
            .collect();
        let responses = self.fan_out(Stage::Coarse, requests).await;

        let mut scratchpad = Scratchpad::new();
        let mut selected_ids = Vec::new();
        for (chunk, response) in chunks.iter().zip(responses) {
            let verdict = coarse_verdict(chunk.id, response);
            if verdict.is_relevant {
                selected_ids.push(chunk.id);
            }
            scratchpad.insert(chunk.id, verdict);
        }

        tracing::info!(
            total = chunks.len(),
            selected = selected_ids.len(),
            "coarse filtration complete"
        );
        CoarseOutcome {
            selected_ids,
            scratchpad,
        }
    }

    /// Re-chunk the top-ranked coarse-relevant chunks and judge each sub-chunk
    /// for direct answer containment. Results keep stable input order no
    /// matter when each judgment completes.
    pub async fn fine_filter(
        &self,
        question: &str,
        scratchpad: &Scratchpad,
        chunks: &[Chunk],
        chunker: &Chunker,
        config: &ChunkingConfig,
    ) -> FineOutcome {
        // Relevance ranks the candidates; BTreeMap iteration order plus a
        // stable sort keeps ties in ascending chunk-id order.
        let mut ranked: Vec<&CoarseVerdict> = scratchpad
            .values()
            .filter(|verdict| verdict.is_relevant)
            .collect();
        ranked.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(config.max_selected_chunks);

        let mut sub_chunks: Vec<String> = Vec::new();
        for verdict in &ranked {
            let Some(chunk) = chunks.iter().find(|c| c.id == verdict.chunk_id) else {
                continue;
            };
            // Later sub-chunks of an over-long chunk are dropped on purpose;
            // fine_split bounds the fan-out per parent chunk.
            for sub in chunker
                .split(&chunk.text, config.fine_min_tokens, config.max_chunks)
                .into_iter()
                .take(config.fine_split)
            {
                sub_chunks.push(sub.text);
            }
        }

        if sub_chunks.is_empty() {
            return FineOutcome {
                selected_sub_chunks: Vec::new(),
                scratchpad: Vec::new(),
            };
        }

        let scratchpad_json = serde_json::to_string_pretty(scratchpad).unwrap_or_default();
        let requests: Vec<String> = sub_chunks
            .iter()
            .map(|text| prompts::fine_prompt(question, text, &scratchpad_json))
            .collect();
        let responses = self.fan_out(Stage::Fine, requests).await;

        let mut selected_sub_chunks = Vec::new();
        let mut reasonings = Vec::with_capacity(sub_chunks.len());
        for (text, response) in sub_chunks.into_iter().zip(responses) {
            let (is_selected, reasoning) = fine_verdict(response);
            if is_selected {
                selected_sub_chunks.push(text);
            }
            reasonings.push(reasoning);
        }

        tracing::info!(
            judged = reasonings.len(),
            selected = selected_sub_chunks.len(),
            "fine filtration complete"
        );
        FineOutcome {
            selected_sub_chunks,
            scratchpad: reasonings,
        }
    }

    /// Fan out one judgment per request under the admission gate, then gather
    /// responses in issue order. Correlation is by index: responses[i] always
    /// answers requests[i], never the i-th completion.
    async fn fan_out(
        &self,
        stage: Stage,
        requests: Vec<String>,
    ) -> Vec<Result<String, OracleError>> {
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(requests.len());

        for prompt in requests {
            let oracle = Arc::clone(&self.oracle);
            let gate = Arc::clone(&gate);
            tasks.push(tokio::spawn(async move {
                let _permit = gate
                    .acquire_owned()
                    .await
                    .map_err(|err| OracleError::Transport(err.to_string()))?;
                oracle.judge(stage, &prompt).await
            }));
        }

        let mut responses = Vec::with_capacity(tasks.len());
        for task in tasks {
            responses.push(match task.await {
                Ok(result) => result,
                Err(err) => Err(OracleError::Transport(format!(
                    "judgment task panicked: {err}"
                ))),
            });
        }
        responses
    }
}

/// Best-effort extraction of a JSON object from an oracle response, tolerating
/// code fences and surrounding prose.
pub(crate) fn parse_json_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(|value| value.is_object())
}

pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Booleans may arrive as JSON booleans or as the string "true".
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub(crate) fn snippet(raw: &str) -> String {
    raw.chars().take(120).collect()
}

/// Fold one coarse response into a verdict. Transport failure, malformed
/// JSON, and out-of-range scores all land on the excluded side with the
/// rejection reason recorded, never dropped.
fn coarse_verdict(chunk_id: usize, response: Result<String, OracleError>) -> CoarseVerdict {
    let raw = match response {
        Ok(raw) => raw,
        Err(err) => {
            return CoarseVerdict {
                chunk_id,
                is_relevant: false,
                relevance: 0.0,
                reasoning: format!("判定调用失败：{err}"),
            }
        }
    };

    let Some(value) = parse_json_object(&raw) else {
        return CoarseVerdict {
            chunk_id,
            is_relevant: false,
            relevance: 0.0,
            reasoning: format!("无法解析判定响应：{}", snippet(&raw)),
        };
    };

    let mut reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("未提供推理")
        .to_string();
    let mut is_relevant = truthy(value.get("is_relevant"));

    let relevance = match value.get("relevance").and_then(coerce_f64) {
        Some(score) if (0.0..=1.0).contains(&score) => score,
        Some(score) => {
            is_relevant = false;
            reasoning.push_str(&format!("（relevance {score} 超出 [0,1]，已按 0.0 处理）"));
            0.0
        }
        None => {
            is_relevant = false;
            reasoning.push_str("（relevance 缺失或非数值，已按 0.0 处理）");
            0.0
        }
    };

    CoarseVerdict {
        chunk_id,
        is_relevant,
        relevance,
        reasoning,
    }
}

fn fine_verdict(response: Result<String, OracleError>) -> (bool, String) {
    let raw = match response {
        Ok(raw) => raw,
        Err(err) => return (false, format!("判定调用失败：{err}")),
    };

    match parse_json_object(&raw) {
        Some(value) => {
            let reasoning = value
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or("未提供推理")
                .to_string();
            (truthy(value.get("is_selected")), reasoning)
        }
        None => (false, format!("无法解析判定响应：{}", snippet(&raw))),
    }
}
