use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use crate::answer::{generate_answer, verify_answer};
use crate::chunker::Chunker;
use crate::config::AppConfig;
use crate::filtration::FiltrationEngine;
use crate::loader;
use crate::models::{Paragraph, SessionRecord};
use crate::oracle::JudgmentOracle;
use crate::tokenize::TokenCounter;

/// Drives one question-scoped session through the funnel:
/// load -> chunk -> coarse -> fine -> synthesize -> verify. Each stage starts
/// only after the previous stage's fan-in has fully resolved; the produced
/// record is plain data for the surrounding collaborators to render.
#[derive(Clone)]
pub struct DocQaService {
    config: AppConfig,
    oracle: Arc<dyn JudgmentOracle>,
    chunker: Chunker,
}

impl DocQaService {
    pub fn new(
        config: AppConfig,
        oracle: Arc<dyn JudgmentOracle>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            config,
            oracle,
            chunker: Chunker::new(counter),
        }
    }

    pub async fn answer_question(&self, question: &str, doc_path: &Path) -> Result<SessionRecord> {
        let started_at = Utc::now();
        let chunking = &self.config.chunking;

        let text = loader::load_pdf_text(doc_path, self.config.max_pages).await?;
        let chunks = self
            .chunker
            .split(&text, chunking.min_tokens, chunking.max_chunks);
        if chunks.is_empty() {
            anyhow::bail!("文档分块失败，文档可能为空：{}", doc_path.display());
        }
        tracing::info!(chunks = chunks.len(), "document split");

        let engine = FiltrationEngine::new(Arc::clone(&self.oracle), self.config.concurrency);

        let coarse = engine.coarse_filter(question, &chunks).await;
        if coarse.selected_ids.is_empty() {
            tracing::warn!("coarse filtration selected no chunks; question may be unanswerable");
        }

        let fine = engine
            .fine_filter(question, &coarse.scratchpad, &chunks, &self.chunker, chunking)
            .await;
        if fine.selected_sub_chunks.is_empty() {
            tracing::warn!("fine filtration selected no sub-chunks");
        }

        let paragraphs: Vec<Paragraph> = fine
            .selected_sub_chunks
            .iter()
            .enumerate()
            .map(|(id, text)| Paragraph {
                id,
                text: text.clone(),
            })
            .collect();

        let answer = generate_answer(self.oracle.as_ref(), question, &paragraphs).await;
        let verified = verify_answer(self.oracle.as_ref(), question, &answer).await;

        Ok(SessionRecord {
            question: question.to_string(),
            doc_path: doc_path.to_path_buf(),
            chunk_count: chunks.len(),
            coarse,
            fine,
            answer,
            verified,
            started_at,
        })
    }
}
