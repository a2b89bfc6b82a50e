use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous, sentence-aligned slice of document text. Ids are dense,
/// 0-based, and follow document order within one splitting pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: usize,
    pub text: String,
}

/// One coarse-stage judgment for one chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoarseVerdict {
    pub chunk_id: usize,
    pub is_relevant: bool,
    /// Always within [0.0, 1.0]; anything else collapses to 0.0 at parse time.
    pub relevance: f64,
    pub reasoning: String,
}

/// Accumulated coarse-stage memory, keyed by chunk id. Append-only while the
/// coarse batch runs, frozen afterwards.
pub type Scratchpad = BTreeMap<usize, CoarseVerdict>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoarseOutcome {
    /// Ids whose verdict came back relevant, in ascending chunk order.
    pub selected_ids: Vec<usize>,
    pub scratchpad: Scratchpad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineOutcome {
    /// Raw text of sub-chunks the fine judge kept, in stable input order.
    pub selected_sub_chunks: Vec<String>,
    /// Per-sub-chunk reasoning, one entry per judged sub-chunk, input order.
    pub scratchpad: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum AnswerStatus {
    Success,
    Error(String),
}

impl AnswerStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AnswerStatus::Success)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub source_chunk_ids: Vec<usize>,
    #[serde(flatten)]
    pub status: AnswerStatus,
}

impl Answer {
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            source_chunk_ids: Vec::new(),
            status: AnswerStatus::Error(reason.into()),
        }
    }
}

/// A synthesis input paragraph: a fine-selected sub-chunk re-enumerated for
/// the answer prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: usize,
    pub text: String,
}

/// Everything one question-answering session produced, as plain data. The
/// record module renders this; the HTTP front end returns it verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub question: String,
    pub doc_path: PathBuf,
    pub chunk_count: usize,
    pub coarse: CoarseOutcome,
    pub fine: FineOutcome,
    pub answer: Answer,
    pub verified: bool,
    pub started_at: DateTime<Utc>,
}
