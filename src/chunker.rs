use std::sync::Arc;

use crate::models::Chunk;
use crate::tokenize::TokenCounter;

/// Splits raw document text into a bounded number of contiguous,
/// sentence-aligned chunks. Sizing decisions are made in token units via the
/// injected counter.
#[derive(Clone)]
pub struct Chunker {
    counter: Arc<dyn TokenCounter>,
}

impl Chunker {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    /// Greedily accumulate sentences into chunks. A running chunk closes only
    /// when the next sentence would push it above `2 * min_tokens` AND it has
    /// already reached `min_tokens`; the final partial chunk is flushed
    /// unconditionally. If the result still exceeds `max_chunks`, the
    /// boundaries are discarded and re-derived as equal-width sentence groups.
    pub fn split(&self, text: &str, min_tokens: usize, max_chunks: usize) -> Vec<Chunk> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for sentence in &sentences {
            let tokens = self.counter.count_tokens(sentence);
            if !current.is_empty()
                && current_tokens + tokens > 2 * min_tokens
                && current_tokens >= min_tokens
            {
                chunks.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            current.push_str(sentence);
            current_tokens += tokens;
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        if max_chunks > 0 && chunks.len() > max_chunks {
            chunks = rebalance(&chunks, max_chunks);
        }

        chunks
            .into_iter()
            .enumerate()
            .map(|(id, text)| Chunk { id, text })
            .collect()
    }
}

/// Fallback normalization pass: re-tokenize the concatenated text into
/// sentences and slice them into at most `max_chunks` equal-width groups.
fn rebalance(chunks: &[String], max_chunks: usize) -> Vec<String> {
    let merged = chunks.concat();
    let sentences = split_sentences(&merged);
    if sentences.is_empty() {
        return Vec::new();
    }
    let per = sentences.len().div_ceil(max_chunks).max(1);
    sentences.chunks(per).map(|group| group.concat()).collect()
}

/// Split on Chinese terminal punctuation or newlines. Terminal punctuation
/// stays attached to its sentence; fragments of two or fewer characters after
/// trimming are dropped.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        match ch {
            '。' | '！' | '？' => {
                current.push(ch);
                flush_sentence(&mut current, &mut sentences);
            }
            '\n' => flush_sentence(&mut current, &mut sentences),
            _ => current.push(ch),
        }
    }
    flush_sentence(&mut current, &mut sentences);

    sentences
}

fn flush_sentence(current: &mut String, sentences: &mut Vec<String>) {
    let trimmed = current.trim();
    if trimmed.chars().count() > 2 {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::testing::CharCounter;

    fn chunker() -> Chunker {
        Chunker::new(Arc::new(CharCounter))
    }

    #[test]
    fn short_fragments_are_discarded() {
        let chunks = chunker().split("嗯。今天的会议定在下午三点。", 100, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "今天的会议定在下午三点。");
    }

    #[test]
    fn chunk_texts_cover_all_kept_sentences_in_order() {
        let text = "第一句讲合同签订背景。\n第二句约定了交付日期！第三句规定了违约责任？尾句没有终止符";
        let chunks = chunker().split(text, 5, 20);

        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            joined,
            "第一句讲合同签订背景。第二句约定了交付日期！第三句规定了违约责任？尾句没有终止符"
        );
    }

    #[test]
    fn ids_are_dense_and_zero_based() {
        let text = "合同第一条写明标的。合同第二条写明价款。合同第三条写明期限。";
        let chunks = chunker().split(text, 5, 20);
        assert!(chunks.len() > 1);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, index);
        }
    }

    #[test]
    fn running_chunk_closes_only_past_both_guards() {
        // Six-character sentences against min_tokens = 10: the running count
        // reaches 18 before 18 + 6 > 20 triggers a close, so chunks are three
        // sentences wide and never under min_tokens except the tail.
        let text = "一二三四五。".repeat(7);
        let chunks = chunker().split(&text, 10, 20);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "一二三四五。".repeat(3));
        assert_eq!(chunks[1].text, "一二三四五。".repeat(3));
        // Final partial chunk flushed even though it is under min_tokens.
        assert_eq!(chunks[2].text, "一二三四五。");
    }

    #[test]
    fn never_splits_mid_sentence() {
        let text = "甲方应当按期交付货物。乙方应当按期支付价款。逾期交付的按日支付违约金。";
        for chunk in chunker().split(text, 8, 20) {
            assert!(chunk.text.ends_with('。'));
        }
    }

    #[test]
    fn chunk_count_is_capped_by_fallback_pass() {
        let text = "这里是一个完整句子。".repeat(60);
        let chunks = chunker().split(&text, 1, 20);

        assert!(chunks.len() <= 20);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, index);
        }
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn fallback_pass_slices_sentences_evenly() {
        // 10 identical sentences into at most 4 chunks: ceil(10 / 4) = 3
        // sentences per chunk, so 4 chunks sized 3/3/3/1.
        let sentence = "均匀切分测试句子。";
        let text = sentence.repeat(10);
        let chunks = chunker().split(&text, 1, 4);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text, sentence.repeat(3));
        assert_eq!(chunks[3].text, sentence.to_string());
    }

    #[test]
    fn empty_and_whitespace_input_yield_no_chunks() {
        assert!(chunker().split("", 100, 20).is_empty());
        assert!(chunker().split(" \n\n  ", 100, 20).is_empty());
    }
}
