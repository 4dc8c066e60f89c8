//! Local reference guide with TF-IDF excerpt search.
//!
//! The guide is split into overlapping word windows once at startup. Each
//! question only ships the best-matching excerpts upstream, which keeps the
//! prompt bounded no matter how large the guide grows.

use crate::utils::error::{Result, TriageError};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_CHUNK_WORDS: usize = 160;
pub const DEFAULT_CHUNK_OVERLAP: usize = 40;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Excerpt {
    pub chunk_index: usize,
    pub text: String,
    pub score: f64,
}

#[derive(Debug)]
pub struct KnowledgeBase {
    chunks: Vec<String>,
    idf: HashMap<String, f64>,
    doc_vectors: Vec<(HashMap<String, f64>, f64)>,
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

fn term_counts(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0.0) += 1.0;
    }
    counts
}

fn norm(vector: &HashMap<String, f64>) -> f64 {
    let n = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if n > 0.0 {
        n
    } else {
        1.0
    }
}

/// 以字數切塊，相鄰區塊重疊 overlap 個字
pub fn chunk_text(text: &str, chunk_words: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let step = chunk_words.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_words).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

impl KnowledgeBase {
    pub fn from_text(text: &str) -> Self {
        Self::from_chunks(chunk_text(text, DEFAULT_CHUNK_WORDS, DEFAULT_CHUNK_OVERLAP))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let kb = Self::from_text(&content);
        if kb.is_empty() {
            return Err(TriageError::ConfigError {
                message: format!("reference guide {} is empty", path.display()),
            });
        }

        tracing::info!(
            "📚 Loaded reference guide {} ({} chunks)",
            path.display(),
            kb.len()
        );
        Ok(kb)
    }

    pub fn from_chunks(chunks: Vec<String>) -> Self {
        let doc_term_counts: Vec<HashMap<String, f64>> =
            chunks.iter().map(|chunk| term_counts(chunk)).collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for counts in &doc_term_counts {
            for term in counts.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        // 平滑 idf：ln((1 + N) / (1 + df)) + 1
        let doc_count = chunks.len().max(1) as f64;
        let idf: HashMap<String, f64> = doc_freq
            .into_iter()
            .map(|(term, freq)| {
                (
                    term.to_string(),
                    ((1.0 + doc_count) / (1.0 + freq as f64)).ln() + 1.0,
                )
            })
            .collect();

        let doc_vectors = doc_term_counts
            .into_iter()
            .map(|counts| {
                let vector: HashMap<String, f64> = counts
                    .into_iter()
                    .map(|(term, count)| {
                        let weight = count * idf.get(&term).copied().unwrap_or(0.0);
                        (term, weight)
                    })
                    .collect();
                let n = norm(&vector);
                (vector, n)
            })
            .collect();

        Self {
            chunks,
            idf,
            doc_vectors,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 依餘弦相似度排序，回傳前 top_k 個正分區塊
    pub fn search(&self, query: &str, top_k: usize) -> Vec<Excerpt> {
        let query_vector: HashMap<String, f64> = term_counts(query)
            .into_iter()
            .filter_map(|(term, count)| self.idf.get(&term).map(|idf| (term, count * idf)))
            .collect();
        if query_vector.is_empty() {
            return Vec::new();
        }
        let query_norm = norm(&query_vector);

        let mut scored: Vec<(f64, usize)> = self
            .doc_vectors
            .iter()
            .enumerate()
            .filter_map(|(idx, (doc_vector, doc_norm))| {
                let dot: f64 = query_vector
                    .iter()
                    .map(|(term, weight)| weight * doc_vector.get(term).copied().unwrap_or(0.0))
                    .sum();
                (dot > 0.0).then(|| (dot / (query_norm * doc_norm), idx))
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(top_k.max(1))
            .map(|(score, idx)| Excerpt {
                chunk_index: idx,
                text: self.chunks[idx].clone(),
                score,
            })
            .collect()
    }

    /// 組出送往上游的參考內容，總長度不超過 max_chars；
    /// 沒有相符區塊時退回指南開頭
    pub fn context_for(&self, query: &str, top_k: usize, max_chars: usize) -> Vec<Excerpt> {
        let mut candidates = self.search(query, top_k);
        if candidates.is_empty() {
            candidates = self
                .chunks
                .iter()
                .enumerate()
                .take(top_k.max(1))
                .map(|(idx, text)| Excerpt {
                    chunk_index: idx,
                    text: text.clone(),
                    score: 0.0,
                })
                .collect();
        }

        let mut used = 0;
        let mut selected = Vec::new();
        for mut excerpt in candidates {
            let remaining = max_chars.saturating_sub(used);
            if remaining == 0 {
                break;
            }
            if excerpt.text.len() > remaining {
                excerpt.text = truncate_chars(&excerpt.text, remaining);
            }
            used += excerpt.text.len();
            selected.push(excerpt);
        }
        selected
    }
}

fn truncate_chars(text: &str, max_bytes: usize) -> String {
    let mut end = max_bytes.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
