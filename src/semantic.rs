use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_MODEL_ID: &str = "hashed-unigram-bigram-v1";
pub const DEFAULT_MODEL_NAME: &str = "local hashed unigram/bigram features";
pub const DEFAULT_EMBEDDING_DIM: usize = 512;
pub const DEFAULT_NORMALIZATION: &str = "l2";
pub const DEFAULT_BACKEND: &str = "local-hash-v1";

pub const DEFAULT_CHUNK_CHARS: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

const SENTENCE_TERMINATORS: &[char] = &['。', '！', '？', '；', '.', '!', '?', ';'];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticModelConfig {
    pub model_id: String,
    pub model_name: String,
    pub dimensions: usize,
    pub normalization: String,
    pub backend: String,
}

pub fn resolve_model_config(model_id: &str) -> SemanticModelConfig {
    let trimmed = model_id.trim();
    let resolved_id = if trimmed.is_empty() {
        DEFAULT_MODEL_ID
    } else {
        trimmed
    };

    let model_name = if resolved_id == DEFAULT_MODEL_ID {
        DEFAULT_MODEL_NAME
    } else {
        resolved_id
    };

    SemanticModelConfig {
        model_id: resolved_id.to_string(),
        model_name: model_name.to_string(),
        dimensions: DEFAULT_EMBEDDING_DIM,
        normalization: DEFAULT_NORMALIZATION.to_string(),
        backend: DEFAULT_BACKEND.to_string(),
    }
}

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

pub fn embedding_text_hash(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Title line followed by the chunk body; the title anchors short chunks.
pub fn chunk_payload_for_embedding(title: &str, chunk: &str) -> Option<String> {
    let body = normalize_whitespace(chunk);
    if body.is_empty() {
        return None;
    }

    let title = normalize_whitespace(title);
    if title.is_empty() {
        Some(body)
    } else {
        Some(format!("{title}\n\n{body}"))
    }
}

pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(8);
    let mut vector = vec![0_f32; dims];
    let tokens = tokenize_payload(payload);

    if tokens.is_empty() {
        return vector;
    }

    for token in tokens {
        let hash = stable_hash(&token);
        let index = (hash as usize) % dims;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
        vector[index] += sign * weight;
    }

    normalize_vector(&mut vector);
    vector
}

/// Dot product of two l2-normalized vectors; 0.0 on dimension mismatch.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    left.iter()
        .zip(right.iter())
        .map(|(left_value, right_value)| f64::from(*left_value) * f64::from(*right_value))
        .sum::<f64>()
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.saturating_mul(4) {
        return None;
    }

    let out = blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<f32>>();

    (out.len() == expected_dim).then_some(out)
}

/// Splits article text into overlapping windows of at most `chunk_chars`
/// characters, cutting at a paragraph, line, or sentence boundary when one
/// falls in the second half of the window.
pub fn split_into_chunks(text: &str, chunk_chars: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chunk_chars = chunk_chars.max(1);
    let overlap = overlap.min(chunk_chars.saturating_sub(1));
    let chars = trimmed.chars().collect::<Vec<char>>();
    if chars.len() <= chunk_chars {
        return vec![trimmed.to_string()];
    }

    let mut out = Vec::<String>::new();
    let mut start = 0usize;
    while start < chars.len() {
        let hard_end = (start + chunk_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            let floor = start + chunk_chars / 2;
            find_break(&chars, floor, hard_end, |window| {
                window[0] == '\n' && window[1] == '\n'
            })
            .or_else(|| find_break(&chars, floor, hard_end, |window| window[1] == '\n'))
            .or_else(|| {
                find_break(&chars, floor, hard_end, |window| {
                    SENTENCE_TERMINATORS.contains(&window[1])
                })
            })
            .unwrap_or(hard_end)
        };

        let piece = chars[start..end].iter().collect::<String>();
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }

        if end >= chars.len() {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    out
}

/// Position just past the last `[prev, current]` pair in `chars[floor..end]`
/// matching `predicate`.
fn find_break(
    chars: &[char],
    floor: usize,
    end: usize,
    predicate: impl Fn(&[char]) -> bool,
) -> Option<usize> {
    let floor = floor.max(1);
    (floor..end)
        .rev()
        .find(|&index| predicate(&chars[index - 1..=index]))
        .map(|index| index + 1)
}

fn stable_hash(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn is_cjk(character: char) -> bool {
    matches!(
        character as u32,
        0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF
    )
}

fn tokenize_payload(payload: &str) -> Vec<String> {
    let mut words = Vec::<String>::new();
    let mut features = Vec::<String>::new();

    for raw in payload
        .split(|character: char| !character.is_alphanumeric())
        .filter(|value| !value.is_empty())
    {
        let lowered = raw.to_lowercase();
        if lowered.chars().any(is_cjk) {
            let characters = lowered.chars().collect::<Vec<char>>();
            for character in &characters {
                features.push(format!("c:{character}"));
            }
            for pair in characters.windows(2) {
                features.push(format!("cb:{}{}", pair[0], pair[1]));
            }
        } else {
            words.push(lowered);
        }
    }

    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    if norm == 0.0 {
        return;
    }

    for value in values {
        *value /= norm;
    }
}
