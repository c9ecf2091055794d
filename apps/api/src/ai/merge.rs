//! Pure combination algorithms used by the multi-provider strategies.
//!
//! Every function here is deterministic in its inputs: callers pass provider outputs in
//! registry order and the result does not depend on the order calls completed in.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::ai::types::Embedding;

/// One provider's text plus the weight it carries in a weighted merge.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedText<'a> {
    pub text: &'a str,
    pub weight: f64,
}

/// Splits text after `.`, `!` or `?` when followed by whitespace. Pieces are trimmed and
/// empty pieces dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_i, next_c)) = chars.peek() {
            if next_c.is_whitespace() {
                sentences.push(&text[start..next_i]);
                start = next_i;
            }
        }
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Positional vote by weight: sentence `i` of the output is sentence `i` of the
/// highest-weighted provider that has one. Equal weights go to the earlier provider.
pub fn weighted_merge(responses: &[WeightedText<'_>]) -> String {
    let split: Vec<(f64, Vec<&str>)> = responses
        .iter()
        .map(|r| (r.weight, split_sentences(r.text)))
        .collect();
    let positions = split.iter().map(|(_, s)| s.len()).max().unwrap_or(0);

    let mut chosen = Vec::with_capacity(positions);
    for position in 0..positions {
        let mut best: Option<(f64, &str)> = None;
        for (weight, sentences) in &split {
            let Some(sentence) = sentences.get(position) else {
                continue;
            };
            if best.map_or(true, |(best_weight, _)| *weight > best_weight) {
                best = Some((*weight, *sentence));
            }
        }
        if let Some((_, sentence)) = best {
            chosen.push(sentence);
        }
    }

    chosen.join(" ")
}

/// Lowercased ASCII alphanumerics only, so punctuation, case, and spacing differences collapse.
pub fn normalize_sentence(sentence: &str) -> String {
    sentence
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Keeps sentences that appear in at least `threshold` of the outputs, in first-seen order.
/// A sentence counts once per output no matter how often that output repeats it.
pub fn consensus_merge(texts: &[&str], threshold: f64) -> String {
    if texts.is_empty() {
        return String::new();
    }

    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, (&str, usize)> = HashMap::new();

    for text in texts {
        let mut seen_here = HashSet::new();
        for sentence in split_sentences(text) {
            let key = normalize_sentence(sentence);
            if key.is_empty() || !seen_here.insert(key.clone()) {
                continue;
            }
            match buckets.get_mut(&key) {
                Some((_, count)) => *count += 1,
                None => {
                    order.push(key.clone());
                    buckets.insert(key, (sentence, 1));
                }
            }
        }
    }

    let total = texts.len() as f64;
    order
        .iter()
        .filter_map(|key| buckets.get(key))
        .filter(|(_, count)| *count as f64 / total >= threshold)
        .map(|(sentence, _)| *sentence)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased words: runs of letters, apostrophes, and hyphens.
fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphabetic() || c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Word-set intersection over union. Two texts with no words at all are identical.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a = word_set(a);
    let b = word_set(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Mean pairwise Jaccard similarity; 1.0 when fewer than two outputs exist.
pub fn consensus_score(texts: &[&str]) -> f64 {
    if texts.len() < 2 {
        return 1.0;
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in texts.iter().enumerate() {
        for b in &texts[i + 1..] {
            total += jaccard_similarity(a, b);
            pairs += 1;
        }
    }
    total / pairs as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AveragedEmbedding {
    pub embedding: Vec<f64>,
    pub dimensions: usize,
    pub providers_used: Vec<String>,
}

/// Element-wise mean. The first vector fixes the dimensionality; vectors of any other length
/// are skipped and their providers left out of `providers_used`.
pub fn average_embeddings(embeddings: &[Embedding]) -> Option<AveragedEmbedding> {
    let dimensions = embeddings.first()?.embedding.len();

    let mut sum = vec![0.0; dimensions];
    let mut providers_used = Vec::new();
    for embedding in embeddings {
        if embedding.embedding.len() != dimensions {
            warn!(
                provider = %embedding.provider,
                expected = dimensions,
                actual = embedding.embedding.len(),
                "Skipping embedding with mismatched dimensions"
            );
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(&embedding.embedding) {
            *acc += value;
        }
        providers_used.push(embedding.provider.clone());
    }

    let count = providers_used.len() as f64;
    Some(AveragedEmbedding {
        embedding: sum.into_iter().map(|v| v / count).collect(),
        dimensions,
        providers_used,
    })
}

/// Labeled concatenation of per-provider analyses.
pub fn combine_analyses<'a>(analyses: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut combined = String::from("Combined Analysis from Multiple AI Providers:\n\n");
    for (provider, analysis) in analyses {
        combined.push_str(&format!("**{provider}**: {analysis}\n\n"));
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weighted(text: &str, weight: f64) -> WeightedText<'_> {
        WeightedText { text, weight }
    }

    #[test]
    fn test_split_sentences_on_terminal_punctuation_followed_by_space() {
        assert_eq!(
            split_sentences("First one. Second!  Third? Fourth"),
            vec!["First one.", "Second!", "Third?", "Fourth"]
        );
    }

    #[test]
    fn test_split_sentences_keeps_decimals_and_urls_together() {
        assert_eq!(
            split_sentences("Version 2.5 shipped.\nSee example.com for more."),
            vec!["Version 2.5 shipped.", "See example.com for more."]
        );
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_weighted_merge_prefers_higher_weight_at_every_position() {
        let responses = [
            weighted("Y one. Y two.", 0.1),
            weighted("X one. X two.", 0.3),
        ];
        assert_eq!(weighted_merge(&responses), "X one. X two.");
    }

    #[test]
    fn test_weighted_merge_fills_positions_from_longer_outputs() {
        let responses = [
            weighted("X one.", 0.3),
            weighted("Y one. Y two. Y three.", 0.1),
        ];
        assert_eq!(weighted_merge(&responses), "X one. Y two. Y three.");
    }

    #[test]
    fn test_weighted_merge_ties_go_to_earlier_provider() {
        let responses = [
            weighted("From groq.", 0.2),
            weighted("From gemini.", 0.2),
        ];
        assert_eq!(weighted_merge(&responses), "From groq.");
    }

    #[test]
    fn test_weighted_merge_empty() {
        assert_eq!(weighted_merge(&[]), "");
    }

    #[test]
    fn test_normalize_sentence_collapses_case_and_punctuation() {
        assert_eq!(normalize_sentence("Hello, World!"), "helloworld");
        assert_eq!(
            normalize_sentence("hello world"),
            normalize_sentence("HELLO   WORLD.")
        );
    }

    #[test]
    fn test_consensus_retains_unanimous_sentence() {
        let texts = ["Rust is fast. Go is simple.", "rust is FAST! Python is slow."];
        assert_eq!(consensus_merge(&texts, 1.0), "Rust is fast.");
    }

    #[test]
    fn test_consensus_drops_minority_sentence() {
        let texts = [
            "Shared point. Only here.",
            "Shared point.",
            "Shared point.",
            "Shared point.",
        ];
        // "Only here." has ratio 0.25.
        assert_eq!(consensus_merge(&texts, 0.7), "Shared point.");
    }

    #[test]
    fn test_consensus_counts_each_output_once() {
        let texts = ["Echo. Echo. Echo.", "Different."];
        assert_eq!(consensus_merge(&texts, 0.7), "");
        assert_eq!(consensus_merge(&texts, 0.5), "Echo. Different.");
    }

    #[test]
    fn test_jaccard_bounds() {
        assert_eq!(jaccard_similarity("the cat sat", "The cat sat"), 1.0);
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
        assert!((jaccard_similarity("a b c", "a b d") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_consensus_score_identical_and_disjoint() {
        assert_eq!(consensus_score(&["same words here", "same words here"]), 1.0);
        assert_eq!(consensus_score(&["one two", "three four"]), 0.0);
        assert_eq!(consensus_score(&["only one"]), 1.0);
        assert_eq!(consensus_score(&[]), 1.0);
    }

    #[test]
    fn test_consensus_score_is_mean_of_pairs() {
        // pairs: (a,b)=1.0, (a,c)=0.0, (b,c)=0.0
        let score = consensus_score(&["red blue", "red blue", "green"]);
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_embeddings_element_wise() {
        let averaged = average_embeddings(&[
            Embedding::new("cohere", "m", vec![1.0, 1.0]),
            Embedding::new("gemini", "m", vec![3.0, 3.0]),
        ])
        .unwrap();
        assert_eq!(averaged.embedding, vec![2.0, 2.0]);
        assert_eq!(averaged.dimensions, 2);
        assert_eq!(averaged.providers_used, vec!["cohere", "gemini"]);
    }

    #[test]
    fn test_average_embeddings_skips_mismatched_dimensions() {
        let averaged = average_embeddings(&[
            Embedding::new("huggingface", "m", vec![2.0, 4.0]),
            Embedding::new("cohere", "m", vec![9.0, 9.0, 9.0]),
            Embedding::new("gemini", "m", vec![4.0, 8.0]),
        ])
        .unwrap();
        assert_eq!(averaged.embedding, vec![3.0, 6.0]);
        assert_eq!(averaged.providers_used, vec!["huggingface", "gemini"]);
    }

    #[test]
    fn test_average_embeddings_empty_input() {
        assert!(average_embeddings(&[]).is_none());
    }

    #[test]
    fn test_combine_analyses_labels_each_provider() {
        let combined = combine_analyses([("claude", "A chart."), ("gemini", "A graph.")]);
        assert_eq!(
            combined,
            "Combined Analysis from Multiple AI Providers:\n\n**claude**: A chart.\n\n**gemini**: A graph.\n\n"
        );
    }
}
