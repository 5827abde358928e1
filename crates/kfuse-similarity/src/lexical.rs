//! Edit-distance scorer.

use async_trait::async_trait;

use kfuse_core::error::FusionResult;
use kfuse_core::traits::SimilarityScorer;

/// Scores names by normalized Levenshtein distance after case folding and
/// whitespace collapsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous form of [`SimilarityScorer::score`].
    pub fn similarity(a: &str, b: &str) -> f32 {
        let a = normalize(a);
        let b = normalize(b);
        let max_len = a.chars().count().max(b.chars().count());
        if max_len == 0 {
            return 1.0;
        }
        1.0 - levenshtein_distance(&a, &b) as f32 / max_len as f32
    }
}

#[async_trait]
impl SimilarityScorer for LexicalScorer {
    async fn score(&self, a: &str, b: &str) -> FusionResult<f32> {
        Ok(Self::similarity(a, b))
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Edit distance counted in chars, not bytes.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("东部舰队", "东部舰队"), 0);
        assert_eq!(levenshtein_distance("东部舰队", "西部舰队"), 1);
    }

    #[test]
    fn test_similarity_normalizes() {
        assert_eq!(LexicalScorer::similarity("Eastern  Fleet", "eastern fleet"), 1.0);
        assert_eq!(LexicalScorer::similarity("", "  "), 1.0);
        assert_eq!(LexicalScorer::similarity("abc", "xyz"), 0.0);
    }

    #[tokio::test]
    async fn test_score_in_range() {
        let scorer = LexicalScorer::new();
        let score = scorer.score("Type 99 Tank", "Type-99 Tank").await.unwrap();
        assert!(score > 0.9 && score < 1.0);
        assert_eq!(scorer.name(), "lexical");
    }
}
