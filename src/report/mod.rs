// Report assembly: turn flattened generated sentences back into one report
// per image, in the fixed anatomical region order, with near-duplicate
// suppression.
//
// Suppression is greedy and order-dependent: each candidate is compared
// against the sentences already retained for the same report, in region
// order. Dropping a sentence is recorded, not silent, so generation quality
// can be audited afterwards.

use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;

use crate::core::errors::{MaskError, MaskResult};
use crate::mask;
use crate::stages::SimilarityScorer;

/// The reference corpus marks slots without a sentence with this
/// placeholder.
pub const EMPTY_SENTENCE_MARKER: &str = "#";

fn is_placeholder(sentence: &str) -> bool {
    let trimmed = sentence.trim();
    trimmed.is_empty() || trimmed == EMPTY_SENTENCE_MARKER
}

/// Audit record for one suppressed sentence.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RemovedSentence {
    pub dropped: String,
    /// The retained sentence it was judged a near-duplicate of.
    pub similar_to: String,
    pub score: f64,
}

/// One image's assembled report.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledReport {
    /// Retained sentences, in region order.
    pub sentences: Vec<String>,
    /// The sentences joined into the final report text.
    pub text: String,
    pub removed: Vec<RemovedSentence>,
}

#[derive(Debug, Clone)]
pub struct ReportAssembler {
    similarity_threshold: f64,
}

impl ReportAssembler {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Regroup the flattened `sentences` (one per true position of
    /// `selected`, row-major) into one report per image and suppress
    /// near-duplicates. Placeholder sentences are skipped entirely.
    pub fn assemble<S>(
        &self,
        selected: &Array2<bool>,
        sentences: &[String],
        scorer: &S,
    ) -> MaskResult<Vec<AssembledReport>>
    where
        S: SimilarityScorer + Sync,
    {
        let grouped = mask::scatter_values(sentences, selected)?;

        Ok(grouped
            .par_iter()
            .map(|row| self.assemble_one(row, scorer))
            .collect())
    }

    fn assemble_one<S>(&self, row: &[Option<String>], scorer: &S) -> AssembledReport
    where
        S: SimilarityScorer + Sync,
    {
        let mut retained: Vec<String> = Vec::new();
        let mut removed: Vec<RemovedSentence> = Vec::new();

        for sentence in row.iter().flatten() {
            if is_placeholder(sentence) {
                continue;
            }

            let best_match = retained
                .iter()
                .map(|kept| (kept, scorer.score(kept, sentence)))
                .max_by(|a, b| a.1.total_cmp(&b.1));

            match best_match {
                Some((kept, score)) if score >= self.similarity_threshold => {
                    removed.push(RemovedSentence {
                        dropped: sentence.clone(),
                        similar_to: kept.clone(),
                        score,
                    });
                }
                _ => retained.push(sentence.clone()),
            }
        }

        let text = retained.join(" ");
        AssembledReport {
            sentences: retained,
            text,
            removed,
        }
    }
}

/// Reference sentences for the selected slots, flattened in the same
/// row-major order as the generated sentences, one entry per selected slot.
pub fn reference_sentences_for_selected(
    references: &[Vec<String>],
    selected: &Array2<bool>,
) -> MaskResult<Vec<String>> {
    let (n, r) = selected.dim();
    if references.len() != n || references.iter().any(|row| row.len() != r) {
        return Err(MaskError::GridMismatch {
            grid: (
                references.len(),
                references.first().map(|row| row.len()).unwrap_or(0),
            ),
            mask: (n, r),
        });
    }

    Ok(mask::flat_indices(selected)
        .into_iter()
        .map(|(i, j)| references[i][j].clone())
        .collect())
}

/// Partition flattened per-slot sentences into the normal and abnormal
/// selected subsets, per the ground-truth abnormality grid.
pub fn split_by_abnormality(
    sentences: &[String],
    selected: &Array2<bool>,
    is_abnormal: &Array2<bool>,
) -> MaskResult<(Vec<String>, Vec<String>)> {
    if is_abnormal.dim() != selected.dim() {
        return Err(MaskError::ShapeMismatch {
            left: selected.dim(),
            right: is_abnormal.dim(),
        });
    }
    let indices = mask::flat_indices(selected);
    if sentences.len() != indices.len() {
        return Err(MaskError::RowCountMismatch {
            selected: indices.len(),
            got: sentences.len(),
        });
    }

    let mut normal = Vec::new();
    let mut abnormal = Vec::new();
    for (sentence, (i, j)) in sentences.iter().zip(indices) {
        if is_abnormal[[i, j]] {
            abnormal.push(sentence.clone());
        } else {
            normal.push(sentence.clone());
        }
    }
    Ok((normal, abnormal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Treats sentences as near-duplicates when they match after trailing
    /// apostrophes are stripped.
    struct StubScorer;

    impl SimilarityScorer for StubScorer {
        fn score(&self, a: &str, b: &str) -> f64 {
            if a.trim_end_matches('\'') == b.trim_end_matches('\'') {
                1.0
            } else {
                0.0
            }
        }
    }

    #[test]
    fn test_greedy_dedup_is_order_dependent_and_audited() {
        let assembler = ReportAssembler::new(0.955);
        let selected = array![[true, true, true]];
        let sentences = vec!["A".to_string(), "B".to_string(), "A'".to_string()];

        let reports = assembler.assemble(&selected, &sentences, &StubScorer).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].sentences, vec!["A", "B"]);
        assert_eq!(reports[0].text, "A B");
        assert_eq!(
            reports[0].removed,
            vec![RemovedSentence {
                dropped: "A'".to_string(),
                similar_to: "A".to_string(),
                score: 1.0,
            }]
        );
    }

    #[test]
    fn test_sentences_keep_region_order_per_image() {
        let assembler = ReportAssembler::new(0.955);
        let selected = array![[true, false, true], [false, true, false]];
        let sentences = vec![
            "first region".to_string(),
            "third region".to_string(),
            "second image".to_string(),
        ];

        let reports = assembler.assemble(&selected, &sentences, &StubScorer).unwrap();
        assert_eq!(reports[0].sentences, vec!["first region", "third region"]);
        assert_eq!(reports[1].sentences, vec!["second image"]);
    }

    #[test]
    fn test_placeholder_sentences_are_skipped() {
        let assembler = ReportAssembler::new(0.955);
        let selected = array![[true, true, true]];
        let sentences = vec!["#".to_string(), "  ".to_string(), "real".to_string()];

        let reports = assembler.assemble(&selected, &sentences, &StubScorer).unwrap();
        assert_eq!(reports[0].sentences, vec!["real"]);
        assert!(reports[0].removed.is_empty());
    }

    #[test]
    fn test_assemble_rejects_wrong_sentence_count() {
        let assembler = ReportAssembler::new(0.955);
        let selected = array![[true, true]];
        let sentences = vec!["only one".to_string()];
        assert!(assembler
            .assemble(&selected, &sentences, &StubScorer)
            .is_err());
    }

    #[test]
    fn test_reference_sentences_follow_flattened_order() {
        let selected = array![[false, true], [true, false]];
        let references = vec![
            vec!["r00".to_string(), "r01".to_string()],
            vec!["r10".to_string(), "r11".to_string()],
        ];

        let refs = reference_sentences_for_selected(&references, &selected).unwrap();
        assert_eq!(refs, vec!["r01", "r10"]);
    }

    #[test]
    fn test_split_by_abnormality_partitions_selected_slots() {
        let selected = array![[true, true, false]];
        let is_abnormal = array![[false, true, true]];
        let sentences = vec!["normal one".to_string(), "abnormal one".to_string()];

        let (normal, abnormal) =
            split_by_abnormality(&sentences, &selected, &is_abnormal).unwrap();
        assert_eq!(normal, vec!["normal one"]);
        assert_eq!(abnormal, vec!["abnormal one"]);
    }
}
