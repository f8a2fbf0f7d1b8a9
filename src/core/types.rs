// Shared data model for the region-guided report pipeline
//
// Dense grids are (N, R) or (N, R, D): one row per image in the batch, one
// column per anatomical region, in the fixed region order.

use ndarray::{Array2, Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::core::errors::{PipelineError, PipelineResult};

/// Axis-aligned box in image coordinates (x1, y1) top-left, (x2, y2)
/// bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn intersection_area(&self, other: &Self) -> f32 {
        let w = self.x2.min(other.x2) - self.x1.max(other.x1);
        let h = self.y2.min(other.y2) - self.y1.max(other.y1);
        w.max(0.0) * h.max(0.0)
    }

    pub fn union_area(&self, other: &Self) -> f32 {
        self.area() + other.area() - self.intersection_area(other)
    }
}

/// Per-image, per-region boxes: outer Vec over images, inner Vec over regions,
/// `None` where no box exists for that slot.
pub type RegionBoxes = Vec<Vec<Option<BoundingBox>>>;

/// A batch of input images.
#[derive(Debug, Clone)]
pub struct ImageBatch {
    /// Pixel data, (N, C, H, W).
    pub pixels: Array4<f32>,
    /// One study identifier per image, used to label assembled reports.
    pub study_ids: Vec<String>,
}

impl ImageBatch {
    pub fn len(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every image needs a study id; assembled reports are keyed by them.
    pub fn validate_study_ids(&self) -> PipelineResult<()> {
        if self.study_ids.len() == self.len() {
            Ok(())
        } else {
            Err(PipelineError::StudyIdCount {
                images: self.len(),
                study_ids: self.study_ids.len(),
            })
        }
    }
}

/// Tokenized reference sentences for the generator, one row per (image,
/// region) slot in row-major order: row `i * r + j` belongs to image `i`,
/// region `j`.
#[derive(Debug, Clone)]
pub struct TokenSupervision {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
}

/// Ground truth accompanying an [`ImageBatch`] during training and evaluation.
#[derive(Debug, Clone)]
pub struct BatchSupervision {
    /// Ground-truth boxes, (N, R).
    pub boxes: RegionBoxes,
    /// Whether the reference report has a sentence for the slot, (N, R).
    pub has_sentence: Array2<bool>,
    /// Whether the region is abnormal per the reference report, (N, R).
    pub is_abnormal: Array2<bool>,
    /// Tokenized reference sentences, (N*R) rows.
    pub tokens: TokenSupervision,
    /// Raw reference sentences per slot ("" or "#" where none exists), used
    /// to pair generated and reference text during evaluation.
    pub reference_sentences: Vec<Vec<String>>,
}

impl BatchSupervision {
    /// Check every grid against the batch dimensions. Mismatches are fatal.
    pub fn validate(&self, n: usize, r: usize) -> PipelineResult<()> {
        let check = |field: &'static str, got: (usize, usize)| {
            if got == (n, r) {
                Ok(())
            } else {
                Err(PipelineError::SupervisionShape {
                    field,
                    expected: (n, r),
                    got,
                })
            }
        };

        let box_rows = self.boxes.len();
        let box_cols = self.boxes.first().map(|row| row.len()).unwrap_or(r);
        check("boxes", (box_rows, box_cols))?;
        if let Some(row) = self.boxes.iter().find(|row| row.len() != r) {
            return Err(PipelineError::SupervisionShape {
                field: "boxes",
                expected: (n, r),
                got: (box_rows, row.len()),
            });
        }

        check("has_sentence", self.has_sentence.dim())?;
        check("is_abnormal", self.is_abnormal.dim())?;

        let token_dim = self.tokens.input_ids.dim();
        if token_dim.0 != n * r {
            return Err(PipelineError::SupervisionShape {
                field: "tokens.input_ids",
                expected: (n * r, token_dim.1),
                got: token_dim,
            });
        }
        if self.tokens.attention_mask.dim() != token_dim {
            return Err(PipelineError::SupervisionShape {
                field: "tokens.attention_mask",
                expected: token_dim,
                got: self.tokens.attention_mask.dim(),
            });
        }

        let ref_rows = self.reference_sentences.len();
        let ref_cols = self
            .reference_sentences
            .first()
            .map(|row| row.len())
            .unwrap_or(r);
        check("reference_sentences", (ref_rows, ref_cols))?;
        if let Some(row) = self.reference_sentences.iter().find(|row| row.len() != r) {
            return Err(PipelineError::SupervisionShape {
                field: "reference_sentences",
                expected: (n, r),
                got: (ref_rows, row.len()),
            });
        }

        Ok(())
    }
}

/// Output of the object detector for one batch.
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    /// Training/evaluation loss; `None` in pure inference.
    pub loss: Option<f32>,
    /// Predicted boxes, (N, R); `None` in training where only features are
    /// needed.
    pub boxes: Option<RegionBoxes>,
    /// Per-region visual features, (N, R, D).
    pub features: Array3<f32>,
    /// Whether the detector found the region, (N, R).
    pub detected: Array2<bool>,
}

/// Output of the region selector for one batch.
#[derive(Debug, Clone)]
pub struct SelectorOutput {
    pub loss: Option<f32>,
    /// Regions chosen for sentence generation, (N, R). Must be a subset of
    /// the detected mask.
    pub selected: Array2<bool>,
}

/// Losses from one training step.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrainLosses {
    pub detector: f32,
    pub selector: f32,
    /// `None` when the generator was skipped (selector pretraining).
    pub generator: Option<f32>,
}

/// Result of one training step. An empty selection is a legitimate outcome,
/// not an error: callers must match on it.
#[derive(Debug, Clone)]
pub enum TrainOutcome {
    Completed(TrainLosses),
    EmptySelection,
}

/// Everything one evaluation step produces, in batch-dense and flattened
/// forms. `generated` rows follow the row-major order of `selected`'s true
/// positions.
#[derive(Debug, Clone)]
pub struct EvalOutput {
    pub detector_loss: f32,
    pub selector_loss: f32,
    pub generator_loss: Option<f32>,
    pub predicted_boxes: RegionBoxes,
    pub detected: Array2<bool>,
    pub selected: Array2<bool>,
    pub predicted_abnormal: Array2<bool>,
    pub generated: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub enum EvalOutcome {
    Completed(Box<EvalOutput>),
    EmptySelection,
}

/// Result of a pure inference pass.
#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    Completed {
        selected: Array2<bool>,
        /// One sentence per selected slot, row-major flattened order.
        sentences: Vec<String>,
    },
    EmptySelection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_areas() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);

        assert_eq!(a.area(), 100.0);
        assert_eq!(a.intersection_area(&b), 25.0);
        assert_eq!(a.union_area(&b), 175.0);
    }

    #[test]
    fn test_disjoint_boxes_have_zero_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(2.0, 2.0, 3.0, 3.0);

        assert_eq!(a.intersection_area(&b), 0.0);
        assert_eq!(a.union_area(&b), 2.0);
    }

    #[test]
    fn test_degenerate_box_has_zero_area() {
        let a = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(a.area(), 0.0);
    }

    fn supervision(n: usize, r: usize, token_len: usize) -> BatchSupervision {
        BatchSupervision {
            boxes: vec![vec![None; r]; n],
            has_sentence: Array2::from_elem((n, r), false),
            is_abnormal: Array2::from_elem((n, r), false),
            tokens: TokenSupervision {
                input_ids: Array2::zeros((n * r, token_len)),
                attention_mask: Array2::zeros((n * r, token_len)),
            },
            reference_sentences: vec![vec![String::new(); r]; n],
        }
    }

    #[test]
    fn test_supervision_validate_accepts_matching_shapes() {
        assert!(supervision(2, 3, 4).validate(2, 3).is_ok());
    }

    #[test]
    fn test_supervision_validate_rejects_wrong_grid() {
        let mut sup = supervision(2, 3, 4);
        sup.has_sentence = Array2::from_elem((2, 4), false);

        let err = sup.validate(2, 3).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SupervisionShape {
                field: "has_sentence",
                ..
            }
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_batch_study_id_count_is_checked() {
        let batch = ImageBatch {
            pixels: Array4::zeros((2, 1, 2, 2)),
            study_ids: vec!["study-0".to_string()],
        };
        let err = batch.validate_study_ids().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StudyIdCount {
                images: 2,
                study_ids: 1
            }
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_supervision_validate_rejects_wrong_token_rows() {
        let mut sup = supervision(2, 3, 4);
        sup.tokens.input_ids = Array2::zeros((5, 4));
        sup.tokens.attention_mask = Array2::zeros((5, 4));

        assert!(sup.validate(2, 3).is_err());
    }
}
