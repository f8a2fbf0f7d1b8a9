// Stage contracts: the model components the orchestrator drives.
//
// All calls are synchronous and blocking; concurrency is the caller's
// concern. Each implementation distinguishes two failure classes:
// `ResourceExhausted` (transient, the batch can be skipped and the run
// continues) and `Failed` (fatal). The generator methods are undefined on
// zero input rows; the orchestrator short-circuits before calling them.

use ndarray::{Array2, Array3};

use crate::core::errors::StageResult;
use crate::core::types::{DetectorOutput, ImageBatch, RegionBoxes, SelectorOutput};

/// Object detector: localizes every anatomical region and extracts its
/// visual features.
pub trait Detector {
    /// `gt_boxes` is present during training/evaluation so the detector can
    /// report a loss; absent in pure inference.
    fn detect(
        &self,
        batch: &ImageBatch,
        gt_boxes: Option<&RegionBoxes>,
    ) -> StageResult<DetectorOutput>;
}

/// Binary region selector: decides which detected regions get a sentence.
///
/// Contract: `selected` must be a subset of `detected`. The orchestrator
/// verifies this and treats a violation as fatal.
pub trait Selector {
    fn select(
        &self,
        features: &Array3<f32>,
        detected: &Array2<bool>,
        gt_has_sentence: Option<&Array2<bool>>,
    ) -> StageResult<SelectorOutput>;
}

/// Binary abnormality classifier over detected regions. Output values at
/// non-detected positions carry no meaning.
pub trait AbnormalityClassifier {
    fn classify(
        &self,
        features: &Array3<f32>,
        detected: &Array2<bool>,
    ) -> StageResult<Array2<bool>>;
}

/// Decoding parameters for [`Generator::generate`].
#[derive(Debug, Clone)]
pub struct DecodingConfig {
    pub max_length: usize,
    pub num_beams: usize,
    pub early_stopping: bool,
}

/// Language model over compacted region features. Both methods take (K, D)
/// features for the K selected slots, in row-major flattened order, K > 0.
pub trait Generator {
    /// Teacher-forced pass against tokenized references; returns the loss.
    fn forward(
        &self,
        region_features: &Array2<f32>,
        input_ids: &Array2<i64>,
        attention_mask: &Array2<i64>,
    ) -> StageResult<f32>;

    /// Beam-search decoding; returns one sentence per input row, same order.
    fn generate(
        &self,
        region_features: &Array2<f32>,
        decoding: &DecodingConfig,
    ) -> StageResult<Vec<String>>;
}

/// Sentence similarity in [0, 1], used for near-duplicate suppression.
pub trait SimilarityScorer {
    fn score(&self, a: &str, b: &str) -> f64;
}
