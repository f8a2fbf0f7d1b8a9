// Run-level metric aggregation.
//
// The aggregator is the single owner of all metric state for an evaluation
// run. Batches fold in through `record_batch`, which computes a complete
// delta before touching the run-level counters: a batch that errors part-way
// through leaves the accumulators exactly as they were. `finalize` consumes
// the aggregator, so scores can be computed at most once per run.

pub mod confusion;
pub mod detection;
pub mod selection;

pub use confusion::{ConfusionCounts, ConfusionReport};
pub use detection::{DetectionAccumulator, DetectionReport, RegionDetectionReport};
pub use selection::{AbnormalityAccumulator, SelectionAccumulator, SelectionReport};

use ndarray::Array2;
use serde::Serialize;

use crate::core::errors::MetricResult;
use crate::core::types::RegionBoxes;

/// Borrowed view of everything one evaluated batch contributes.
#[derive(Debug, Clone, Copy)]
pub struct BatchObservation<'a> {
    pub predicted_boxes: &'a RegionBoxes,
    pub ground_truth_boxes: &'a RegionBoxes,
    pub detected: &'a Array2<bool>,
    pub selected: &'a Array2<bool>,
    pub has_sentence: &'a Array2<bool>,
    pub is_abnormal: &'a Array2<bool>,
    pub predicted_abnormal: &'a Array2<bool>,
}

#[derive(Debug, Clone)]
pub struct MetricAggregator {
    detection: DetectionAccumulator,
    selection: SelectionAccumulator,
    abnormality: AbnormalityAccumulator,
}

impl MetricAggregator {
    pub fn new(num_regions: usize) -> Self {
        Self {
            detection: DetectionAccumulator::new(num_regions),
            selection: SelectionAccumulator::new(),
            abnormality: AbnormalityAccumulator::new(),
        }
    }

    pub fn total_images(&self) -> u64 {
        self.detection.total_images()
    }

    /// Fold one batch in, all-or-nothing: the delta is built completely
    /// before it is merged, so any shape error leaves `self` untouched.
    pub fn record_batch(&mut self, obs: &BatchObservation<'_>) -> MetricResult<()> {
        let mut delta = Self::new(self.detection.num_regions());
        delta.detection.update(
            obs.predicted_boxes,
            obs.ground_truth_boxes,
            obs.detected,
        )?;
        delta
            .selection
            .update(obs.selected, obs.has_sentence, obs.is_abnormal)?;
        delta
            .abnormality
            .update(obs.predicted_abnormal, obs.is_abnormal, obs.detected)?;

        self.merge(&delta)
    }

    /// Combine two aggregators. Merging is commutative and associative, so
    /// partial runs can be combined in any order.
    pub fn merge(&mut self, other: &Self) -> MetricResult<()> {
        self.detection.merge(&other.detection)?;
        self.selection.merge(&other.selection);
        self.abnormality.merge(&other.abnormality);
        Ok(())
    }

    /// Compute the final scores. Consumes the aggregator: a second
    /// finalization of the same run state is impossible by construction.
    pub fn finalize(self) -> MetricsReport {
        MetricsReport {
            total_images: self.detection.total_images(),
            detection: self.detection.finalize(),
            selection: self.selection.finalize(),
            abnormality: self.abnormality.finalize(),
        }
    }
}

/// Finalized, serializable scores for one evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub total_images: u64,
    pub detection: DetectionReport,
    pub selection: SelectionReport,
    pub abnormality: ConfusionReport,
}
