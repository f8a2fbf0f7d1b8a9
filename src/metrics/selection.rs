// Selection and abnormality confusion accumulators.
//
// Selection quality is tracked three times over: for all region slots, and
// separately for the slots whose ground truth marks them normal vs abnormal.
// Abnormality classification is scored only where the detector found the
// region; elsewhere the prediction carries no meaning.

use ndarray::Array2;
use serde::Serialize;

use crate::core::errors::{MetricError, MetricResult};
use crate::metrics::confusion::{ConfusionCounts, ConfusionReport};

#[derive(Debug, Clone, Default)]
pub struct SelectionAccumulator {
    all: ConfusionCounts,
    normal: ConfusionCounts,
    abnormal: ConfusionCounts,
}

impl SelectionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        selected: &Array2<bool>,
        has_sentence: &Array2<bool>,
        is_abnormal: &Array2<bool>,
    ) -> MetricResult<()> {
        let dim = selected.dim();
        for (name, got) in [
            ("selection has_sentence", has_sentence.dim()),
            ("selection is_abnormal", is_abnormal.dim()),
        ] {
            if got != dim {
                return Err(MetricError::ShapeMismatch {
                    context: name,
                    expected: dim,
                    got,
                });
            }
        }

        for ((idx, &pred), &truth) in selected.indexed_iter().zip(has_sentence.iter()) {
            self.all.record(pred, truth);
            if is_abnormal[idx] {
                self.abnormal.record(pred, truth);
            } else {
                self.normal.record(pred, truth);
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &Self) {
        self.all.merge(&other.all);
        self.normal.merge(&other.normal);
        self.abnormal.merge(&other.abnormal);
    }

    pub fn finalize(self) -> SelectionReport {
        SelectionReport {
            all: self.all.report(),
            normal: self.normal.report(),
            abnormal: self.abnormal.report(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    pub all: ConfusionReport,
    pub normal: ConfusionReport,
    pub abnormal: ConfusionReport,
}

#[derive(Debug, Clone, Default)]
pub struct AbnormalityAccumulator {
    counts: ConfusionCounts,
}

impl AbnormalityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare predicted vs ground-truth abnormality at detected positions
    /// only.
    pub fn update(
        &mut self,
        predicted: &Array2<bool>,
        truth: &Array2<bool>,
        detected: &Array2<bool>,
    ) -> MetricResult<()> {
        let dim = detected.dim();
        for (name, got) in [
            ("abnormality predicted", predicted.dim()),
            ("abnormality truth", truth.dim()),
        ] {
            if got != dim {
                return Err(MetricError::ShapeMismatch {
                    context: name,
                    expected: dim,
                    got,
                });
            }
        }

        for (&is_detected, (&pred, &gt)) in detected
            .iter()
            .zip(predicted.iter().zip(truth.iter()))
        {
            if is_detected {
                self.counts.record(pred, gt);
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &Self) {
        self.counts.merge(&other.counts);
    }

    pub fn finalize(self) -> ConfusionReport {
        self.counts.report()
    }
}
