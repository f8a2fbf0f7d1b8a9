// Detection quality: per-region box IoU and detection frequency.
//
// IoU is accumulated as area sums, not averaged per sample, so the final
// per-region score is area-weighted: sum(intersection) / sum(union). Regions
// that never accumulated union area are reported as no-data, never as 0.

use ndarray::Array2;
use serde::Serialize;

use crate::core::errors::{MetricError, MetricResult};
use crate::core::regions::{metric_key, region_name};
use crate::core::types::RegionBoxes;

#[derive(Debug, Clone)]
pub struct DetectionAccumulator {
    sum_intersection: Vec<f64>,
    sum_union: Vec<f64>,
    detected_count: Vec<u64>,
    total_images: u64,
}

impl DetectionAccumulator {
    pub fn new(num_regions: usize) -> Self {
        Self {
            sum_intersection: vec![0.0; num_regions],
            sum_union: vec![0.0; num_regions],
            detected_count: vec![0; num_regions],
            total_images: 0,
        }
    }

    pub fn num_regions(&self) -> usize {
        self.sum_union.len()
    }

    pub fn total_images(&self) -> u64 {
        self.total_images
    }

    /// Fold one batch in. A region slot contributes to the IoU sums only
    /// when it was detected and both a predicted and a ground-truth box
    /// exist for it.
    pub fn update(
        &mut self,
        predicted: &RegionBoxes,
        ground_truth: &RegionBoxes,
        detected: &Array2<bool>,
    ) -> MetricResult<()> {
        let (n, r) = detected.dim();
        if r != self.num_regions() {
            return Err(MetricError::RegionCount {
                ours: self.num_regions(),
                theirs: r,
            });
        }
        if predicted.len() != n || ground_truth.len() != n {
            return Err(MetricError::ShapeMismatch {
                context: "detection boxes",
                expected: (n, r),
                got: (predicted.len().min(ground_truth.len()), r),
            });
        }
        for row in predicted.iter().chain(ground_truth.iter()) {
            if row.len() != r {
                return Err(MetricError::ShapeMismatch {
                    context: "detection boxes",
                    expected: (n, r),
                    got: (n, row.len()),
                });
            }
        }

        for i in 0..n {
            for j in 0..r {
                if !detected[[i, j]] {
                    continue;
                }
                self.detected_count[j] += 1;
                if let (Some(pred), Some(gt)) = (&predicted[i][j], &ground_truth[i][j]) {
                    self.sum_intersection[j] += pred.intersection_area(gt) as f64;
                    self.sum_union[j] += pred.union_area(gt) as f64;
                }
            }
        }
        self.total_images += n as u64;
        Ok(())
    }

    pub fn merge(&mut self, other: &Self) -> MetricResult<()> {
        if self.num_regions() != other.num_regions() {
            return Err(MetricError::RegionCount {
                ours: self.num_regions(),
                theirs: other.num_regions(),
            });
        }
        for j in 0..self.num_regions() {
            self.sum_intersection[j] += other.sum_intersection[j];
            self.sum_union[j] += other.sum_union[j];
            self.detected_count[j] += other.detected_count[j];
        }
        self.total_images += other.total_images;
        Ok(())
    }

    pub fn finalize(self) -> DetectionReport {
        let total_intersection: f64 = self.sum_intersection.iter().sum();
        let total_union: f64 = self.sum_union.iter().sum();
        let total_detections: u64 = self.detected_count.iter().sum();

        let per_region = self
            .sum_intersection
            .iter()
            .zip(&self.sum_union)
            .zip(&self.detected_count)
            .enumerate()
            .map(|(j, ((&inter, &union), &count))| RegionDetectionReport {
                region: metric_key(j),
                name: region_name(j),
                iou: weighted_iou(inter, union),
                detection_frequency: if self.total_images == 0 {
                    None
                } else {
                    Some(count as f64 / self.total_images as f64)
                },
            })
            .collect();

        DetectionReport {
            total_images: self.total_images,
            avg_iou: weighted_iou(total_intersection, total_union),
            avg_detections_per_image: if self.total_images == 0 {
                None
            } else {
                Some(total_detections as f64 / self.total_images as f64)
            },
            per_region,
        }
    }
}

fn weighted_iou(intersection: f64, union: f64) -> Option<f64> {
    if union == 0.0 {
        None
    } else {
        Some(intersection / union)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionDetectionReport {
    /// Stable underscored key, e.g. "right_lower_lung_zone".
    pub region: String,
    /// Human-readable anatomical name, e.g. "right lower lung zone".
    pub name: String,
    /// Area-weighted IoU; `None` when the region never accumulated union
    /// area.
    pub iou: Option<f64>,
    pub detection_frequency: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub total_images: u64,
    pub avg_iou: Option<f64>,
    pub avg_detections_per_image: Option<f64>,
    pub per_region: Vec<RegionDetectionReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BoundingBox;
    use ndarray::array;

    fn unit_box(offset: f32) -> BoundingBox {
        BoundingBox::new(offset, 0.0, offset + 2.0, 1.0)
    }

    #[test]
    fn test_weighted_iou_and_no_data_region() {
        let mut acc = DetectionAccumulator::new(2);

        // Region 0: pred [0,2] vs gt [1,3] → intersection 1, union 3.
        // Region 1: detected but no predicted box → no IoU contribution.
        let predicted = vec![vec![Some(unit_box(0.0)), None]];
        let ground_truth = vec![vec![Some(unit_box(1.0)), Some(unit_box(0.0))]];
        let detected = array![[true, true]];

        acc.update(&predicted, &ground_truth, &detected).unwrap();
        // Same batch again doubles the sums, the ratio is unchanged.
        acc.update(&predicted, &ground_truth, &detected).unwrap();

        let report = acc.finalize();
        assert_eq!(report.total_images, 2);
        assert_eq!(report.per_region[0].region, "right_lung");
        assert_eq!(report.per_region[0].name, "right lung");
        assert_eq!(report.per_region[0].iou, Some(1.0 / 3.0));
        assert_eq!(report.per_region[1].iou, None);
        assert_eq!(report.avg_iou, Some(1.0 / 3.0));
        assert_eq!(report.avg_detections_per_image, Some(2.0));
        assert_eq!(report.per_region[0].detection_frequency, Some(1.0));
    }

    #[test]
    fn test_undetected_slots_do_not_contribute() {
        let mut acc = DetectionAccumulator::new(1);
        let boxes = vec![vec![Some(unit_box(0.0))]];
        let detected = array![[false]];

        acc.update(&boxes, &boxes, &detected).unwrap();
        let report = acc.finalize();
        assert_eq!(report.per_region[0].iou, None);
        assert_eq!(report.avg_detections_per_image, Some(0.0));
    }

    #[test]
    fn test_region_count_mismatch_rejected() {
        let mut acc = DetectionAccumulator::new(3);
        let boxes = vec![vec![None, None]];
        let detected = array![[false, false]];
        assert!(matches!(
            acc.update(&boxes, &boxes, &detected),
            Err(MetricError::RegionCount { ours: 3, theirs: 2 })
        ));
    }

    #[test]
    fn test_empty_run_is_all_no_data() {
        let report = DetectionAccumulator::new(2).finalize();
        assert_eq!(report.avg_iou, None);
        assert_eq!(report.avg_detections_per_image, None);
        assert!(report.per_region.iter().all(|r| r.iou.is_none()));
    }
}
