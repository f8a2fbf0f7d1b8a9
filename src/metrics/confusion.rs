use serde::Serialize;

/// Binary confusion counters with positive-class precision/recall/F1.
///
/// Ratios with a zero denominator are `None` ("no data"), serialized as JSON
/// null. They are never reported as 0 or NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounts {
    pub tp: u64,
    pub fp: u64,
    pub fn_: u64,
    pub tn: u64,
}

impl ConfusionCounts {
    pub fn record(&mut self, predicted: bool, truth: bool) {
        match (predicted, truth) {
            (true, true) => self.tp += 1,
            (true, false) => self.fp += 1,
            (false, true) => self.fn_ += 1,
            (false, false) => self.tn += 1,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
        self.tn += other.tn;
    }

    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.fn_ + self.tn
    }

    pub fn precision(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> Option<f64> {
        // Harmonic mean over raw counts; defined as long as any of tp/fp/fn
        // is nonzero.
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }

    pub fn report(&self) -> ConfusionReport {
        ConfusionReport {
            tp: self.tp,
            fp: self.fp,
            fn_: self.fn_,
            tn: self.tn,
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1(),
        }
    }
}

fn ratio(num: u64, denom: u64) -> Option<f64> {
    if denom == 0 {
        None
    } else {
        Some(num as f64 / denom as f64)
    }
}

/// Finalized confusion metrics for one subset.
#[derive(Debug, Clone, Serialize)]
pub struct ConfusionReport {
    pub tp: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
    pub tn: u64,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_ratios() {
        let mut counts = ConfusionCounts::default();
        counts.record(true, true);
        counts.record(true, true);
        counts.record(true, false);
        counts.record(false, true);
        counts.record(false, false);

        assert_eq!(counts.total(), 5);
        assert_eq!(counts.precision(), Some(2.0 / 3.0));
        assert_eq!(counts.recall(), Some(2.0 / 3.0));
        assert_eq!(counts.f1(), Some(2.0 / 3.0));
    }

    #[test]
    fn test_zero_denominators_are_no_data() {
        let counts = ConfusionCounts::default();
        assert_eq!(counts.precision(), None);
        assert_eq!(counts.recall(), None);
        assert_eq!(counts.f1(), None);

        // All-negative data: precision and recall undefined, tn alone does
        // not create evidence for the positive class.
        let mut negatives = ConfusionCounts::default();
        negatives.record(false, false);
        assert_eq!(negatives.precision(), None);
        assert_eq!(negatives.f1(), None);
    }

    #[test]
    fn test_merge_adds_counts() {
        let mut a = ConfusionCounts {
            tp: 1,
            fp: 2,
            fn_: 3,
            tn: 4,
        };
        let b = ConfusionCounts {
            tp: 10,
            fp: 20,
            fn_: 30,
            tn: 40,
        };
        a.merge(&b);
        assert_eq!(
            a,
            ConfusionCounts {
                tp: 11,
                fp: 22,
                fn_: 33,
                tn: 44,
            }
        );
    }

    #[test]
    fn test_no_data_serializes_as_null() {
        let report = ConfusionCounts::default().report();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["precision"].is_null());
        assert!(json["f1"].is_null());
    }
}
