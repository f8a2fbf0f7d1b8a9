// The fixed anatomical region vocabulary.
//
// Every dense grid in the pipeline has exactly one column per entry, in this
// order. Metric reports use the underscored form of each name as a stable key.

use once_cell::sync::Lazy;

/// Number of anatomical regions per image.
pub const NUM_REGIONS: usize = 29;

pub const REGION_NAMES: [&str; NUM_REGIONS] = [
    "right lung",
    "right upper lung zone",
    "right mid lung zone",
    "right lower lung zone",
    "right hilar structures",
    "right apical zone",
    "right costophrenic angle",
    "right hemidiaphragm",
    "left lung",
    "left upper lung zone",
    "left mid lung zone",
    "left lower lung zone",
    "left hilar structures",
    "left apical zone",
    "left costophrenic angle",
    "left hemidiaphragm",
    "trachea",
    "spine",
    "right clavicle",
    "left clavicle",
    "aortic arch",
    "mediastinum",
    "upper mediastinum",
    "svc",
    "cardiac silhouette",
    "cavoatrial junction",
    "right atrium",
    "carina",
    "abdomen",
];

static METRIC_KEYS: Lazy<Vec<String>> = Lazy::new(|| {
    REGION_NAMES
        .iter()
        .map(|name| name.split_whitespace().collect::<Vec<_>>().join("_"))
        .collect()
});

/// Human-readable name of region `index`, or "region_{index}" for grids wider
/// than the built-in vocabulary.
pub fn region_name(index: usize) -> String {
    REGION_NAMES
        .get(index)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("region_{}", index))
}

/// Underscored metric key for region `index` (e.g. "right_lower_lung_zone").
pub fn metric_key(index: usize) -> String {
    METRIC_KEYS
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("region_{}", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_table_size() {
        assert_eq!(REGION_NAMES.len(), NUM_REGIONS);
    }

    #[test]
    fn test_metric_keys_are_underscored() {
        assert_eq!(metric_key(3), "right_lower_lung_zone");
        assert_eq!(metric_key(24), "cardiac_silhouette");
        assert!(!METRIC_KEYS.iter().any(|k| k.contains(' ')));
    }

    #[test]
    fn test_out_of_table_index_falls_back() {
        assert_eq!(region_name(100), "region_100");
        assert_eq!(metric_key(100), "region_100");
    }
}
