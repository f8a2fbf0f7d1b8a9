pub mod config;
pub mod errors;
pub mod regions;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{ConfigError, MaskError, MetricError, PipelineError, StageError};
pub use regions::{metric_key, region_name, NUM_REGIONS, REGION_NAMES};
pub use types::{
    BatchSupervision, BoundingBox, DetectorOutput, EvalOutcome, EvalOutput, GenerateOutcome,
    ImageBatch, RegionBoxes, SelectorOutput, TokenSupervision, TrainLosses, TrainOutcome,
};
