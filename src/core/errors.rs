// Custom error types for better error handling and debugging
//
// Using thiserror for ergonomic error definitions with:
// - Context preservation
// - Type-safe error matching
// - Automatic Display/Error trait implementations
// - Source error chaining

use thiserror::Error;

/// Mask algebra errors
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("mask shape mismatch: left operand is {left:?}, right operand is {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("dense grid is {grid:?} but mask is {mask:?}")]
    GridMismatch {
        grid: (usize, usize),
        mask: (usize, usize),
    },

    #[error("flattened input has {got} rows but mask selects {selected}")]
    RowCountMismatch { selected: usize, got: usize },
}

/// Errors raised by the external pipeline stages (detector, selector,
/// abnormality classifier, generator)
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage} exhausted resources: {detail}")]
    ResourceExhausted { stage: &'static str, detail: String },

    #[error("{stage} failed: {detail}")]
    Failed { stage: &'static str, detail: String },
}

/// Pipeline orchestration errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Retryable: the batch is skipped, the run continues.
    #[error("{stage} exhausted resources on this batch: {detail}")]
    ResourceExhausted { stage: &'static str, detail: String },

    #[error("{stage} failed: {detail}")]
    StageFailed { stage: &'static str, detail: String },

    #[error("selector marked region {region} of image {image} without a detection")]
    SelectionWithoutDetection { image: usize, region: usize },

    #[error("shape mismatch in {context}: {source}")]
    ShapeMismatch {
        context: &'static str,
        #[source]
        source: MaskError,
    },

    #[error("supervision grid {field} is {got:?}, batch expects {expected:?}")]
    SupervisionShape {
        field: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("batch carries {study_ids} study ids for {images} images")]
    StudyIdCount { images: usize, study_ids: usize },
}

impl PipelineError {
    /// Whether the failure is confined to one batch. Retryable failures are
    /// skipped by the evaluation loop; everything else aborts the run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }

    pub(crate) fn from_stage(err: StageError) -> Self {
        match err {
            StageError::ResourceExhausted { stage, detail } => {
                Self::ResourceExhausted { stage, detail }
            }
            StageError::Failed { stage, detail } => Self::StageFailed { stage, detail },
        }
    }
}

/// Metric accumulation errors
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metric update shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("region count mismatch: accumulator tracks {ours} regions, input has {theirs}")]
    RegionCount { ours: usize, theirs: usize },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("similarity threshold must be in [0.0, 1.0], got {0}")]
    InvalidSimilarityThreshold(f64),

    #[error("region count must be > 0, got {0}")]
    InvalidRegionCount(usize),

    #[error("feature dimension must be > 0, got {0}")]
    InvalidFeatureDim(usize),

    #[error("invalid decoding config: {0}")]
    InvalidDecodingConfig(String),

    #[error("environment variable parsing failed: {0}")]
    EnvVarError(String),
}

// Convenience type aliases for Results
pub type MaskResult<T> = Result<T, MaskError>;
pub type StageResult<T> = Result<T, StageError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type MetricResult<T> = Result<T, MetricError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

// Helper traits for lifting stage and mask failures into pipeline errors.
// Stage errors carry their own stage name; mask errors need a caller-supplied
// context, so each conversion gets its own trait.
pub trait IntoPipeline<T> {
    fn into_pipeline(self) -> PipelineResult<T>;
}

impl<T> IntoPipeline<T> for StageResult<T> {
    fn into_pipeline(self) -> PipelineResult<T> {
        self.map_err(PipelineError::from_stage)
    }
}

pub trait MaskContext<T> {
    fn with_mask_context(self, context: &'static str) -> PipelineResult<T>;
}

impl<T> MaskContext<T> for MaskResult<T> {
    fn with_mask_context(self, context: &'static str) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::ShapeMismatch { context, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_exhaustion_stays_retryable_through_conversion() {
        let err: StageResult<()> = Err(StageError::ResourceExhausted {
            stage: "detector",
            detail: "out of device memory".to_string(),
        });
        let converted = err.into_pipeline().unwrap_err();
        assert!(converted.is_retryable());
        assert!(matches!(
            converted,
            PipelineError::ResourceExhausted {
                stage: "detector",
                ..
            }
        ));
    }

    #[test]
    fn test_mask_errors_pick_up_their_context() {
        let err: MaskResult<()> = Err(MaskError::RowCountMismatch {
            selected: 3,
            got: 2,
        });
        let converted = err.with_mask_context("eval features").unwrap_err();
        assert!(!converted.is_retryable());
        assert!(matches!(
            converted,
            PipelineError::ShapeMismatch {
                context: "eval features",
                ..
            }
        ));
    }
}
