// Library exports for the region-guided report pipeline
//
// Orchestrates detector → region selector → abnormality classifier →
// language generator over dense per-region batch grids, and aggregates
// evaluation metrics and assembled reports.

// Core modules
pub mod core;
pub mod mask;
pub mod metrics;
pub mod orchestration;
pub mod report;
pub mod stages;
pub mod utils;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{ConfigError, MaskError, MetricError, PipelineError, StageError},
    types::{
        BatchSupervision, BoundingBox, DetectorOutput, EvalOutcome, EvalOutput, GenerateOutcome,
        ImageBatch, RegionBoxes, SelectorOutput, TokenSupervision, TrainLosses, TrainOutcome,
    },
};

pub use metrics::{BatchObservation, MetricAggregator, MetricsReport};

pub use orchestration::{
    EvaluationSummary, GeneratedReport, GeneratorEvalMode, MaskPolicy, PipelineOrchestrator,
    SentencePairs, SentenceSets,
};

pub use report::{AssembledReport, RemovedSentence, ReportAssembler};

pub use stages::{
    AbnormalityClassifier, DecodingConfig, Detector, Generator, Selector, SimilarityScorer,
};

pub use utils::{init_tracing, RunStats, RunStatsSnapshot};
