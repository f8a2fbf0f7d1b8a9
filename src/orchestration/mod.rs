pub mod pipeline;
pub mod run;

pub use pipeline::{GeneratorEvalMode, MaskPolicy, PipelineOrchestrator};
pub use run::{EvaluationSummary, GeneratedReport, LossSummary, SentencePairs, SentenceSets};
