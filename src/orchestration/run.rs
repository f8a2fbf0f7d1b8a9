// Evaluation run loop: feed batches through the orchestrator, fold results
// into the metric aggregator, assemble reports, finalize once.
//
// Failure discipline mirrors the per-batch taxonomy: a retryable failure
// skips the batch (logged and counted), a fatal failure aborts the run.
// Skipped batches contribute nothing, not even their image count.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::types::{BatchSupervision, EvalOutcome, ImageBatch};
use crate::metrics::{BatchObservation, MetricAggregator, MetricsReport};
use crate::orchestration::pipeline::{GeneratorEvalMode, PipelineOrchestrator};
use crate::report::{self, AssembledReport, RemovedSentence, ReportAssembler};
use crate::stages::{AbnormalityClassifier, Detector, Generator, Selector, SimilarityScorer};
use crate::utils::RunStatsSnapshot;

/// One image's generated report paired with its reference.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GeneratedReport {
    pub study_id: String,
    pub generated: String,
    pub reference: String,
    pub removed: Vec<RemovedSentence>,
}

/// Mean per-batch losses over the evaluated (non-skipped) batches.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct LossSummary {
    pub detector: Option<f64>,
    pub selector: Option<f64>,
    pub generator: Option<f64>,
}

/// Generated and reference sentences for the same selected slots,
/// index-aligned.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SentencePairs {
    pub generated: Vec<String>,
    pub reference: Vec<String>,
}

/// Sentence-level pairs over every scored slot, plus the normal and abnormal
/// partitions per the ground-truth abnormality grid.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SentenceSets {
    pub all: SentencePairs,
    pub normal: SentencePairs,
    pub abnormal: SentencePairs,
}

/// Everything one evaluation run produces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationSummary {
    pub metrics: MetricsReport,
    pub mean_losses: LossSummary,
    pub reports: Vec<GeneratedReport>,
    pub sentences: SentenceSets,
    pub stats: RunStatsSnapshot,
}

impl<D, S, C, G> PipelineOrchestrator<D, S, C, G>
where
    D: Detector,
    S: Selector,
    C: AbnormalityClassifier,
    G: Generator,
{
    /// Evaluate every batch the source yields and finalize the metrics once
    /// at the end.
    #[instrument(skip_all)]
    pub fn run_evaluation<I, Sc>(&self, batches: I, scorer: &Sc) -> Result<EvaluationSummary>
    where
        I: IntoIterator<Item = (ImageBatch, BatchSupervision)>,
        Sc: SimilarityScorer + Sync,
    {
        let mut aggregator = MetricAggregator::new(self.config().num_regions());
        let assembler = ReportAssembler::new(self.config().similarity_threshold());
        let mut reports: Vec<GeneratedReport> = Vec::new();
        let mut sentence_sets = SentenceSets::default();

        let mut detector_loss_sum = 0.0f64;
        let mut selector_loss_sum = 0.0f64;
        let mut generator_loss_sum = 0.0f64;
        let mut loss_batches = 0u64;
        let mut generator_loss_batches = 0u64;

        for (batch_index, (batch, supervision)) in batches.into_iter().enumerate() {
            batch
                .validate_study_ids()
                .with_context(|| format!("evaluation aborted at batch {}", batch_index))?;

            let output = match self.eval_step(&batch, &supervision, GeneratorEvalMode::LossAndGenerate)
            {
                Ok(EvalOutcome::Completed(output)) => output,
                Ok(EvalOutcome::EmptySelection) => {
                    info!(batch_index, "empty selection, batch excluded from scoring");
                    continue;
                }
                Err(err) if err.is_retryable() => {
                    warn!(batch_index, error = %err, "skipping batch after retryable failure");
                    self.stats().record_exhausted_skip(skip_stage(&err));
                    continue;
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("evaluation aborted at batch {}", batch_index));
                }
            };

            aggregator
                .record_batch(&BatchObservation {
                    predicted_boxes: &output.predicted_boxes,
                    ground_truth_boxes: &supervision.boxes,
                    detected: &output.detected,
                    selected: &output.selected,
                    has_sentence: &supervision.has_sentence,
                    is_abnormal: &supervision.is_abnormal,
                    predicted_abnormal: &output.predicted_abnormal,
                })
                .with_context(|| format!("recording metrics for batch {}", batch_index))?;

            detector_loss_sum += output.detector_loss as f64;
            selector_loss_sum += output.selector_loss as f64;
            loss_batches += 1;
            if let Some(loss) = output.generator_loss {
                generator_loss_sum += loss as f64;
                generator_loss_batches += 1;
            }

            let sentences = output
                .generated
                .as_deref()
                .context("generator produced no sentences in LossAndGenerate mode")?;

            // Sentence-level pairing: references flatten in the same
            // row-major order as the generated sentences.
            let references = report::reference_sentences_for_selected(
                &supervision.reference_sentences,
                &output.selected,
            )
            .with_context(|| format!("pairing reference sentences for batch {}", batch_index))?;
            let (generated_normal, generated_abnormal) =
                report::split_by_abnormality(sentences, &output.selected, &supervision.is_abnormal)
                    .context("partitioning generated sentences by abnormality")?;
            let (reference_normal, reference_abnormal) = report::split_by_abnormality(
                &references,
                &output.selected,
                &supervision.is_abnormal,
            )
            .context("partitioning reference sentences by abnormality")?;
            sentence_sets.all.generated.extend_from_slice(sentences);
            sentence_sets.all.reference.extend(references);
            sentence_sets.normal.generated.extend(generated_normal);
            sentence_sets.normal.reference.extend(reference_normal);
            sentence_sets.abnormal.generated.extend(generated_abnormal);
            sentence_sets.abnormal.reference.extend(reference_abnormal);

            let assembled = assembler
                .assemble(&output.selected, sentences, scorer)
                .context("assembling generated reports")?;

            let suppressed: usize = assembled.iter().map(|r| r.removed.len()).sum();
            self.stats().record_sentences_suppressed(suppressed);

            for (image_index, (assembled, study_id)) in
                assembled.into_iter().zip(&batch.study_ids).enumerate()
            {
                let reference =
                    reference_report(&supervision, &output.selected, image_index);
                reports.push(pair_report(study_id.clone(), assembled, reference));
            }

            self.stats().record_batch_processed(batch.len());
        }

        let mean_losses = LossSummary {
            detector: mean(detector_loss_sum, loss_batches),
            selector: mean(selector_loss_sum, loss_batches),
            generator: mean(generator_loss_sum, generator_loss_batches),
        };

        let metrics = aggregator.finalize();
        info!(
            total_images = metrics.total_images,
            reports = reports.len(),
            "evaluation run finalized"
        );

        Ok(EvaluationSummary {
            metrics,
            mean_losses,
            reports,
            sentences: sentence_sets,
            stats: self.stats().snapshot(),
        })
    }
}

fn mean(sum: f64, count: u64) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn skip_stage(err: &crate::core::errors::PipelineError) -> &'static str {
    match err {
        crate::core::errors::PipelineError::ResourceExhausted { stage, .. } => *stage,
        _ => "unknown",
    }
}

/// The reference report for one image: its reference sentences at selected
/// slots, region order, placeholders skipped.
fn reference_report(
    supervision: &BatchSupervision,
    selected: &ndarray::Array2<bool>,
    image_index: usize,
) -> String {
    let r = selected.dim().1;
    let mut parts: Vec<&str> = Vec::new();
    for j in 0..r {
        if !selected[[image_index, j]] {
            continue;
        }
        let sentence = supervision.reference_sentences[image_index][j].trim();
        if sentence.is_empty() || sentence == crate::report::EMPTY_SENTENCE_MARKER {
            continue;
        }
        parts.push(sentence);
    }
    parts.join(" ")
}

fn pair_report(study_id: String, assembled: AssembledReport, reference: String) -> GeneratedReport {
    GeneratedReport {
        study_id,
        generated: assembled.text,
        reference,
        removed: assembled.removed,
    }
}
