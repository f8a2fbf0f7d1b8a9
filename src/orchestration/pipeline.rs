// Pipeline orchestrator: drives detector → selector → classifier →
// generator over one batch, with the mask bookkeeping between stages.
//
// The generator only ever sees the compacted (K, D) rows of the regions the
// active mask selects. An empty mask is a legitimate outcome reported as a
// sentinel variant; the generator is never invoked with zero rows. Stage
// outputs are only assembled into a result at the very end, so a failed
// batch leaks no partial state.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use ndarray::Array2;

use crate::core::config::Config;
use crate::core::errors::{IntoPipeline, MaskContext, PipelineError, PipelineResult};
use crate::core::types::{
    BatchSupervision, EvalOutcome, EvalOutput, GenerateOutcome, ImageBatch, SelectorOutput,
    TrainLosses, TrainOutcome,
};
use crate::mask;
use crate::stages::{AbnormalityClassifier, DecodingConfig, Detector, Generator, Selector};
use crate::utils::RunStats;

/// Which mask drives sentence generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    /// Training: `detected AND has_sentence`, so the generator is
    /// teacher-forced only on regions with a reference sentence.
    GroundTruth,
    /// Evaluation and inference: the selector's predicted mask.
    Predicted,
}

/// What the generator contributes during an evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorEvalMode {
    /// Teacher-forced loss only.
    Loss,
    /// Loss plus beam-search decoded sentences.
    LossAndGenerate,
}

pub struct PipelineOrchestrator<D, S, C, G> {
    config: Arc<Config>,
    detector: Arc<D>,
    selector: Arc<S>,
    classifier: Arc<C>,
    generator: Arc<G>,
    decoding: DecodingConfig,
    stats: RunStats,
}

impl<D, S, C, G> PipelineOrchestrator<D, S, C, G>
where
    D: Detector,
    S: Selector,
    C: AbnormalityClassifier,
    G: Generator,
{
    pub fn new(
        config: Arc<Config>,
        detector: Arc<D>,
        selector: Arc<S>,
        classifier: Arc<C>,
        generator: Arc<G>,
        stats: RunStats,
    ) -> Self {
        let decoding = DecodingConfig {
            max_length: config.decoding.max_generate_tokens,
            num_beams: config.decoding.num_beams,
            early_stopping: config.decoding.early_stopping,
        };
        Self {
            config,
            detector,
            selector,
            classifier,
            generator,
            decoding,
            stats,
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One training step. Generation is driven by the ground-truth mask
    /// ([`MaskPolicy::GroundTruth`]).
    #[instrument(skip_all, fields(batch_size = batch.len()))]
    pub fn train_step(
        &self,
        batch: &ImageBatch,
        supervision: &BatchSupervision,
    ) -> PipelineResult<TrainOutcome> {
        self.train_inner(batch, supervision, true)
    }

    /// Training step that stops after the selector: detector and selector
    /// losses only, the generator is untouched.
    #[instrument(skip_all, fields(batch_size = batch.len()))]
    pub fn pretrain_without_generator(
        &self,
        batch: &ImageBatch,
        supervision: &BatchSupervision,
    ) -> PipelineResult<TrainOutcome> {
        self.train_inner(batch, supervision, false)
    }

    fn train_inner(
        &self,
        batch: &ImageBatch,
        supervision: &BatchSupervision,
        with_generator: bool,
    ) -> PipelineResult<TrainOutcome> {
        supervision.validate(batch.len(), self.config.num_regions())?;

        let detector_out = self.run_detector(batch, Some(supervision))?;
        let detector_loss = require_loss(detector_out.loss, "detector")?;

        let selector_out = self.run_selector(
            &detector_out.features,
            &detector_out.detected,
            Some(&supervision.has_sentence),
        )?;
        let selector_loss = require_loss(selector_out.loss, "selector")?;

        if !with_generator {
            return Ok(TrainOutcome::Completed(TrainLosses {
                detector: detector_loss,
                selector: selector_loss,
                generator: None,
            }));
        }

        let active = self.generation_mask(
            MaskPolicy::GroundTruth,
            &detector_out.detected,
            Some(&supervision.has_sentence),
            &selector_out,
        )?;

        if mask::count(&active) == 0 {
            debug!("no region with both a detection and a reference sentence, skipping generator");
            self.stats.record_empty_selection_skip();
            return Ok(TrainOutcome::EmptySelection);
        }

        let features = mask::compact_features(&detector_out.features, &active)
            .with_mask_context("train features")?;
        let input_ids = mask::compact_rows(&supervision.tokens.input_ids, &active)
            .with_mask_context("train input_ids")?;
        let attention_mask = mask::compact_rows(&supervision.tokens.attention_mask, &active)
            .with_mask_context("train attention_mask")?;

        let start = Instant::now();
        let generator_loss = self
            .generator
            .forward(&features, &input_ids, &attention_mask)
            .into_pipeline()?;
        self.stats.record_generator_latency(start.elapsed());

        Ok(TrainOutcome::Completed(TrainLosses {
            detector: detector_loss,
            selector: selector_loss,
            generator: Some(generator_loss),
        }))
    }

    /// One evaluation step. Generation is driven by the selector's
    /// predicted mask ([`MaskPolicy::Predicted`]); the selector output is
    /// verified against the detection mask before it is trusted.
    #[instrument(skip_all, fields(batch_size = batch.len()))]
    pub fn eval_step(
        &self,
        batch: &ImageBatch,
        supervision: &BatchSupervision,
        mode: GeneratorEvalMode,
    ) -> PipelineResult<EvalOutcome> {
        supervision.validate(batch.len(), self.config.num_regions())?;

        let detector_out = self.run_detector(batch, Some(supervision))?;
        let detector_loss = require_loss(detector_out.loss, "detector")?;
        let predicted_boxes = detector_out.boxes.clone().ok_or_else(|| {
            PipelineError::StageFailed {
                stage: "detector",
                detail: "no predicted boxes in evaluation".to_string(),
            }
        })?;

        let selector_out = self.run_selector(
            &detector_out.features,
            &detector_out.detected,
            Some(&supervision.has_sentence),
        )?;
        let selector_loss = require_loss(selector_out.loss, "selector")?;

        let selected = self.generation_mask(
            MaskPolicy::Predicted,
            &detector_out.detected,
            Some(&supervision.has_sentence),
            &selector_out,
        )?;

        let start = Instant::now();
        let predicted_abnormal = self
            .classifier
            .classify(&detector_out.features, &detector_out.detected)
            .into_pipeline()?;
        self.stats.record_classifier_latency(start.elapsed());

        if mask::count(&selected) == 0 {
            info!("selector chose no region in this batch");
            self.stats.record_empty_selection_skip();
            return Ok(EvalOutcome::EmptySelection);
        }

        let features = mask::compact_features(&detector_out.features, &selected)
            .with_mask_context("eval features")?;
        let input_ids = mask::compact_rows(&supervision.tokens.input_ids, &selected)
            .with_mask_context("eval input_ids")?;
        let attention_mask = mask::compact_rows(&supervision.tokens.attention_mask, &selected)
            .with_mask_context("eval attention_mask")?;

        let start = Instant::now();
        let generator_loss = self
            .generator
            .forward(&features, &input_ids, &attention_mask)
            .into_pipeline()?;

        let generated = match mode {
            GeneratorEvalMode::Loss => None,
            GeneratorEvalMode::LossAndGenerate => {
                let sentences = self
                    .generator
                    .generate(&features, &self.decoding)
                    .into_pipeline()?;
                self.stats.record_sentences_generated(sentences.len());
                Some(sentences)
            }
        };
        self.stats.record_generator_latency(start.elapsed());

        Ok(EvalOutcome::Completed(Box::new(EvalOutput {
            detector_loss,
            selector_loss,
            generator_loss: Some(generator_loss),
            predicted_boxes,
            detected: detector_out.detected,
            selected,
            predicted_abnormal,
            generated,
        })))
    }

    /// Pure inference: no ground truth, no losses, just the selected mask
    /// and one sentence per selected slot.
    #[instrument(skip_all, fields(batch_size = batch.len()))]
    pub fn generate(&self, batch: &ImageBatch) -> PipelineResult<GenerateOutcome> {
        let detector_out = self.run_detector(batch, None)?;

        let selector_out =
            self.run_selector(&detector_out.features, &detector_out.detected, None)?;

        let selected = self.generation_mask(
            MaskPolicy::Predicted,
            &detector_out.detected,
            None,
            &selector_out,
        )?;

        if mask::count(&selected) == 0 {
            info!("selector chose no region, nothing to generate");
            self.stats.record_empty_selection_skip();
            return Ok(GenerateOutcome::EmptySelection);
        }

        let features = mask::compact_features(&detector_out.features, &selected)
            .with_mask_context("generate features")?;

        let start = Instant::now();
        let sentences = self
            .generator
            .generate(&features, &self.decoding)
            .into_pipeline()?;
        self.stats.record_generator_latency(start.elapsed());
        self.stats.record_sentences_generated(sentences.len());

        Ok(GenerateOutcome::Completed {
            selected,
            sentences,
        })
    }

    fn run_detector(
        &self,
        batch: &ImageBatch,
        supervision: Option<&BatchSupervision>,
    ) -> PipelineResult<crate::core::types::DetectorOutput> {
        let start = Instant::now();
        let out = self
            .detector
            .detect(batch, supervision.map(|s| &s.boxes))
            .into_pipeline()?;
        self.stats.record_detector_latency(start.elapsed());
        Ok(out)
    }

    fn run_selector(
        &self,
        features: &ndarray::Array3<f32>,
        detected: &Array2<bool>,
        gt_has_sentence: Option<&Array2<bool>>,
    ) -> PipelineResult<SelectorOutput> {
        let start = Instant::now();
        let out = self
            .selector
            .select(features, detected, gt_has_sentence)
            .into_pipeline()?;
        self.stats.record_selector_latency(start.elapsed());
        Ok(out)
    }

    /// Build the mask that drives generation under `policy`. The predicted
    /// mask is verified to be a subset of the detection mask; a violation is
    /// fatal, never silently repaired.
    fn generation_mask(
        &self,
        policy: MaskPolicy,
        detected: &Array2<bool>,
        has_sentence: Option<&Array2<bool>>,
        selector_out: &SelectorOutput,
    ) -> PipelineResult<Array2<bool>> {
        match policy {
            MaskPolicy::GroundTruth => {
                let has_sentence = has_sentence.ok_or(PipelineError::StageFailed {
                    stage: "orchestrator",
                    detail: "ground-truth mask policy without supervision".to_string(),
                })?;
                mask::and(detected, has_sentence).with_mask_context("detected AND has_sentence")
            }
            MaskPolicy::Predicted => {
                let selected = &selector_out.selected;
                if selected.dim() != detected.dim() {
                    return Err(PipelineError::ShapeMismatch {
                        context: "selector output",
                        source: crate::core::errors::MaskError::ShapeMismatch {
                            left: selected.dim(),
                            right: detected.dim(),
                        },
                    });
                }
                for ((i, j), &is_selected) in selected.indexed_iter() {
                    if is_selected && !detected[[i, j]] {
                        warn!(image = i, region = j, "selection outside the detection mask");
                        return Err(PipelineError::SelectionWithoutDetection {
                            image: i,
                            region: j,
                        });
                    }
                }
                Ok(selected.clone())
            }
        }
    }
}

fn require_loss(loss: Option<f32>, stage: &'static str) -> PipelineResult<f32> {
    loss.ok_or_else(|| PipelineError::StageFailed {
        stage,
        detail: "no loss reported under supervision".to_string(),
    })
}
