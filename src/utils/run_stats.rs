use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Run-level counters for an evaluation or inference run.
///
/// Tracks batch throughput, per-stage latency, skip reasons, and sentence
/// volume. Thread-safe and cheap to clone across the run.
#[derive(Clone)]
pub struct RunStats {
    inner: Arc<RunStatsInner>,
}

struct RunStatsInner {
    // Batch counters
    batches_processed: AtomicUsize,
    images_processed: AtomicUsize,
    batches_skipped_exhausted: AtomicUsize,
    batches_skipped_empty: AtomicUsize,

    // Per-stage latency
    detector_latency_ms: RwLock<Vec<u64>>,
    selector_latency_ms: RwLock<Vec<u64>>,
    classifier_latency_ms: RwLock<Vec<u64>>,
    generator_latency_ms: RwLock<Vec<u64>>,

    // Skip counters keyed by the stage that exhausted resources
    skips_by_stage: DashMap<String, AtomicUsize>,

    // Output volume
    sentences_generated: AtomicU64,
    sentences_suppressed: AtomicU64,

    // Start time for elapsed calculation
    start_time: Instant,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RunStatsInner {
                batches_processed: AtomicUsize::new(0),
                images_processed: AtomicUsize::new(0),
                batches_skipped_exhausted: AtomicUsize::new(0),
                batches_skipped_empty: AtomicUsize::new(0),
                detector_latency_ms: RwLock::new(Vec::new()),
                selector_latency_ms: RwLock::new(Vec::new()),
                classifier_latency_ms: RwLock::new(Vec::new()),
                generator_latency_ms: RwLock::new(Vec::new()),
                skips_by_stage: DashMap::new(),
                sentences_generated: AtomicU64::new(0),
                sentences_suppressed: AtomicU64::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_batch_processed(&self, num_images: usize) {
        self.inner.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .images_processed
            .fetch_add(num_images, Ordering::Relaxed);
    }

    pub fn record_exhausted_skip(&self, stage: &str) {
        self.inner
            .batches_skipped_exhausted
            .fetch_add(1, Ordering::Relaxed);
        self.inner
            .skips_by_stage
            .entry(stage.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_selection_skip(&self) {
        self.inner
            .batches_skipped_empty
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detector_latency(&self, duration: Duration) {
        self.inner
            .detector_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_selector_latency(&self, duration: Duration) {
        self.inner
            .selector_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_classifier_latency(&self, duration: Duration) {
        self.inner
            .classifier_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_generator_latency(&self, duration: Duration) {
        self.inner
            .generator_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_sentences_generated(&self, count: usize) {
        self.inner
            .sentences_generated
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_sentences_suppressed(&self, count: usize) {
        self.inner
            .sentences_suppressed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> RunStatsSnapshot {
        let detector = self.inner.detector_latency_ms.read();
        let detector_avg = avg(&detector);
        let detector_p95 = percentile(&detector, 0.95);
        drop(detector);

        let selector = self.inner.selector_latency_ms.read();
        let selector_avg = avg(&selector);
        drop(selector);

        let classifier = self.inner.classifier_latency_ms.read();
        let classifier_avg = avg(&classifier);
        drop(classifier);

        let generator = self.inner.generator_latency_ms.read();
        let generator_avg = avg(&generator);
        let generator_p95 = percentile(&generator, 0.95);
        drop(generator);

        let skips_by_stage = self
            .inner
            .skips_by_stage
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        RunStatsSnapshot {
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            images_processed: self.inner.images_processed.load(Ordering::Relaxed),
            batches_skipped_exhausted: self
                .inner
                .batches_skipped_exhausted
                .load(Ordering::Relaxed),
            batches_skipped_empty: self.inner.batches_skipped_empty.load(Ordering::Relaxed),
            skips_by_stage,
            detector_latency_avg_ms: detector_avg,
            detector_latency_p95_ms: detector_p95,
            selector_latency_avg_ms: selector_avg,
            classifier_latency_avg_ms: classifier_avg,
            generator_latency_avg_ms: generator_avg,
            generator_latency_p95_ms: generator_p95,
            sentences_generated: self.inner.sentences_generated.load(Ordering::Relaxed),
            sentences_suppressed: self.inner.sentences_suppressed.load(Ordering::Relaxed),
            elapsed_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatsSnapshot {
    pub batches_processed: usize,
    pub images_processed: usize,
    pub batches_skipped_exhausted: usize,
    pub batches_skipped_empty: usize,
    pub skips_by_stage: std::collections::HashMap<String, usize>,
    pub detector_latency_avg_ms: u64,
    pub detector_latency_p95_ms: u64,
    pub selector_latency_avg_ms: u64,
    pub classifier_latency_avg_ms: u64,
    pub generator_latency_avg_ms: u64,
    pub generator_latency_p95_ms: u64,
    pub sentences_generated: u64,
    pub sentences_suppressed: u64,
    pub elapsed_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_recording() {
        let stats = RunStats::new();

        stats.record_batch_processed(4);
        stats.record_batch_processed(4);
        stats.record_exhausted_skip("generator");
        stats.record_empty_selection_skip();
        stats.record_detector_latency(Duration::from_millis(100));
        stats.record_detector_latency(Duration::from_millis(200));
        stats.record_sentences_generated(12);
        stats.record_sentences_suppressed(2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.batches_processed, 2);
        assert_eq!(snapshot.images_processed, 8);
        assert_eq!(snapshot.batches_skipped_exhausted, 1);
        assert_eq!(snapshot.batches_skipped_empty, 1);
        assert_eq!(snapshot.skips_by_stage.get("generator"), Some(&1));
        assert_eq!(snapshot.detector_latency_avg_ms, 150);
        assert_eq!(snapshot.sentences_generated, 12);
        assert_eq!(snapshot.sentences_suppressed, 2);
    }

    #[test]
    fn test_clone_shares_state() {
        let stats = RunStats::new();
        let clone = stats.clone();
        clone.record_batch_processed(3);
        assert_eq!(stats.snapshot().images_processed, 3);
    }

    #[test]
    fn test_empty_latency_is_zero() {
        let snapshot = RunStats::new().snapshot();
        assert_eq!(snapshot.detector_latency_avg_ms, 0);
        assert_eq!(snapshot.generator_latency_p95_ms, 0);
    }
}
