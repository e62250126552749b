use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::config::DEFAULT_MONITOR_WINDOW;
use crate::models::{Detection, PerStage};

/// Quality samples kept per processing-time sample slot
const QUALITY_SAMPLES_PER_CALL: usize = 10;

#[derive(Debug)]
struct Samples {
    inference_times: VecDeque<f64>,
    quality_scores: VecDeque<f32>,
    histogram: PerStage<u64>,
    total_calls: u64,
    time_window: usize,
    quality_window: usize,
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    if queue.len() == cap {
        queue.pop_front();
    }
    queue.push_back(value);
}

/// Rolling statistics across classification calls.
///
/// Samples live in bounded windows; the call count and category histogram
/// are cumulative. Share it between classifiers through an `Arc`.
#[derive(Debug)]
pub struct PerformanceMonitor {
    samples: Mutex<Samples>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub avg_inference_time: f64,
    pub min_inference_time: f64,
    pub max_inference_time: f64,
    pub total_inferences: u64,
    /// Calls still inside the rolling window
    pub sampled_inferences: usize,
    pub avg_quality_score: f32,
    /// Population standard deviation of the windowed quality scores
    pub quality_std: f32,
    pub class_distribution: PerStage<u64>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_MONITOR_WINDOW)
    }
}

impl PerformanceMonitor {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: Mutex::new(Samples {
                inference_times: VecDeque::with_capacity(window),
                quality_scores: VecDeque::new(),
                histogram: PerStage::default(),
                total_calls: 0,
                time_window: window,
                quality_window: window * QUALITY_SAMPLES_PER_CALL,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Samples> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one completed call and its accepted detections
    pub fn record(&self, processing_time: f64, detections: &[Detection]) {
        let mut samples = self.lock();
        let (time_window, quality_window) = (samples.time_window, samples.quality_window);

        push_bounded(&mut samples.inference_times, processing_time, time_window);
        samples.total_calls += 1;
        for detection in detections {
            samples.histogram[detection.category] += 1;
            push_bounded(&mut samples.quality_scores, detection.quality_score, quality_window);
        }
    }

    /// `None` until the first call has been recorded
    pub fn summary(&self) -> Option<PerformanceSummary> {
        let samples = self.lock();
        if samples.inference_times.is_empty() {
            return None;
        }

        let times = &samples.inference_times;
        let avg_time = times.iter().sum::<f64>() / times.len() as f64;
        let min_time = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max_time = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let (avg_quality, quality_std) = if samples.quality_scores.is_empty() {
            (0.0, 0.0)
        } else {
            let n = samples.quality_scores.len() as f32;
            let mean = samples.quality_scores.iter().sum::<f32>() / n;
            let variance = samples
                .quality_scores
                .iter()
                .map(|q| (q - mean).powi(2))
                .sum::<f32>()
                / n;
            (mean, variance.sqrt())
        };

        Some(PerformanceSummary {
            avg_inference_time: avg_time,
            min_inference_time: min_time,
            max_inference_time: max_time,
            total_inferences: samples.total_calls,
            sampled_inferences: times.len(),
            avg_quality_score: avg_quality,
            quality_std,
            class_distribution: samples.histogram,
        })
    }

    pub fn reset(&self) {
        let mut samples = self.lock();
        samples.inference_times.clear();
        samples.quality_scores.clear();
        samples.histogram = PerStage::default();
        samples.total_calls = 0;
    }
}
