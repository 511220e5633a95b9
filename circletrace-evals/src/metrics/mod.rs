// Copyright 2025 Impact Circle Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Metric engine and built-in metrics
//!
//! All built-in metrics are deterministic heuristics over the structured
//! payloads; none of them calls a model. The engine guarantees that every
//! metric resolves: a failing implementation scores a neutral 0.5 with
//! reason "Evaluation failed", and every value is clamped to [0, 1].

use crate::{Metric, ScoringSample};
use circletrace_core::MetricResult;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

pub mod accuracy;
pub mod actionability;
pub mod calibration;
pub mod hallucination;
pub mod personalization;
pub mod relevance;
pub mod response_time;

pub use accuracy::AccuracyMetric;
pub use actionability::ActionabilityMetric;
pub use calibration::ConfidenceCalibrationMetric;
pub use hallucination::HallucinationFreedomMetric;
pub use personalization::PersonalizationMetric;
pub use relevance::RelevanceMetric;
pub use response_time::ResponseTimeMetric;

/// Runs metric sets over scoring samples.
#[derive(Default)]
pub struct MetricEngine;

impl MetricEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score one sample with every metric. Never fails: metric errors
    /// become neutral results and values are clamped to [0, 1].
    pub async fn score_all(
        &self,
        metrics: &[Arc<dyn Metric>],
        sample: &ScoringSample,
    ) -> Vec<MetricResult> {
        let mut results = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let result = match metric.score(sample).await {
                Ok(mut result) => {
                    result.value = result.value.clamp(0.0, 1.0);
                    result
                }
                Err(e) => {
                    warn!(metric = metric.name(), "metric failed: {}", e);
                    MetricResult::new(metric.name(), 0.5).with_reason("Evaluation failed")
                }
            };
            results.push(result);
        }
        results
    }
}

/// Default metric set for a known agent type. Unknown types fall back to
/// {relevance, accuracy}.
pub fn default_metrics(agent_type: &str) -> Vec<Arc<dyn Metric>> {
    let normalized = agent_type.to_lowercase().replace([' ', '_'], "-");

    if normalized.contains("skill") {
        vec![
            Arc::new(RelevanceMetric::new()),
            Arc::new(AccuracyMetric::new()),
            Arc::new(PersonalizationMetric::new()),
        ]
    } else if normalized.contains("action") || normalized.contains("plan") {
        vec![
            Arc::new(RelevanceMetric::new()),
            Arc::new(ActionabilityMetric::new()),
            Arc::new(PersonalizationMetric::new()),
        ]
    } else if normalized.contains("impact") || normalized.contains("valid") {
        vec![
            Arc::new(AccuracyMetric::new()),
            Arc::new(HallucinationFreedomMetric::new()),
            Arc::new(ConfidenceCalibrationMetric::new()),
        ]
    } else if normalized.contains("engage") || normalized.contains("coach") {
        vec![
            Arc::new(RelevanceMetric::new()),
            Arc::new(PersonalizationMetric::new()),
            Arc::new(ActionabilityMetric::new()),
        ]
    } else {
        vec![
            Arc::new(RelevanceMetric::new()),
            Arc::new(AccuracyMetric::new()),
        ]
    }
}

/// Lowercased alphanumeric tokens longer than two characters. Shared
/// tokenization for the overlap-based metrics.
pub(crate) fn content_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| t.len() > 2)
        .collect()
}
