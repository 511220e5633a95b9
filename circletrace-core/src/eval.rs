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

//! Evaluation and experiment result contracts
//!
//! Result types shared between `circletrace-evals` and its consumers.
//! All of them are immutable snapshots once produced.

use crate::value::TraceValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One scoring of one (input, output) pair. Value is 0.0-1.0, higher is
/// better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResult {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, TraceValue>,
}

impl MetricResult {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            reason: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Outcome of running the function under test against one dataset item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationCaseResult {
    pub input: TraceValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<TraceValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metrics: Vec<MetricResult>,
    pub duration_ms: u64,
}

impl EvaluationCaseResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Output of running one function against one dataset with a metric set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub agent_name: String,
    pub dataset_name: String,
    pub total_cases: usize,
    pub successful_cases: usize,
    pub failed_cases: usize,
    /// Metric name -> mean value across successful cases.
    pub average_scores: BTreeMap<String, f64>,
    /// Per-case results, in dataset order.
    pub results: Vec<EvaluationCaseResult>,
    pub created_at_us: u64,
}

impl EvaluationResult {
    /// Mean of the per-metric averages. Zero when no metric produced a value.
    pub fn overall_score(&self) -> f64 {
        if self.average_scores.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.average_scores.values().sum();
        sum / self.average_scores.len() as f64
    }
}

/// One variant's outcome inside an experiment, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantOutcome {
    pub name: String,
    pub overall_score: f64,
    pub evaluation: EvaluationResult,
}

/// The winning variant plus per-metric improvement over the baseline
/// (first-listed) variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerReport {
    pub name: String,
    pub overall_score: f64,
    /// Name of the first-listed variant, used for delta reporting whether
    /// or not it won.
    pub baseline: String,
    /// Metric name -> winner average minus baseline average.
    pub deltas: BTreeMap<String, f64>,
}

/// A single metric's descending ranking of all variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRanking {
    pub metric: String,
    pub entries: Vec<RankedVariant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedVariant {
    pub name: String,
    pub average: f64,
}

/// Output of running every variant against the same dataset and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub name: String,
    pub dataset_name: String,
    pub variants: Vec<VariantOutcome>,
    pub winner: WinnerReport,
    /// Per-metric rankings, ties broken by original variant order.
    pub comparison: Vec<MetricRanking>,
    /// Metric name -> best variant for that metric.
    pub best_per_metric: BTreeMap<String, String>,
    pub created_at_us: u64,
}

impl ExperimentResult {
    pub fn variant(&self, name: &str) -> Option<&VariantOutcome> {
        self.variants.iter().find(|v| v.name == name)
    }
}

/// Which side won a two-variant comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Baseline,
    Treatment,
    Tie,
}

/// Result of the two-variant quick comparison. Overall scores within one
/// percentage point of each other are reported as a tie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickCompareResult {
    pub baseline: String,
    pub treatment: String,
    pub baseline_score: f64,
    pub treatment_score: f64,
    /// Treatment minus baseline overall score.
    pub delta: f64,
    pub winner: Winner,
}
