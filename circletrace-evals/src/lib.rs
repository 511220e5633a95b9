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

//! # Circletrace Evals
//!
//! Quality evaluation for the Impact Circle agents.
//!
//! - **Metric engine**: trait-based scoring functions producing 0-1
//!   quality measures, with built-in metrics per agent type.
//! - **Dataset store**: named, append-only collections of labeled test
//!   cases, remote or in-memory.
//! - **Evaluation runner**: drives the metric set over a dataset against
//!   a caller-supplied function, sequentially and deterministically.
//! - **Experiment runner**: evaluates several variant functions against
//!   the identical dataset and ranks them.
//!
//! Everything here runs offline: the runners never call a generative
//! model themselves, they only invoke the function the caller supplies.

use async_trait::async_trait;
use circletrace_core::{MetricResult, TraceValue};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod dataset_store;
pub mod experiment;
pub mod metrics;
pub mod runner;

pub use dataset_store::DatasetStore;
pub use experiment::{ExperimentConfig, ExperimentRunner, ExperimentVariant};
pub use metrics::{default_metrics, MetricEngine};
pub use runner::{agent_fn, AgentFn, AgentFuture, EvaluationConfig, EvaluationRunner};

/// Everything a metric may look at when scoring one case.
#[derive(Debug, Clone)]
pub struct ScoringSample {
    pub input: TraceValue,
    pub output: TraceValue,
    /// Reference output from the dataset item, when labeled.
    pub expected_output: Option<TraceValue>,
    /// Case metadata plus runner-supplied fields such as `duration_ms`.
    pub context: BTreeMap<String, TraceValue>,
}

impl ScoringSample {
    pub fn new(input: TraceValue, output: TraceValue) -> Self {
        Self {
            input,
            output,
            expected_output: None,
            context: BTreeMap::new(),
        }
    }

    pub fn with_expected_output(mut self, expected: TraceValue) -> Self {
        self.expected_output = Some(expected);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: TraceValue) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// A stateless scoring function. Implementations should resolve whenever
/// possible; an `Err` is converted by the engine into a neutral 0.5 score
/// so one broken metric never aborts an evaluation run.
#[async_trait]
pub trait Metric: Send + Sync {
    /// Metric name used as the key in average-score maps.
    fn name(&self) -> &str;

    async fn score(&self, sample: &ScoringSample) -> Result<MetricResult, MetricError>;
}

/// Internal failure of a metric implementation. Never propagated past the
/// engine.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors surfaced by the dataset store and the runners.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
