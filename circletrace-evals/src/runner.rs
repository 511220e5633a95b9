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

//! Evaluation runner
//!
//! Drives a caller-supplied agent function over every item of a dataset,
//! sequentially and in dataset order, scoring each successful call with
//! the configured metric set. A case whose agent call fails is recorded
//! with its error and excluded from the averages; it never aborts the run.

use crate::metrics::{default_metrics, MetricEngine};
use crate::{DatasetStore, EvalError, Metric, ScoringSample};
use circletrace_core::{
    current_timestamp_us, EvaluationCaseResult, EvaluationResult, TraceValue,
};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// The future an agent function returns for one case.
pub type AgentFuture = BoxFuture<'static, Result<TraceValue, anyhow::Error>>;

/// The function under test. Takes one dataset item's input and produces
/// the agent's output. Wrap an async fn with [`agent_fn`].
pub type AgentFn = Arc<dyn Fn(TraceValue) -> AgentFuture + Send + Sync>;

/// Wraps an async closure into an [`AgentFn`].
pub fn agent_fn<F, Fut>(f: F) -> AgentFn
where
    F: Fn(TraceValue) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<TraceValue, anyhow::Error>> + Send + 'static,
{
    Arc::new(move |input| Box::pin(f(input)))
}

pub struct EvaluationConfig {
    pub agent_name: String,
    pub dataset_name: String,
    /// Explicit metric set; `None` selects the defaults for the agent name.
    pub metrics: Option<Vec<Arc<dyn Metric>>>,
    /// Evaluate only the first N items when set.
    pub max_cases: Option<usize>,
}

impl EvaluationConfig {
    pub fn new(agent_name: impl Into<String>, dataset_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            dataset_name: dataset_name.into(),
            metrics: None,
            max_cases: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<Arc<dyn Metric>>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_max_cases(mut self, max_cases: usize) -> Self {
        self.max_cases = Some(max_cases);
        self
    }
}

pub struct EvaluationRunner {
    store: Arc<DatasetStore>,
    engine: MetricEngine,
}

impl EvaluationRunner {
    pub fn new(store: Arc<DatasetStore>) -> Self {
        Self {
            store,
            engine: MetricEngine::new(),
        }
    }

    /// Run one agent function against one dataset.
    pub async fn run(
        &self,
        config: &EvaluationConfig,
        agent: AgentFn,
    ) -> Result<EvaluationResult, EvalError> {
        let dataset = self.store.get(&config.dataset_name).await?;
        let metrics = match &config.metrics {
            Some(metrics) => metrics.clone(),
            None => default_metrics(&config.agent_name),
        };

        let items: Vec<_> = match config.max_cases {
            Some(max) => dataset.items.into_iter().take(max).collect(),
            None => dataset.items,
        };

        info!(
            agent = %config.agent_name,
            dataset = %config.dataset_name,
            cases = items.len(),
            "starting evaluation"
        );

        let mut results = Vec::with_capacity(items.len());
        let mut metric_sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut failed_cases = 0;

        for item in items {
            let started = Instant::now();
            let outcome = agent(item.input.clone()).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    let mut sample = ScoringSample::new(item.input.clone(), output.clone());
                    if let Some(expected) = item.expected_output.clone() {
                        sample = sample.with_expected_output(expected);
                    }
                    sample.context = item.metadata.clone();
                    sample.context.insert(
                        "duration_ms".to_string(),
                        TraceValue::Number(duration_ms as f64),
                    );

                    let metric_results = self.engine.score_all(&metrics, &sample).await;
                    for result in &metric_results {
                        let entry = metric_sums.entry(result.name.clone()).or_insert((0.0, 0));
                        entry.0 += result.value;
                        entry.1 += 1;
                    }
                    results.push(EvaluationCaseResult {
                        input: item.input,
                        output: Some(output),
                        error: None,
                        metrics: metric_results,
                        duration_ms,
                    });
                }
                Err(e) => {
                    debug!(case = %item.id, "agent call failed: {}", e);
                    failed_cases += 1;
                    results.push(EvaluationCaseResult {
                        input: item.input,
                        output: None,
                        error: Some(e.to_string()),
                        metrics: Vec::new(),
                        duration_ms,
                    });
                }
            }
        }

        let average_scores: BTreeMap<String, f64> = metric_sums
            .into_iter()
            .map(|(name, (sum, count))| (name, sum / count as f64))
            .collect();

        let total_cases = results.len();
        Ok(EvaluationResult {
            agent_name: config.agent_name.clone(),
            dataset_name: config.dataset_name.clone(),
            total_cases,
            successful_cases: total_cases - failed_cases,
            failed_cases,
            average_scores,
            results,
            created_at_us: current_timestamp_us(),
        })
    }
}
