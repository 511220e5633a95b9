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

//! Experiment runner
//!
//! Evaluates several agent variants against the identical dataset and
//! metric set, then ranks them. The first-listed variant is the baseline:
//! improvement deltas are reported against it, and it wins exact overall
//! ties. Variants run sequentially so their case-level timings do not
//! contend with each other.

use crate::runner::{AgentFn, EvaluationConfig, EvaluationRunner};
use crate::{default_metrics, DatasetStore, EvalError, Metric};
use circletrace_core::{
    current_timestamp_us, ExperimentResult, MetricRanking, QuickCompareResult, RankedVariant,
    VariantOutcome, Winner, WinnerReport,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Overall-score margin under which a two-variant comparison is a tie.
const TIE_MARGIN: f64 = 0.01;

pub struct ExperimentVariant {
    pub name: String,
    pub function: AgentFn,
}

impl ExperimentVariant {
    pub fn new(name: impl Into<String>, function: AgentFn) -> Self {
        Self {
            name: name.into(),
            function,
        }
    }
}

pub struct ExperimentConfig {
    pub name: String,
    pub dataset_name: String,
    /// Shared metric set; `None` selects the defaults for the experiment
    /// name. Every variant is scored with the same set.
    pub metrics: Option<Vec<Arc<dyn Metric>>>,
    pub max_cases: Option<usize>,
}

impl ExperimentConfig {
    pub fn new(name: impl Into<String>, dataset_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
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

pub struct ExperimentRunner {
    runner: EvaluationRunner,
}

impl ExperimentRunner {
    pub fn new(store: Arc<DatasetStore>) -> Self {
        Self {
            runner: EvaluationRunner::new(store),
        }
    }

    /// Run every variant against the dataset and rank the outcomes.
    pub async fn run_experiment(
        &self,
        config: &ExperimentConfig,
        variants: Vec<ExperimentVariant>,
    ) -> Result<ExperimentResult, EvalError> {
        if variants.len() < 2 {
            return Err(EvalError::InvalidArgument(
                "an experiment needs at least two variants".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for variant in &variants {
            if !seen.insert(variant.name.clone()) {
                return Err(EvalError::InvalidArgument(format!(
                    "duplicate variant name '{}'",
                    variant.name
                )));
            }
        }

        let metrics = match &config.metrics {
            Some(metrics) => metrics.clone(),
            None => default_metrics(&config.name),
        };

        info!(
            experiment = %config.name,
            dataset = %config.dataset_name,
            variants = variants.len(),
            "starting experiment"
        );

        let mut outcomes = Vec::with_capacity(variants.len());
        for variant in variants {
            let eval_config = EvaluationConfig {
                agent_name: variant.name.clone(),
                dataset_name: config.dataset_name.clone(),
                metrics: Some(metrics.clone()),
                max_cases: config.max_cases,
            };
            let evaluation = self.runner.run(&eval_config, variant.function).await?;
            outcomes.push(VariantOutcome {
                name: variant.name,
                overall_score: evaluation.overall_score(),
                evaluation,
            });
        }

        // First-listed wins exact ties: only a strictly higher score
        // displaces the current winner.
        let mut winner_index = 0;
        for (i, outcome) in outcomes.iter().enumerate().skip(1) {
            if outcome.overall_score > outcomes[winner_index].overall_score {
                winner_index = i;
            }
        }

        let baseline = &outcomes[0];
        let winner = &outcomes[winner_index];
        let deltas: BTreeMap<String, f64> = winner
            .evaluation
            .average_scores
            .iter()
            .map(|(metric, value)| {
                let baseline_value = baseline
                    .evaluation
                    .average_scores
                    .get(metric)
                    .copied()
                    .unwrap_or(0.0);
                (metric.clone(), value - baseline_value)
            })
            .collect();
        let winner_report = WinnerReport {
            name: winner.name.clone(),
            overall_score: winner.overall_score,
            baseline: baseline.name.clone(),
            deltas,
        };

        let comparison = rank_per_metric(&metrics, &outcomes);
        let best_per_metric: BTreeMap<String, String> = comparison
            .iter()
            .filter_map(|ranking| {
                ranking
                    .entries
                    .first()
                    .map(|top| (ranking.metric.clone(), top.name.clone()))
            })
            .collect();

        Ok(ExperimentResult {
            name: config.name.clone(),
            dataset_name: config.dataset_name.clone(),
            variants: outcomes,
            winner: winner_report,
            comparison,
            best_per_metric,
            created_at_us: current_timestamp_us(),
        })
    }

    /// Two-variant comparison returning just the verdict. Overall scores
    /// closer than one percentage point are a tie.
    pub async fn quick_compare(
        &self,
        config: &ExperimentConfig,
        baseline: ExperimentVariant,
        treatment: ExperimentVariant,
    ) -> Result<QuickCompareResult, EvalError> {
        let baseline_name = baseline.name.clone();
        let treatment_name = treatment.name.clone();
        let result = self
            .run_experiment(config, vec![baseline, treatment])
            .await?;

        let score_of = |name: &str| -> f64 {
            result
                .variant(name)
                .map(|v| v.overall_score)
                .unwrap_or(0.0)
        };
        let baseline_score = score_of(&baseline_name);
        let treatment_score = score_of(&treatment_name);
        let delta = treatment_score - baseline_score;
        let winner = if delta.abs() < TIE_MARGIN {
            Winner::Tie
        } else if delta > 0.0 {
            Winner::Treatment
        } else {
            Winner::Baseline
        };

        Ok(QuickCompareResult {
            baseline: baseline_name,
            treatment: treatment_name,
            baseline_score,
            treatment_score,
            delta,
            winner,
        })
    }
}

/// Stable descending ranking of variants per metric; ties keep the
/// original variant order.
fn rank_per_metric(metrics: &[Arc<dyn Metric>], outcomes: &[VariantOutcome]) -> Vec<MetricRanking> {
    metrics
        .iter()
        .map(|metric| {
            let mut entries: Vec<RankedVariant> = outcomes
                .iter()
                .map(|outcome| RankedVariant {
                    name: outcome.name.clone(),
                    average: outcome
                        .evaluation
                        .average_scores
                        .get(metric.name())
                        .copied()
                        .unwrap_or(0.0),
                })
                .collect();
            entries.sort_by(|a, b| {
                b.average
                    .partial_cmp(&a.average)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            MetricRanking {
                metric: metric.name().to_string(),
                entries,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::agent_fn;
    use crate::{MetricError, ScoringSample};
    use async_trait::async_trait;
    use circletrace_core::{DatasetItem, MetricResult, TraceValue};

    /// Reads a named field from the agent output, so variants can dictate
    /// their own metric values.
    struct FieldMetric(&'static str);

    #[async_trait]
    impl Metric for FieldMetric {
        fn name(&self) -> &str {
            self.0
        }

        async fn score(&self, sample: &ScoringSample) -> Result<MetricResult, MetricError> {
            let value = sample
                .output
                .get(self.0)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| MetricError::MissingField(self.0.to_string()))?;
            Ok(MetricResult::new(self.name(), value))
        }
    }

    fn fixed_output(fields: &[(&'static str, f64)]) -> TraceValue {
        let map: std::collections::BTreeMap<String, TraceValue> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), TraceValue::Number(*v)))
            .collect();
        TraceValue::Map(map)
    }

    fn fixed_variant(name: &str, fields: &'static [(&'static str, f64)]) -> ExperimentVariant {
        ExperimentVariant::new(name, agent_fn(move |_| async move { Ok(fixed_output(fields)) }))
    }

    async fn seeded_store() -> Arc<DatasetStore> {
        let store = Arc::new(DatasetStore::in_memory());
        store.create("cases", "").await.unwrap();
        store
            .add_items(
                "cases",
                vec![
                    DatasetItem::new(TraceValue::from("a")),
                    DatasetItem::new(TraceValue::from("b")),
                ],
            )
            .await
            .unwrap();
        store
    }

    fn score_metrics() -> Vec<Arc<dyn Metric>> {
        vec![
            Arc::new(FieldMetric("quality")) as Arc<dyn Metric>,
            Arc::new(FieldMetric("speed")) as Arc<dyn Metric>,
        ]
    }

    #[tokio::test]
    async fn test_strictly_higher_variant_wins() {
        let runner = ExperimentRunner::new(seeded_store().await);
        let config =
            ExperimentConfig::new("prompt-tuning", "cases").with_metrics(score_metrics());

        let result = runner
            .run_experiment(
                &config,
                vec![
                    fixed_variant("variant-a", &[("quality", 0.7), ("speed", 0.7)]),
                    fixed_variant("variant-b", &[("quality", 0.8), ("speed", 0.7)]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(result.winner.name, "variant-b");
        assert_eq!(result.winner.baseline, "variant-a");
        assert!((result.winner.deltas["quality"] - 0.1).abs() < 1e-9);
        assert!(result.winner.deltas["speed"].abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_baseline_wins_exact_tie() {
        let runner = ExperimentRunner::new(seeded_store().await);
        let config =
            ExperimentConfig::new("prompt-tuning", "cases").with_metrics(score_metrics());

        let result = runner
            .run_experiment(
                &config,
                vec![
                    fixed_variant("first", &[("quality", 0.6), ("speed", 0.6)]),
                    fixed_variant("second", &[("quality", 0.6), ("speed", 0.6)]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(result.winner.name, "first");
    }

    #[tokio::test]
    async fn test_per_metric_rankings_and_best() {
        let runner = ExperimentRunner::new(seeded_store().await);
        let config =
            ExperimentConfig::new("prompt-tuning", "cases").with_metrics(score_metrics());

        let result = runner
            .run_experiment(
                &config,
                vec![
                    fixed_variant("variant-a", &[("quality", 0.9), ("speed", 0.2)]),
                    fixed_variant("variant-b", &[("quality", 0.3), ("speed", 0.8)]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(result.best_per_metric["quality"], "variant-a");
        assert_eq!(result.best_per_metric["speed"], "variant-b");

        let quality = &result.comparison[0];
        assert_eq!(quality.metric, "quality");
        assert_eq!(quality.entries[0].name, "variant-a");
        assert_eq!(quality.entries[1].name, "variant-b");
    }

    #[tokio::test]
    async fn test_fewer_than_two_variants_rejected() {
        let runner = ExperimentRunner::new(seeded_store().await);
        let config = ExperimentConfig::new("prompt-tuning", "cases");
        let err = runner
            .run_experiment(
                &config,
                vec![fixed_variant("only", &[("quality", 1.0)])],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_duplicate_variant_names_rejected() {
        let runner = ExperimentRunner::new(seeded_store().await);
        let config = ExperimentConfig::new("prompt-tuning", "cases");
        let err = runner
            .run_experiment(
                &config,
                vec![
                    fixed_variant("same", &[("quality", 1.0)]),
                    fixed_variant("same", &[("quality", 0.5)]),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_quick_compare_close_scores_tie() {
        let runner = ExperimentRunner::new(seeded_store().await);
        let config =
            ExperimentConfig::new("prompt-tuning", "cases").with_metrics(score_metrics());

        let result = runner
            .quick_compare(
                &config,
                fixed_variant("old", &[("quality", 0.700), ("speed", 0.700)]),
                fixed_variant("new", &[("quality", 0.705), ("speed", 0.705)]),
            )
            .await
            .unwrap();
        assert_eq!(result.winner, Winner::Tie);
        assert!(result.delta.abs() < 0.01);
    }

    #[tokio::test]
    async fn test_quick_compare_definite_improvement() {
        let runner = ExperimentRunner::new(seeded_store().await);
        let config =
            ExperimentConfig::new("prompt-tuning", "cases").with_metrics(score_metrics());

        let result = runner
            .quick_compare(
                &config,
                fixed_variant("old", &[("quality", 0.70), ("speed", 0.70)]),
                fixed_variant("new", &[("quality", 0.72), ("speed", 0.72)]),
            )
            .await
            .unwrap();
        assert_eq!(result.winner, Winner::Treatment);
        assert!((result.delta - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_quick_compare_regression() {
        let runner = ExperimentRunner::new(seeded_store().await);
        let config =
            ExperimentConfig::new("prompt-tuning", "cases").with_metrics(score_metrics());

        let result = runner
            .quick_compare(
                &config,
                fixed_variant("old", &[("quality", 0.80), ("speed", 0.80)]),
                fixed_variant("new", &[("quality", 0.60), ("speed", 0.60)]),
            )
            .await
            .unwrap();
        assert_eq!(result.winner, Winner::Baseline);
    }
}
