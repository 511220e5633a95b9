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

//! Actionability: can a volunteer act on this output?
//!
//! Two-part heuristic. The verb component counts distinct imperative
//! action verbs in the output, saturating at three. The structure
//! component checks for step-like structure: a list anywhere in the
//! output value, or a `steps` key. The score weights verbs 60/40 over
//! structure.

use crate::metrics::content_tokens;
use crate::{Metric, MetricError, ScoringSample};
use async_trait::async_trait;
use circletrace_core::{MetricResult, TraceValue};

const ACTION_VERBS: &[&str] = &[
    "contact", "email", "call", "register", "sign", "signup", "join", "attend", "visit",
    "apply", "schedule", "book", "bring", "prepare", "complete", "submit", "review",
    "share", "invite", "confirm", "arrive", "start", "plan",
];

pub struct ActionabilityMetric;

impl ActionabilityMetric {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ActionabilityMetric {
    fn default() -> Self {
        Self::new()
    }
}

fn has_step_structure(value: &TraceValue) -> bool {
    match value {
        TraceValue::List(items) => items.len() > 1,
        TraceValue::Map(map) => {
            map.contains_key("steps") || map.values().any(has_step_structure)
        }
        _ => false,
    }
}

#[async_trait]
impl Metric for ActionabilityMetric {
    fn name(&self) -> &str {
        "actionability"
    }

    async fn score(&self, sample: &ScoringSample) -> Result<MetricResult, MetricError> {
        let tokens = content_tokens(&sample.output.to_plain_text());
        let verb_count = ACTION_VERBS
            .iter()
            .filter(|v| tokens.contains(**v))
            .count();
        let verb_score = (verb_count as f64 / 3.0).min(1.0);
        let structure_score = if has_step_structure(&sample.output) {
            1.0
        } else {
            0.0
        };
        let value = 0.6 * verb_score + 0.4 * structure_score;

        Ok(MetricResult::new(self.name(), value).with_reason(format!(
            "{} action verb(s), step structure: {}",
            verb_count,
            structure_score > 0.0
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_verbs_and_steps_score_full() {
        let metric = ActionabilityMetric::new();
        let mut map = BTreeMap::new();
        map.insert(
            "steps".to_string(),
            TraceValue::List(vec![
                TraceValue::from("Register on the portal"),
                TraceValue::from("Email the coordinator"),
                TraceValue::from("Attend the Saturday briefing"),
            ]),
        );
        let sample = ScoringSample::new(TraceValue::Null, TraceValue::Map(map));
        let result = metric.score(&sample).await.unwrap();
        assert_eq!(result.value, 1.0);
    }

    #[tokio::test]
    async fn test_vague_prose_scores_zero() {
        let metric = ActionabilityMetric::new();
        let sample = ScoringSample::new(
            TraceValue::Null,
            TraceValue::from("There are many wonderful opportunities around"),
        );
        let result = metric.score(&sample).await.unwrap();
        assert_eq!(result.value, 0.0);
    }

    #[tokio::test]
    async fn test_verbs_without_structure_partial() {
        let metric = ActionabilityMetric::new();
        let sample = ScoringSample::new(
            TraceValue::Null,
            TraceValue::from("Contact the shelter and register for a shift"),
        );
        let result = metric.score(&sample).await.unwrap();
        assert!(result.value > 0.0 && result.value < 1.0);
    }

    #[tokio::test]
    async fn test_verb_count_saturates() {
        let metric = ActionabilityMetric::new();
        let sample = ScoringSample::new(
            TraceValue::Null,
            TraceValue::from("Register, email, call, visit, apply and confirm"),
        );
        let result = metric.score(&sample).await.unwrap();
        assert!((result.value - 0.6).abs() < 1e-9);
    }
}
