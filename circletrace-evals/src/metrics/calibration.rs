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

//! Confidence calibration
//!
//! An agent that reports a `confidence` field should be confident when it
//! is right and hesitant when it is wrong. Scores `1 - |confidence -
//! match|`, where match is the structural similarity of the output to the
//! expected output. Without a labeled expected output the match is
//! unknown and fixed at 0.5, so extreme confidence claims are still
//! penalized. An output with no confidence field scores 0.0.

use crate::metrics::accuracy::structural_similarity;
use crate::{Metric, MetricError, ScoringSample};
use async_trait::async_trait;
use circletrace_core::MetricResult;

pub struct ConfidenceCalibrationMetric;

impl ConfidenceCalibrationMetric {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConfidenceCalibrationMetric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Metric for ConfidenceCalibrationMetric {
    fn name(&self) -> &str {
        "confidence_calibration"
    }

    async fn score(&self, sample: &ScoringSample) -> Result<MetricResult, MetricError> {
        let Some(confidence) = sample
            .output
            .get("confidence")
            .and_then(|v| v.as_f64())
        else {
            return Ok(MetricResult::new(self.name(), 0.0)
                .with_reason("Output reports no confidence"));
        };
        let confidence = confidence.clamp(0.0, 1.0);

        let match_score = match &sample.expected_output {
            Some(expected) => structural_similarity(&sample.output, expected),
            None => 0.5,
        };
        let value = 1.0 - (confidence - match_score).abs();

        Ok(MetricResult::new(self.name(), value).with_reason(format!(
            "Confidence {:.2} against match {:.2}",
            confidence, match_score
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circletrace_core::TraceValue;
    use std::collections::BTreeMap;

    fn verdict(approved: bool, confidence: f64) -> TraceValue {
        let mut map = BTreeMap::new();
        map.insert("approved".to_string(), TraceValue::Bool(approved));
        map.insert("confidence".to_string(), TraceValue::Number(confidence));
        TraceValue::Map(map)
    }

    #[tokio::test]
    async fn test_confident_and_correct_scores_one() {
        let metric = ConfidenceCalibrationMetric::new();
        let sample = ScoringSample::new(TraceValue::Null, verdict(true, 1.0))
            .with_expected_output(verdict(true, 1.0));
        let result = metric.score(&sample).await.unwrap();
        assert_eq!(result.value, 1.0);
    }

    #[tokio::test]
    async fn test_confident_and_wrong_penalized() {
        let metric = ConfidenceCalibrationMetric::new();
        let mut expected = BTreeMap::new();
        expected.insert("approved".to_string(), TraceValue::Bool(true));
        let sample = ScoringSample::new(TraceValue::Null, verdict(false, 1.0))
            .with_expected_output(TraceValue::Map(expected));
        let result = metric.score(&sample).await.unwrap();
        assert!(result.value < 0.5);
    }

    #[tokio::test]
    async fn test_no_confidence_scores_zero() {
        let metric = ConfidenceCalibrationMetric::new();
        let sample = ScoringSample::new(TraceValue::Null, TraceValue::from("sure!"));
        let result = metric.score(&sample).await.unwrap();
        assert_eq!(result.value, 0.0);
    }

    #[tokio::test]
    async fn test_unlabeled_case_uses_neutral_match() {
        let metric = ConfidenceCalibrationMetric::new();
        let sample = ScoringSample::new(TraceValue::Null, verdict(true, 0.5));
        let result = metric.score(&sample).await.unwrap();
        assert_eq!(result.value, 1.0);
    }
}
