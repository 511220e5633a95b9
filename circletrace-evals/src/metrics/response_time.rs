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

//! Latency scoring from the measured call duration
//!
//! Reads `duration_ms` from the sample context, which the evaluation
//! runner records around each agent call. Piecewise thresholds: under a
//! second is ideal, five seconds and beyond bottoms out at 0.2. A sample
//! without a duration scores a neutral 0.5.

use crate::{Metric, MetricError, ScoringSample};
use async_trait::async_trait;
use circletrace_core::MetricResult;

pub struct ResponseTimeMetric;

impl ResponseTimeMetric {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ResponseTimeMetric {
    fn default() -> Self {
        Self::new()
    }
}

fn score_duration(duration_ms: f64) -> f64 {
    if duration_ms < 1000.0 {
        1.0
    } else if duration_ms < 2000.0 {
        0.8
    } else if duration_ms < 3000.0 {
        0.6
    } else if duration_ms < 5000.0 {
        0.4
    } else {
        0.2
    }
}

#[async_trait]
impl Metric for ResponseTimeMetric {
    fn name(&self) -> &str {
        "response_time"
    }

    async fn score(&self, sample: &ScoringSample) -> Result<MetricResult, MetricError> {
        let Some(duration_ms) = sample.context.get("duration_ms").and_then(|v| v.as_f64())
        else {
            return Ok(MetricResult::new(self.name(), 0.5)
                .with_reason("No duration recorded for this case"));
        };

        Ok(MetricResult::new(self.name(), score_duration(duration_ms))
            .with_reason(format!("Responded in {:.0} ms", duration_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circletrace_core::TraceValue;

    #[tokio::test]
    async fn test_threshold_bands() {
        let metric = ResponseTimeMetric::new();
        for (ms, expected) in [
            (250.0, 1.0),
            (1500.0, 0.8),
            (2500.0, 0.6),
            (4000.0, 0.4),
            (9000.0, 0.2),
        ] {
            let sample = ScoringSample::new(TraceValue::Null, TraceValue::Null)
                .with_context("duration_ms", TraceValue::Number(ms));
            let result = metric.score(&sample).await.unwrap();
            assert_eq!(result.value, expected, "at {} ms", ms);
        }
    }

    #[tokio::test]
    async fn test_missing_duration_is_neutral() {
        let metric = ResponseTimeMetric::new();
        let sample = ScoringSample::new(TraceValue::Null, TraceValue::Null);
        let result = metric.score(&sample).await.unwrap();
        assert_eq!(result.value, 0.5);
    }
}
