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

//! Groundedness of the output in the provided material
//!
//! Scores the fraction of output content tokens that also appear in the
//! input or in the sample context. Tokens the source material never
//! mentioned count as potential fabrications. An output with no content
//! tokens asserts nothing and scores 1.0.

use crate::metrics::content_tokens;
use crate::{Metric, MetricError, ScoringSample};
use async_trait::async_trait;
use circletrace_core::MetricResult;
use std::collections::HashSet;

pub struct HallucinationFreedomMetric;

impl HallucinationFreedomMetric {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HallucinationFreedomMetric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Metric for HallucinationFreedomMetric {
    fn name(&self) -> &str {
        "hallucination_freedom"
    }

    async fn score(&self, sample: &ScoringSample) -> Result<MetricResult, MetricError> {
        let output_tokens = content_tokens(&sample.output.to_plain_text());
        if output_tokens.is_empty() {
            return Ok(MetricResult::new(self.name(), 1.0)
                .with_reason("Output asserts no content"));
        }

        let mut source_tokens: HashSet<String> =
            content_tokens(&sample.input.to_plain_text());
        for value in sample.context.values() {
            source_tokens.extend(content_tokens(&value.to_plain_text()));
        }

        let grounded = output_tokens
            .iter()
            .filter(|t| source_tokens.contains(*t))
            .count();
        let value = grounded as f64 / output_tokens.len() as f64;

        Ok(MetricResult::new(self.name(), value).with_reason(format!(
            "{} of {} output content tokens grounded in source material",
            grounded,
            output_tokens.len()
        )))
    }
}
