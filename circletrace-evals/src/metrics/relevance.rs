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

//! Relevance of the output to the input
//!
//! Keyword-overlap heuristic: Jaccard similarity between the content
//! tokens of the flattened input and the flattened output.

use crate::metrics::content_tokens;
use crate::{Metric, MetricError, ScoringSample};
use async_trait::async_trait;
use circletrace_core::MetricResult;

pub struct RelevanceMetric;

impl RelevanceMetric {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RelevanceMetric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Metric for RelevanceMetric {
    fn name(&self) -> &str {
        "relevance"
    }

    async fn score(&self, sample: &ScoringSample) -> Result<MetricResult, MetricError> {
        let input_tokens = content_tokens(&sample.input.to_plain_text());
        let output_tokens = content_tokens(&sample.output.to_plain_text());

        if input_tokens.is_empty() || output_tokens.is_empty() {
            return Ok(MetricResult::new(self.name(), 0.0)
                .with_reason("Input or output has no scoreable content"));
        }

        let intersection = input_tokens.intersection(&output_tokens).count();
        let union = input_tokens.union(&output_tokens).count();
        let value = intersection as f64 / union as f64;

        Ok(MetricResult::new(self.name(), value).with_reason(format!(
            "{} of {} content tokens shared between input and output",
            intersection, union
        )))
    }
}
