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

//! Personalization: does the output engage with the volunteer's profile?
//!
//! Treats each string leaf of the input as one profile detail (a skill,
//! an availability window, a location) and scores the fraction of details
//! the output references by token overlap. An input with no string leaves
//! gives the metric nothing to check, which scores a neutral 0.5.

use crate::metrics::content_tokens;
use crate::{Metric, MetricError, ScoringSample};
use async_trait::async_trait;
use circletrace_core::MetricResult;

pub struct PersonalizationMetric;

impl PersonalizationMetric {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PersonalizationMetric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Metric for PersonalizationMetric {
    fn name(&self) -> &str {
        "personalization"
    }

    async fn score(&self, sample: &ScoringSample) -> Result<MetricResult, MetricError> {
        let details: Vec<&str> = sample
            .input
            .string_leaves()
            .into_iter()
            .filter(|leaf| !content_tokens(leaf).is_empty())
            .collect();

        if details.is_empty() {
            return Ok(MetricResult::new(self.name(), 0.5)
                .with_reason("Input carries no profile details to personalize against"));
        }

        let output_tokens = content_tokens(&sample.output.to_plain_text());
        let referenced = details
            .iter()
            .filter(|detail| {
                content_tokens(detail)
                    .iter()
                    .any(|t| output_tokens.contains(t))
            })
            .count();
        let value = referenced as f64 / details.len() as f64;

        Ok(MetricResult::new(self.name(), value).with_reason(format!(
            "{} of {} profile details referenced in the output",
            referenced,
            details.len()
        )))
    }
}
