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

//! Accuracy against the expected output
//!
//! Compares output and expected output structurally rather than over a
//! serialized form, so map key ordering cannot depress the score. String
//! leaves are compared case-insensitively by normalized edit distance
//! (1.0 = identical); containers average over their elements. A case with
//! no expected output scores 0.0, which is a data gap, not an error.

use crate::{Metric, MetricError, ScoringSample};
use async_trait::async_trait;
use circletrace_core::{MetricResult, TraceValue};

pub struct AccuracyMetric;

impl AccuracyMetric {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AccuracyMetric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Metric for AccuracyMetric {
    fn name(&self) -> &str {
        "accuracy"
    }

    async fn score(&self, sample: &ScoringSample) -> Result<MetricResult, MetricError> {
        let Some(expected) = &sample.expected_output else {
            return Ok(MetricResult::new(self.name(), 0.0)
                .with_reason("No expected output to compare against"));
        };

        let value = structural_similarity(&sample.output, expected);
        let reason = if value >= 1.0 {
            "Output matches expected output".to_string()
        } else {
            format!("Structural similarity to expected output: {:.2}", value)
        };
        Ok(MetricResult::new(self.name(), value).with_reason(reason))
    }
}

/// Recursive structural similarity in [0, 1].
///
/// - scalars of different kinds score 0
/// - strings: 1 - editDistance / max(len), case-insensitive
/// - numbers and booleans: exact match
/// - lists: mean pairwise similarity over the longer length
/// - maps: mean similarity over the union of keys, missing keys score 0
pub fn structural_similarity(a: &TraceValue, b: &TraceValue) -> f64 {
    match (a, b) {
        (TraceValue::Null, TraceValue::Null) => 1.0,
        (TraceValue::Bool(x), TraceValue::Bool(y)) => {
            if x == y {
                1.0
            } else {
                0.0
            }
        }
        (TraceValue::Number(x), TraceValue::Number(y)) => {
            if (x - y).abs() < 1e-9 {
                1.0
            } else {
                0.0
            }
        }
        (TraceValue::String(x), TraceValue::String(y)) => string_similarity(x, y),
        (TraceValue::List(xs), TraceValue::List(ys)) => {
            let len = xs.len().max(ys.len());
            if len == 0 {
                return 1.0;
            }
            let mut sum = 0.0;
            for i in 0..len {
                match (xs.get(i), ys.get(i)) {
                    (Some(x), Some(y)) => sum += structural_similarity(x, y),
                    _ => {}
                }
            }
            sum / len as f64
        }
        (TraceValue::Map(xs), TraceValue::Map(ys)) => {
            let keys: std::collections::BTreeSet<&String> =
                xs.keys().chain(ys.keys()).collect();
            if keys.is_empty() {
                return 1.0;
            }
            let mut sum = 0.0;
            for key in &keys {
                if let (Some(x), Some(y)) = (xs.get(*key), ys.get(*key)) {
                    sum += structural_similarity(x, y);
                }
            }
            sum / keys.len() as f64
        }
        _ => 0.0,
    }
}

/// `1 - editDistance(a, b) / max(len)`, case-insensitive, over characters.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / max_len as f64
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
