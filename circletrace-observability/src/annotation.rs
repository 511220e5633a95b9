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

//! Human review queues
//!
//! Low-confidence or flagged agent outputs are routed into named queues
//! for human annotation. The routing rules are independent of each other:
//! one output can land in several queues from a single call.

use circletrace_core::{current_timestamp_us, TraceValue};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

pub const LOW_CONFIDENCE_QUEUE: &str = "low-confidence";
pub const SAFETY_FLAGS_QUEUE: &str = "safety-flags";
pub const IMPACT_VALIDATION_QUEUE: &str = "impact-validation";

/// Confidence below this routes to the low-confidence queue.
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// One output awaiting human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: String,
    pub agent_name: String,
    pub input: TraceValue,
    pub output: TraceValue,
    /// Why this item was queued.
    pub reason: String,
    pub queued_at_us: u64,
}

impl ReviewItem {
    fn new(agent_name: &str, input: &TraceValue, output: &TraceValue, reason: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_name: agent_name.to_string(),
            input: input.clone(),
            output: output.clone(),
            reason,
            queued_at_us: current_timestamp_us(),
        }
    }
}

/// Named FIFO review queues.
#[derive(Default)]
pub struct AnnotationQueue {
    queues: RwLock<HashMap<String, VecDeque<ReviewItem>>>,
}

impl AnnotationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue into an explicitly named queue.
    pub fn enqueue(&self, queue: &str, item: ReviewItem) {
        self.queues
            .write()
            .entry(queue.to_string())
            .or_default()
            .push_back(item);
    }

    /// Apply the automatic routing rules. Returns the queue names the
    /// output was routed to, possibly empty, possibly several.
    pub fn auto_queue_for_review(
        &self,
        agent_name: &str,
        input: &TraceValue,
        output: &TraceValue,
        confidence: Option<f64>,
    ) -> Vec<String> {
        let mut routed = Vec::new();

        if let Some(confidence) = confidence {
            if confidence < LOW_CONFIDENCE_THRESHOLD {
                self.enqueue(
                    LOW_CONFIDENCE_QUEUE,
                    ReviewItem::new(
                        agent_name,
                        input,
                        output,
                        format!("confidence {:.2} below {}", confidence, LOW_CONFIDENCE_THRESHOLD),
                    ),
                );
                routed.push(LOW_CONFIDENCE_QUEUE.to_string());
            }
        }

        let flags = output
            .get("flags")
            .and_then(TraceValue::as_list)
            .unwrap_or(&[]);
        if !flags.is_empty() {
            self.enqueue(
                SAFETY_FLAGS_QUEUE,
                ReviewItem::new(
                    agent_name,
                    input,
                    output,
                    format!("{} safety flag(s) raised", flags.len()),
                ),
            );
            routed.push(SAFETY_FLAGS_QUEUE.to_string());
        }

        if is_impact_validator(agent_name) && is_rejected(output) {
            self.enqueue(
                IMPACT_VALIDATION_QUEUE,
                ReviewItem::new(
                    agent_name,
                    input,
                    output,
                    "impact validation rejected".to_string(),
                ),
            );
            routed.push(IMPACT_VALIDATION_QUEUE.to_string());
        }

        routed
    }

    /// Number of items waiting in a queue.
    pub fn pending(&self, queue: &str) -> usize {
        self.queues.read().get(queue).map_or(0, VecDeque::len)
    }

    /// Take up to `n` items from the front of a queue.
    pub fn take(&self, queue: &str, n: usize) -> Vec<ReviewItem> {
        let mut queues = self.queues.write();
        let Some(items) = queues.get_mut(queue) else {
            return Vec::new();
        };
        let n = n.min(items.len());
        items.drain(..n).collect()
    }

    /// Names of all queues that have ever received an item.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn is_impact_validator(agent_name: &str) -> bool {
    let normalized = agent_name.to_lowercase().replace('_', "-");
    normalized.contains("impact") && normalized.contains("valid")
}

fn is_rejected(output: &TraceValue) -> bool {
    if output.get("approved").and_then(TraceValue::as_bool) == Some(false) {
        return true;
    }
    matches!(
        output.get("status").and_then(TraceValue::as_str),
        Some("rejected")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn map(entries: Vec<(&str, TraceValue)>) -> TraceValue {
        TraceValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_low_confidence_routing() {
        let queue = AnnotationQueue::new();
        let routed = queue.auto_queue_for_review(
            "skill-matcher",
            &TraceValue::from("input"),
            &TraceValue::from("output"),
            Some(0.4),
        );
        assert_eq!(routed, vec![LOW_CONFIDENCE_QUEUE.to_string()]);
        assert_eq!(queue.pending(LOW_CONFIDENCE_QUEUE), 1);
    }

    #[test]
    fn test_confident_output_is_not_queued() {
        let queue = AnnotationQueue::new();
        let routed = queue.auto_queue_for_review(
            "skill-matcher",
            &TraceValue::from("input"),
            &TraceValue::from("output"),
            Some(0.9),
        );
        assert!(routed.is_empty());

        // Missing confidence is not low confidence.
        let routed = queue.auto_queue_for_review(
            "skill-matcher",
            &TraceValue::from("input"),
            &TraceValue::from("output"),
            None,
        );
        assert!(routed.is_empty());
    }

    #[test]
    fn test_safety_flags_routing() {
        let queue = AnnotationQueue::new();
        let output = map(vec![(
            "flags",
            TraceValue::List(vec![TraceValue::from("pii")]),
        )]);
        let routed =
            queue.auto_queue_for_review("action-planner", &TraceValue::Null, &output, Some(0.95));
        assert_eq!(routed, vec![SAFETY_FLAGS_QUEUE.to_string()]);
    }

    #[test]
    fn test_impact_validator_rejection_routing() {
        let queue = AnnotationQueue::new();
        let output = map(vec![("approved", TraceValue::Bool(false))]);
        let routed =
            queue.auto_queue_for_review("impact-validator", &TraceValue::Null, &output, None);
        assert_eq!(routed, vec![IMPACT_VALIDATION_QUEUE.to_string()]);

        // The same output from another agent does not route.
        let routed =
            queue.auto_queue_for_review("engagement-coach", &TraceValue::Null, &output, None);
        assert!(routed.is_empty());
    }

    #[test]
    fn test_rules_are_independent() {
        let queue = AnnotationQueue::new();
        let output = map(vec![
            ("status", TraceValue::from("rejected")),
            ("flags", TraceValue::List(vec![TraceValue::from("spam")])),
        ]);
        let routed =
            queue.auto_queue_for_review("impact_validator", &TraceValue::Null, &output, Some(0.2));
        assert_eq!(routed.len(), 3);
        assert_eq!(queue.pending(LOW_CONFIDENCE_QUEUE), 1);
        assert_eq!(queue.pending(SAFETY_FLAGS_QUEUE), 1);
        assert_eq!(queue.pending(IMPACT_VALIDATION_QUEUE), 1);
    }

    #[test]
    fn test_take_drains_fifo() {
        let queue = AnnotationQueue::new();
        for confidence in [0.1, 0.2, 0.3] {
            queue.auto_queue_for_review(
                "skill-matcher",
                &TraceValue::from(confidence),
                &TraceValue::Null,
                Some(confidence),
            );
        }
        let taken = queue.take(LOW_CONFIDENCE_QUEUE, 2);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].input.as_f64(), Some(0.1));
        assert_eq!(queue.pending(LOW_CONFIDENCE_QUEUE), 1);
        assert!(queue.take("empty-queue", 5).is_empty());
    }
}
