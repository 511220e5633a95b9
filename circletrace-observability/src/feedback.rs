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

//! Feedback scores
//!
//! Human- and user-supplied quality signals attached to a trace after the
//! fact, keyed by a caller-supplied trace id (not validated for
//! existence). Scores are append-only: never mutated, never deleted.
//! Scores are appended independently; when a later score in a batch fails
//! the outcome reports `success=false` with the count actually logged, and
//! there is no rollback.

use crate::ConfigurationError;
use circletrace_core::{current_timestamp_us, SinkConfig, TraceValue};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// What aspect of the output a score rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    Quality,
    Relevance,
    Helpfulness,
    Accuracy,
    Satisfaction,
    Custom,
}

/// One quality signal, 0.0-1.0, higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackScore {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub category: FeedbackCategory,
}

impl FeedbackScore {
    pub fn new(name: impl Into<String>, value: f64, category: FeedbackCategory) -> Self {
        Self {
            name: name.into(),
            value,
            reason: None,
            category,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A logged score plus its submission context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub trace_id: String,
    pub score: FeedbackScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, TraceValue>,
    pub logged_at_us: u64,
}

/// Result of a feedback submission. HTTP status mapping is left to the
/// caller: invalid input maps to 400, sink failure to 500.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub success: bool,
    pub scores_logged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeedbackOutcome {
    fn ok(scores_logged: usize) -> Self {
        Self {
            success: true,
            scores_logged,
            error: None,
        }
    }

    fn failed(scores_logged: usize, error: impl Into<String>) -> Self {
        Self {
            success: false,
            scores_logged,
            error: Some(error.into()),
        }
    }
}

enum Backend {
    Remote {
        client: reqwest::Client,
        config: SinkConfig,
    },
    Memory(RwLock<HashMap<String, Vec<FeedbackEntry>>>),
}

/// Append-only log of feedback scores.
pub struct FeedbackLog {
    backend: Backend,
}

impl FeedbackLog {
    /// Log backed by the remote sink. Unlike trace recording there is no
    /// meaningful no-op here, so an unconfigured sink is an explicit error.
    pub fn remote(config: SinkConfig) -> Result<Self, ConfigurationError> {
        if !config.is_configured() {
            return Err(ConfigurationError::MissingCredentials(
                "feedback requires an API key and workspace".to_string(),
            ));
        }
        Ok(Self {
            backend: Backend::Remote {
                client: reqwest::Client::new(),
                config,
            },
        })
    }

    /// In-process log for local deployments and tests.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(HashMap::new())),
        }
    }

    /// Append each score independently. Stops at the first delivery
    /// failure and reports how many scores made it.
    pub async fn log_feedback(
        &self,
        trace_id: &str,
        scores: Vec<FeedbackScore>,
        comment: Option<String>,
        user_id: Option<String>,
        metadata: BTreeMap<String, TraceValue>,
    ) -> FeedbackOutcome {
        if trace_id.is_empty() {
            return FeedbackOutcome::failed(0, "traceId is required");
        }
        if scores.is_empty() {
            return FeedbackOutcome::failed(0, "at least one score is required");
        }
        for score in &scores {
            if !(0.0..=1.0).contains(&score.value) {
                return FeedbackOutcome::failed(
                    0,
                    format!("score '{}' is out of range: {}", score.name, score.value),
                );
            }
        }

        let mut logged = 0;
        for score in scores {
            let entry = FeedbackEntry {
                trace_id: trace_id.to_string(),
                score,
                comment: comment.clone(),
                user_id: user_id.clone(),
                metadata: metadata.clone(),
                logged_at_us: current_timestamp_us(),
            };
            if let Err(e) = self.append(entry).await {
                warn!(trace_id, "feedback delivery failed: {}", e);
                return FeedbackOutcome::failed(logged, e);
            }
            logged += 1;
        }
        FeedbackOutcome::ok(logged)
    }

    /// Thumbs up/down convenience: value 1.0 or 0.0.
    pub async fn log_thumbs(&self, trace_id: &str, up: bool, comment: Option<String>) -> FeedbackOutcome {
        let score = FeedbackScore::new(
            "thumbs",
            if up { 1.0 } else { 0.0 },
            FeedbackCategory::Satisfaction,
        );
        self.log_feedback(trace_id, vec![score], comment, None, BTreeMap::new())
            .await
    }

    /// Star rating convenience: stars in [1,5] map linearly to
    /// (stars - 1) / 4.
    pub async fn log_star_rating(&self, trace_id: &str, stars: u8) -> FeedbackOutcome {
        if !(1..=5).contains(&stars) {
            return FeedbackOutcome::failed(0, format!("stars must be 1-5, got {}", stars));
        }
        let value = f64::from(stars - 1) / 4.0;
        let score = FeedbackScore::new("star_rating", value, FeedbackCategory::Satisfaction)
            .with_reason(format!("{} star rating", stars));
        self.log_feedback(trace_id, vec![score], None, None, BTreeMap::new())
            .await
    }

    /// One score per named dimension.
    pub async fn log_multi_dimensional(
        &self,
        trace_id: &str,
        ratings: BTreeMap<String, f64>,
        user_id: Option<String>,
    ) -> FeedbackOutcome {
        let scores = ratings
            .into_iter()
            .map(|(name, value)| FeedbackScore::new(name, value, FeedbackCategory::Custom))
            .collect();
        self.log_feedback(trace_id, scores, None, user_id, BTreeMap::new())
            .await
    }

    /// Scores logged for a trace. Only available on the in-memory backend;
    /// the remote sink owns persistence otherwise.
    pub fn scores_for(&self, trace_id: &str) -> Vec<FeedbackEntry> {
        match &self.backend {
            Backend::Memory(entries) => entries
                .read()
                .get(trace_id)
                .cloned()
                .unwrap_or_default(),
            Backend::Remote { .. } => Vec::new(),
        }
    }

    async fn append(&self, entry: FeedbackEntry) -> Result<(), String> {
        match &self.backend {
            Backend::Memory(entries) => {
                entries
                    .write()
                    .entry(entry.trace_id.clone())
                    .or_default()
                    .push(entry);
                Ok(())
            }
            Backend::Remote { client, config } => {
                let endpoint = format!(
                    "{}/v1/traces/{}/feedback-scores",
                    config.base_url, entry.trace_id
                );
                let mut request = client.post(&endpoint).json(&entry);
                if let Some(api_key) = &config.api_key {
                    request = request.header("X-Api-Key", api_key);
                }
                if let Some(workspace) = &config.workspace {
                    request = request.header("X-Workspace", workspace);
                }
                let response = request.send().await.map_err(|e| e.to_string())?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(format!("feedback rejected: HTTP {}", response.status()))
                }
            }
        }
    }
}
