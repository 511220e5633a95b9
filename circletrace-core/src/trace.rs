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

//! Trace and span records
//!
//! A `TraceRecord` is one recorded execution of a named operation: input
//! captured at start, output and timing set at completion, plus an open
//! metadata bag, string tags, and an ordered tree of sub-operation spans.
//! Records are built by `circletrace-observability` and shipped to the
//! remote sink once closed.

use crate::value::TraceValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn current_timestamp_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// A nested sub-operation within a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    pub span_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<TraceValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<TraceValue>,
    pub start_time_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_us: Option<u64>,
    pub success: bool,
    /// Child spans, in the order they were opened.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<SpanRecord>,
}

impl SpanRecord {
    pub fn new(name: impl Into<String>, input: Option<TraceValue>) -> Self {
        Self {
            span_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            input,
            output: None,
            start_time_us: current_timestamp_us(),
            end_time_us: None,
            success: true,
            spans: Vec::new(),
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time_us
            .map(|end| end.saturating_sub(self.start_time_us) / 1000)
    }
}

/// One recorded execution of a named operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub name: String,
    pub input: TraceValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<TraceValue>,
    /// Open key/value bag: `duration_ms`, `success`, model name, cost,
    /// custom agent fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, TraceValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<SpanRecord>,
    pub start_time_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_us: Option<u64>,
}

impl TraceRecord {
    pub fn new(name: impl Into<String>, input: TraceValue) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            input,
            output: None,
            metadata: BTreeMap::new(),
            tags: Vec::new(),
            spans: Vec::new(),
            start_time_us: current_timestamp_us(),
            end_time_us: None,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time_us
            .map(|end| end.saturating_sub(self.start_time_us) / 1000)
    }

    /// Whether the recorded operation completed successfully. Defaults to
    /// true when the metadata flag was never set.
    pub fn success(&self) -> bool {
        self.metadata
            .get("success")
            .and_then(TraceValue::as_bool)
            .unwrap_or(true)
    }
}
