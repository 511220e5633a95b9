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

//! Evaluation datasets
//!
//! A dataset is a named, ordered collection of labeled test cases used to
//! benchmark an agent function. Datasets are append-only; correcting a bad
//! item means appending a replacement and versioning by name convention
//! ("skill-cases-v2"). Items within one dataset are expected to share a
//! compatible input/output shape, which is a caller responsibility and not
//! enforced structurally.

use crate::trace::current_timestamp_us;
use crate::value::TraceValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One labeled test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetItem {
    pub id: String,
    /// Payload mirroring what the function under test expects.
    pub input: TraceValue,
    /// Optional reference output used by accuracy-style metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<TraceValue>,
    /// Classification tags: difficulty, category, provenance.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, TraceValue>,
}

impl DatasetItem {
    pub fn new(input: TraceValue) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            input,
            expected_output: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_expected_output(mut self, expected: TraceValue) -> Self {
        self.expected_output = Some(expected);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: TraceValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A named, ordered collection of test cases. Identity is the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub items: Vec<DatasetItem>,
    pub created_at_us: u64,
    pub updated_at_us: u64,
}

impl Dataset {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = current_timestamp_us();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            items: Vec::new(),
            created_at_us: now,
            updated_at_us: now,
        }
    }

    pub fn add_item(&mut self, item: DatasetItem) {
        self.items.push(item);
        self.updated_at_us = current_timestamp_us();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
