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

//! Named collections of labeled test cases
//!
//! A dataset is addressed by name and append-only: items can be added but
//! never edited in place, so an evaluation result always refers to the
//! cases that were present when it ran. The store is either remote
//! (backed by the trace service REST API) or in-memory for tests and
//! offline runs.

use crate::EvalError;
use circletrace_core::{current_timestamp_us, Dataset, DatasetItem, SinkConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug)]
enum Backend {
    Remote {
        client: reqwest::Client,
        config: SinkConfig,
    },
    Memory(RwLock<HashMap<String, Dataset>>),
}

#[derive(Debug)]
pub struct DatasetStore {
    backend: Backend,
}

impl DatasetStore {
    /// Store backed by the trace service. Requires configured credentials.
    pub fn remote(config: SinkConfig) -> Result<Self, EvalError> {
        if !config.is_configured() {
            return Err(EvalError::Configuration(
                "dataset store requires an API key and workspace".to_string(),
            ));
        }
        Ok(Self {
            backend: Backend::Remote {
                client: reqwest::Client::new(),
                config,
            },
        })
    }

    /// Process-local store. Contents are lost when the store is dropped.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(HashMap::new())),
        }
    }

    /// Create an empty dataset. Names are unique per store.
    pub async fn create(&self, name: &str, description: &str) -> Result<Dataset, EvalError> {
        if name.trim().is_empty() {
            return Err(EvalError::InvalidArgument(
                "dataset name must not be empty".to_string(),
            ));
        }
        let dataset = Dataset::new(name, description);

        match &self.backend {
            Backend::Memory(datasets) => {
                let mut datasets = datasets.write();
                if datasets.contains_key(name) {
                    return Err(EvalError::InvalidArgument(format!(
                        "dataset '{}' already exists",
                        name
                    )));
                }
                datasets.insert(name.to_string(), dataset.clone());
            }
            Backend::Remote { client, config } => {
                let url = format!("{}/v1/datasets", config.base_url);
                let response = self
                    .authorized(client.post(&url), config)
                    .json(&dataset)
                    .send()
                    .await?;
                if response.status() == reqwest::StatusCode::CONFLICT {
                    return Err(EvalError::InvalidArgument(format!(
                        "dataset '{}' already exists",
                        name
                    )));
                }
                Self::check_status(response, name)?;
            }
        }
        debug!(dataset = name, "created dataset");
        Ok(dataset)
    }

    /// Append items to an existing dataset.
    pub async fn add_items(&self, name: &str, items: Vec<DatasetItem>) -> Result<(), EvalError> {
        match &self.backend {
            Backend::Memory(datasets) => {
                let mut datasets = datasets.write();
                let dataset = datasets
                    .get_mut(name)
                    .ok_or_else(|| EvalError::NotFound(format!("dataset '{}'", name)))?;
                dataset.items.extend(items);
                dataset.updated_at_us = current_timestamp_us();
            }
            Backend::Remote { client, config } => {
                let url = format!("{}/v1/datasets/{}/items", config.base_url, name);
                let response = self
                    .authorized(client.post(&url), config)
                    .json(&items)
                    .send()
                    .await?;
                Self::check_status(response, name)?;
            }
        }
        Ok(())
    }

    /// Fetch a dataset with all of its items.
    pub async fn get(&self, name: &str) -> Result<Dataset, EvalError> {
        match &self.backend {
            Backend::Memory(datasets) => datasets
                .read()
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::NotFound(format!("dataset '{}'", name))),
            Backend::Remote { client, config } => {
                let url = format!("{}/v1/datasets/{}", config.base_url, name);
                let response = self.authorized(client.get(&url), config).send().await?;
                let response = Self::check_status(response, name)?;
                Ok(response.json::<Dataset>().await?)
            }
        }
    }

    /// Remove a dataset and its items. Deleting a missing dataset is an
    /// error so typos surface.
    pub async fn delete(&self, name: &str) -> Result<(), EvalError> {
        match &self.backend {
            Backend::Memory(datasets) => {
                datasets
                    .write()
                    .remove(name)
                    .ok_or_else(|| EvalError::NotFound(format!("dataset '{}'", name)))?;
            }
            Backend::Remote { client, config } => {
                let url = format!("{}/v1/datasets/{}", config.base_url, name);
                let response = self.authorized(client.delete(&url), config).send().await?;
                Self::check_status(response, name)?;
            }
        }
        Ok(())
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        config: &SinkConfig,
    ) -> reqwest::RequestBuilder {
        let mut request = request;
        if let Some(api_key) = &config.api_key {
            request = request.header("X-Api-Key", api_key);
        }
        if let Some(workspace) = &config.workspace {
            request = request.header("X-Workspace", workspace);
        }
        request
    }

    fn check_status(
        response: reqwest::Response,
        name: &str,
    ) -> Result<reqwest::Response, EvalError> {
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EvalError::NotFound(format!("dataset '{}'", name)));
        }
        if !response.status().is_success() {
            return Err(EvalError::Sink(format!(
                "dataset request failed with status {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circletrace_core::TraceValue;

    fn item(input: &str, expected: &str) -> DatasetItem {
        DatasetItem::new(TraceValue::from(input))
            .with_expected_output(TraceValue::from(expected))
    }

    #[tokio::test]
    async fn test_memory_create_add_get() {
        let store = DatasetStore::in_memory();
        store.create("matcher-cases", "regression set").await.unwrap();
        store
            .add_items(
                "matcher-cases",
                vec![item("gardening", "garden project"), item("teaching", "tutoring")],
            )
            .await
            .unwrap();

        let dataset = store.get("matcher-cases").await.unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.description, "regression set");
    }

    #[tokio::test]
    async fn test_memory_duplicate_name_rejected() {
        let store = DatasetStore::in_memory();
        store.create("cases", "").await.unwrap();
        let err = store.create("cases", "").await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_memory_missing_dataset_not_found() {
        let store = DatasetStore::in_memory();
        assert!(matches!(
            store.get("nope").await.unwrap_err(),
            EvalError::NotFound(_)
        ));
        assert!(matches!(
            store.add_items("nope", vec![]).await.unwrap_err(),
            EvalError::NotFound(_)
        ));
        assert!(matches!(
            store.delete("nope").await.unwrap_err(),
            EvalError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_memory_delete_removes() {
        let store = DatasetStore::in_memory();
        store.create("cases", "").await.unwrap();
        store.delete("cases").await.unwrap();
        assert!(store.get("cases").await.is_err());
    }

    #[tokio::test]
    async fn test_remote_requires_configuration() {
        let err = DatasetStore::remote(SinkConfig::disabled()).unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_remote_get_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let mut dataset = Dataset::new("cases", "");
        dataset.add_item(item("in", "out"));
        let mock = server
            .mock("GET", "/v1/datasets/cases")
            .match_header("x-api-key", "key")
            .with_status(200)
            .with_body(serde_json::to_string(&dataset).unwrap())
            .create_async()
            .await;

        let config = SinkConfig::new("key", "ws", &server.url());
        let store = DatasetStore::remote(config).unwrap();
        let fetched = store.get("cases").await.unwrap();
        assert_eq!(fetched.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remote_missing_dataset_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/datasets/ghost")
            .with_status(404)
            .create_async()
            .await;

        let config = SinkConfig::new("key", "ws", &server.url());
        let store = DatasetStore::remote(config).unwrap();
        assert!(matches!(
            store.get("ghost").await.unwrap_err(),
            EvalError::NotFound(_)
        ));
    }
}
