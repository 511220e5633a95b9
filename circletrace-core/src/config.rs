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

//! Remote sink configuration
//!
//! Credentials and endpoint for the hosted trace/dataset/feedback sink.
//! Without an API key and workspace the sink is considered unconfigured:
//! trace recording degrades to a no-op, while dataset and feedback
//! operations (which have no meaningful no-op) surface a configuration
//! error to the caller.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://trace.impactcircle.org/api";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub api_key: Option<String>,
    pub workspace: Option<String>,
    /// Project identifier, defaults to "impact-circle" when unset.
    pub project: String,
    pub base_url: String,
    /// Kill switch; overrides credentials when false.
    pub enabled: bool,
}

impl SinkConfig {
    /// Read configuration from `CIRCLETRACE_*` environment variables.
    /// Never fails; absent credentials simply leave the sink unconfigured.
    pub fn from_env() -> Self {
        let enabled = std::env::var("CIRCLETRACE_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        Self {
            api_key: std::env::var("CIRCLETRACE_API_KEY").ok(),
            workspace: std::env::var("CIRCLETRACE_WORKSPACE").ok(),
            project: std::env::var("CIRCLETRACE_PROJECT")
                .unwrap_or_else(|_| "impact-circle".to_string()),
            base_url: std::env::var("CIRCLETRACE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            enabled,
        }
    }

    /// A config that always selects the null sink.
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            workspace: None,
            project: "impact-circle".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            enabled: false,
        }
    }

    pub fn new(
        api_key: impl Into<String>,
        workspace: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: Some(api_key.into()),
            workspace: Some(workspace.into()),
            project: "impact-circle".to_string(),
            base_url: base_url.into(),
            enabled: true,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.enabled && self.api_key.is_some() && self.workspace.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_not_configured() {
        assert!(!SinkConfig::disabled().is_configured());
    }

    #[test]
    fn test_credentials_required() {
        let mut config = SinkConfig::new("key", "workspace", DEFAULT_BASE_URL);
        assert!(config.is_configured());
        config.enabled = false;
        assert!(!config.is_configured());

        let mut config = SinkConfig::disabled();
        config.enabled = true;
        assert!(!config.is_configured());
    }
}
