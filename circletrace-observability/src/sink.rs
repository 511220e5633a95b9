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

//! Trace sink capability
//!
//! Delivery of closed traces is modeled as a capability with two variants:
//! [`ActiveSink`](crate::batcher::ActiveSink) batches records and drains
//! them to the remote REST endpoint in the background, [`NullSink`] drops
//! them. The variant is selected once at startup from [`SinkConfig`];
//! components depend on the trait, never on an "is configured" flag.

use async_trait::async_trait;
use circletrace_core::{SinkConfig, TraceRecord};
use std::sync::Arc;

use crate::batcher::{ActiveSink, BatcherConfig};

/// Destination for closed trace records.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Whether records are actually delivered anywhere.
    fn is_active(&self) -> bool {
        true
    }

    /// Queue one closed trace for delivery. Non-blocking and infallible
    /// from the caller's point of view: delivery failures are logged by
    /// the sink, never raised.
    fn submit(&self, trace: TraceRecord);

    /// Drain everything queued so far. Shutdown paths call this to avoid
    /// losing the tail of the queue.
    async fn flush_and_wait(&self);
}

/// Sink that drops every record. Selected when the remote sink is not
/// configured.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl TraceSink for NullSink {
    fn is_active(&self) -> bool {
        false
    }

    fn submit(&self, _trace: TraceRecord) {}

    async fn flush_and_wait(&self) {}
}

/// Select the sink variant for this process.
pub fn sink_from_config(config: &SinkConfig) -> Arc<dyn TraceSink> {
    if config.is_configured() {
        Arc::new(ActiveSink::spawn(config.clone(), BatcherConfig::default()))
    } else {
        tracing::debug!("trace sink not configured, recording is a no-op");
        Arc::new(NullSink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circletrace_core::TraceValue;

    #[tokio::test]
    async fn test_null_sink_is_inert() {
        let sink = NullSink;
        assert!(!sink.is_active());
        sink.submit(TraceRecord::new("op", TraceValue::Null));
        sink.flush_and_wait().await;
    }

    #[tokio::test]
    async fn test_selection_follows_configuration() {
        let sink = sink_from_config(&SinkConfig::disabled());
        assert!(!sink.is_active());

        let sink = sink_from_config(&SinkConfig::new("key", "ws", "http://localhost:9"));
        assert!(sink.is_active());
        sink.flush_and_wait().await;
    }
}
