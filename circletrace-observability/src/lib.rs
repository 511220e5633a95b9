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

//! # Circletrace Observability
//!
//! Trace recording for the Impact Circle agent layer.
//!
//! The entry point is [`TraceRecorder`]: it wraps one unit of work, records
//! a structured [`circletrace_core::TraceRecord`] (timing, output, success,
//! tags, nested spans), and queues the closed record on a [`TraceSink`] for
//! fire-and-forget delivery. With no sink configured everything degrades to
//! a no-op that still runs the wrapped function: instrumentation observes
//! behavior, it never changes it.
//!
//! The crate also carries the human-signal surfaces that attach to traces
//! after the fact: [`FeedbackLog`] for user quality scores and
//! [`AnnotationQueue`] for routing flagged outputs into review queues.

pub mod annotation;
pub mod batcher;
pub mod feedback;
pub mod recorder;
pub mod sink;

pub use annotation::{
    AnnotationQueue, ReviewItem, IMPACT_VALIDATION_QUEUE, LOW_CONFIDENCE_QUEUE, SAFETY_FLAGS_QUEUE,
};
pub use batcher::{ActiveSink, BatcherConfig};
pub use feedback::{FeedbackCategory, FeedbackEntry, FeedbackLog, FeedbackOutcome, FeedbackScore};
pub use recorder::{SpanHandle, TraceHandle, TraceRecorder};
pub use sink::{sink_from_config, NullSink, TraceSink};

use thiserror::Error;

/// Errors surfaced by the recording layer. Only `OpenSpans` ever reaches a
/// caller; sink failures are logged and swallowed.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Closing a trace while child spans are still open loses their data,
    /// so it fails loudly instead of silently dropping the spans.
    #[error("trace has {0} open span(s), close them before ending the trace")]
    OpenSpans(usize),
}

/// Raised by surfaces that have no meaningful no-op (feedback logging)
/// when the remote sink credentials are absent.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("remote sink is not configured: {0}")]
    MissingCredentials(String),
}
