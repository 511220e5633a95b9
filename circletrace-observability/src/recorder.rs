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

//! Trace recorder
//!
//! Wraps one unit of work and produces a closed [`TraceRecord`]. The
//! primary integration point is [`TraceRecorder::trace_call`], which wraps
//! an arbitrary async function in the full start -> invoke -> end-or-fail
//! sequence and returns the function's result unchanged. Business errors
//! always propagate to the caller after being recorded; instrumentation
//! errors never do.
//!
//! Lifecycle rules:
//! - `end`/`fail` close a trace at most once; later calls are no-ops.
//! - spans may close in any order, but every span must close before its
//!   owning trace ends. `end` on a trace with open spans fails loudly
//!   instead of silently dropping their data.
//! - `fail` force-closes open spans as failed so that errored traces
//!   still flush.

use circletrace_core::{current_timestamp_us, SpanRecord, TraceRecord, TraceValue};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::sink::{sink_from_config, NullSink, TraceSink};
use crate::TraceError;

struct SpanSlot {
    record: SpanRecord,
    closed: bool,
    children: Vec<Arc<Mutex<SpanSlot>>>,
}

impl SpanSlot {
    fn new(name: &str, input: Option<TraceValue>) -> Self {
        Self {
            record: SpanRecord::new(name, input),
            closed: false,
            children: Vec::new(),
        }
    }

    fn open_count(&self) -> usize {
        let own = usize::from(!self.closed);
        own + self
            .children
            .iter()
            .map(|c| c.lock().open_count())
            .sum::<usize>()
    }

    fn force_close(&mut self, now: u64) {
        if !self.closed {
            self.closed = true;
            self.record.success = false;
            self.record.end_time_us = Some(now);
        }
        for child in &self.children {
            child.lock().force_close(now);
        }
    }

    fn to_record(&self) -> SpanRecord {
        let mut record = self.record.clone();
        record.spans = self.children.iter().map(|c| c.lock().to_record()).collect();
        record
    }
}

struct TraceState {
    record: TraceRecord,
    closed: bool,
    children: Vec<Arc<Mutex<SpanSlot>>>,
}

impl TraceState {
    fn collect_spans(&mut self) {
        self.record.spans = self.children.iter().map(|c| c.lock().to_record()).collect();
    }

    fn close(&mut self, output: TraceValue, success: bool, extra: BTreeMap<String, TraceValue>) {
        let now = current_timestamp_us();
        self.record.end_time_us = Some(now);
        self.record.output = Some(output);
        self.record
            .metadata
            .insert("success".to_string(), TraceValue::Bool(success));
        let duration_ms = now.saturating_sub(self.record.start_time_us) / 1000;
        self.record.metadata.insert(
            "duration_ms".to_string(),
            TraceValue::Number(duration_ms as f64),
        );
        self.record.metadata.extend(extra);
        self.collect_spans();
        self.closed = true;
    }
}

/// Handle to one in-flight trace.
pub struct TraceHandle {
    state: Arc<Mutex<TraceState>>,
    sink: Arc<dyn TraceSink>,
}

impl TraceHandle {
    /// Close the trace successfully and queue it for delivery.
    ///
    /// Idempotent: a second `end` or `fail` on a closed trace has no
    /// effect. Fails with [`TraceError::OpenSpans`] when child spans are
    /// still open; close them first and call `end` again.
    pub fn end(&self, output: TraceValue) -> Result<(), TraceError> {
        self.end_with_metadata(output, BTreeMap::new())
    }

    /// `end` with extra metadata merged into the record.
    pub fn end_with_metadata(
        &self,
        output: TraceValue,
        extra: BTreeMap<String, TraceValue>,
    ) -> Result<(), TraceError> {
        let record = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            let open: usize = state
                .children
                .iter()
                .map(|c| c.lock().open_count())
                .sum();
            if open > 0 {
                return Err(TraceError::OpenSpans(open));
            }
            state.close(output, true, extra);
            state.record.clone()
        };
        self.sink.submit(record);
        Ok(())
    }

    /// Close the trace as failed, recording the error message as output.
    /// Open spans are force-closed as failed so the trace still flushes.
    pub fn fail(&self, error: impl Into<String>) {
        let record = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            let now = current_timestamp_us();
            for child in &state.children {
                child.lock().force_close(now);
            }
            state.close(
                TraceValue::String(error.into()),
                false,
                BTreeMap::new(),
            );
            state.record.clone()
        };
        self.sink.submit(record);
    }

    /// Open a sub-operation span. A span opened after the trace closed is
    /// an inert handle; its updates are never flushed.
    pub fn span(&self, name: &str, input: Option<TraceValue>) -> SpanHandle {
        let slot = Arc::new(Mutex::new(SpanSlot::new(name, input)));
        let mut state = self.state.lock();
        if state.closed {
            warn!(span = name, "span opened on a closed trace, ignoring");
        } else {
            state.children.push(Arc::clone(&slot));
        }
        SpanHandle { slot }
    }

    pub fn trace_id(&self) -> String {
        self.state.lock().record.trace_id.clone()
    }
}

/// Handle to one in-flight span. Same end/fail contract as a trace,
/// nestable via [`SpanHandle::span`].
pub struct SpanHandle {
    slot: Arc<Mutex<SpanSlot>>,
}

impl SpanHandle {
    pub fn end(&self, output: Option<TraceValue>) {
        let mut slot = self.slot.lock();
        if slot.closed {
            return;
        }
        slot.closed = true;
        slot.record.success = true;
        slot.record.output = output;
        slot.record.end_time_us = Some(current_timestamp_us());
    }

    pub fn fail(&self, error: impl Into<String>) {
        let mut slot = self.slot.lock();
        if slot.closed {
            return;
        }
        slot.closed = true;
        slot.record.success = false;
        slot.record.output = Some(TraceValue::String(error.into()));
        slot.record.end_time_us = Some(current_timestamp_us());
    }

    /// Open a nested child span. Inert if this span already closed.
    pub fn span(&self, name: &str, input: Option<TraceValue>) -> SpanHandle {
        let child = Arc::new(Mutex::new(SpanSlot::new(name, input)));
        let mut slot = self.slot.lock();
        if slot.closed {
            warn!(span = name, "span opened on a closed parent span, ignoring");
        } else {
            slot.children.push(Arc::clone(&child));
        }
        SpanHandle { slot: child }
    }
}

/// Records traces and hands closed records to the configured sink.
#[derive(Clone)]
pub struct TraceRecorder {
    sink: Arc<dyn TraceSink>,
}

impl TraceRecorder {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink }
    }

    /// Build a recorder from `CIRCLETRACE_*` environment configuration.
    /// Must run inside a tokio runtime when the sink is configured.
    pub fn from_env() -> Self {
        Self::new(sink_from_config(&circletrace_core::SinkConfig::from_env()))
    }

    /// Recorder whose traces go nowhere.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullSink))
    }

    pub fn start_trace(
        &self,
        name: &str,
        input: TraceValue,
        metadata: BTreeMap<String, TraceValue>,
        tags: Vec<String>,
    ) -> TraceHandle {
        let mut record = TraceRecord::new(name, input);
        record.metadata = metadata;
        record.tags = tags;
        TraceHandle {
            state: Arc::new(Mutex::new(TraceState {
                record,
                closed: false,
                children: Vec::new(),
            })),
            sink: Arc::clone(&self.sink),
        }
    }

    /// Wrap an async operation in a trace. Returns the operation's result
    /// unchanged; the error, if any, is recorded on the trace and then
    /// rethrown. Sink problems never reach the caller.
    pub async fn trace_call<T, E, F, Fut>(
        &self,
        name: &str,
        input: TraceValue,
        f: F,
    ) -> Result<T, E>
    where
        T: Serialize,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.trace_call_with_metadata(name, input, BTreeMap::new(), f)
            .await
    }

    /// [`trace_call`](Self::trace_call) with caller-supplied metadata
    /// recorded on the trace: model name, cost, custom agent fields.
    pub async fn trace_call_with_metadata<T, E, F, Fut>(
        &self,
        name: &str,
        input: TraceValue,
        metadata: BTreeMap<String, TraceValue>,
        f: F,
    ) -> Result<T, E>
    where
        T: Serialize,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let handle = self.start_trace(
            name,
            input,
            metadata,
            vec!["agent".to_string(), name.to_string()],
        );

        match f().await {
            Ok(value) => {
                let output = serde_json::to_value(&value)
                    .map(TraceValue::from_json)
                    .unwrap_or(TraceValue::Null);
                if let Err(e) = handle.end(output) {
                    warn!(operation = name, "failed to close trace: {}", e);
                }
                Ok(value)
            }
            Err(error) => {
                handle.fail(error.to_string());
                Err(error)
            }
        }
    }

    /// Drain the sink queue; shutdown paths call this before exiting.
    pub async fn flush_and_wait(&self) {
        self.sink.flush_and_wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<TraceRecord>>,
    }

    impl RecordingSink {
        fn records(&self) -> Vec<TraceRecord> {
            self.records.lock().clone()
        }
    }

    #[async_trait]
    impl TraceSink for RecordingSink {
        fn submit(&self, trace: TraceRecord) {
            self.records.lock().push(trace);
        }

        async fn flush_and_wait(&self) {}
    }

    fn recording_recorder() -> (TraceRecorder, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (TraceRecorder::new(sink.clone()), sink)
    }

    #[test]
    fn test_idempotent_close() {
        let (recorder, sink) = recording_recorder();
        let handle = recorder.start_trace("op", TraceValue::Null, BTreeMap::new(), vec![]);
        handle.end(TraceValue::from("done")).unwrap();
        handle.end(TraceValue::from("again")).unwrap();
        handle.fail("too late");

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].success());
        assert_eq!(
            records[0].output.as_ref().and_then(|v| v.as_str()),
            Some("done")
        );
    }

    #[test]
    fn test_fail_records_error_as_output() {
        let (recorder, sink) = recording_recorder();
        let handle = recorder.start_trace("op", TraceValue::Null, BTreeMap::new(), vec![]);
        handle.fail("model timed out");

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success());
        assert_eq!(
            records[0].output.as_ref().and_then(|v| v.as_str()),
            Some("model timed out")
        );
    }

    #[test]
    fn test_end_with_open_span_fails_loudly() {
        let (recorder, sink) = recording_recorder();
        let handle = recorder.start_trace("op", TraceValue::Null, BTreeMap::new(), vec![]);
        let span = handle.span("model-call", None);

        let err = handle.end(TraceValue::Null).unwrap_err();
        assert!(matches!(err, TraceError::OpenSpans(1)));
        assert!(sink.records().is_empty());

        span.end(Some(TraceValue::from("ok")));
        handle.end(TraceValue::Null).unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spans.len(), 1);
        assert!(records[0].spans[0].success);
    }

    #[test]
    fn test_fail_force_closes_open_spans() {
        let (recorder, sink) = recording_recorder();
        let handle = recorder.start_trace("op", TraceValue::Null, BTreeMap::new(), vec![]);
        let _span = handle.span("model-call", None);
        handle.fail("boom");

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spans.len(), 1);
        assert!(!records[0].spans[0].success);
        assert!(records[0].spans[0].end_time_us.is_some());
    }

    #[test]
    fn test_nested_spans() {
        let (recorder, sink) = recording_recorder();
        let handle = recorder.start_trace("op", TraceValue::Null, BTreeMap::new(), vec![]);
        let outer = handle.span("plan", None);
        let inner = outer.span("parse", Some(TraceValue::from("raw")));
        // Spans may close out of opening order.
        inner.end(None);
        outer.end(None);
        handle.end(TraceValue::Null).unwrap();

        let records = sink.records();
        assert_eq!(records[0].spans.len(), 1);
        assert_eq!(records[0].spans[0].name, "plan");
        assert_eq!(records[0].spans[0].spans.len(), 1);
        assert_eq!(records[0].spans[0].spans[0].name, "parse");
    }

    #[test]
    fn test_span_after_close_is_inert() {
        let (recorder, sink) = recording_recorder();
        let handle = recorder.start_trace("op", TraceValue::Null, BTreeMap::new(), vec![]);
        handle.end(TraceValue::Null).unwrap();

        let late = handle.span("too-late", None);
        late.end(None);
        assert!(sink.records()[0].spans.is_empty());
    }

    #[tokio::test]
    async fn test_trace_call_transparency_with_null_sink() {
        let recorder = TraceRecorder::disabled();

        let ok: Result<i32, String> = recorder
            .trace_call("op", TraceValue::Null, || async { Ok(41 + 1) })
            .await;
        assert_eq!(ok.unwrap(), 42);

        let err: Result<i32, String> = recorder
            .trace_call("op", TraceValue::Null, || async {
                Err("bad input".to_string())
            })
            .await;
        assert_eq!(err.unwrap_err(), "bad input");
    }

    #[tokio::test]
    async fn test_trace_call_records_success_metadata() {
        let (recorder, sink) = recording_recorder();
        let result: Result<Vec<u32>, String> = recorder
            .trace_call("skill-matcher", TraceValue::from("query"), || async {
                Ok(vec![1, 2])
            })
            .await;
        assert!(result.is_ok());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.success());
        assert!(record.metadata.contains_key("duration_ms"));
        assert!(record.tags.contains(&"agent".to_string()));
        assert_eq!(
            record.output,
            Some(TraceValue::List(vec![1.0.into(), 2.0.into()]))
        );
    }

    #[tokio::test]
    async fn test_trace_call_keeps_caller_metadata() {
        let (recorder, sink) = recording_recorder();
        let metadata = BTreeMap::from([
            (
                "model".to_string(),
                TraceValue::from("gemini-1.5-flash"),
            ),
            ("cost_usd".to_string(), TraceValue::Number(0.0021)),
        ]);
        let result: Result<i32, String> = recorder
            .trace_call_with_metadata("skill-matcher", TraceValue::Null, metadata, || async {
                Ok(7)
            })
            .await;
        assert!(result.is_ok());

        let records = sink.records();
        let record = &records[0];
        assert_eq!(
            record.metadata.get("model").and_then(|v| v.as_str()),
            Some("gemini-1.5-flash")
        );
        assert_eq!(
            record.metadata.get("cost_usd").and_then(|v| v.as_f64()),
            Some(0.0021)
        );
        // Lifecycle fields are still written alongside the caller's.
        assert!(record.success());
        assert!(record.metadata.contains_key("duration_ms"));
    }

    #[tokio::test]
    async fn test_trace_call_records_failure_and_rethrows() {
        let (recorder, sink) = recording_recorder();
        let result: Result<i32, String> = recorder
            .trace_call("op", TraceValue::Null, || async {
                Err("exploded".to_string())
            })
            .await;
        assert_eq!(result.unwrap_err(), "exploded");

        let records = sink.records();
        assert!(!records[0].success());
        assert_eq!(
            records[0].output.as_ref().and_then(|v| v.as_str()),
            Some("exploded")
        );
    }
}
