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

//! # Circletrace Core
//!
//! Shared data model for the Impact Circle trace-and-evaluate core:
//! trace payload values, trace and span records, evaluation datasets,
//! metric/evaluation/experiment result types, model pricing, and the
//! remote sink configuration.
//!
//! This crate holds contracts only. The recording, scoring, and budget
//! machinery lives in `circletrace-observability`, `circletrace-evals`,
//! and `circletrace-budget`.

pub mod config;
pub mod dataset;
pub mod eval;
pub mod pricing;
pub mod trace;
pub mod value;

pub use config::SinkConfig;
pub use dataset::{Dataset, DatasetItem};
pub use eval::{
    EvaluationCaseResult, EvaluationResult, ExperimentResult, MetricRanking, MetricResult,
    QuickCompareResult, RankedVariant, VariantOutcome, Winner, WinnerReport,
};
pub use pricing::{ModelPricing, PricingTable};
pub use trace::{current_timestamp_us, SpanRecord, TraceRecord};
pub use value::TraceValue;
