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

//! # Circletrace Budget
//!
//! Per-agent model spend tracking with daily and monthly budget windows.
//!
//! Charges are priced from the model pricing table in `circletrace-core`
//! and accumulated per agent. Crossing a UTC day or month boundary resets
//! the corresponding window; nothing here ever blocks a call, it only
//! reports whether the spend stayed within budget and raises alert
//! strings for the caller to surface.

mod registry;

pub use registry::{
    BudgetLimits, BudgetRegistry, BudgetStatus, ChargeOutcome, ChargeRecord, HISTORY_LIMIT,
};
