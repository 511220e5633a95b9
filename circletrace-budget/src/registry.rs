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

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use circletrace_core::PricingTable;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Charges kept per agent, oldest evicted first.
pub const HISTORY_LIMIT: usize = 1000;

/// Budget limits for one agent. Both windows are optional; an agent with
/// a daily limit only is never flagged on monthly spend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub daily_usd: Option<f64>,
    pub monthly_usd: Option<f64>,
    /// Fraction of a window at which a warning alert fires, in (0, 1].
    pub alert_threshold: f64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            daily_usd: None,
            monthly_usd: None,
            alert_threshold: 0.8,
        }
    }
}

impl BudgetLimits {
    pub fn daily(limit_usd: f64) -> Self {
        Self {
            daily_usd: Some(limit_usd),
            ..Self::default()
        }
    }

    pub fn with_monthly(mut self, limit_usd: f64) -> Self {
        self.monthly_usd = Some(limit_usd);
        self
    }

    pub fn with_alert_threshold(mut self, threshold: f64) -> Self {
        self.alert_threshold = threshold;
        self
    }
}

/// One priced model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub charged_at: DateTime<Utc>,
}

/// What one charge did to the agent's budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeOutcome {
    pub cost_usd: f64,
    /// False once a daily or monthly limit has been exceeded in the
    /// current window. Charges for agents with no registered budget are
    /// always within budget.
    pub within_budget: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
}

/// Point-in-time snapshot of one agent's spend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub agent: String,
    pub daily_spend_usd: f64,
    pub daily_limit_usd: Option<f64>,
    pub monthly_spend_usd: f64,
    pub monthly_limit_usd: Option<f64>,
}

struct BudgetState {
    limits: BudgetLimits,
    daily_spend: f64,
    monthly_spend: f64,
    day: NaiveDate,
    month: (i32, u32),
    history: VecDeque<ChargeRecord>,
}

impl BudgetState {
    fn new(limits: BudgetLimits, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            daily_spend: 0.0,
            monthly_spend: 0.0,
            day: now.date_naive(),
            month: (now.year(), now.month()),
            history: VecDeque::new(),
        }
    }

    /// Reset whichever spend windows `now` has rolled past. A day
    /// boundary resets daily spend only; a month boundary resets both.
    fn roll_windows(&mut self, now: DateTime<Utc>) {
        let day = now.date_naive();
        if day != self.day {
            self.day = day;
            self.daily_spend = 0.0;
        }
        let month = (now.year(), now.month());
        if month != self.month {
            self.month = month;
            self.monthly_spend = 0.0;
        }
    }
}

/// Tracks model spend per agent. Cheap to share behind an `Arc`; all
/// methods take `&self`.
pub struct BudgetRegistry {
    pricing: PricingTable,
    budgets: Mutex<HashMap<String, BudgetState>>,
}

impl BudgetRegistry {
    pub fn new() -> Self {
        Self::with_pricing(PricingTable::builtin())
    }

    pub fn with_pricing(pricing: PricingTable) -> Self {
        Self {
            pricing,
            budgets: Mutex::new(HashMap::new()),
        }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Register or replace the budget for an agent. Spend already
    /// accumulated in the current windows is kept.
    pub fn set_budget(&self, agent: &str, limits: BudgetLimits) {
        let mut budgets = self.budgets.lock();
        match budgets.get_mut(agent) {
            Some(state) => state.limits = limits,
            None => {
                budgets.insert(agent.to_string(), BudgetState::new(limits, Utc::now()));
            }
        }
    }

    /// Price a model call and charge it to the agent's budget.
    pub fn charge(
        &self,
        agent: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> ChargeOutcome {
        self.charge_at(agent, model, input_tokens, output_tokens, Utc::now())
    }

    /// As [`charge`](Self::charge) with an explicit clock, so window
    /// rollover is testable.
    pub fn charge_at(
        &self,
        agent: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        now: DateTime<Utc>,
    ) -> ChargeOutcome {
        let cost_usd = self.pricing.cost_for(model, input_tokens, output_tokens);

        let mut budgets = self.budgets.lock();
        let Some(state) = budgets.get_mut(agent) else {
            debug!(agent, model, cost_usd, "charge for untracked agent");
            return ChargeOutcome {
                cost_usd,
                within_budget: true,
                alert: None,
            };
        };

        state.roll_windows(now);
        state.daily_spend += cost_usd;
        state.monthly_spend += cost_usd;
        if state.history.len() == HISTORY_LIMIT {
            state.history.pop_front();
        }
        state.history.push_back(ChargeRecord {
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost_usd,
            charged_at: now,
        });

        let (within_budget, alert) = assess(state);
        if let Some(alert) = &alert {
            warn!(agent, "{}", alert);
        }
        ChargeOutcome {
            cost_usd,
            within_budget,
            alert,
        }
    }

    /// Snapshot of the agent's current windows, or `None` when no budget
    /// is registered. Rolls the windows first so a stale snapshot cannot
    /// report yesterday's spend as today's.
    pub fn status(&self, agent: &str) -> Option<BudgetStatus> {
        self.status_at(agent, Utc::now())
    }

    pub fn status_at(&self, agent: &str, now: DateTime<Utc>) -> Option<BudgetStatus> {
        let mut budgets = self.budgets.lock();
        let state = budgets.get_mut(agent)?;
        state.roll_windows(now);
        Some(BudgetStatus {
            agent: agent.to_string(),
            daily_spend_usd: state.daily_spend,
            daily_limit_usd: state.limits.daily_usd,
            monthly_spend_usd: state.monthly_spend,
            monthly_limit_usd: state.limits.monthly_usd,
        })
    }

    /// Charge history for an agent, oldest first.
    pub fn history(&self, agent: &str) -> Vec<ChargeRecord> {
        self.budgets
            .lock()
            .get(agent)
            .map(|state| state.history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for BudgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Exceeded limits beat warnings, and the daily window beats the monthly
/// one; only the most urgent alert is reported per charge.
fn assess(state: &BudgetState) -> (bool, Option<String>) {
    if let Some(limit) = state.limits.daily_usd {
        if state.daily_spend >= limit {
            return (
                false,
                Some(format!(
                    "Daily budget exceeded: ${:.2} / ${:.2}",
                    state.daily_spend, limit
                )),
            );
        }
    }
    if let Some(limit) = state.limits.monthly_usd {
        if state.monthly_spend >= limit {
            return (
                false,
                Some(format!(
                    "Monthly budget exceeded: ${:.2} / ${:.2}",
                    state.monthly_spend, limit
                )),
            );
        }
    }
    if let Some(limit) = state.limits.daily_usd {
        if state.daily_spend >= state.limits.alert_threshold * limit {
            let percent = (state.daily_spend / limit * 100.0).round();
            return (
                true,
                Some(format!(
                    "Budget warning: {}% of daily limit reached",
                    percent as u64
                )),
            );
        }
    }
    if let Some(limit) = state.limits.monthly_usd {
        if state.monthly_spend >= state.limits.alert_threshold * limit {
            let percent = (state.monthly_spend / limit * 100.0).round();
            return (
                true,
                Some(format!(
                    "Budget warning: {}% of monthly limit reached",
                    percent as u64
                )),
            );
        }
    }
    (true, None)
}
