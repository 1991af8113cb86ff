use crate::error::Result;
use crate::utils::{is_zero_amount, round_to_cents, validate_month};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type MonthlyFigures = [f64; 12];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct BudgetRecord {
    pub account_id: String,
    pub year: i32,
    #[schemars(description = "Budget for January through December")]
    pub months: MonthlyFigures,
}

impl BudgetRecord {
    pub fn annual_total(&self) -> f64 {
        self.months.iter().sum()
    }
}

/// A single edit to the budget grid, as submitted by the budget editor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BudgetEdit {
    /// Spread an annual figure evenly over the twelve months.
    SetAnnual {
        account_id: String,
        year: i32,
        value: f64,
    },

    /// Set one month (1 = January). Other months are untouched.
    SetMonth {
        account_id: String,
        year: i32,
        month: u32,
        value: f64,
    },

    SetMonths {
        account_id: String,
        year: i32,
        months: MonthlyFigures,
    },

    Clear { account_id: String, year: i32 },
}

impl BudgetEdit {
    /// The (account, year) record this edit touches.
    pub fn key(&self) -> (&str, i32) {
        match self {
            Self::SetAnnual {
                account_id, year, ..
            }
            | Self::SetMonth {
                account_id, year, ..
            }
            | Self::SetMonths {
                account_id, year, ..
            }
            | Self::Clear { account_id, year } => (account_id.as_str(), *year),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BudgetStore {
    records: BTreeMap<(String, i32), MonthlyFigures>,
}

impl BudgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[BudgetRecord]) -> Self {
        let mut store = Self::new();
        for record in records {
            store
                .records
                .insert((record.account_id.clone(), record.year), record.months);
        }
        store
    }

    pub fn contains(&self, account_id: &str, year: i32) -> bool {
        self.records.contains_key(&(account_id.to_string(), year))
    }

    /// Monthly figures for an account, all zero when no record exists.
    pub fn monthly(&self, account_id: &str, year: i32) -> MonthlyFigures {
        self.records
            .get(&(account_id.to_string(), year))
            .copied()
            .unwrap_or([0.0; 12])
    }

    pub fn month_value(&self, account_id: &str, year: i32, month: u32) -> Result<f64> {
        validate_month(month)?;
        Ok(self.monthly(account_id, year)[month as usize - 1])
    }

    pub fn annual_total(&self, account_id: &str, year: i32) -> f64 {
        self.monthly(account_id, year).iter().sum()
    }

    pub fn set_annual(&mut self, account_id: &str, year: i32, value: f64) {
        let per_month = round_to_cents(value / 12.0);
        debug!(
            "Distributing annual budget {:.2} for {} ({}) as {:.2} per month",
            value, account_id, year, per_month
        );
        self.records
            .insert((account_id.to_string(), year), [per_month; 12]);
    }

    pub fn set_month(&mut self, account_id: &str, year: i32, month: u32, value: f64) -> Result<()> {
        validate_month(month)?;
        let figures = self
            .records
            .entry((account_id.to_string(), year))
            .or_insert([0.0; 12]);
        figures[month as usize - 1] = value;
        Ok(())
    }

    pub fn set_months(&mut self, account_id: &str, year: i32, months: MonthlyFigures) {
        self.records.insert((account_id.to_string(), year), months);
    }

    pub fn clear(&mut self, account_id: &str, year: i32) {
        self.records.remove(&(account_id.to_string(), year));
    }

    pub fn apply(&mut self, edit: &BudgetEdit) -> Result<()> {
        match edit {
            BudgetEdit::SetAnnual {
                account_id,
                year,
                value,
            } => self.set_annual(account_id, *year, *value),
            BudgetEdit::SetMonth {
                account_id,
                year,
                month,
                value,
            } => self.set_month(account_id, *year, *month, *value)?,
            BudgetEdit::SetMonths {
                account_id,
                year,
                months,
            } => self.set_months(account_id, *year, *months),
            BudgetEdit::Clear { account_id, year } => self.clear(account_id, *year),
        }
        Ok(())
    }

    /// Records in key order, ready to be upserted by a budget repository.
    pub fn records(&self) -> Vec<BudgetRecord> {
        self.records
            .iter()
            .map(|((account_id, year), months)| BudgetRecord {
                account_id: account_id.clone(),
                year: *year,
                months: *months,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Variance {
    pub budget: f64,
    pub actual: f64,
    /// Budget minus actual; negative means over budget.
    pub variance: f64,
    pub percent_used: f64,
}

pub fn percent_used(budget: f64, actual: f64) -> f64 {
    if is_zero_amount(budget) {
        // Any spend against a zero budget reads as fully used rather than infinite.
        if actual > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        actual / budget * 100.0
    }
}

pub fn compute_variance(budget: f64, actual: f64) -> Variance {
    Variance {
        budget,
        actual,
        variance: budget - actual,
        percent_used: percent_used(budget, actual),
    }
}
